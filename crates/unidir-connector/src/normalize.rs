//! Source-specific field-name mapping into the canonical record shape.
//!
//! Each source reports its own attribute names; normalization maps the
//! well-known ones onto the typed core of [`IdentityRecord`]. The raw
//! record itself stays untouched: schema discovery and the dynamic
//! attribute bag work from the source-native field names, so a directory
//! batch registers `mail` or `givenName` columns even though those values
//! also feed the canonical core. The mapping is per-source but the target
//! shape is always the same.

use thiserror::Error;

use unidir_core::{IdentityRecord, Source};

use crate::raw::RawRecord;

/// Error raised when a raw record cannot be normalized.
#[derive(Debug, Clone, Error)]
pub enum NormalizeError {
    /// No usable email was present under any known key.
    #[error("record has no email (looked at {looked_at})")]
    MissingEmail { looked_at: String },
}

/// Map one raw record into the canonical shape for its source.
pub fn normalize_record(source: Source, raw: &RawRecord) -> Result<IdentityRecord, NormalizeError> {
    match source {
        Source::Directory => normalize_directory(raw),
        Source::Ldap => normalize_ldap(raw),
        Source::Upload | Source::Manual => normalize_flat(source, raw),
    }
}

/// Graph-style directory attributes: `mail` / `userPrincipalName`,
/// `givenName` / `surname`, `accountEnabled`.
fn normalize_directory(raw: &RawRecord) -> Result<IdentityRecord, NormalizeError> {
    let email = first_text(raw, &["mail", "userPrincipalName"]).ok_or_else(|| {
        NormalizeError::MissingEmail {
            looked_at: "mail, userPrincipalName".to_string(),
        }
    })?;

    let mut record = IdentityRecord::new(Source::Directory, email);
    record.external_id = first_text(raw, &["id"]);
    record.first_name = first_text(raw, &["givenName"]);
    record.last_name = first_text(raw, &["surname"]);
    record.display_name = first_text(raw, &["displayName"]);
    if let Some(enabled) = raw.get_bool("accountEnabled") {
        record.is_active = enabled;
    }
    Ok(record)
}

/// inetOrgPerson-style attributes: `mail`, `givenName`, `sn`, `cn`, with
/// `entryUUID` / `uid` / `dn` as the source-native key. An Active Directory
/// `userAccountControl` with the ACCOUNTDISABLE bit (0x2) marks the record
/// inactive.
fn normalize_ldap(raw: &RawRecord) -> Result<IdentityRecord, NormalizeError> {
    let email = first_text(raw, &["mail"]).ok_or_else(|| NormalizeError::MissingEmail {
        looked_at: "mail".to_string(),
    })?;

    let mut record = IdentityRecord::new(Source::Ldap, email);
    record.external_id = first_text(raw, &["entryUUID", "uid", "dn"]);
    record.first_name = first_text(raw, &["givenName"]);
    record.last_name = first_text(raw, &["sn"]);
    record.display_name = first_text(raw, &["cn", "displayName"]);

    if let Some(uac) = raw.get("userAccountControl") {
        let flags = uac
            .as_i64()
            .or_else(|| uac.as_str().and_then(|s| s.trim().parse::<i64>().ok()));
        if let Some(flags) = flags {
            record.is_active = flags & 0x2 == 0;
        }
    }
    Ok(record)
}

/// Flat column names as produced by upload parsing or manual entry forms.
/// Both snake_case and camelCase spellings are accepted.
fn normalize_flat(source: Source, raw: &RawRecord) -> Result<IdentityRecord, NormalizeError> {
    let email = first_text(raw, &["email", "mail", "email_address"]).ok_or_else(|| {
        NormalizeError::MissingEmail {
            looked_at: "email, mail, email_address".to_string(),
        }
    })?;

    let mut record = IdentityRecord::new(source, email);
    record.external_id = first_text(raw, &["external_id", "externalId", "id"]);
    record.first_name = first_text(raw, &["first_name", "firstName"]);
    record.last_name = first_text(raw, &["last_name", "lastName"]);
    record.display_name = first_text(raw, &["display_name", "displayName"]);
    for key in ["is_active", "isActive", "active"] {
        if let Some(active) = raw.get_bool(key) {
            record.is_active = active;
            break;
        }
    }
    Ok(record)
}

/// First non-empty text value among the given keys.
fn first_text(raw: &RawRecord, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| raw.get_text(key))
}
