//! Identity source kinds.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Origin of identity records.
///
/// Each source owns an isolated store; records from different sources are
/// never merged at write time, only in the read-only aggregation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// Cloud directory service (Graph-style REST API).
    Directory,
    /// LDAP / Active Directory tree.
    Ldap,
    /// Spreadsheet / CSV bulk uploads.
    Upload,
    /// Manually entered records.
    Manual,
}

impl Source {
    /// All known sources, in canonical order.
    pub const ALL: [Source; 4] = [Source::Directory, Source::Ldap, Source::Upload, Source::Manual];

    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Directory => "directory",
            Source::Ldap => "ldap",
            Source::Upload => "upload",
            Source::Manual => "manual",
        }
    }

    /// Whether this source supports pull-based synchronization.
    ///
    /// Upload and manual records arrive via direct creation; triggering a
    /// sync for them is rejected with `NoSyncSupported`.
    #[must_use]
    pub fn is_syncable(&self) -> bool {
        matches!(self, Source::Directory | Source::Ldap)
    }

    /// Sources that support pull-based synchronization.
    #[must_use]
    pub fn syncable() -> impl Iterator<Item = Source> {
        Self::ALL.into_iter().filter(Source::is_syncable)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "directory" => Ok(Source::Directory),
            "ldap" => Ok(Source::Ldap),
            "upload" => Ok(Source::Upload),
            "manual" => Ok(Source::Manual),
            _ => Err(format!("Unknown source: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_roundtrip() {
        for source in Source::ALL {
            let parsed: Source = source.as_str().parse().unwrap();
            assert_eq!(parsed, source);
        }
        assert!("github".parse::<Source>().is_err());
    }

    #[test]
    fn test_syncable_sources() {
        assert!(Source::Directory.is_syncable());
        assert!(Source::Ldap.is_syncable());
        assert!(!Source::Upload.is_syncable());
        assert!(!Source::Manual.is_syncable());
        assert_eq!(Source::syncable().count(), 2);
    }

    #[test]
    fn test_serde_snake_case() {
        let json = serde_json::to_string(&Source::Directory).unwrap();
        assert_eq!(json, "\"directory\"");
    }
}
