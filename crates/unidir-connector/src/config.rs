//! Connector configuration types.
//!
//! Shapes for the connection parameters handed to the excluded network
//! clients. Credentials are redacted from `Debug` output.

use serde::{Deserialize, Serialize};

use crate::error::{ConnectorError, ConnectorResult};

/// Configuration for the cloud directory (Graph-style REST) source.
#[derive(Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Tenant identifier.
    pub tenant_id: String,

    /// OAuth client id.
    pub client_id: String,

    /// OAuth client secret.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    /// API base URL.
    #[serde(default = "default_directory_base_url")]
    pub base_url: String,

    /// Page size for user listing.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl DirectoryConfig {
    /// Whether all required parameters are present.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.tenant_id.is_empty()
            && !self.client_id.is_empty()
            && self.client_secret.as_deref().is_some_and(|s| !s.is_empty())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ConnectorResult<()> {
        if self.tenant_id.is_empty() {
            return Err(ConnectorError::invalid_configuration("tenant_id is required"));
        }
        if self.client_id.is_empty() {
            return Err(ConnectorError::invalid_configuration("client_id is required"));
        }
        if self.client_secret.as_deref().unwrap_or("").is_empty() {
            return Err(ConnectorError::invalid_configuration(
                "client_secret is required",
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for DirectoryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryConfig")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "***REDACTED***"),
            )
            .field("base_url", &self.base_url)
            .field("page_size", &self.page_size)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Configuration for the LDAP source.
#[derive(Clone, Serialize, Deserialize)]
pub struct LdapSourceConfig {
    /// LDAP server hostname or IP address.
    pub host: String,

    /// LDAP server port (389 for LDAP, 636 for LDAPS).
    #[serde(default = "default_ldap_port")]
    pub port: u16,

    /// Use SSL/TLS (LDAPS).
    #[serde(default)]
    pub use_ssl: bool,

    /// Base DN for searches (e.g. "dc=example,dc=com").
    pub base_dn: String,

    /// Bind DN for authentication.
    pub bind_dn: String,

    /// Bind password.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_password: Option<String>,

    /// Search filter selecting user entries.
    #[serde(default = "default_user_filter")]
    pub user_filter: String,

    /// Attribute used as the source-native key.
    #[serde(default = "default_uid_attribute")]
    pub uid_attribute: String,

    /// Page size for search operations.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Connect timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl LdapSourceConfig {
    /// Whether all required parameters are present.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.host.is_empty() && !self.base_dn.is_empty() && !self.bind_dn.is_empty()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ConnectorResult<()> {
        if self.host.is_empty() {
            return Err(ConnectorError::invalid_configuration("host is required"));
        }
        if self.base_dn.is_empty() {
            return Err(ConnectorError::invalid_configuration("base_dn is required"));
        }
        if self.bind_dn.is_empty() {
            return Err(ConnectorError::invalid_configuration("bind_dn is required"));
        }
        Ok(())
    }
}

impl std::fmt::Debug for LdapSourceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapSourceConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("use_ssl", &self.use_ssl)
            .field("base_dn", &self.base_dn)
            .field("bind_dn", &self.bind_dn)
            .field(
                "bind_password",
                &self.bind_password.as_ref().map(|_| "***REDACTED***"),
            )
            .field("user_filter", &self.user_filter)
            .field("uid_attribute", &self.uid_attribute)
            .field("page_size", &self.page_size)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

fn default_directory_base_url() -> String {
    "https://graph.microsoft.com/v1.0".to_string()
}

fn default_ldap_port() -> u16 {
    389
}

fn default_user_filter() -> String {
    "(objectClass=inetOrgPerson)".to_string()
}

fn default_uid_attribute() -> String {
    "entryUUID".to_string()
}

fn default_page_size() -> u32 {
    500
}

fn default_timeout_secs() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ldap_config() -> LdapSourceConfig {
        LdapSourceConfig {
            host: "ldap.example.com".into(),
            port: 389,
            use_ssl: false,
            base_dn: "dc=example,dc=com".into(),
            bind_dn: "cn=admin,dc=example,dc=com".into(),
            bind_password: Some("hunter2".into()),
            user_filter: default_user_filter(),
            uid_attribute: default_uid_attribute(),
            page_size: 500,
            timeout_secs: 30,
        }
    }

    #[test]
    fn test_ldap_validation() {
        assert!(ldap_config().validate().is_ok());

        let mut config = ldap_config();
        config.host.clear();
        assert!(config.validate().is_err());
        assert!(!config.is_complete());
    }

    #[test]
    fn test_debug_redacts_credentials() {
        let debug = format!("{:?}", ldap_config());
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("***REDACTED***"));
    }

    #[test]
    fn test_directory_completeness() {
        let config = DirectoryConfig {
            tenant_id: "t".into(),
            client_id: "c".into(),
            client_secret: Some("s".into()),
            base_url: default_directory_base_url(),
            page_size: 500,
            timeout_secs: 30,
        };
        assert!(config.is_complete());
        assert!(config.validate().is_ok());

        let incomplete = DirectoryConfig {
            client_secret: None,
            ..config
        };
        assert!(!incomplete.is_complete());
        assert!(incomplete.validate().is_err());
    }
}
