//! Connector error types with transient/permanent classification.

use thiserror::Error;

use unidir_core::Source;

/// Error that can occur during connector operations.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// Failed to reach the source system.
    #[error("connection failed: {message}")]
    ConnectionFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The source system did not answer in time.
    #[error("connection timeout after {timeout_secs} seconds")]
    ConnectionTimeout { timeout_secs: u64 },

    /// Credentials were rejected by the source system.
    #[error("authentication failed: invalid credentials")]
    AuthenticationFailed,

    /// Connector configuration is missing or invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// No connector is registered for the source.
    #[error("no connector registered for source {source_kind}")]
    NotRegistered { source_kind: Source },

    /// The source returned data the connector could not interpret.
    #[error("invalid data from source: {message}")]
    InvalidData { message: String },
}

impl ConnectorError {
    /// Check if this error is transient and a later retry may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ConnectorError::ConnectionFailed { .. } | ConnectorError::ConnectionTimeout { .. }
        )
    }

    /// Check if this error is permanent and retry won't help.
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }

    /// Create a connection failed error.
    pub fn connection_failed(message: impl Into<String>) -> Self {
        ConnectorError::ConnectionFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection failed error with source.
    pub fn connection_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ConnectorError::ConnectionFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        ConnectorError::InvalidConfiguration {
            message: message.into(),
        }
    }

    /// Create an invalid data error.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        ConnectorError::InvalidData {
            message: message.into(),
        }
    }
}

/// Result type for connector operations.
pub type ConnectorResult<T> = Result<T, ConnectorError>;
