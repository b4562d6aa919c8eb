//! Source connector contract.
//!
//! The engine consumes connectors purely through this trait: given
//! configuration, a connector reports whether it is usable, fetches a batch
//! of raw attribute maps, and can probe its transport. Network transports
//! live behind implementations of this trait and carry their own timeouts;
//! the engine never cancels an in-flight fetch.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use unidir_core::Source;

use crate::error::ConnectorResult;
use crate::raw::RawRecord;

/// Outcome of probing a connector's transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionReport {
    /// Whether the probe succeeded.
    pub success: bool,
    /// Human-readable details (server version, bind DN, error text, ...).
    pub details: String,
    /// Probe round-trip time.
    pub latency_ms: Option<i64>,
}

impl ConnectionReport {
    /// Create a successful report.
    #[must_use]
    pub fn ok(details: impl Into<String>) -> Self {
        Self {
            success: true,
            details: details.into(),
            latency_ms: None,
        }
    }

    /// Create a failed report.
    #[must_use]
    pub fn failed(details: impl Into<String>) -> Self {
        Self {
            success: false,
            details: details.into(),
            latency_ms: None,
        }
    }

    /// Attach the probe round-trip time.
    #[must_use]
    pub fn with_latency(mut self, latency_ms: i64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }
}

/// Contract every identity source connector implements.
#[async_trait]
pub trait SourceConnector: Send + Sync {
    /// Which source this connector feeds.
    fn source(&self) -> Source;

    /// Display name for this connector instance.
    fn display_name(&self) -> &str;

    /// Whether the connector has everything it needs to fetch.
    ///
    /// An unconfigured connector is skipped by `sync_all_sources` and makes
    /// a targeted `sync_source` fail without occupying the run guard.
    fn is_configured(&self) -> bool;

    /// Fetch the current batch of raw records from the source system.
    ///
    /// Implementations own their transport timeout; this call must not
    /// block indefinitely.
    async fn fetch(&self) -> ConnectorResult<Vec<RawRecord>>;

    /// Probe the transport without fetching records.
    async fn test_connection(&self) -> ConnectorResult<ConnectionReport>;
}
