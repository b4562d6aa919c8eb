//! In-memory connector backed by a fixed record set.
//!
//! Stands in for the real network clients in tests and local runs: the
//! record batch, configuration state, fetch latency, and failure behavior
//! are all scripted up front.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use unidir_core::Source;

use crate::error::{ConnectorError, ConnectorResult};
use crate::raw::RawRecord;
use crate::traits::{ConnectionReport, SourceConnector};

/// A connector that serves a scripted batch of records.
pub struct StaticConnector {
    source: Source,
    display_name: String,
    configured: bool,
    records: Arc<Mutex<Vec<RawRecord>>>,
    fail_with: Option<String>,
    fetch_delay: Option<Duration>,
}

impl StaticConnector {
    /// Create a configured connector serving the given records.
    #[must_use]
    pub fn new(source: Source, records: Vec<RawRecord>) -> Self {
        Self {
            source,
            display_name: format!("static:{source}"),
            configured: true,
            records: Arc::new(Mutex::new(records)),
            fail_with: None,
            fetch_delay: None,
        }
    }

    /// Create a connector that reports itself unconfigured.
    #[must_use]
    pub fn unconfigured(source: Source) -> Self {
        let mut connector = Self::new(source, Vec::new());
        connector.configured = false;
        connector
    }

    /// Make every fetch fail with a connection error.
    #[must_use]
    pub fn failing(source: Source, message: impl Into<String>) -> Self {
        let mut connector = Self::new(source, Vec::new());
        connector.fail_with = Some(message.into());
        connector
    }

    /// Delay each fetch, to exercise overlap behavior.
    #[must_use]
    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = Some(delay);
        self
    }

    /// Replace the scripted batch.
    pub async fn set_records(&self, records: Vec<RawRecord>) {
        *self.records.lock().await = records;
    }
}

#[async_trait]
impl SourceConnector for StaticConnector {
    fn source(&self) -> Source {
        self.source
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn fetch(&self) -> ConnectorResult<Vec<RawRecord>> {
        if let Some(delay) = self.fetch_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.fail_with {
            return Err(ConnectorError::connection_failed(message.clone()));
        }
        Ok(self.records.lock().await.clone())
    }

    async fn test_connection(&self) -> ConnectorResult<ConnectionReport> {
        if let Some(message) = &self.fail_with {
            return Ok(ConnectionReport::failed(message.clone()));
        }
        if !self.configured {
            return Ok(ConnectionReport::failed("connector is not configured"));
        }
        let count = self.records.lock().await.len();
        Ok(ConnectionReport::ok(format!("{count} records available")).with_latency(0))
    }
}
