//! Connector instance registry.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use unidir_core::Source;

use crate::traits::SourceConnector;

/// Shared connector handle.
pub type BoxedConnector = Arc<dyn SourceConnector>;

/// Registry of connector instances, one per source.
///
/// Registering a source again replaces the previous instance; lookups hand
/// out shared handles so in-flight fetches on a replaced connector run to
/// completion.
#[derive(Default)]
pub struct ConnectorRegistry {
    connectors: RwLock<HashMap<Source, BoxedConnector>>,
}

impl ConnectorRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connector for its source.
    pub async fn register(&self, connector: BoxedConnector) {
        let source = connector.source();
        info!(source = %source, name = connector.display_name(), "Registered connector");
        self.connectors.write().await.insert(source, connector);
    }

    /// Get the connector for a source, if one is registered.
    pub async fn get(&self, source: Source) -> Option<BoxedConnector> {
        self.connectors.read().await.get(&source).cloned()
    }

    /// Remove the connector for a source.
    pub async fn remove(&self, source: Source) -> Option<BoxedConnector> {
        self.connectors.write().await.remove(&source)
    }

    /// Sources that have a registered, configured connector.
    pub async fn configured_sources(&self) -> Vec<Source> {
        let connectors = self.connectors.read().await;
        Source::ALL
            .into_iter()
            .filter(|source| {
                connectors
                    .get(source)
                    .is_some_and(|c| c.is_configured())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::static_connector::StaticConnector;

    #[tokio::test]
    async fn test_register_and_lookup() {
        let registry = ConnectorRegistry::new();
        assert!(registry.get(Source::Ldap).await.is_none());

        registry
            .register(Arc::new(StaticConnector::new(Source::Ldap, Vec::new())))
            .await;
        let connector = registry.get(Source::Ldap).await.unwrap();
        assert_eq!(connector.source(), Source::Ldap);
    }

    #[tokio::test]
    async fn test_configured_sources_skips_unconfigured() {
        let registry = ConnectorRegistry::new();
        registry
            .register(Arc::new(StaticConnector::new(Source::Directory, Vec::new())))
            .await;
        registry
            .register(Arc::new(StaticConnector::unconfigured(Source::Ldap)))
            .await;

        let configured = registry.configured_sources().await;
        assert_eq!(configured, vec![Source::Directory]);
    }
}
