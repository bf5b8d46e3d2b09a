//! Process-wide connection registry keyed by effective broker configuration.
//!
//! The registry deduplicates [`BrokerConnection`] instances by the identity
//! string derived from normalized credentials. Its own lock covers only
//! lookup-or-insert; each connection serializes producer creation and reset
//! behind its own async lock, so unrelated brokers never wait on each other.

use crate::config::{normalize, BrokerCredentials, EffectiveConfig};
use crate::error::{PublishError, PublishResult};
use crate::transport::kafka::KafkaProducerFactory;
use crate::transport::{ProducerFactory, ProducerHandle};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{error, info};

/// Bound on the best-effort flush performed while resetting a connection
const RESET_FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

/// One cached connection per identity.
///
/// Owns at most one live producer at a time and never shares it with
/// another connection. The producer is created lazily on first use and
/// recreated after [`BrokerConnection::reset_connection`].
pub struct BrokerConnection {
    config: EffectiveConfig,
    identity: String,
    factory: Arc<dyn ProducerFactory>,
    producer: AsyncMutex<Option<Arc<dyn ProducerHandle>>>,
}

impl BrokerConnection {
    fn new(config: EffectiveConfig, identity: String, factory: Arc<dyn ProducerFactory>) -> Self {
        info!(
            brokers = config.bootstrap_servers(),
            security = %config.security_summary(),
            "initializing broker connection"
        );
        Self {
            config,
            identity,
            factory,
            producer: AsyncMutex::new(None),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn bootstrap_servers(&self) -> &str {
        self.config.bootstrap_servers()
    }

    pub fn config(&self) -> &EffectiveConfig {
        &self.config
    }

    /// Return the live producer, constructing it on first use.
    ///
    /// Construction happens under the connection's lock, so concurrent
    /// first-use from multiple tasks performs at most one construction. A
    /// construction failure leaves the slot empty; the next call retries.
    pub async fn get_or_create_producer(&self) -> PublishResult<Arc<dyn ProducerHandle>> {
        let mut slot = self.producer.lock().await;
        if let Some(producer) = slot.as_ref() {
            return Ok(producer.clone());
        }

        let _span = crate::connection_span!(identity = %self.identity).entered();
        match self.factory.create(&self.config) {
            Ok(producer) => {
                let mut log_msg = format!(
                    "producer created, servers: {}",
                    self.config.bootstrap_servers()
                );
                if let Some(auth) = self.config.auth() {
                    log_msg.push_str(&format!(", SASL authentication ({})", auth.mechanism));
                }
                info!("{log_msg}");
                *slot = Some(producer.clone());
                Ok(producer)
            }
            Err(e) => {
                error!(
                    brokers = self.config.bootstrap_servers(),
                    error = %e,
                    "failed to create producer"
                );
                Err(PublishError::connection(
                    self.config.bootstrap_servers(),
                    e.to_string(),
                ))
            }
        }
    }

    /// Discard the live producer after a best-effort bounded flush.
    ///
    /// Idempotent: with no live producer this is a no-op. The connection
    /// itself stays in the registry; only the transport handle is dropped,
    /// to be lazily recreated on next use. The handle is discarded even if
    /// the flush fails, and that failure is reported.
    pub async fn reset_connection(&self) -> PublishResult<()> {
        let mut slot = self.producer.lock().await;
        if let Some(producer) = slot.take() {
            let flushed = producer.flush(RESET_FLUSH_TIMEOUT).await;
            info!(
                brokers = self.config.bootstrap_servers(),
                "producer reset"
            );
            flushed.map_err(|e| {
                PublishError::transport(self.config.bootstrap_servers(), e.to_string())
            })?;
        }
        Ok(())
    }

    /// Whether a producer is currently live (used by tests)
    pub async fn has_producer(&self) -> bool {
        self.producer.lock().await.is_some()
    }
}

/// Process-wide keyed cache of broker connections.
///
/// Construct one instance per process and share it by `Arc`; keeping the
/// registry an explicit value rather than a global makes it resettable
/// between test cases.
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<String, Arc<BrokerConnection>>>,
    factory: Arc<dyn ProducerFactory>,
}

impl ConnectionRegistry {
    /// Registry with an injected producer factory
    pub fn new(factory: Arc<dyn ProducerFactory>) -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
            factory,
        }
    }

    /// Registry backed by the rdkafka producer factory
    pub fn with_default_factory() -> Self {
        Self::new(Arc::new(KafkaProducerFactory::new()))
    }

    /// Resolve credentials to the connection for their identity, creating
    /// it on first use.
    ///
    /// Normalization is applied here independently of any normalization the
    /// caller already performed, so every connection is constructed from
    /// consistent configuration. The registry lock covers only
    /// lookup-or-insert.
    pub fn resolve(&self, credentials: &BrokerCredentials) -> PublishResult<Arc<BrokerConnection>> {
        let config = normalize(credentials)?;
        let identity = config.identity();

        let mut connections = self
            .connections
            .lock()
            .expect("connection registry lock poisoned");
        let connection = connections
            .entry(identity.clone())
            .or_insert_with(|| {
                Arc::new(BrokerConnection::new(config, identity, self.factory.clone()))
            })
            .clone();
        Ok(connection)
    }

    /// Number of cached connections
    pub fn len(&self) -> usize {
        self.connections
            .lock()
            .expect("connection registry lock poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reset and drop every cached connection.
    ///
    /// The map is drained under the registry lock so no resolver can see a
    /// half-closed connection; resets then run outside it. Failures are
    /// accumulated and returned so one bad connection never blocks cleanup
    /// of the others.
    pub async fn close_all(&self) -> Vec<(String, PublishError)> {
        let drained: Vec<(String, Arc<BrokerConnection>)> = {
            let mut connections = self
                .connections
                .lock()
                .expect("connection registry lock poisoned");
            connections.drain().collect()
        };

        let mut failures = Vec::new();
        for (identity, connection) in drained {
            match connection.reset_connection().await {
                Ok(()) => info!(identity = %identity, "closed broker connection"),
                Err(e) => {
                    error!(identity = %identity, error = %e, "failed to close broker connection");
                    failures.push((identity, e));
                }
            }
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Secret;
    use crate::testing::mocks::MockProducerFactory;

    fn credentials(servers: &str) -> BrokerCredentials {
        BrokerCredentials {
            bootstrap_servers: servers.to_string(),
            ..Default::default()
        }
    }

    fn sasl_credentials(servers: &str, username: &str, password: &str) -> BrokerCredentials {
        BrokerCredentials {
            bootstrap_servers: servers.to_string(),
            sasl_username: Some(username.to_string()),
            sasl_password: Some(Secret::from(password)),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_resolve_rejects_missing_bootstrap_servers() {
        let registry = ConnectionRegistry::new(Arc::new(MockProducerFactory::new()));
        let result = registry.resolve(&credentials(""));
        assert!(matches!(result, Err(PublishError::Config(_))));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_resolve_returns_same_connection_for_same_identity() {
        let registry = ConnectionRegistry::new(Arc::new(MockProducerFactory::new()));
        let a = registry.resolve(&credentials("b1:9092")).unwrap();
        let b = registry.resolve(&credentials("b1:9092")).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_resolve_differing_password_shares_connection() {
        // The identity intentionally excludes the password; two credential
        // sets differing only there share one connection.
        let registry = ConnectionRegistry::new(Arc::new(MockProducerFactory::new()));
        let a = registry.resolve(&sasl_credentials("b1:9092", "u", "p1")).unwrap();
        let b = registry.resolve(&sasl_credentials("b1:9092", "u", "p2")).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_resolve_distinct_identities_get_distinct_connections() {
        let registry = ConnectionRegistry::new(Arc::new(MockProducerFactory::new()));
        let a = registry.resolve(&credentials("b1:9092")).unwrap();
        let b = registry.resolve(&credentials("b2:9092")).unwrap();
        let c = registry.resolve(&sasl_credentials("b1:9092", "u", "p")).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(registry.len(), 3);
    }

    #[tokio::test]
    async fn test_concurrent_first_use_constructs_one_producer() {
        let factory = Arc::new(MockProducerFactory::new());
        let registry = Arc::new(ConnectionRegistry::new(factory.clone()));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                let connection = registry.resolve(&BrokerCredentials {
                    bootstrap_servers: "b1:9092".to_string(),
                    ..Default::default()
                })?;
                connection.get_or_create_producer().await.map(|_| ())
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(registry.len(), 1);
        assert_eq!(factory.constructions(), 1);
    }

    #[tokio::test]
    async fn test_construction_failure_leaves_slot_empty_for_retry() {
        let factory = Arc::new(MockProducerFactory::new());
        factory.fail_next_construction("broker unreachable");
        let registry = ConnectionRegistry::new(factory.clone());
        let connection = registry.resolve(&credentials("b1:9092")).unwrap();

        let first = connection.get_or_create_producer().await;
        assert!(matches!(first, Err(PublishError::Connection { .. })));
        assert!(!connection.has_producer().await);

        // The failure is not sticky: the next call retries construction
        let second = connection.get_or_create_producer().await;
        assert!(second.is_ok());
        assert_eq!(factory.constructions(), 1);
    }

    #[tokio::test]
    async fn test_reset_is_idempotent_and_keeps_registry_entry() {
        let factory = Arc::new(MockProducerFactory::new());
        let registry = ConnectionRegistry::new(factory.clone());
        let connection = registry.resolve(&credentials("b1:9092")).unwrap();

        // No-op without a live producer
        connection.reset_connection().await.unwrap();

        connection.get_or_create_producer().await.unwrap();
        assert!(connection.has_producer().await);
        connection.reset_connection().await.unwrap();
        assert!(!connection.has_producer().await);
        assert_eq!(registry.len(), 1);

        // Next use recreates transparently
        connection.get_or_create_producer().await.unwrap();
        assert_eq!(factory.constructions(), 2);
    }

    #[tokio::test]
    async fn test_close_all_clears_registry() {
        let factory = Arc::new(MockProducerFactory::new());
        let registry = ConnectionRegistry::new(factory.clone());
        for servers in ["b1:9092", "b2:9092", "b3:9092"] {
            let connection = registry.resolve(&credentials(servers)).unwrap();
            connection.get_or_create_producer().await.unwrap();
        }
        assert_eq!(registry.len(), 3);

        let failures = registry.close_all().await;
        assert!(failures.is_empty());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_close_all_accumulates_failures() {
        let factory = Arc::new(MockProducerFactory::new());
        let registry = ConnectionRegistry::new(factory.clone());
        for servers in ["b1:9092", "b2:9092"] {
            let connection = registry.resolve(&credentials(servers)).unwrap();
            connection.get_or_create_producer().await.unwrap();
        }

        // Flush failures on one connection do not stop cleanup of the rest:
        // both failures are reported and the map is still cleared.
        factory.fail_flushes("flush timed out");
        let failures = registry.close_all().await;

        assert!(registry.is_empty());
        assert_eq!(failures.len(), 2);
    }
}
