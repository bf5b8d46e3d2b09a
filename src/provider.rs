//! Credential validation entry point for the host runtime.
//!
//! Invoked once at setup time: applies the same normalization rules as the
//! publish path, then probes connectivity with a throwaway producer and a
//! lightweight metadata request. The throwaway producer is never cached.

use crate::config::{normalize, BrokerCredentials};
use crate::error::{PublishError, PublishResult};
use crate::transport::kafka::KafkaProducerFactory;
use crate::transport::ProducerFactory;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Bound on the connectivity probe
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Validates host-supplied credentials against a live broker
pub struct KafkaProvider {
    factory: Arc<dyn ProducerFactory>,
}

impl KafkaProvider {
    /// Provider with an injected producer factory
    pub fn new(factory: Arc<dyn ProducerFactory>) -> Self {
        Self { factory }
    }

    /// Provider backed by the rdkafka producer factory
    pub fn with_default_factory() -> Self {
        Self::new(Arc::new(KafkaProducerFactory::new()))
    }

    /// Normalize the credentials and probe the broker.
    ///
    /// Every failure surfaces as [`PublishError::CredentialValidation`]
    /// carrying the underlying message.
    pub async fn validate_credentials(&self, credentials: &BrokerCredentials) -> PublishResult<()> {
        let effective =
            normalize(credentials).map_err(|e| PublishError::credential_validation(e.to_string()))?;

        let producer = self
            .factory
            .create(&effective)
            .map_err(|e| PublishError::credential_validation(e.to_string()))?;

        let topics = producer
            .list_topics(PROBE_TIMEOUT)
            .await
            .map_err(|e| PublishError::credential_validation(e.to_string()))?;

        producer
            .flush(PROBE_TIMEOUT)
            .await
            .map_err(|e| PublishError::credential_validation(e.to_string()))?;

        info!(
            brokers = effective.bootstrap_servers(),
            security = %effective.security_summary(),
            visible_topics = topics.len(),
            "broker connectivity test succeeded"
        );
        Ok(())
    }
}
