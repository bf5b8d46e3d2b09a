//! rdkafka-backed producer handle and factory.
//!
//! The delivery future returned by `begin_send` resolves when librdkafka's
//! background thread reports the broker's acknowledgment; a negative
//! acknowledgment surfaces as [`TransportError::Refused`], everything else
//! as a transport-level failure.

use crate::config::EffectiveConfig;
use crate::transport::{
    DeliveryAck, DeliveryFuture, OutboundRecord, ProducerFactory, ProducerHandle, TransportError,
};
use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Producer handle for one broker identity
pub struct KafkaProducer {
    inner: FutureProducer,
    bootstrap_servers: String,
}

impl KafkaProducer {
    pub fn bootstrap_servers(&self) -> &str {
        &self.bootstrap_servers
    }
}

#[async_trait]
impl ProducerHandle for KafkaProducer {
    fn begin_send(&self, record: OutboundRecord) -> Result<DeliveryFuture, TransportError> {
        let delivery = {
            let mut headers = OwnedHeaders::new_with_capacity(record.headers.len());
            for (key, value) in &record.headers {
                headers = headers.insert(Header {
                    key,
                    value: Some(value.as_str()),
                });
            }

            let mut future_record = FutureRecord::<[u8], [u8]>::to(&record.topic)
                .payload(record.payload.as_slice())
                .headers(headers);
            if let Some(key) = &record.key {
                future_record = future_record.key(key.as_slice());
            }

            self.inner
                .send_result(future_record)
                .map_err(|(e, _)| TransportError::Producer {
                    message: e.to_string(),
                })?
        };

        let topic = record.topic;
        Ok(Box::pin(async move {
            match delivery.await {
                Ok(Ok((partition, offset))) => Ok(DeliveryAck {
                    topic,
                    partition,
                    offset,
                }),
                Ok(Err((err, _message))) => Err(TransportError::Refused {
                    reason: err.to_string(),
                }),
                Err(_canceled) => Err(TransportError::AckDropped),
            }
        }))
    }

    async fn flush(&self, timeout: Duration) -> Result<(), TransportError> {
        // librdkafka's flush blocks the calling thread
        let producer = self.inner.clone();
        tokio::task::spawn_blocking(move || producer.flush(Timeout::After(timeout)))
            .await
            .map_err(|e| TransportError::Producer {
                message: format!("flush task failed: {e}"),
            })?
            .map_err(|e| TransportError::Producer {
                message: e.to_string(),
            })
    }

    async fn list_topics(&self, timeout: Duration) -> Result<Vec<String>, TransportError> {
        let producer = self.inner.clone();
        let metadata = tokio::task::spawn_blocking(move || {
            producer
                .client()
                .fetch_metadata(None, Timeout::After(timeout))
        })
        .await
        .map_err(|e| TransportError::Metadata {
            message: format!("metadata task failed: {e}"),
        })?
        .map_err(|e| TransportError::Metadata {
            message: e.to_string(),
        })?;

        Ok(metadata
            .topics()
            .iter()
            .map(|t| t.name().to_string())
            .collect())
    }
}

/// Constructs [`KafkaProducer`] instances from normalized configuration
#[derive(Debug, Default)]
pub struct KafkaProducerFactory;

impl KafkaProducerFactory {
    pub fn new() -> Self {
        Self
    }
}

impl ProducerFactory for KafkaProducerFactory {
    fn create(&self, config: &EffectiveConfig) -> Result<Arc<dyn ProducerHandle>, TransportError> {
        let mut client_config = ClientConfig::new();
        for (key, value) in config.to_client_config() {
            client_config.set(key, value);
        }

        let producer: FutureProducer =
            client_config.create().map_err(|e| TransportError::Producer {
                message: e.to_string(),
            })?;

        debug!(
            brokers = config.bootstrap_servers(),
            client_id = config.client_id(),
            "constructed rdkafka producer"
        );

        Ok(Arc::new(KafkaProducer {
            inner: producer,
            bootstrap_servers: config.bootstrap_servers().to_string(),
        }))
    }
}
