//! Transport seam over the Kafka client library.
//!
//! The publisher core never talks to the client library directly; it goes
//! through [`ProducerHandle`] and [`ProducerFactory`] to enable dependency
//! injection and testing. The production implementation lives in
//! [`kafka`]; mocks live in `crate::testing::mocks`.

use crate::config::EffectiveConfig;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub mod kafka;

/// One outbound message as handed to the transport
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRecord {
    pub topic: String,
    pub payload: Vec<u8>,
    pub key: Option<Vec<u8>>,
    pub headers: Vec<(String, String)>,
}

/// Broker acknowledgment for one delivered record
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryAck {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

/// Resolves exactly once per submitted record: acknowledgment or refusal
pub type DeliveryFuture = BoxFuture<'static, Result<DeliveryAck, TransportError>>;

/// Transport-layer errors.
///
/// `Refused` is a delivery-level negative acknowledgment and does not put
/// the producer in doubt; every other variant is a transport-level failure
/// after which the owning connection should be reset.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The broker or client library refused the record (negative ack)
    #[error("delivery refused: {reason}")]
    Refused { reason: String },

    /// Failure inside the client library during enqueue, send, or flush
    #[error("producer failure: {message}")]
    Producer { message: String },

    /// The delivery notification was dropped before it resolved
    #[error("delivery notification dropped before resolving")]
    AckDropped,

    /// Metadata request failure (connectivity probe)
    #[error("metadata request failed: {message}")]
    Metadata { message: String },
}

impl TransportError {
    /// Whether this failure leaves the producer in an unknown state
    pub fn is_transport_level(&self) -> bool {
        !matches!(self, TransportError::Refused { .. })
    }
}

/// A live producer for one broker identity.
///
/// Implementations must support concurrent use from multiple tasks; the
/// connection layer serializes only creation and reset, not sends.
#[async_trait]
pub trait ProducerHandle: Send + Sync {
    /// Enqueue one record with the local client library. The returned
    /// future resolves when the broker acknowledges or refuses the record;
    /// bounding that wait is the caller's responsibility.
    fn begin_send(&self, record: OutboundRecord) -> Result<DeliveryFuture, TransportError>;

    /// Push enqueued records to the wire, waiting up to `timeout`
    async fn flush(&self, timeout: Duration) -> Result<(), TransportError>;

    /// Lightweight connectivity probe: names of topics visible to this
    /// producer's credentials
    async fn list_topics(&self, timeout: Duration) -> Result<Vec<String>, TransportError>;
}

/// Constructs producers from normalized configuration.
///
/// Injected into the connection registry so tests can count and fail
/// constructions without a broker.
pub trait ProducerFactory: Send + Sync {
    fn create(&self, config: &EffectiveConfig) -> Result<Arc<dyn ProducerHandle>, TransportError>;
}
