//! Mock implementations for testing
//!
//! Provides mock [`ProducerHandle`] and [`ProducerFactory`] implementations
//! with scriptable delivery behavior: acknowledge, refuse, fail at enqueue,
//! or never resolve (to exercise the bounded acknowledgment wait).

use crate::config::EffectiveConfig;
use crate::transport::{
    DeliveryAck, DeliveryFuture, OutboundRecord, ProducerFactory, ProducerHandle, TransportError,
};
use async_trait::async_trait;
use futures::future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Scripted behavior for the next sends of a [`MockProducer`]
#[derive(Debug, Clone)]
pub enum SendMode {
    /// Resolve the delivery future with an acknowledgment
    Ack { partition: i32, offset: i64 },
    /// Resolve the delivery future with a negative acknowledgment
    Refuse(String),
    /// Fail at enqueue time (transport-level)
    FailEnqueue(String),
    /// Never resolve the delivery future
    NeverResolve,
}

/// Mock producer recording every record handed to it
pub struct MockProducer {
    sent: Mutex<Vec<OutboundRecord>>,
    send_mode: Mutex<SendMode>,
    flush_error: Mutex<Option<String>>,
    flushes: AtomicUsize,
    topics: Mutex<Vec<String>>,
    list_topics_error: Mutex<Option<String>>,
}

impl MockProducer {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            send_mode: Mutex::new(SendMode::Ack {
                partition: 0,
                offset: 42,
            }),
            flush_error: Mutex::new(None),
            flushes: AtomicUsize::new(0),
            topics: Mutex::new(vec!["orders".to_string()]),
            list_topics_error: Mutex::new(None),
        }
    }

    pub fn set_send_mode(&self, mode: SendMode) {
        *self.send_mode.lock().unwrap() = mode;
    }

    pub fn set_flush_error(&self, message: Option<&str>) {
        *self.flush_error.lock().unwrap() = message.map(str::to_string);
    }

    pub fn set_topics(&self, topics: Vec<String>) {
        *self.topics.lock().unwrap() = topics;
    }

    pub fn set_list_topics_error(&self, message: Option<&str>) {
        *self.list_topics_error.lock().unwrap() = message.map(str::to_string);
    }

    pub fn sent_records(&self) -> Vec<OutboundRecord> {
        self.sent.lock().unwrap().clone()
    }

    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }
}

impl Default for MockProducer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProducerHandle for MockProducer {
    fn begin_send(&self, record: OutboundRecord) -> Result<DeliveryFuture, TransportError> {
        let mode = self.send_mode.lock().unwrap().clone();
        if let SendMode::FailEnqueue(message) = &mode {
            return Err(TransportError::Producer {
                message: message.clone(),
            });
        }

        self.sent.lock().unwrap().push(record.clone());

        match mode {
            SendMode::Ack { partition, offset } => {
                let ack = DeliveryAck {
                    topic: record.topic,
                    partition,
                    offset,
                };
                Ok(Box::pin(future::ready(Ok(ack))))
            }
            SendMode::Refuse(reason) => {
                Ok(Box::pin(future::ready(Err(TransportError::Refused {
                    reason,
                }))))
            }
            SendMode::NeverResolve => Ok(Box::pin(future::pending::<
                Result<DeliveryAck, TransportError>,
            >())),
            SendMode::FailEnqueue(_) => unreachable!("handled above"),
        }
    }

    async fn flush(&self, _timeout: Duration) -> Result<(), TransportError> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        match self.flush_error.lock().unwrap().as_ref() {
            Some(message) => Err(TransportError::Producer {
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }

    async fn list_topics(&self, _timeout: Duration) -> Result<Vec<String>, TransportError> {
        match self.list_topics_error.lock().unwrap().as_ref() {
            Some(message) => Err(TransportError::Metadata {
                message: message.clone(),
            }),
            None => Ok(self.topics.lock().unwrap().clone()),
        }
    }
}

/// Mock factory counting constructions and retaining every producer it made
pub struct MockProducerFactory {
    constructions: AtomicUsize,
    fail_next: Mutex<Option<String>>,
    created: Mutex<Vec<Arc<MockProducer>>>,
    configs: Mutex<Vec<EffectiveConfig>>,
    default_send_mode: Mutex<SendMode>,
    default_list_topics_error: Mutex<Option<String>>,
}

impl MockProducerFactory {
    pub fn new() -> Self {
        Self {
            constructions: AtomicUsize::new(0),
            fail_next: Mutex::new(None),
            created: Mutex::new(Vec::new()),
            configs: Mutex::new(Vec::new()),
            default_send_mode: Mutex::new(SendMode::Ack {
                partition: 0,
                offset: 42,
            }),
            default_list_topics_error: Mutex::new(None),
        }
    }

    /// Number of successful producer constructions
    pub fn constructions(&self) -> usize {
        self.constructions.load(Ordering::SeqCst)
    }

    /// Make the next construction fail once
    pub fn fail_next_construction(&self, message: &str) {
        *self.fail_next.lock().unwrap() = Some(message.to_string());
    }

    /// Send mode applied to producers constructed from now on
    pub fn set_default_send_mode(&self, mode: SendMode) {
        *self.default_send_mode.lock().unwrap() = mode;
    }

    /// Metadata failure applied to producers constructed from now on
    pub fn set_default_list_topics_error(&self, message: Option<&str>) {
        *self.default_list_topics_error.lock().unwrap() = message.map(str::to_string);
    }

    /// Inject a flush failure into every producer constructed so far
    pub fn fail_flushes(&self, message: &str) {
        for producer in self.created.lock().unwrap().iter() {
            producer.set_flush_error(Some(message));
        }
    }

    /// Clear injected failures on every producer constructed so far
    pub fn heal(&self) {
        *self.fail_next.lock().unwrap() = None;
        for producer in self.created.lock().unwrap().iter() {
            producer.set_flush_error(None);
            producer.set_list_topics_error(None);
        }
    }

    /// The most recently constructed producer
    pub fn last_producer(&self) -> Option<Arc<MockProducer>> {
        self.created.lock().unwrap().last().cloned()
    }

    /// The normalized configuration of the most recent construction
    pub fn last_config(&self) -> Option<EffectiveConfig> {
        self.configs.lock().unwrap().last().cloned()
    }
}

impl Default for MockProducerFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ProducerFactory for MockProducerFactory {
    fn create(&self, config: &EffectiveConfig) -> Result<Arc<dyn ProducerHandle>, TransportError> {
        if let Some(message) = self.fail_next.lock().unwrap().take() {
            return Err(TransportError::Producer { message });
        }

        self.constructions.fetch_add(1, Ordering::SeqCst);
        self.configs.lock().unwrap().push(config.clone());

        let producer = Arc::new(MockProducer::new());
        producer.set_send_mode(self.default_send_mode.lock().unwrap().clone());
        producer
            .set_list_topics_error(self.default_list_topics_error.lock().unwrap().as_deref());
        self.created.lock().unwrap().push(producer.clone());
        Ok(producer)
    }
}
