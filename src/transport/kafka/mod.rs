//! Kafka transport implementation backed by rdkafka.
//!
//! `client` wraps the rdkafka producer behind the crate's transport traits;
//! `registry` owns the process-wide connection cache and per-identity
//! producer lifecycle.

pub mod client;
pub mod registry;

pub use client::{KafkaProducer, KafkaProducerFactory};
pub use registry::{BrokerConnection, ConnectionRegistry};
