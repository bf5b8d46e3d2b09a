//! Kafka Publisher
//!
//! A multiplexed, credential-keyed Kafka producer plugin: broker connections
//! are lazily created, cached by effective bootstrap/auth configuration,
//! reused across callers, and reset after transport failures. Publishing is
//! synchronous-style on top of the client library's asynchronous delivery
//! model: fire the record, then wait for the broker's acknowledgment under a
//! deadline.
//!
//! # Overview
//!
//! This crate provides:
//! - Credential normalization and validation for SASL-authenticated brokers
//! - A process-wide connection registry guaranteeing at most one live
//!   producer per broker identity under concurrent access
//! - A bounded-wait publish tool with transparent producer recovery
//! - A credential-validation entry point for the host runtime
//!
//! # Quick Start
//!
//! ```rust
//! use kafka_publisher::config::{normalize, BrokerCredentials, Secret};
//!
//! let credentials = BrokerCredentials {
//!     bootstrap_servers: "b1:9092".to_string(),
//!     sasl_username: Some("svc-publisher".to_string()),
//!     sasl_password: Some(Secret::from("...")),
//!     ..Default::default()
//! };
//!
//! // SASL credentials without an explicit protocol normalize to SASL_SSL
//! // with the PLAIN mechanism, and the password never enters the identity.
//! let effective = normalize(&credentials).unwrap();
//! assert_eq!(
//!     effective.identity(),
//!     "b1:9092|security.protocol=SASL_SSL|sasl.mechanism=PLAIN|sasl.username=svc-publisher"
//! );
//! ```

pub mod config;
pub mod error;
pub mod observability;
pub mod provider;
pub mod testing;
pub mod tools;
pub mod transport;

pub use config::{normalize, BrokerCredentials, EffectiveConfig, SecurityProtocol};
pub use error::{PublishError, PublishResult};
pub use provider::KafkaProvider;
pub use tools::builtin::{PublishMessageTool, PublishOutcome, PublishRequest};
pub use tools::{Tool, ToolConfig, ToolDescription, ToolError, ToolSystem};
pub use transport::kafka::{BrokerConnection, ConnectionRegistry};
