//! Kafka message publishing utility
//!
//! A clean, simple tool for publishing one message to a Kafka topic through
//! the connection registry, using the same bounded-wait path as the hosted
//! publish tool. Useful for smoke-testing broker credentials and topics.
//!
//! ## Usage
//!
//! ```bash
//! # Plaintext local broker
//! publish-message --bootstrap-servers localhost:9092 --topic orders --message "hello"
//!
//! # Keyed message
//! publish-message --bootstrap-servers localhost:9092 --topic orders \
//!   --message "hello" --key k1
//!
//! # SASL-authenticated cluster (protocol and mechanism are normalized
//! # automatically when credentials are present)
//! publish-message --bootstrap-servers broker:9093 --topic orders \
//!   --message "hello" --sasl-username svc --sasl-password secret
//!
//! # Credentials from a TOML file, probe connectivity only
//! publish-message --credentials creds.toml --validate-only
//! ```

use clap::Parser;
use kafka_publisher::config::{BrokerCredentials, Secret, SecurityProtocol};
use kafka_publisher::observability::init_default_logging;
use kafka_publisher::publish_span;
use kafka_publisher::{ConnectionRegistry, KafkaProvider, PublishMessageTool, PublishRequest};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Instrument;

#[derive(Parser)]
#[command(
    name = "publish-message",
    about = "Publish a message to a Kafka topic and wait for the broker's acknowledgment"
)]
struct Args {
    /// Path to a TOML credentials file (dotted Kafka keys, quoted)
    #[arg(long)]
    credentials: Option<PathBuf>,

    /// Comma-separated broker list (overrides the credentials file)
    #[arg(long, env = "KAFKA_BOOTSTRAP_SERVERS")]
    bootstrap_servers: Option<String>,

    /// Security protocol (PLAINTEXT, SSL, SASL_PLAINTEXT, SASL_SSL)
    #[arg(long)]
    security_protocol: Option<SecurityProtocol>,

    /// SASL mechanism (e.g. PLAIN, SCRAM-SHA-256)
    #[arg(long)]
    sasl_mechanism: Option<String>,

    /// SASL username (must be paired with --sasl-password)
    #[arg(long, env = "KAFKA_SASL_USERNAME")]
    sasl_username: Option<String>,

    /// SASL password (must be paired with --sasl-username)
    #[arg(long, env = "KAFKA_SASL_PASSWORD")]
    sasl_password: Option<String>,

    /// Client identifier; defaults to a stable per-host value
    #[arg(long)]
    client_id: Option<String>,

    /// Target topic
    #[arg(long, required_unless_present = "validate_only")]
    topic: Option<String>,

    /// Message payload
    #[arg(long, required_unless_present = "validate_only")]
    message: Option<String>,

    /// Optional message key
    #[arg(long)]
    key: Option<String>,

    /// Only validate the credentials with a connectivity probe, do not publish
    #[arg(long)]
    validate_only: bool,
}

impl Args {
    fn into_credentials(self) -> Result<(BrokerCredentials, Option<PublishRequest>), Box<dyn std::error::Error>> {
        let mut credentials = match &self.credentials {
            Some(path) => BrokerCredentials::load_from_file(path)?,
            None => BrokerCredentials::default(),
        };

        if let Some(servers) = self.bootstrap_servers {
            credentials.bootstrap_servers = servers;
        }
        if let Some(protocol) = self.security_protocol {
            credentials.security_protocol = Some(protocol);
        }
        if let Some(mechanism) = self.sasl_mechanism {
            credentials.sasl_mechanism = Some(mechanism);
        }
        if let Some(username) = self.sasl_username {
            credentials.sasl_username = Some(username);
        }
        if let Some(password) = self.sasl_password {
            credentials.sasl_password = Some(Secret::from(password));
        }
        if let Some(client_id) = self.client_id {
            credentials.client_id = Some(client_id);
        }

        let request = match (self.topic, self.message) {
            (Some(topic), Some(message)) => Some(PublishRequest {
                topic,
                message,
                key: self.key,
                ..Default::default()
            }),
            _ => None,
        };

        Ok((credentials, request))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_default_logging();

    let args = Args::parse();
    let validate_only = args.validate_only;
    let (credentials, request) = args.into_credentials()?;

    if validate_only {
        let provider = KafkaProvider::with_default_factory();
        if let Err(e) = provider.validate_credentials(&credentials).await {
            eprintln!("✗ Credential validation failed: {}", e.sanitized_message());
            std::process::exit(1);
        }
        println!("✓ Credentials validated");
        return Ok(());
    }

    let request = request.expect("clap enforces topic and message unless --validate-only");
    let registry = Arc::new(ConnectionRegistry::with_default_factory());
    let tool = PublishMessageTool::new(registry.clone(), credentials);

    let span = publish_span!(topic = %request.topic);
    let outcome = match tool.publish(&request).instrument(span).await {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("✗ Publish failed: {}", e.sanitized_message());
            let failures = registry.close_all().await;
            for (identity, error) in failures {
                eprintln!("  (cleanup failed for {identity}: {error})");
            }
            std::process::exit(1);
        }
    };

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    println!("✓ {}", outcome.confirmation());

    let failures = registry.close_all().await;
    for (identity, error) in failures {
        eprintln!("✗ Failed to close connection {identity}: {error}");
    }

    Ok(())
}
