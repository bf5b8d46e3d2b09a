//! Publish-message tool: bounded-wait publishing through the connection
//! registry.
//!
//! Merges the host-supplied base credentials with per-call overrides,
//! normalizes the result, resolves a cached broker connection, submits the
//! record, and awaits the broker's acknowledgment under a deadline. The
//! delivery confirmation is inherently asynchronous (librdkafka reports it
//! from its own thread); the deadline on the delivery future is what makes
//! this interface appear synchronous to the caller.

use crate::config::{normalize, BrokerCredentials, ConfigError, Secret, SecurityProtocol};
use crate::error::{PublishError, PublishResult};
use crate::tools::{Tool, ToolDescription, ToolError};
use crate::transport::kafka::{BrokerConnection, ConnectionRegistry};
use crate::transport::{OutboundRecord, TransportError};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::net::ToSocketAddrs;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Bound on pushing an accepted record to the wire
const FLUSH_TIMEOUT: Duration = Duration::from_secs(10);
/// Bound on waiting for the broker's acknowledgment
const ACK_TIMEOUT: Duration = Duration::from_secs(5);

/// Fixed outbound metadata identifying this publisher, computed once per
/// process rather than per send
struct ProcessIdentity {
    hostname: String,
    ip: String,
}

static PROCESS_IDENTITY: Lazy<ProcessIdentity> = Lazy::new(|| {
    let hostname = crate::config::process_hostname();
    let ip = (hostname.as_str(), 0u16)
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "127.0.0.1".to_string());
    ProcessIdentity { hostname, ip }
});

/// Headers attached to every produced message
pub fn default_headers() -> Vec<(String, String)> {
    vec![
        (
            "X-Kafka-Publisher-Name".to_string(),
            env!("CARGO_PKG_NAME").to_string(),
        ),
        (
            "X-Kafka-Publisher-IP".to_string(),
            PROCESS_IDENTITY.ip.clone(),
        ),
        (
            "X-Kafka-Publisher-Hostname".to_string(),
            PROCESS_IDENTITY.hostname.clone(),
        ),
    ]
}

/// One publish request: required topic and message, optional key, optional
/// per-call connection overrides
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PublishRequest {
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub bootstrap_servers: Option<String>,
    #[serde(default)]
    pub security_protocol: Option<String>,
    #[serde(default)]
    pub sasl_mechanism: Option<String>,
    #[serde(default)]
    pub sasl_username: Option<String>,
    #[serde(default)]
    pub sasl_password: Option<Secret>,
}

/// Security posture echoed in a successful outcome. Never the password.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SecuritySummary {
    pub protocol: String,
    pub mechanism: String,
    pub username: String,
}

/// Result of one successful publish
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PublishOutcome {
    pub success: bool,
    pub topic: String,
    pub message: String,
    pub partition: i32,
    pub offset: i64,
    pub bootstrap_servers: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security: Option<SecuritySummary>,
}

impl PublishOutcome {
    /// Human-readable confirmation line
    pub fn confirmation(&self) -> String {
        format!(
            "Message sent successfully, topic: {}, partition: {}, offset: {}",
            self.topic, self.partition, self.offset
        )
    }
}

/// The publish tool: host-facing wrapper around [`PublishMessageTool::publish`]
pub struct PublishMessageTool {
    registry: Arc<ConnectionRegistry>,
    credentials: BrokerCredentials,
}

impl PublishMessageTool {
    pub fn new(registry: Arc<ConnectionRegistry>, credentials: BrokerCredentials) -> Self {
        Self {
            registry,
            credentials,
        }
    }

    /// Apply per-call overrides to an owned copy of the base credentials.
    ///
    /// Empty-string overrides count as absent. Returns the merged
    /// credentials and whether anything was overridden.
    fn apply_overrides(
        &self,
        request: &PublishRequest,
    ) -> PublishResult<(BrokerCredentials, bool)> {
        let mut credentials = self.credentials.clone();
        let mut customized = false;

        if let Some(servers) = non_empty(&request.bootstrap_servers) {
            info!(
                new = servers,
                previous = %credentials.bootstrap_servers,
                "using per-call bootstrap servers"
            );
            credentials.bootstrap_servers = servers.to_string();
            customized = true;
        }

        if let Some(protocol) = non_empty(&request.security_protocol) {
            let parsed: SecurityProtocol = protocol
                .parse()
                .map_err(|e: ConfigError| PublishError::invalid_request(e.to_string()))?;
            info!(new = %parsed, "using per-call security protocol");
            credentials.security_protocol = Some(parsed);
            customized = true;
        }

        if let Some(mechanism) = non_empty(&request.sasl_mechanism) {
            info!(new = mechanism, "using per-call SASL mechanism");
            credentials.sasl_mechanism = Some(mechanism.to_string());
            customized = true;
        }

        let username = non_empty(&request.sasl_username);
        let password = request
            .sasl_password
            .as_ref()
            .filter(|p| !p.is_empty());
        match (username, password) {
            (Some(username), Some(password)) => {
                info!(username, "using per-call SASL credentials");
                credentials.sasl_username = Some(username.to_string());
                credentials.sasl_password = Some(password.clone());
                customized = true;
            }
            (None, None) => {}
            _ => {
                return Err(PublishError::invalid_request(
                    "SASL username and password must be supplied together",
                ));
            }
        }

        Ok((credentials, customized))
    }

    /// Publish one message and wait, bounded, for the broker's acknowledgment
    pub async fn publish(&self, request: &PublishRequest) -> PublishResult<PublishOutcome> {
        if request.topic.is_empty() {
            return Err(PublishError::invalid_request("no topic provided"));
        }
        if request.message.is_empty() {
            return Err(PublishError::invalid_request("no message content provided"));
        }

        let (credentials, customized) = self.apply_overrides(request)?;

        // Preview of the effective configuration for logging and the result;
        // the registry re-normalizes independently with the same rules.
        let effective = normalize(&credentials).map_err(|e| match e {
            ConfigError::SaslCredentialsIncomplete => PublishError::invalid_request(
                "SASL username and password must be supplied together",
            ),
            other => PublishError::from(other),
        })?;

        if customized {
            info!(
                servers = effective.bootstrap_servers(),
                security = %effective.security_summary(),
                "effective publish configuration"
            );
        }

        let connection = self.registry.resolve(&credentials)?;
        let producer = connection.get_or_create_producer().await?;
        let broker = connection.bootstrap_servers().to_string();

        let record = OutboundRecord {
            topic: request.topic.clone(),
            payload: request.message.clone().into_bytes(),
            key: request.key.as_ref().map(|k| k.clone().into_bytes()),
            headers: default_headers(),
        };

        let delivery = match producer.begin_send(record) {
            Ok(delivery) => delivery,
            Err(e) => return Err(self.fail_transport(&connection, &broker, e).await),
        };

        // Push the record to the wire immediately rather than letting the
        // client batch it indefinitely.
        if let Err(e) = producer.flush(FLUSH_TIMEOUT).await {
            return Err(self.fail_transport(&connection, &broker, e).await);
        }

        let ack = match tokio::time::timeout(ACK_TIMEOUT, delivery).await {
            Err(_elapsed) => {
                return Err(PublishError::delivery(
                    &broker,
                    "send timed out or unacknowledged",
                ));
            }
            Ok(Err(TransportError::Refused { reason })) => {
                return Err(PublishError::delivery(&broker, reason));
            }
            Ok(Err(e)) => return Err(self.fail_transport(&connection, &broker, e).await),
            Ok(Ok(ack)) => ack,
        };

        info!(
            topic = %ack.topic,
            partition = ack.partition,
            offset = ack.offset,
            "message delivered"
        );

        Ok(PublishOutcome {
            success: true,
            topic: ack.topic,
            message: request.message.clone(),
            partition: ack.partition,
            offset: ack.offset,
            bootstrap_servers: broker,
            key: request.key.clone(),
            security: effective.auth().map(|auth| SecuritySummary {
                protocol: auth.protocol.to_string(),
                mechanism: auth.mechanism.clone(),
                username: auth.username.clone(),
            }),
        })
    }

    /// Transport-level failure path: report, then reset the connection so
    /// the next call recreates a fresh producer instead of reusing one in an
    /// unknown state. A failed reset surfaces both errors.
    async fn fail_transport(
        &self,
        connection: &Arc<BrokerConnection>,
        broker: &str,
        send_error: TransportError,
    ) -> PublishError {
        error!(broker, error = %send_error, "transport failure during publish");
        match connection.reset_connection().await {
            Ok(()) => PublishError::transport(broker, send_error.to_string()),
            Err(reset_error) => {
                error!(broker, error = %reset_error, "connection reset failed");
                PublishError::ResetFailed {
                    broker: broker.to_string(),
                    send_error: send_error.to_string(),
                    reset_error: reset_error.to_string(),
                }
            }
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

#[async_trait]
impl Tool for PublishMessageTool {
    fn describe(&self) -> ToolDescription {
        ToolDescription {
            name: "publish_message".to_string(),
            description: "Publish a message to a Kafka topic and wait for the broker's acknowledgment".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "topic": {
                        "type": "string"
                    },
                    "message": {
                        "type": "string"
                    },
                    "key": {
                        "type": "string"
                    },
                    "bootstrap_servers": {
                        "type": "string",
                        "description": "Override the configured brokers for this call"
                    },
                    "security_protocol": {
                        "type": "string",
                        "enum": ["PLAINTEXT", "SSL", "SASL_PLAINTEXT", "SASL_SSL"]
                    },
                    "sasl_mechanism": {
                        "type": "string"
                    },
                    "sasl_username": {
                        "type": "string"
                    },
                    "sasl_password": {
                        "type": "string"
                    }
                },
                "required": ["topic", "message"],
                "additionalProperties": false
            }),
        }
    }

    async fn initialize(&mut self, _config: Option<&Value>) -> Result<(), ToolError> {
        Ok(())
    }

    async fn execute(&self, parameters: &Value) -> Result<Value, ToolError> {
        let request: PublishRequest = serde_json::from_value(parameters.clone())
            .map_err(|e| ToolError::ValidationError(e.to_string()))?;

        let outcome = self
            .publish(&request)
            .await
            .map_err(|e| ToolError::ExecutionError(e.sanitized_message()))?;

        let mut value = serde_json::to_value(&outcome)
            .map_err(|e| ToolError::ExecutionError(e.to_string()))?;
        value["confirmation"] = json!(outcome.confirmation());
        Ok(value)
    }

    async fn shutdown(&mut self) -> Result<(), ToolError> {
        let failures = self.registry.close_all().await;
        if failures.is_empty() {
            Ok(())
        } else {
            let identities: Vec<&str> = failures.iter().map(|(id, _)| id.as_str()).collect();
            Err(ToolError::ShutdownError(format!(
                "failed to close {} connection(s): {}",
                failures.len(),
                identities.join(", ")
            )))
        }
    }
}
