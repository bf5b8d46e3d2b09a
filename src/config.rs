//! Broker credential configuration, normalization, and connection identity.
//!
//! Credentials arrive from the host runtime as a flat mapping with dotted
//! Kafka-style keys (`bootstrap.servers`, `sasl.username`, ...). This module
//! owns the rules that turn that partial, possibly-inconsistent mapping into
//! an [`EffectiveConfig`] the transport can trust, and derives the identity
//! string used to deduplicate connections.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;

/// Security protocol for broker connections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecurityProtocol {
    Plaintext,
    Ssl,
    SaslPlaintext,
    SaslSsl,
}

impl SecurityProtocol {
    /// Whether this protocol carries SASL authentication
    pub fn is_sasl(&self) -> bool {
        matches!(self, SecurityProtocol::SaslPlaintext | SecurityProtocol::SaslSsl)
    }

    /// Kafka configuration value for this protocol
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityProtocol::Plaintext => "PLAINTEXT",
            SecurityProtocol::Ssl => "SSL",
            SecurityProtocol::SaslPlaintext => "SASL_PLAINTEXT",
            SecurityProtocol::SaslSsl => "SASL_SSL",
        }
    }
}

impl fmt::Display for SecurityProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SecurityProtocol {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PLAINTEXT" => Ok(SecurityProtocol::Plaintext),
            "SSL" => Ok(SecurityProtocol::Ssl),
            "SASL_PLAINTEXT" => Ok(SecurityProtocol::SaslPlaintext),
            "SASL_SSL" => Ok(SecurityProtocol::SaslSsl),
            other => Err(ConfigError::InvalidSecurityProtocol(other.to_string())),
        }
    }
}

/// A string value that must never appear in logs, debug output, or results.
///
/// Deserializes from a plain string; serializes and debug-prints redacted.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl Serialize for Secret {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("***")
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Secret(value.to_string())
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Secret(value)
    }
}

/// Broker credentials as supplied by the host credential store.
///
/// Field names mirror the Kafka client configuration keys, so a credential
/// file uses the quoted dotted form:
///
/// ```toml
/// "bootstrap.servers" = "broker1:9092,broker2:9092"
/// "sasl.username" = "svc-publisher"
/// "sasl.password" = "..."
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BrokerCredentials {
    #[serde(rename = "bootstrap.servers", default)]
    pub bootstrap_servers: String,
    #[serde(rename = "security.protocol", default, skip_serializing_if = "Option::is_none")]
    pub security_protocol: Option<SecurityProtocol>,
    #[serde(rename = "sasl.mechanism", default, skip_serializing_if = "Option::is_none")]
    pub sasl_mechanism: Option<String>,
    #[serde(rename = "sasl.username", default, skip_serializing_if = "Option::is_none")]
    pub sasl_username: Option<String>,
    #[serde(rename = "sasl.password", default, skip_serializing_if = "Option::is_none")]
    pub sasl_password: Option<Secret>,
    #[serde(rename = "client.id", default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

impl BrokerCredentials {
    /// Load credentials from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let credentials: BrokerCredentials = toml::from_str(&content)?;
        Ok(credentials)
    }
}

/// SASL authentication block of a normalized configuration.
///
/// Existence of this block implies both username and password were present;
/// the protocol is guaranteed to be one of the `SASL_` variants.
#[derive(Debug, Clone, PartialEq)]
pub struct SaslAuth {
    pub protocol: SecurityProtocol,
    pub mechanism: String,
    pub username: String,
    pub password: Secret,
}

/// Normalized, owned broker configuration as handed to the transport.
///
/// Produced only by [`normalize`]; callers never construct this directly, so
/// the SASL invariants hold by construction.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveConfig {
    bootstrap_servers: String,
    client_id: String,
    auth: Option<SaslAuth>,
}

impl EffectiveConfig {
    pub fn bootstrap_servers(&self) -> &str {
        &self.bootstrap_servers
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn auth(&self) -> Option<&SaslAuth> {
        self.auth.as_ref()
    }

    /// Derived connection identity: bootstrap servers plus any security
    /// fields present, in fixed order, as `key=value` joined by `|`.
    ///
    /// The password is deliberately excluded, so configurations differing
    /// only in password share one connection.
    pub fn identity(&self) -> String {
        let mut parts = vec![self.bootstrap_servers.clone()];
        if let Some(auth) = &self.auth {
            parts.push(format!("security.protocol={}", auth.protocol));
            parts.push(format!("sasl.mechanism={}", auth.mechanism));
            parts.push(format!("sasl.username={}", auth.username));
        }
        parts.join("|")
    }

    /// One-line security posture for logs. Never includes the password.
    pub fn security_summary(&self) -> String {
        match &self.auth {
            Some(auth) => format!(
                "protocol={}, mechanism={}, username={}",
                auth.protocol, auth.mechanism, auth.username
            ),
            None => "protocol=PLAINTEXT".to_string(),
        }
    }

    /// Render as the flat key/value map the Kafka client library consumes
    pub fn to_client_config(&self) -> HashMap<String, String> {
        let mut config = HashMap::new();
        config.insert("bootstrap.servers".to_string(), self.bootstrap_servers.clone());
        config.insert("client.id".to_string(), self.client_id.clone());
        if let Some(auth) = &self.auth {
            config.insert("security.protocol".to_string(), auth.protocol.to_string());
            config.insert("sasl.mechanism".to_string(), auth.mechanism.clone());
            config.insert("sasl.username".to_string(), auth.username.clone());
            config.insert("sasl.password".to_string(), auth.password.expose().to_string());
        }
        config
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required broker parameter: bootstrap.servers")]
    MissingBootstrapServers,
    #[error("SASL username and password must be supplied together")]
    SaslCredentialsIncomplete,
    #[error("invalid security protocol: {0}")]
    InvalidSecurityProtocol(String),
    #[error("failed to read credentials file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("failed to parse credentials TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
}

/// Default `client.id`, stable for the lifetime of the process
static DEFAULT_CLIENT_ID: Lazy<String> =
    Lazy::new(|| format!("kafka-publisher-{}", process_hostname()));

/// Get system hostname via the `hostname` command, falling back to "unknown".
pub fn process_hostname() -> String {
    std::process::Command::new("hostname")
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_owned())
        .unwrap_or_else(|| "unknown".to_owned())
}

/// Normalize credentials into an [`EffectiveConfig`].
///
/// Rules, applied identically at every call site:
/// - `bootstrap.servers` must be non-empty;
/// - both SASL username and password present and non-empty: the security
///   protocol is coerced to `SASL_SSL` unless already a `SASL_` variant, and
///   the mechanism defaults to `PLAIN`;
/// - exactly one of the pair present: [`ConfigError::SaslCredentialsIncomplete`];
/// - neither present: all security-related keys are stripped from the
///   effective configuration;
/// - `client.id` defaults to a stable per-process value.
pub fn normalize(credentials: &BrokerCredentials) -> Result<EffectiveConfig, ConfigError> {
    if credentials.bootstrap_servers.trim().is_empty() {
        return Err(ConfigError::MissingBootstrapServers);
    }

    let username = credentials.sasl_username.as_deref().unwrap_or("");
    let has_password = credentials
        .sasl_password
        .as_ref()
        .is_some_and(|p| !p.is_empty());

    let auth = match (!username.is_empty(), has_password) {
        (true, true) => {
            let protocol = match credentials.security_protocol {
                Some(p) if p.is_sasl() => p,
                other => {
                    warn!(
                        configured = ?other,
                        "SASL credentials present without a SASL security protocol, adjusting to SASL_SSL"
                    );
                    SecurityProtocol::SaslSsl
                }
            };
            let mechanism = match &credentials.sasl_mechanism {
                Some(m) if !m.is_empty() => m.clone(),
                _ => {
                    warn!("no SASL mechanism specified, defaulting to PLAIN");
                    "PLAIN".to_string()
                }
            };
            Some(SaslAuth {
                protocol,
                mechanism,
                username: username.to_string(),
                password: credentials
                    .sasl_password
                    .clone()
                    .unwrap_or_else(|| Secret::from("")),
            })
        }
        (false, false) => None,
        _ => return Err(ConfigError::SaslCredentialsIncomplete),
    };

    let client_id = match &credentials.client_id {
        Some(id) if !id.is_empty() => id.clone(),
        _ => DEFAULT_CLIENT_ID.clone(),
    };

    Ok(EffectiveConfig {
        bootstrap_servers: credentials.bootstrap_servers.clone(),
        client_id,
        auth,
    })
}
