//! Tool system exposed to the host runtime.
//!
//! The host invokes tools by name with JSON parameters; parameters are
//! validated against each tool's declared schema before execution.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::config::BrokerCredentials;
use crate::transport::kafka::ConnectionRegistry;

pub mod builtin;

/// Tool interface invoked by the host runtime
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns name, description, and a JSON Schema for the parameters
    fn describe(&self) -> ToolDescription;

    /// Receives the tool's configuration block; called once at startup
    async fn initialize(&mut self, config: Option<&Value>) -> Result<(), ToolError>;

    /// Receives parameters matching the schema from `describe()`
    async fn execute(&self, parameters: &Value) -> Result<Value, ToolError>;

    /// Performs cleanup (close connections, release resources)
    async fn shutdown(&mut self) -> Result<(), ToolError> {
        Ok(())
    }
}

/// Tool description handed to the host
#[derive(Debug, Clone)]
pub struct ToolDescription {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Per-tool configuration from the host manifest
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ToolConfig {
    /// Simple form: tool_name = "identifier"
    Simple(String),
    /// Complex form: tool_name = { impl = "identifier", config = { ... } }
    Complex {
        #[serde(rename = "impl")]
        implementation: String,
        #[serde(default)]
        config: HashMap<String, Value>,
    },
}

/// Tool system for managing and executing tools.
///
/// Holds the shared connection registry and the base credentials supplied by
/// the host credential store; builtin tools are constructed against both.
pub struct ToolSystem {
    registry: Arc<ConnectionRegistry>,
    credentials: BrokerCredentials,
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolSystem {
    pub fn new(registry: Arc<ConnectionRegistry>, credentials: BrokerCredentials) -> Self {
        Self {
            registry,
            credentials,
            tools: HashMap::new(),
        }
    }

    /// Initialize the configured tools
    pub async fn initialize(
        &mut self,
        tool_configs: &HashMap<String, ToolConfig>,
    ) -> Result<(), ToolError> {
        for (tool_name, tool_config) in tool_configs {
            let mut tool = self.create_tool(tool_name, tool_config)?;

            let config = match tool_config {
                ToolConfig::Simple(_) => None,
                ToolConfig::Complex { config, .. } => {
                    Some(serde_json::to_value(config).map_err(|e| {
                        ToolError::InitializationError(format!("invalid tool config: {e}"))
                    })?)
                }
            };

            tool.initialize(config.as_ref()).await?;
            self.tools.insert(tool_name.clone(), tool);
        }

        Ok(())
    }

    /// Create tool instance based on configuration
    fn create_tool(
        &self,
        tool_name: &str,
        config: &ToolConfig,
    ) -> Result<Box<dyn Tool>, ToolError> {
        let impl_name = match config {
            ToolConfig::Simple(impl_name) => impl_name,
            ToolConfig::Complex { implementation, .. } => implementation,
        };

        match impl_name.as_str() {
            "builtin" => self.create_builtin_tool(tool_name),
            _ => Err(ToolError::UnknownImplementation(impl_name.clone())),
        }
    }

    /// Create builtin tool instances
    fn create_builtin_tool(&self, tool_name: &str) -> Result<Box<dyn Tool>, ToolError> {
        match tool_name {
            "publish_message" => Ok(Box::new(builtin::PublishMessageTool::new(
                self.registry.clone(),
                self.credentials.clone(),
            ))),
            _ => Err(ToolError::UnknownTool(tool_name.to_string())),
        }
    }

    /// Get tool description
    pub fn describe_tool(&self, tool_name: &str) -> Option<ToolDescription> {
        self.tools.get(tool_name).map(|tool| tool.describe())
    }

    /// Execute tool with validated parameters
    pub async fn execute_tool(
        &self,
        tool_name: &str,
        parameters: &Value,
    ) -> Result<Value, ToolError> {
        let tool = self
            .tools
            .get(tool_name)
            .ok_or_else(|| ToolError::UnknownTool(tool_name.to_string()))?;

        self.validate_parameters(tool_name, parameters)?;

        tool.execute(parameters).await
    }

    /// Validate parameters against the tool's declared schema
    fn validate_parameters(&self, tool_name: &str, parameters: &Value) -> Result<(), ToolError> {
        let tool = self
            .tools
            .get(tool_name)
            .ok_or_else(|| ToolError::UnknownTool(tool_name.to_string()))?;

        let description = tool.describe();
        let validator = jsonschema::validator_for(&description.parameters)
            .map_err(|e| ToolError::SchemaError(format!("Schema compilation error: {e}")))?;

        let error_messages: Vec<String> = match validator.validate(parameters) {
            Ok(()) => Vec::new(),
            Err(errors) => errors
                .map(|e| format!("At '{}': {}", e.instance_path, e))
                .collect(),
        };
        if error_messages.is_empty() {
            Ok(())
        } else {
            Err(ToolError::ValidationError(error_messages.join("; ")))
        }
    }

    /// Get list of available tools
    pub fn list_tools(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// Shutdown all tools
    pub async fn shutdown(&mut self) -> Result<(), ToolError> {
        for tool in self.tools.values_mut() {
            tool.shutdown().await?;
        }
        Ok(())
    }
}

/// Tool system errors
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("Unknown tool implementation: {0}")]
    UnknownImplementation(String),
    #[error("Tool initialization failed: {0}")]
    InitializationError(String),
    #[error("Parameter validation failed: {0}")]
    ValidationError(String),
    #[error("Schema error: {0}")]
    SchemaError(String),
    #[error("Tool execution failed: {0}")]
    ExecutionError(String),
    #[error("Tool shutdown failed: {0}")]
    ShutdownError(String),
}
