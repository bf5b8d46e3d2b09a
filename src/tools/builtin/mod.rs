//! Builtin tools.

pub mod publish_message;

pub use publish_message::{PublishMessageTool, PublishOutcome, PublishRequest, SecuritySummary};
