//! Observability infrastructure
//!
//! Structured logging setup for the publisher. Formats and levels are
//! controlled through environment variables; see [`logging`].

pub mod logging;

pub use logging::{init_default_logging, init_logging, LogFormat};
