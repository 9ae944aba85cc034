//! Infrastructure layer for concierge
//!
//! This crate contains adapters that implement the ports defined in the
//! application layer: tool server connections and their supervisor, the
//! OpenAI-compatible completion gateway, the JSONL conversation logger,
//! and configuration file loading.

pub mod config;
pub mod connection;
pub mod llm;
pub mod logging;
pub mod protocol;
pub mod retry;
pub mod supervisor;

// Re-export commonly used types
pub use config::{ConfigLoadError, ConfigLoader, ConfigValidationError, FileConfig};
pub use connection::{
    ConnectionError, ConnectionSettings, Connector, DefaultConnector, Endpoint,
    ToolServerConnection,
};
pub use llm::{OpenAiGateway, OpenAiSettings};
pub use logging::JsonlConversationLogger;
pub use retry::RetryPolicy;
pub use supervisor::{ConnectionSupervisor, ServerStatus};
