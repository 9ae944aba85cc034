//! Application layer for concierge
//!
//! This crate contains the capability registry, use cases, port definitions,
//! and application configuration. It depends only on the domain layer.

pub mod config;
pub mod ports;
pub mod registry;
pub mod use_cases;

// Re-export commonly used types
pub use config::{ExecutionParams, PersonaConfig};
pub use ports::{
    completion_gateway::{CompletionGateway, GatewayError},
    conversation_logger::{ConversationEvent, ConversationLogger, NoConversationLogger},
    tool_invoker::{ToolAvailability, ToolInvoker},
};
pub use registry::{
    CapabilityRegistry, PublishReport, RegisteredCapability, RegistrySnapshot, RejectReason,
    Rejection,
};
pub use use_cases::dispatch::ToolDispatcher;
pub use use_cases::handle_message::{HandleMessageOutput, HandleMessageUseCase};
pub use use_cases::run_turn::{RunTurnError, RunTurnInput, RunTurnOutput, RunTurnUseCase};
