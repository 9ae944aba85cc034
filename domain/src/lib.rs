//! Domain layer for concierge
//!
//! Pure types for the tool-augmented agent orchestration core. No I/O lives
//! here; connections, registries and use cases are built on top of these
//! types in the application and infrastructure layers.
//!
//! # Core Concepts
//!
//! - **Server**: a [`ServerDescriptor`] and the [`ConnectionState`] of its
//!   connection.
//! - **Capability**: one invocable tool, named `server.tool`, with an input
//!   schema compiled into a [`SchemaValidator`].
//! - **Turn**: an [`AgentTurn`] of reasoning and tool steps bounded by a step
//!   budget; each tool call attempt is an immutable [`Invocation`].
//! - **Permission**: the [`PermissionGate`] that guards elevated
//!   capabilities.
//! - **Fallback**: the [`FallbackTier`] state machine that guarantees every
//!   message gets an answer.

pub mod capability;
pub mod conversation;
pub mod core;
pub mod fallback;
pub mod permission;
pub mod server;
pub mod turn;
pub mod util;
pub mod validation;

// Re-export commonly used types
pub use capability::{
    Capability, PermissionTier, SchemaValidator, SchemaViolation, qualify, split_qualified,
};
pub use conversation::{Completion, ConversationContext, Message, Role, ToolCallIntent};
pub use core::error::DomainError;
pub use fallback::FallbackTier;
pub use permission::{PermissionDecision, PermissionGate};
pub use server::{ConnectionState, ServerDescriptor};
pub use turn::{
    AgentTurn, BudgetExceeded, CallerIdentity, Invocation, PendingInvocation, ReasonStep, Step,
    ToolError, ToolErrorKind, ToolOutcome, ToolStep, TurnOutcome, TurnSummary,
};
pub use validation::{ConfigIssue, ConfigIssueCode, Severity};
