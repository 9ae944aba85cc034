//! Completion gateway port
//!
//! Defines the interface to the LLM completion capability. The reasoning
//! algorithm is opaque: the gateway is handed the conversation so far and
//! the capabilities currently on offer, and answers with either a final text
//! or a list of tool-call intents.

use async_trait::async_trait;
use concierge_domain::{Capability, Completion, ConversationContext};
use thiserror::Error;

/// Errors from the completion capability. Any of these moves the fallback
/// chain to its next tier.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Timeout")]
    Timeout,

    #[error("Other error: {0}")]
    Other(String),
}

/// Gateway for LLM completions
///
/// Implementations (adapters) live in the infrastructure layer and own their
/// own timeout and retry policy.
#[async_trait]
pub trait CompletionGateway: Send + Sync {
    /// Ask for the next action. An empty `tools` slice means plain completion.
    async fn complete(
        &self,
        context: &ConversationContext,
        tools: &[Capability],
    ) -> Result<Completion, GatewayError>;
}
