//! Handle Message use case — the fallback chain.
//!
//! The caller-facing entry point. Walks [`FallbackTier`] one step at a time
//! and always returns text:
//!
//! | Tier | Entered when | Fails over when |
//! |------|--------------|-----------------|
//! | `TryAugmented` | always | no server ready, reasoning error, turn deadline, task panic |
//! | `TryPlain` | augmented failed or skipped | completion error, empty answer |
//! | `TryStatic` | plain failed | never |
//!
//! No error, code or protocol detail from a failed tier reaches the caller.

use crate::config::{ExecutionParams, PersonaConfig};
use crate::ports::completion_gateway::CompletionGateway;
use crate::ports::conversation_logger::{
    ConversationEvent, ConversationLogger, NoConversationLogger,
};
use crate::ports::tool_invoker::ToolAvailability;
use crate::use_cases::run_turn::{RunTurnInput, RunTurnUseCase};
use concierge_domain::util::truncate_str;
use concierge_domain::{
    CallerIdentity, Completion, ConversationContext, FallbackTier, TurnOutcome, TurnSummary,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The answer together with how it was produced.
#[derive(Debug, Clone)]
pub struct HandleMessageOutput {
    pub text: String,
    /// Tier that produced `text`.
    pub tier: FallbackTier,
    /// Present when the augmented tier answered.
    pub summary: Option<TurnSummary>,
}

#[derive(Clone)]
pub struct HandleMessageUseCase {
    run_turn: RunTurnUseCase,
    gateway: Arc<dyn CompletionGateway>,
    availability: Arc<dyn ToolAvailability>,
    persona: PersonaConfig,
    params: ExecutionParams,
    conversation_logger: Arc<dyn ConversationLogger>,
}

impl HandleMessageUseCase {
    pub fn new(
        run_turn: RunTurnUseCase,
        gateway: Arc<dyn CompletionGateway>,
        availability: Arc<dyn ToolAvailability>,
        persona: PersonaConfig,
        params: ExecutionParams,
    ) -> Self {
        Self {
            run_turn,
            gateway,
            availability,
            persona,
            params,
            conversation_logger: Arc::new(NoConversationLogger),
        }
    }

    /// Create with a conversation logger.
    pub fn with_conversation_logger(mut self, logger: Arc<dyn ConversationLogger>) -> Self {
        self.conversation_logger = logger;
        self
    }

    /// Answer `text` from `caller`. Never fails.
    pub async fn handle_message(
        &self,
        history: &ConversationContext,
        text: &str,
        caller: &CallerIdentity,
    ) -> String {
        self.handle(history, text, caller).await.text
    }

    pub async fn handle(
        &self,
        history: &ConversationContext,
        text: &str,
        caller: &CallerIdentity,
    ) -> HandleMessageOutput {
        self.conversation_logger.log(ConversationEvent::new(
            "turn_started",
            serde_json::json!({
                "caller": caller.as_str(),
                "text": truncate_str(text, 200),
                "history": history.len(),
            }),
        ));
        let context = ConversationContext::for_request(&self.persona.system_prompt, history, text);

        let mut tier = FallbackTier::TryAugmented;
        loop {
            let answer = match tier {
                FallbackTier::TryAugmented => self.try_augmented(&context, caller).await,
                FallbackTier::TryPlain => self.try_plain(&context).await,
                FallbackTier::TryStatic | FallbackTier::Done => Some((
                    self.persona.fallback_message.clone(),
                    None,
                )),
            };

            if let Some((text, summary)) = answer {
                info!(tier = %tier, "Message answered");
                self.conversation_logger.log(ConversationEvent::new(
                    "fallback_tier",
                    serde_json::json!({ "tier": tier.as_str(), "bytes": text.len() }),
                ));
                return HandleMessageOutput {
                    text,
                    tier,
                    summary,
                };
            }
            tier = tier.next();
            debug!(tier = %tier, "Falling back");
        }
    }

    async fn try_augmented(
        &self,
        context: &ConversationContext,
        caller: &CallerIdentity,
    ) -> Option<(String, Option<TurnSummary>)> {
        if !self.availability.any_ready() {
            info!("No tool server ready, skipping tool-augmented mode");
            return None;
        }

        // Own task: a panic inside the turn is contained, and the deadline
        // aborts the turn rather than leaving it running.
        let run_turn = self.run_turn.clone();
        let input = RunTurnInput::new(context.clone(), caller.clone());
        let mut handle = tokio::spawn(async move { run_turn.execute(input).await });

        match tokio::time::timeout(self.params.turn_deadline, &mut handle).await {
            Ok(Ok(Ok(output))) => {
                let text = match output.outcome {
                    TurnOutcome::Answered(text) => text,
                    TurnOutcome::CouldNotComplete => {
                        self.persona.could_not_complete_message.clone()
                    }
                };
                Some((text, Some(output.summary)))
            }
            Ok(Ok(Err(e))) => {
                warn!(error = %e, "Tool-augmented turn failed");
                None
            }
            Ok(Err(join_error)) => {
                warn!(error = %join_error, "Tool-augmented turn aborted");
                None
            }
            Err(_) => {
                handle.abort();
                warn!(
                    deadline_secs = self.params.turn_deadline.as_secs(),
                    "Tool-augmented turn exceeded its deadline"
                );
                None
            }
        }
    }

    async fn try_plain(&self, context: &ConversationContext) -> Option<(String, Option<TurnSummary>)> {
        let result =
            tokio::time::timeout(self.params.turn_deadline, self.gateway.complete(context, &[]))
                .await;
        match result {
            Ok(Ok(Completion::Final(text))) if !text.trim().is_empty() => Some((text, None)),
            Ok(Ok(other)) => {
                warn!(
                    requested_tools = other.intents().len(),
                    "Plain completion produced no usable answer"
                );
                None
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Plain completion failed");
                None
            }
            Err(_) => {
                warn!("Plain completion exceeded its deadline");
                None
            }
        }
    }
}
