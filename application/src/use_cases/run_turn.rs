//! Run Turn use case — the reasoning loop.
//!
//! Produces a final answer for one inbound message using zero or more tool
//! invocations:
//!
//! 1. Offer the current registry snapshot to the completion capability
//! 2. A final answer ends the turn
//! 3. Tool-call intents are dispatched one at a time, in the order given,
//!    and each outcome is appended to the context as an observation
//! 4. Loop until an answer arrives or the step budget runs out
//!
//! Every invocation-level failure (unknown tool, bad arguments, denial,
//! timeout, remote error) becomes an observation the model can react to.
//! Only a failure of the completion capability itself ends the turn with an
//! error, which the fallback chain turns into a tier transition.

use crate::config::ExecutionParams;
use crate::ports::completion_gateway::{CompletionGateway, GatewayError};
use crate::ports::conversation_logger::{
    ConversationEvent, ConversationLogger, NoConversationLogger,
};
use crate::registry::CapabilityRegistry;
use crate::use_cases::dispatch::ToolDispatcher;
use concierge_domain::util::bounded;
use concierge_domain::{
    AgentTurn, CallerIdentity, Completion, ConversationContext, Message, ToolOutcome, TurnOutcome,
    TurnSummary,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that end a turn early and hand control to the next fallback tier.
#[derive(Error, Debug)]
pub enum RunTurnError {
    #[error("Gateway error: {0}")]
    GatewayError(#[from] GatewayError),

    #[error("No response from model")]
    EmptyResponse,
}

#[derive(Debug, Clone)]
pub struct RunTurnInput {
    /// Full request context: system prompt, history and the new user message.
    pub context: ConversationContext,
    pub caller: CallerIdentity,
}

impl RunTurnInput {
    pub fn new(context: ConversationContext, caller: CallerIdentity) -> Self {
        Self { context, caller }
    }
}

#[derive(Debug, Clone)]
pub struct RunTurnOutput {
    pub outcome: TurnOutcome,
    pub summary: TurnSummary,
    /// Every step of the turn, in the order it happened.
    pub turn: AgentTurn,
}

#[derive(Clone)]
pub struct RunTurnUseCase {
    gateway: Arc<dyn CompletionGateway>,
    registry: Arc<CapabilityRegistry>,
    dispatcher: Arc<ToolDispatcher>,
    params: ExecutionParams,
    conversation_logger: Arc<dyn ConversationLogger>,
}

impl RunTurnUseCase {
    pub fn new(
        gateway: Arc<dyn CompletionGateway>,
        registry: Arc<CapabilityRegistry>,
        dispatcher: Arc<ToolDispatcher>,
        params: ExecutionParams,
    ) -> Self {
        Self {
            gateway,
            registry,
            dispatcher,
            params,
            conversation_logger: Arc::new(NoConversationLogger),
        }
    }

    /// Create with a conversation logger.
    pub fn with_conversation_logger(mut self, logger: Arc<dyn ConversationLogger>) -> Self {
        self.conversation_logger = logger;
        self
    }

    pub async fn execute(&self, input: RunTurnInput) -> Result<RunTurnOutput, RunTurnError> {
        let RunTurnInput {
            mut context,
            caller,
        } = input;
        let mut turn = AgentTurn::new(self.params.max_steps);

        loop {
            if turn.budget_exhausted() {
                return Ok(self.finish(turn, TurnOutcome::CouldNotComplete));
            }

            // Fresh snapshot each step: servers may have come or gone.
            let tools = self.registry.snapshot().capabilities();
            debug!(
                step = turn.reasoning_steps() + 1,
                max_steps = turn.max_steps(),
                tools = tools.len(),
                "Requesting completion"
            );
            let completion = self.gateway.complete(&context, &tools).await?;

            let (text, intents) = match completion {
                Completion::Final(text) => (text, Vec::new()),
                Completion::ToolCalls { text, intents } => (text, intents),
            };

            if intents.is_empty() {
                if text.trim().is_empty() {
                    return Err(RunTurnError::EmptyResponse);
                }
                self.record_reason(&mut turn, Completion::Final(text.clone()));
                info!(steps = turn.reasoning_steps(), "Turn answered");
                return Ok(self.finish(turn, TurnOutcome::Answered(text)));
            }

            self.record_reason(
                &mut turn,
                Completion::ToolCalls {
                    text: text.clone(),
                    intents: intents.clone(),
                },
            );

            if turn.budget_exhausted() {
                warn!(
                    max_steps = turn.max_steps(),
                    pending_calls = intents.len(),
                    "Step budget exhausted, ending turn"
                );
                return Ok(self.finish(turn, TurnOutcome::CouldNotComplete));
            }

            context.push(Message::assistant_tool_calls(text, intents.clone()));

            // Strictly sequential: the next intent starts only after the
            // previous one has completed.
            for intent in intents {
                let outcome = self.dispatcher.dispatch(&intent, &caller).await;
                let observation = render_observation(&outcome, self.params.max_observation_chars);
                self.log_tool_step(&intent.capability, &outcome);
                context.push(Message::tool_result(intent.id.clone(), observation));
                turn.push_tool(intent, outcome);
            }
        }
    }

    fn record_reason(&self, turn: &mut AgentTurn, completion: Completion) {
        self.conversation_logger.log(ConversationEvent::new(
            "reason_step",
            serde_json::json!({
                "step": turn.reasoning_steps() + 1,
                "text": completion.text(),
                "tool_calls": completion
                    .intents()
                    .iter()
                    .map(|i| i.capability.as_str())
                    .collect::<Vec<_>>(),
            }),
        ));
        // Budget is checked at the top of every iteration.
        if let Err(e) = turn.push_reason(completion) {
            warn!("{}", e);
        }
    }

    fn log_tool_step(&self, capability: &str, outcome: &ToolOutcome) {
        let attempts: Vec<_> = outcome
            .invocations()
            .map(|inv| {
                serde_json::json!({
                    "attempt": inv.attempt(),
                    "duration_ms": inv.duration().as_millis() as u64,
                    "success": inv.is_success(),
                })
            })
            .collect();
        let error = outcome.result().err().map(|e| e.to_string());
        self.conversation_logger.log(ConversationEvent::new(
            "tool_invocation",
            serde_json::json!({
                "capability": capability,
                "success": outcome.is_success(),
                "error": error,
                "attempts": attempts,
            }),
        ));
    }

    fn finish(&self, turn: AgentTurn, outcome: TurnOutcome) -> RunTurnOutput {
        let summary = turn.summary();
        self.conversation_logger.log(ConversationEvent::new(
            "turn_finished",
            serde_json::json!({
                "outcome": outcome.as_str(),
                "summary": summary,
            }),
        ));
        RunTurnOutput {
            outcome,
            summary,
            turn,
        }
    }
}

/// Text fed back to the model for one tool step, bounded in size.
pub fn render_observation(outcome: &ToolOutcome, max_chars: usize) -> String {
    let full = match outcome.result() {
        Ok(serde_json::Value::String(text)) => text.clone(),
        Ok(value) => value.to_string(),
        Err(err) => format!("error: {}", err),
    };
    bounded(&full, max_chars).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::use_cases::test_support::{
        MockAvailability, RecordingInvoker, RecordingLogger, ScriptedGateway, call,
    };
    use concierge_domain::{
        Capability, PermissionGate, Role, ToolCallIntent, ToolError, ToolErrorKind,
    };
    use serde_json::json;
    use std::time::Duration;

    struct Fixture {
        registry: Arc<CapabilityRegistry>,
        availability: Arc<MockAvailability>,
        invoker: Arc<RecordingInvoker>,
    }

    impl Fixture {
        fn new(invoker: RecordingInvoker) -> Self {
            let registry = Arc::new(CapabilityRegistry::new());
            registry.publish(
                "alpha",
                vec![
                    Capability::new("alpha", "search", "Search").with_input_schema(json!({
                        "type": "object",
                        "properties": { "q": { "type": "string" } },
                        "required": ["q"]
                    })),
                    Capability::new("alpha", "summarize", "Summarize"),
                ],
            );
            registry.publish(
                "beta",
                vec![Capability::new("beta", "postMessage", "Post a message").elevated()],
            );
            Self {
                registry,
                availability: Arc::new(MockAvailability::ready(&["alpha", "beta"])),
                invoker: Arc::new(invoker),
            }
        }

        fn use_case(&self, gateway: Arc<ScriptedGateway>, params: ExecutionParams) -> RunTurnUseCase {
            let dispatcher = Arc::new(ToolDispatcher::new(
                self.registry.clone(),
                self.availability.clone(),
                self.invoker.clone(),
                Arc::new(PermissionGate::new(["U_ADMIN"])),
                params.clone(),
            ));
            RunTurnUseCase::new(gateway, self.registry.clone(), dispatcher, params)
        }
    }

    fn input(text: &str, caller: &str) -> RunTurnInput {
        RunTurnInput::new(
            ConversationContext::for_request("system", &ConversationContext::new(), text),
            CallerIdentity::new(caller),
        )
    }

    fn tool_messages(ctx: &ConversationContext) -> Vec<String> {
        ctx.messages()
            .iter()
            .filter(|m| m.role == Role::Tool)
            .map(|m| m.content.clone())
            .collect()
    }

    #[tokio::test]
    async fn test_direct_answer() {
        let fixture = Fixture::new(RecordingInvoker::new());
        let gateway = Arc::new(ScriptedGateway::replies(vec![Completion::final_text(
            "Hello!",
        )]));
        let use_case = fixture.use_case(gateway.clone(), ExecutionParams::default());

        let output = use_case.execute(input("hi", "U1")).await.unwrap();
        assert_eq!(output.outcome, TurnOutcome::Answered("Hello!".to_string()));
        assert_eq!(output.summary.reasoning_steps, 1);
        assert_eq!(output.summary.tool_calls, 0);
        assert_eq!(gateway.tools_offered()[0].len(), 3);
    }

    #[tokio::test]
    async fn test_tool_result_folded_into_context() {
        let fixture = Fixture::new(RecordingInvoker::new());
        let gateway = Arc::new(ScriptedGateway::replies(vec![
            Completion::tool_calls(vec![call("c1", "alpha.search", json!({ "q": "rust" }))]),
            Completion::final_text("Rust is a language."),
        ]));
        let use_case = fixture.use_case(gateway.clone(), ExecutionParams::default());

        let output = use_case.execute(input("what is rust?", "U1")).await.unwrap();
        assert_eq!(
            output.outcome,
            TurnOutcome::Answered("Rust is a language.".to_string())
        );
        assert_eq!(fixture.invoker.calls(), vec!["alpha.search"]);

        let second = &gateway.contexts()[1];
        let observations = tool_messages(second);
        assert_eq!(observations.len(), 1);
        assert!(observations[0].contains("\"q\":\"rust\""));
        assert_eq!(
            second.messages().last().unwrap().tool_call_id.as_deref(),
            Some("c1")
        );
    }

    #[tokio::test]
    async fn test_budget_of_three_ends_after_exactly_three_steps() {
        let fixture = Fixture::new(RecordingInvoker::new());
        let gateway = Arc::new(ScriptedGateway::always(Completion::tool_calls(vec![call(
            "c",
            "alpha.summarize",
            json!({}),
        )])));
        let use_case = fixture.use_case(gateway.clone(), ExecutionParams::default().with_max_steps(3));

        let output = use_case.execute(input("loop forever", "U1")).await.unwrap();
        assert_eq!(output.outcome, TurnOutcome::CouldNotComplete);
        assert_eq!(gateway.call_count(), 3);
        assert_eq!(output.summary.reasoning_steps, 3);
        // The third step's intents are never executed
        assert_eq!(fixture.invoker.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_intents_run_sequentially_in_order() {
        let fixture = Fixture::new(RecordingInvoker::new().with_delay(Duration::from_millis(5)));
        let gateway = Arc::new(ScriptedGateway::replies(vec![
            Completion::tool_calls(vec![
                call("c1", "alpha.summarize", json!({ "n": 1 })),
                call("c2", "alpha.search", json!({ "q": "two" })),
                call("c3", "alpha.summarize", json!({ "n": 3 })),
            ]),
            Completion::final_text("done"),
        ]));
        let use_case = fixture.use_case(gateway.clone(), ExecutionParams::default());
        let logger = Arc::new(RecordingLogger::default());
        let use_case = use_case.with_conversation_logger(logger.clone());

        let output = use_case.execute(input("three things", "U1")).await.unwrap();
        assert_eq!(output.summary.tool_calls, 3);
        assert_eq!(fixture.invoker.max_in_flight(), 1);
        assert_eq!(
            fixture.invoker.calls(),
            vec!["alpha.summarize", "alpha.search", "alpha.summarize"]
        );

        let ids: Vec<_> = gateway.contexts()[1]
            .messages()
            .iter()
            .filter_map(|m| m.tool_call_id.clone())
            .collect();
        assert_eq!(ids, vec!["c1", "c2", "c3"]);
        assert_eq!(logger.payloads("tool_invocation").len(), 3);
    }

    #[tokio::test]
    async fn test_invocation_timestamps_strictly_increase() {
        let fixture = Fixture::new(RecordingInvoker::new().with_delay(Duration::from_millis(3)));
        let gateway = Arc::new(ScriptedGateway::replies(vec![
            Completion::tool_calls(vec![
                call("c1", "alpha.search", json!({ "q": "one" })),
                call("c2", "alpha.summarize", json!({})),
            ]),
            Completion::final_text("done"),
        ]));
        let use_case = fixture.use_case(gateway, ExecutionParams::default());

        let output = use_case.execute(input("two things", "U1")).await.unwrap();
        let steps: Vec<_> = output.turn.tool_steps().collect();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].intent.id, "c1");
        assert_eq!(steps[1].intent.id, "c2");

        let invocations: Vec<_> = steps
            .iter()
            .flat_map(|step| step.outcome.invocations())
            .collect();
        assert_eq!(invocations.len(), 2);
        assert_eq!(invocations[0].capability(), "alpha.search");
        assert_eq!(invocations[1].capability(), "alpha.summarize");
        assert!(invocations[0].started_at() < invocations[1].started_at());
        assert!(invocations[0].completed_at() <= invocations[1].started_at());
    }

    #[tokio::test]
    async fn test_unknown_capability_becomes_observation() {
        let fixture = Fixture::new(RecordingInvoker::new());
        let gateway = Arc::new(ScriptedGateway::replies(vec![
            Completion::tool_calls(vec![call("c1", "gamma.teleport", json!({}))]),
            Completion::final_text("I can't teleport, sorry."),
        ]));
        let use_case = fixture.use_case(gateway.clone(), ExecutionParams::default());

        let output = use_case.execute(input("teleport me", "U1")).await.unwrap();
        assert!(matches!(output.outcome, TurnOutcome::Answered(_)));
        assert!(fixture.invoker.calls().is_empty());
        let observations = tool_messages(&gateway.contexts()[1]);
        assert!(observations[0].contains("NOT_AVAILABLE"));
        assert!(observations[0].contains("gamma.teleport"));
    }

    #[tokio::test]
    async fn test_permission_denial_is_explained_not_fatal() {
        let fixture = Fixture::new(RecordingInvoker::new());
        let gateway = Arc::new(ScriptedGateway::replies(vec![
            Completion::tool_calls(vec![call("c1", "beta.postMessage", json!({ "text": "hi" }))]),
            Completion::final_text("Only administrators can post announcements."),
        ]));
        let use_case = fixture.use_case(gateway.clone(), ExecutionParams::default());

        let output = use_case.execute(input("announce hi", "U_GUEST")).await.unwrap();
        assert_eq!(
            output.outcome,
            TurnOutcome::Answered("Only administrators can post announcements.".to_string())
        );
        assert!(fixture.invoker.calls().is_empty());
        assert!(tool_messages(&gateway.contexts()[1])[0].contains("PERMISSION_DENIED"));
        assert_eq!(output.summary.failed_calls, 1);
    }

    #[tokio::test]
    async fn test_validation_error_observed_and_not_retried() {
        let fixture = Fixture::new(RecordingInvoker::new());
        let gateway = Arc::new(ScriptedGateway::replies(vec![
            Completion::tool_calls(vec![call("c1", "alpha.search", json!({ "query": "x" }))]),
            Completion::final_text("I need a search term."),
        ]));
        let use_case = fixture.use_case(gateway.clone(), ExecutionParams::default());

        let output = use_case.execute(input("search", "U1")).await.unwrap();
        assert!(matches!(output.outcome, TurnOutcome::Answered(_)));
        assert!(fixture.invoker.calls().is_empty());
        assert_eq!(output.summary.invocations, 0);
        let observation = &tool_messages(&gateway.contexts()[1])[0];
        assert!(observation.contains("INVALID_ARGUMENT"));
        assert!(observation.contains("missing required property 'q'"));
    }

    #[tokio::test]
    async fn test_unparseable_arguments_observed_beside_good_call() {
        let fixture = Fixture::new(RecordingInvoker::new());
        let gateway = Arc::new(ScriptedGateway::replies(vec![
            Completion::tool_calls(vec![
                call("c1", "alpha.search", json!({ "q": "rust" })),
                ToolCallIntent::unparseable(
                    "c2",
                    "alpha.search",
                    "{q: broken",
                    "key must be a string",
                ),
            ]),
            Completion::final_text("Found one result."),
        ]));
        let use_case = fixture.use_case(gateway.clone(), ExecutionParams::default());

        let output = use_case.execute(input("search twice", "U1")).await.unwrap();
        assert_eq!(
            output.outcome,
            TurnOutcome::Answered("Found one result.".to_string())
        );
        // Only the well-formed call reached the server, and nothing was retried
        assert_eq!(fixture.invoker.calls(), vec!["alpha.search"]);
        assert_eq!(output.summary.invocations, 1);
        assert_eq!(output.summary.failed_calls, 1);

        let observations = tool_messages(&gateway.contexts()[1]);
        assert_eq!(observations.len(), 2);
        assert!(observations[0].contains("\"q\":\"rust\""));
        assert!(observations[1].contains("INVALID_ARGUMENT"));
        assert!(observations[1].contains("not valid JSON"));
    }

    #[tokio::test]
    async fn test_gateway_failure_propagates() {
        let fixture = Fixture::new(RecordingInvoker::new());
        let gateway = Arc::new(ScriptedGateway::unreachable());
        let use_case = fixture.use_case(gateway, ExecutionParams::default());

        let err = use_case.execute(input("hi", "U1")).await.unwrap_err();
        assert!(matches!(err, RunTurnError::GatewayError(_)));
    }

    #[tokio::test]
    async fn test_empty_answer_is_an_error() {
        let fixture = Fixture::new(RecordingInvoker::new());
        let gateway = Arc::new(ScriptedGateway::replies(vec![Completion::final_text("  ")]));
        let use_case = fixture.use_case(gateway, ExecutionParams::default());

        let err = use_case.execute(input("hi", "U1")).await.unwrap_err();
        assert!(matches!(err, RunTurnError::EmptyResponse));
    }

    #[tokio::test]
    async fn test_disconnected_server_tools_disappear_between_steps() {
        let fixture = Fixture::new(RecordingInvoker::new());
        let gateway = Arc::new(ScriptedGateway::replies(vec![
            Completion::tool_calls(vec![call("c1", "beta.postMessage", json!({}))]),
            Completion::final_text("done"),
        ]));
        let use_case = fixture.use_case(gateway.clone(), ExecutionParams::default());

        // alpha drops out before the turn starts
        fixture.registry.unpublish("alpha");
        fixture.availability.set("alpha", concierge_domain::ConnectionState::Degraded);

        let output = use_case.execute(input("post", "U_ADMIN")).await.unwrap();
        assert!(matches!(output.outcome, TurnOutcome::Answered(_)));
        assert_eq!(gateway.tools_offered()[0], vec!["beta.postMessage"]);
        assert_eq!(fixture.invoker.calls(), vec!["beta.postMessage"]);
    }

    #[tokio::test]
    async fn test_transient_failure_retried_within_turn() {
        let fixture = Fixture::new(RecordingInvoker::new());
        fixture.invoker.fail_next(ToolError::transient("reset"));
        let gateway = Arc::new(ScriptedGateway::replies(vec![
            Completion::tool_calls(vec![call("c1", "alpha.summarize", json!({}))]),
            Completion::final_text("summary"),
        ]));
        let use_case = fixture.use_case(gateway.clone(), ExecutionParams::default());

        let output = use_case.execute(input("summarize", "U1")).await.unwrap();
        assert_eq!(output.summary.invocations, 2);
        assert_eq!(output.summary.failed_calls, 0);
    }

    #[test]
    fn test_observation_truncated() {
        let long = "x".repeat(50);
        let outcome = ToolOutcome::Rejected(ToolError::new(ToolErrorKind::Remote, long));
        let rendered = render_observation(&outcome, 30);
        assert!(rendered.starts_with("error: [REMOTE_ERROR]"));
        assert!(rendered.contains("[truncated"));
    }
}
