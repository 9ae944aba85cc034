//! Hand-written port mocks shared by the use case tests.

use crate::ports::completion_gateway::{CompletionGateway, GatewayError};
use crate::ports::conversation_logger::{ConversationEvent, ConversationLogger};
use crate::ports::tool_invoker::{ToolAvailability, ToolInvoker};
use async_trait::async_trait;
use concierge_domain::{
    Capability, Completion, ConnectionState, ConversationContext, ToolCallIntent, ToolError,
};
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

// ==================== Availability ====================

pub struct MockAvailability {
    states: Mutex<HashMap<String, ConnectionState>>,
}

impl MockAvailability {
    pub fn ready(servers: &[&str]) -> Self {
        Self {
            states: Mutex::new(
                servers
                    .iter()
                    .map(|s| (s.to_string(), ConnectionState::Ready))
                    .collect(),
            ),
        }
    }

    pub fn set(&self, server: &str, state: ConnectionState) {
        self.states
            .lock()
            .unwrap()
            .insert(server.to_string(), state);
    }
}

impl ToolAvailability for MockAvailability {
    fn server_state(&self, server: &str) -> Option<ConnectionState> {
        self.states.lock().unwrap().get(server).copied()
    }

    fn any_ready(&self) -> bool {
        self.states.lock().unwrap().values().any(|s| s.is_ready())
    }

    fn all_ready(&self) -> bool {
        let states = self.states.lock().unwrap();
        !states.is_empty() && states.values().all(|s| s.is_ready())
    }
}

// ==================== Invoker ====================

/// Records every forwarded call and echoes its arguments back.
pub struct RecordingInvoker {
    calls: Mutex<Vec<String>>,
    failures: Mutex<VecDeque<ToolError>>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl RecordingInvoker {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(VecDeque::new()),
            delay: None,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue an error for the next call.
    pub fn fail_next(&self, error: ToolError) {
        self.failures.lock().unwrap().push_back(error);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolInvoker for RecordingInvoker {
    async fn invoke(&self, capability: &Capability, arguments: &Value) -> Result<Value, ToolError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.calls
            .lock()
            .unwrap()
            .push(capability.qualified_name.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self.failures.lock().unwrap().pop_front();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        match failure {
            Some(err) => Err(err),
            None => Ok(json!({ "tool": capability.qualified_name, "echo": arguments })),
        }
    }
}

// ==================== Completion gateway ====================

/// Replays scripted completions; once the script runs out it repeats
/// `repeat` forever, or fails if none was given.
pub struct ScriptedGateway {
    script: Mutex<VecDeque<Result<Completion, GatewayError>>>,
    repeat: Option<Completion>,
    /// Each call's context and offered tool names.
    seen: Mutex<Vec<(ConversationContext, Vec<String>)>>,
    delay: Option<Duration>,
}

impl ScriptedGateway {
    pub fn new(script: Vec<Result<Completion, GatewayError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            repeat: None,
            seen: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    pub fn replies(completions: Vec<Completion>) -> Self {
        Self::new(completions.into_iter().map(Ok).collect())
    }

    pub fn always(completion: Completion) -> Self {
        Self {
            repeat: Some(completion),
            ..Self::new(Vec::new())
        }
    }

    pub fn unreachable() -> Self {
        Self::new(Vec::new())
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn tools_offered(&self) -> Vec<Vec<String>> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .map(|(_, tools)| tools.clone())
            .collect()
    }

    pub fn contexts(&self) -> Vec<ConversationContext> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .map(|(ctx, _)| ctx.clone())
            .collect()
    }
}

#[async_trait]
impl CompletionGateway for ScriptedGateway {
    async fn complete(
        &self,
        context: &ConversationContext,
        tools: &[Capability],
    ) -> Result<Completion, GatewayError> {
        self.seen.lock().unwrap().push((
            context.clone(),
            tools.iter().map(|t| t.qualified_name.clone()).collect(),
        ));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        match (next, &self.repeat) {
            (Some(result), _) => result,
            (None, Some(repeat)) => Ok(repeat.clone()),
            (None, None) => Err(GatewayError::ConnectionError(
                "completion service unreachable".to_string(),
            )),
        }
    }
}

// ==================== Conversation logger ====================

#[derive(Default)]
pub struct RecordingLogger {
    events: Mutex<Vec<(&'static str, Value)>>,
}

impl RecordingLogger {
    pub fn event_types(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(|(t, _)| *t).collect()
    }

    pub fn payloads(&self, event_type: &str) -> Vec<Value> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| *t == event_type)
            .map(|(_, p)| p.clone())
            .collect()
    }
}

impl ConversationLogger for RecordingLogger {
    fn log(&self, event: ConversationEvent) {
        self.events
            .lock()
            .unwrap()
            .push((event.event_type, event.payload));
    }
}

// ==================== Helpers ====================

pub fn call(id: &str, capability: &str, arguments: Value) -> ToolCallIntent {
    ToolCallIntent::new(id, capability, arguments)
}
