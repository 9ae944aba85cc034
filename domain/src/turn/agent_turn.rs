//! One bounded reasoning cycle for one inbound message.
//!
//! An [`AgentTurn`] records every reasoning step and every tool step in the
//! order they happened. The step budget counts reasoning steps (one per
//! completion call): once `max_steps` reasoning steps have been recorded the
//! turn refuses further ones and must end as
//! [`TurnOutcome::CouldNotComplete`].

use super::error::ToolError;
use super::invocation::Invocation;
use crate::conversation::{Completion, ToolCallIntent};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Output of one completion call.
#[derive(Debug, Clone)]
pub struct ReasonStep {
    pub completion: Completion,
}

/// What happened to one tool-call intent.
#[derive(Debug, Clone)]
pub enum ToolOutcome {
    /// Stopped before any call reached a connection (unknown capability,
    /// owner not ready, invalid arguments, permission denied).
    Rejected(ToolError),
    /// Forwarded at least once. `last` decides the observation; `earlier`
    /// holds attempts that were retried.
    Attempted {
        earlier: Vec<Invocation>,
        last: Invocation,
    },
}

impl ToolOutcome {
    pub fn result(&self) -> Result<&serde_json::Value, &ToolError> {
        match self {
            ToolOutcome::Rejected(err) => Err(err),
            ToolOutcome::Attempted { last, .. } => last.result(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result().is_ok()
    }

    /// All invocations in the order they were started.
    pub fn invocations(&self) -> impl Iterator<Item = &Invocation> {
        let (earlier, last): (&[Invocation], Option<&Invocation>) = match self {
            ToolOutcome::Rejected(_) => (&[], None),
            ToolOutcome::Attempted { earlier, last } => (earlier.as_slice(), Some(last)),
        };
        earlier.iter().chain(last)
    }
}

#[derive(Debug, Clone)]
pub struct ToolStep {
    pub intent: ToolCallIntent,
    pub outcome: ToolOutcome,
}

#[derive(Debug, Clone)]
pub enum Step {
    Reason(ReasonStep),
    Tool(ToolStep),
}

/// The step budget was already used up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("step budget of {max_steps} exhausted")]
pub struct BudgetExceeded {
    pub max_steps: usize,
}

/// How a turn ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "text", rename_all = "snake_case")]
pub enum TurnOutcome {
    Answered(String),
    /// The step budget ran out while the model still wanted tools.
    CouldNotComplete,
}

impl TurnOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnOutcome::Answered(_) => "answered",
            TurnOutcome::CouldNotComplete => "could_not_complete",
        }
    }
}

/// Compact record of a finished turn, handed to the conversation store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnSummary {
    pub reasoning_steps: usize,
    pub tool_calls: usize,
    pub failed_calls: usize,
    /// Total invocations forwarded to connections, retries included.
    pub invocations: usize,
    pub capabilities_used: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct AgentTurn {
    max_steps: usize,
    steps: Vec<Step>,
    reasoning_steps: usize,
}

impl AgentTurn {
    pub fn new(max_steps: usize) -> Self {
        Self {
            max_steps,
            steps: Vec::new(),
            reasoning_steps: 0,
        }
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn reasoning_steps(&self) -> usize {
        self.reasoning_steps
    }

    pub fn budget_exhausted(&self) -> bool {
        self.reasoning_steps >= self.max_steps
    }

    /// Record a completion. Fails once `max_steps` completions are recorded.
    pub fn push_reason(&mut self, completion: Completion) -> Result<(), BudgetExceeded> {
        if self.budget_exhausted() {
            return Err(BudgetExceeded {
                max_steps: self.max_steps,
            });
        }
        self.reasoning_steps += 1;
        self.steps.push(Step::Reason(ReasonStep { completion }));
        Ok(())
    }

    pub fn push_tool(&mut self, intent: ToolCallIntent, outcome: ToolOutcome) {
        self.steps.push(Step::Tool(ToolStep { intent, outcome }));
    }

    pub fn tool_steps(&self) -> impl Iterator<Item = &ToolStep> {
        self.steps.iter().filter_map(|step| match step {
            Step::Tool(tool) => Some(tool),
            Step::Reason(_) => None,
        })
    }

    pub fn summary(&self) -> TurnSummary {
        let mut tool_calls = 0;
        let mut failed_calls = 0;
        let mut invocations = 0;
        let mut used = BTreeSet::new();
        for step in self.tool_steps() {
            tool_calls += 1;
            if !step.outcome.is_success() {
                failed_calls += 1;
            }
            invocations += step.outcome.invocations().count();
            used.insert(step.intent.capability.clone());
        }
        TurnSummary {
            reasoning_steps: self.reasoning_steps,
            tool_calls,
            failed_calls,
            invocations,
            capabilities_used: used.into_iter().collect(),
        }
    }
}
