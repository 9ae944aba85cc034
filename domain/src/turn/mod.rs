//! Agent turns, tool invocations and their error taxonomy.

pub mod agent_turn;
pub mod error;
pub mod invocation;

pub use agent_turn::{
    AgentTurn, BudgetExceeded, ReasonStep, Step, ToolOutcome, ToolStep, TurnOutcome, TurnSummary,
};
pub use error::{ToolError, ToolErrorKind};
pub use invocation::{CallerIdentity, Invocation, PendingInvocation};
