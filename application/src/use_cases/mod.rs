//! Use cases
//!
//! Application-level operations that orchestrate domain logic.

pub mod dispatch;
pub mod handle_message;
pub mod run_turn;

#[cfg(test)]
pub(crate) mod test_support;
