//! Application-level configuration.
//!
//! - [`ExecutionParams`] — step budget, timeouts and retry count for one turn
//! - [`PersonaConfig`] — system prompt and the canned fallback texts

pub mod execution_params;
pub mod persona;

pub use execution_params::ExecutionParams;
pub use persona::PersonaConfig;
