//! Domain error types

use crate::server::ConnectionState;
use thiserror::Error;

/// Domain-level errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid connection state transition: {from} -> {to}")]
    InvalidTransition {
        from: ConnectionState,
        to: ConnectionState,
    },

    #[error("Invalid input schema: {0}")]
    InvalidSchema(String),

    #[error("Invalid server descriptor: {0}")]
    InvalidDescriptor(String),
}
