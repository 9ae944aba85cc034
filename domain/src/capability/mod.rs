//! Capabilities advertised by tool servers.

pub mod entities;
pub mod schema;

pub use entities::{Capability, PermissionTier, qualify, split_qualified};
pub use schema::{SchemaValidator, SchemaViolation};
