//! Permission gate for elevated capabilities.
//!
//! Checks are pure and synchronous: the admin set is loaded once from
//! configuration and no network call is ever made.

use crate::capability::Capability;
use crate::turn::CallerIdentity;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionDecision {
    Allow,
    Deny(String),
}

impl PermissionDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, PermissionDecision::Allow)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PermissionGate {
    admins: HashSet<String>,
}

impl PermissionGate {
    pub fn new<I, S>(admins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            admins: admins.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_admin(&self, caller: &CallerIdentity) -> bool {
        self.admins.contains(caller.as_str())
    }

    pub fn check(&self, caller: &CallerIdentity, capability: &Capability) -> PermissionDecision {
        if !capability.requires_elevated_permission || self.is_admin(caller) {
            return PermissionDecision::Allow;
        }
        PermissionDecision::Deny(format!(
            "'{}' requires elevated permission and the caller is not an administrator",
            capability.qualified_name
        ))
    }
}
