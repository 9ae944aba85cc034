//! Capability Registry — single source of truth for what can be called.
//!
//! Readers take an [`Arc<RegistrySnapshot>`] and keep using it for as long as
//! they like; writers build a complete replacement snapshot off to the side
//! and swap the pointer under a short write lock. A reader therefore sees
//! either the old set or the new set, never a partial one, and never waits on
//! a publish in progress.
//!
//! Collisions: a qualified name may be owned by only one server. Servers only
//! hold entries while their connection is live (a connection unpublishes
//! before leaving `Ready`), so an entry owned by another server is always a
//! live one and the newcomer is rejected and logged.

use concierge_domain::{Capability, SchemaValidator};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info, warn};

/// A capability together with its compiled argument validator.
#[derive(Debug)]
pub struct RegisteredCapability {
    pub capability: Capability,
    pub validator: SchemaValidator,
}

impl RegisteredCapability {
    pub fn server(&self) -> &str {
        &self.capability.server
    }
}

/// Immutable view of every published capability.
#[derive(Debug, Default)]
pub struct RegistrySnapshot {
    entries: BTreeMap<String, Arc<RegisteredCapability>>,
}

impl RegistrySnapshot {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, qualified_name: &str) -> Option<&Arc<RegisteredCapability>> {
        self.entries.get(qualified_name)
    }

    /// Capabilities in qualified-name order, as offered to the model.
    pub fn capabilities(&self) -> Vec<Capability> {
        self.entries
            .values()
            .map(|entry| entry.capability.clone())
            .collect()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn owned_by<'a>(&'a self, server: &'a str) -> impl Iterator<Item = &'a Capability> + 'a {
        self.entries
            .values()
            .filter(move |entry| entry.server() == server)
            .map(|entry| &entry.capability)
    }

    /// Look up a capability by qualified name, or by bare tool name when
    /// exactly one server offers a tool of that name.
    pub fn resolve(&self, name: &str) -> Option<Arc<RegisteredCapability>> {
        if let Some(entry) = self.entries.get(name) {
            return Some(entry.clone());
        }
        let mut matches = self
            .entries
            .values()
            .filter(|entry| entry.capability.tool_name == name);
        match (matches.next(), matches.next()) {
            (Some(only), None) => Some(only.clone()),
            _ => None,
        }
    }

    fn same_as(&self, other: &BTreeMap<String, Arc<RegisteredCapability>>) -> bool {
        self.entries.len() == other.len()
            && self
                .entries
                .iter()
                .zip(other.iter())
                .all(|((ka, a), (kb, b))| ka == kb && a.capability == b.capability)
    }
}

/// Why a capability was left out of a publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Another live server already owns the qualified name.
    Collision { owner: String },
    /// The batch named the same capability twice; the first one was kept.
    DuplicateInBatch,
    /// The capability claims a different owning server.
    ForeignOwner { claimed: String },
    /// The input schema could not be compiled.
    InvalidSchema(String),
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::Collision { owner } => write!(f, "name already owned by '{}'", owner),
            RejectReason::DuplicateInBatch => write!(f, "duplicate in batch"),
            RejectReason::ForeignOwner { claimed } => {
                write!(f, "capability claims owner '{}'", claimed)
            }
            RejectReason::InvalidSchema(msg) => write!(f, "{}", msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub qualified_name: String,
    pub reason: RejectReason,
}

/// Result of one [`CapabilityRegistry::publish`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub accepted: usize,
    pub rejected: Vec<Rejection>,
}

/// Shared registry of capabilities across all tool server connections.
#[derive(Debug, Default)]
pub struct CapabilityRegistry {
    current: RwLock<Arc<RegistrySnapshot>>,
    /// Serializes writers so concurrent publishes never lose each other's entries.
    write_lock: Mutex<()>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot. Never waits on a writer building a new one.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<RegisteredCapability>> {
        self.snapshot().resolve(name)
    }

    /// Atomically replace everything `server` has published with
    /// `capabilities`.
    pub fn publish(&self, server: &str, capabilities: Vec<Capability>) -> PublishReport {
        let _writer = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let old = self.snapshot();

        let mut entries: BTreeMap<String, Arc<RegisteredCapability>> = old
            .entries
            .iter()
            .filter(|(_, entry)| entry.server() != server)
            .map(|(name, entry)| (name.clone(), entry.clone()))
            .collect();

        let mut report = PublishReport::default();
        let mut seen = HashSet::new();

        for capability in capabilities {
            let name = capability.qualified_name.clone();
            let rejection = if capability.server != server {
                Some(RejectReason::ForeignOwner {
                    claimed: capability.server.clone(),
                })
            } else if let Some(existing) = entries.get(&name) {
                if seen.contains(&name) {
                    Some(RejectReason::DuplicateInBatch)
                } else {
                    Some(RejectReason::Collision {
                        owner: existing.server().to_string(),
                    })
                }
            } else {
                None
            };

            if let Some(reason) = rejection {
                warn!(server = %server, capability = %name, reason = %reason, "Capability rejected");
                report.rejected.push(Rejection {
                    qualified_name: name,
                    reason,
                });
                continue;
            }

            match SchemaValidator::compile(&capability.input_schema) {
                Ok(validator) => {
                    seen.insert(name.clone());
                    entries.insert(
                        name,
                        Arc::new(RegisteredCapability {
                            capability,
                            validator,
                        }),
                    );
                    report.accepted += 1;
                }
                Err(e) => {
                    warn!(server = %server, capability = %name, error = %e, "Capability rejected");
                    report.rejected.push(Rejection {
                        qualified_name: name,
                        reason: RejectReason::InvalidSchema(e.to_string()),
                    });
                }
            }
        }

        if old.same_as(&entries) {
            debug!(server = %server, "Publish unchanged, keeping snapshot");
        } else {
            info!(
                server = %server,
                accepted = report.accepted,
                rejected = report.rejected.len(),
                total = entries.len(),
                "Published capabilities"
            );
            self.swap(entries);
        }
        report
    }

    /// Remove every capability published by `server`.
    pub fn unpublish(&self, server: &str) -> usize {
        let _writer = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let old = self.snapshot();
        let entries: BTreeMap<_, _> = old
            .entries
            .iter()
            .filter(|(_, entry)| entry.server() != server)
            .map(|(name, entry)| (name.clone(), entry.clone()))
            .collect();
        let removed = old.len() - entries.len();
        if removed > 0 {
            info!(server = %server, removed, "Unpublished capabilities");
            self.swap(entries);
        }
        removed
    }

    /// Capability count per server.
    pub fn stats(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for entry in self.snapshot().entries.values() {
            *counts.entry(entry.server().to_string()).or_insert(0) += 1;
        }
        counts
    }

    fn swap(&self, entries: BTreeMap<String, Arc<RegisteredCapability>>) {
        let next = Arc::new(RegistrySnapshot { entries });
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = next;
    }
}
