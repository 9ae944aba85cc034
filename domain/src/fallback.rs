//! Fallback tiers as an explicit state machine.
//!
//! ```text
//! TryAugmented ──fail / no server ready──▶ TryPlain ──fail──▶ TryStatic ──▶ Done
//!      │                                      │
//!      └──────────── success ─────────────────┴──────────────────────────▶ Done
//! ```
//!
//! Each request walks the tiers strictly in order, one step at a time.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackTier {
    TryAugmented,
    TryPlain,
    TryStatic,
    Done,
}

impl FallbackTier {
    /// Tier to enter when the current one fails or is skipped.
    /// `TryStatic` cannot fail, so its successor is `Done`.
    pub fn next(self) -> FallbackTier {
        match self {
            FallbackTier::TryAugmented => FallbackTier::TryPlain,
            FallbackTier::TryPlain => FallbackTier::TryStatic,
            FallbackTier::TryStatic | FallbackTier::Done => FallbackTier::Done,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackTier::TryAugmented => "augmented",
            FallbackTier::TryPlain => "plain",
            FallbackTier::TryStatic => "static",
            FallbackTier::Done => "done",
        }
    }
}

impl std::fmt::Display for FallbackTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tiers_degrade_one_at_a_time() {
        let mut tier = FallbackTier::TryAugmented;
        let mut visited = vec![tier];
        while tier != FallbackTier::Done {
            tier = tier.next();
            visited.push(tier);
        }
        assert_eq!(
            visited,
            vec![
                FallbackTier::TryAugmented,
                FallbackTier::TryPlain,
                FallbackTier::TryStatic,
                FallbackTier::Done
            ]
        );
    }

    #[test]
    fn test_done_is_absorbing() {
        assert_eq!(FallbackTier::Done.next(), FallbackTier::Done);
    }
}
