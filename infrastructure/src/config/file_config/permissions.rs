//! Administrator list from TOML (`[permissions]` section)

use concierge_domain::PermissionGate;
use serde::{Deserialize, Serialize};

/// Raw permission configuration from TOML
///
/// ```toml
/// [permissions]
/// admins = ["U024BE7LH", "U0G9QF9C6"]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilePermissionsConfig {
    /// Caller identities allowed to use elevated capabilities.
    pub admins: Vec<String>,
}

impl FilePermissionsConfig {
    pub fn to_gate(&self) -> PermissionGate {
        PermissionGate::new(
            self.admins
                .iter()
                .map(|admin| admin.trim())
                .filter(|admin| !admin.is_empty()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admins_trimmed() {
        let config = FilePermissionsConfig {
            admins: vec![" U_ADMIN ".to_string(), "".to_string()],
        };
        let gate = config.to_gate();
        assert!(gate.is_admin(&"U_ADMIN".into()));
        assert!(!gate.is_admin(&"".into()));
    }
}
