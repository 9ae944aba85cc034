//! Capability domain entities

use serde::{Deserialize, Serialize};

/// Separator between the server name and the tool name in a qualified name.
pub const QUALIFIED_NAME_SEPARATOR: char = '.';

/// Permission tier advertised by a tool server for one of its tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionTier {
    /// Any caller may invoke the capability.
    #[default]
    Standard,
    /// Only admin callers may invoke the capability.
    Elevated,
}

impl PermissionTier {
    pub fn as_str(&self) -> &str {
        match self {
            PermissionTier::Standard => "standard",
            PermissionTier::Elevated => "elevated",
        }
    }

    pub fn requires_elevated_permission(&self) -> bool {
        matches!(self, PermissionTier::Elevated)
    }
}

impl std::str::FromStr for PermissionTier {
    type Err = String;

    /// Servers in the wild use several spellings for the privileged tier.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "standard" | "public" | "user" | "default" => Ok(PermissionTier::Standard),
            "elevated" | "admin" | "privileged" | "restricted" => Ok(PermissionTier::Elevated),
            other => Err(format!("unknown permission tier: {}", other)),
        }
    }
}

impl std::fmt::Display for PermissionTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One invocable tool, owned by exactly one tool server.
///
/// Capabilities are built at discovery time and replaced wholesale when the
/// owning server reconnects; they are never patched in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    /// Registry-wide unique id, `server.tool`.
    pub qualified_name: String,
    /// Owning server name.
    pub server: String,
    /// Name the owning server knows the tool by.
    pub tool_name: String,
    /// Shown to the LLM to aid tool selection.
    pub description: String,
    /// JSON Schema describing accepted arguments.
    pub input_schema: serde_json::Value,
    pub requires_elevated_permission: bool,
}

impl Capability {
    pub fn new(
        server: impl Into<String>,
        tool_name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        let server = server.into();
        let tool_name = tool_name.into();
        Self {
            qualified_name: qualify(&server, &tool_name),
            server,
            tool_name,
            description: description.into(),
            input_schema: serde_json::json!({ "type": "object" }),
            requires_elevated_permission: false,
        }
    }

    pub fn with_input_schema(mut self, schema: serde_json::Value) -> Self {
        self.input_schema = schema;
        self
    }

    pub fn with_tier(mut self, tier: PermissionTier) -> Self {
        self.requires_elevated_permission = tier.requires_elevated_permission();
        self
    }

    pub fn elevated(self) -> Self {
        self.with_tier(PermissionTier::Elevated)
    }

    pub fn tier(&self) -> PermissionTier {
        if self.requires_elevated_permission {
            PermissionTier::Elevated
        } else {
            PermissionTier::Standard
        }
    }
}

/// Build the qualified name for a server-scoped tool.
pub fn qualify(server: &str, tool_name: &str) -> String {
    format!("{}{}{}", server, QUALIFIED_NAME_SEPARATOR, tool_name)
}

/// Split a qualified name into `(server, tool)`.
///
/// Only the first separator counts, so tool names may themselves contain dots.
pub fn split_qualified(qualified_name: &str) -> Option<(&str, &str)> {
    let (server, tool) = qualified_name.split_once(QUALIFIED_NAME_SEPARATOR)?;
    if server.is_empty() || tool.is_empty() {
        return None;
    }
    Some((server, tool))
}
