//! Tool server descriptors from TOML (`[[servers]]` array)

use concierge_domain::ServerDescriptor;
use serde::{Deserialize, Serialize};

/// Raw tool server entry
///
/// # Example
///
/// ```toml
/// [[servers]]
/// name = "search"
/// endpoint = "tcp://127.0.0.1:7001"
///
/// [[servers]]
/// name = "files"
/// endpoint = "stdio:files-server --root /srv/share"
/// enabled = false
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileServerConfig {
    pub name: String,
    pub endpoint: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl FileServerConfig {
    pub fn to_descriptor(&self) -> ServerDescriptor {
        let descriptor = ServerDescriptor::new(self.name.trim(), self.endpoint.trim());
        if self.enabled {
            descriptor
        } else {
            descriptor.disabled()
        }
    }
}
