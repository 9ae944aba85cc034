//! Persona text from TOML (`[persona]` section)

use concierge_application::PersonaConfig;
use serde::{Deserialize, Serialize};

/// Raw persona configuration from TOML
///
/// Unset fields keep the built-in wording.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilePersonaConfig {
    pub system_prompt: Option<String>,
    pub fallback_message: Option<String>,
    pub could_not_complete_message: Option<String>,
}

impl FilePersonaConfig {
    pub fn to_persona(&self) -> PersonaConfig {
        let mut persona = PersonaConfig::default();
        if let Some(prompt) = &self.system_prompt {
            persona = persona.with_system_prompt(prompt.clone());
        }
        if let Some(message) = &self.fallback_message {
            persona = persona.with_fallback_message(message.clone());
        }
        if let Some(message) = &self.could_not_complete_message {
            persona = persona.with_could_not_complete_message(message.clone());
        }
        persona
    }
}
