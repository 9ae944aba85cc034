//! Persona settings — the assistant's voice in every fallback tier.

use serde::{Deserialize, Serialize};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant in a team chat. \
Use the available tools when they help answer the request. \
If a tool call fails or is refused, explain that briefly instead of guessing.";

pub const DEFAULT_FALLBACK_MESSAGE: &str =
    "Sorry, I can't help with that right now. Please try again in a little while.";

pub const DEFAULT_COULD_NOT_COMPLETE_MESSAGE: &str =
    "I couldn't finish that within my step limit. Could you narrow the request down?";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PersonaConfig {
    /// Prepended to every completion request.
    pub system_prompt: String,
    /// Returned verbatim by the static tier.
    pub fallback_message: String,
    /// Returned when the step budget runs out.
    pub could_not_complete_message: String,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            fallback_message: DEFAULT_FALLBACK_MESSAGE.to_string(),
            could_not_complete_message: DEFAULT_COULD_NOT_COMPLETE_MESSAGE.to_string(),
        }
    }
}

impl PersonaConfig {
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_fallback_message(mut self, message: impl Into<String>) -> Self {
        self.fallback_message = message.into();
        self
    }

    pub fn with_could_not_complete_message(mut self, message: impl Into<String>) -> Self {
        self.could_not_complete_message = message.into();
        self
    }
}
