//! Agent prompt configuration

use serde::{Deserialize, Serialize};

/// Conversation prompts for the assistant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// System prompt seeding every session's history
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Instruction appended when a client connects, prompting the first turn
    #[serde(default = "default_kickoff_instruction")]
    pub kickoff_instruction: String,
}

fn default_system_prompt() -> String {
    "You are a helpful LLM in a WebRTC call. Your goal is to demonstrate your capabilities \
     in a succinct way. Your output will be converted to audio so don't include special \
     characters in your answers. Respond to what the user said in a creative and helpful way."
        .to_string()
}

fn default_kickoff_instruction() -> String {
    "Please introduce yourself to the user.".to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            kickoff_instruction: default_kickoff_instruction(),
        }
    }
}
