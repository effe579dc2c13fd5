//! Chat prompt assembly.

use serde::{Deserialize, Serialize};

/// One earlier exchange. Either side may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assistant: Option<String>,
}

impl ChatTurn {
    pub fn new(user: impl Into<String>, assistant: impl Into<String>) -> Self {
        Self {
            user: Some(user.into()),
            assistant: Some(assistant.into()),
        }
    }
}

/// Render system prompt, history and the new message as plain text.
///
/// Sections are separated by a blank line and the prompt ends with an open
/// `Assistant:` turn:
///
/// ```text
/// You are Kei, a helpful agricultural AI assistant.
///
/// User: when to plant maize?
///
/// Assistant:
/// ```
///
/// An empty system prompt is left out.
pub fn build_chat_prompt(system_prompt: &str, history: &[ChatTurn], message: &str) -> String {
    let mut sections = Vec::with_capacity(history.len() * 2 + 3);
    let system = system_prompt.trim();
    if !system.is_empty() {
        sections.push(system.to_string());
    }
    for turn in history {
        if let Some(user) = &turn.user {
            sections.push(format!("User: {user}"));
        }
        if let Some(assistant) = &turn.assistant {
            sections.push(format!("Assistant: {assistant}"));
        }
    }
    sections.push(format!("User: {message}"));
    sections.push("Assistant:".to_string());
    sections.join("\n\n")
}
