//! Conversation history shared by the context aggregators

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// Chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Ordered, append-only message history for one session.
///
/// Clones share the same underlying list. The session owns one instance and
/// hands clones to the user aggregator, the assistant aggregator and the
/// kickoff handler; nothing else is given a reference.
#[derive(Debug, Clone, Default)]
pub struct ConversationHistory {
    messages: Arc<Mutex<Vec<Message>>>,
}

impl ConversationHistory {
    /// Create a history seeded with the given messages
    pub fn new(initial: Vec<Message>) -> Self {
        Self {
            messages: Arc::new(Mutex::new(initial)),
        }
    }

    /// Create a history starting with a system prompt
    pub fn with_system_prompt(prompt: impl Into<String>) -> Self {
        Self::new(vec![Message::system(prompt)])
    }

    /// Append a message
    pub fn push(&self, message: Message) {
        tracing::trace!(role = %message.role, chars = message.content.len(), "History append");
        self.messages.lock().push(message);
    }

    /// Copy of the current message list
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }

    /// Most recent message
    pub fn last(&self) -> Option<Message> {
        self.messages.lock().last().cloned()
    }

    /// Number of messages with the given role
    pub fn count_role(&self, role: Role) -> usize {
        self.messages.lock().iter().filter(|m| m.role == role).count()
    }

    /// Whether two handles point at the same history
    pub fn shares_with(&self, other: &ConversationHistory) -> bool {
        Arc::ptr_eq(&self.messages, &other.messages)
    }
}
