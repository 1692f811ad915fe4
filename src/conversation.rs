// Conversation State Machine - one pending input request per chat.
// Ephemeral: lives for the process lifetime only.

use std::collections::HashMap;
use std::fmt;
use tokio::sync::RwLock;

use crate::models::ChatId;

/// Profile field a user can ask to edit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProfileField {
    City,
    Interests,
    DigestTime,
}

impl ProfileField {
    pub fn prompt(self) -> &'static str {
        match self {
            ProfileField::City => "Enter your new city:",
            ProfileField::Interests => "Enter your interests, separated by commas:",
            ProfileField::DigestTime => "Enter the time to receive your digest (for example, 10:00):",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConversationState {
    /// No pending input; free text is ignored
    #[default]
    Idle,
    AwaitingCity,
    AwaitingInterests,
    AwaitingDigestTime,
}

impl ConversationState {
    pub fn awaiting(field: ProfileField) -> Self {
        match field {
            ProfileField::City => ConversationState::AwaitingCity,
            ProfileField::Interests => ConversationState::AwaitingInterests,
            ProfileField::DigestTime => ConversationState::AwaitingDigestTime,
        }
    }

    pub fn is_idle(self) -> bool {
        self == ConversationState::Idle
    }
}

impl fmt::Display for ConversationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConversationState::Idle => "none",
            ConversationState::AwaitingCity => "awaiting_city",
            ConversationState::AwaitingInterests => "awaiting_interests",
            ConversationState::AwaitingDigestTime => "awaiting_digest_time",
        };
        f.write_str(name)
    }
}

/// Pending-input table keyed by chat. Concurrent reads, exclusive writes.
///
/// Each instance is independent; the owner decides its lifetime.
#[derive(Debug, Default)]
pub struct ConversationStates {
    states: RwLock<HashMap<ChatId, ConversationState>>,
}

impl ConversationStates {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, chat: ChatId) -> ConversationState {
        self.states
            .read()
            .await
            .get(&chat)
            .copied()
            .unwrap_or_default()
    }

    /// Overwrite the pending state. Returns what was pending before.
    pub async fn set(&self, chat: ChatId, state: ConversationState) -> ConversationState {
        let mut states = self.states.write().await;
        let previous = if state.is_idle() {
            states.remove(&chat)
        } else {
            states.insert(chat, state)
        };
        previous.unwrap_or_default()
    }

    /// Start collecting `field`; last request wins over any unfinished prompt.
    pub async fn request_edit(&self, chat: ChatId, field: ProfileField) -> ConversationState {
        self.set(chat, ConversationState::awaiting(field)).await
    }

    pub async fn clear(&self, chat: ChatId) {
        self.states.write().await.remove(&chat);
    }

    /// Remove and return the pending state in one step, leaving the chat idle.
    pub async fn take(&self, chat: ChatId) -> ConversationState {
        self.states
            .write()
            .await
            .remove(&chat)
            .unwrap_or_default()
    }

    pub async fn pending_count(&self) -> usize {
        self.states.read().await.len()
    }
}
