// Inbound updates as posted by the messaging channel's webhook.

use serde::{Deserialize, Serialize};

use crate::models::{ChatId, ExternalUserId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Update {
    #[serde(default)]
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<IncomingMessage>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sender {
    pub id: ExternalUserId,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
}

impl Sender {
    pub fn display_name(&self) -> &str {
        self.username
            .as_deref()
            .or(self.first_name.as_deref())
            .unwrap_or("")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: ChatId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMessage {
    #[serde(default)]
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<Sender>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: Sender,
    #[serde(default)]
    pub message: Option<CallbackMessage>,
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackMessage {
    #[serde(default)]
    pub message_id: i64,
    pub chat: Chat,
}

impl CallbackQuery {
    /// Chat the button was pressed in; private chats share the user's id.
    pub fn chat_id(&self) -> ChatId {
        self.message
            .as_ref()
            .map(|m| m.chat.id)
            .unwrap_or(ChatId(self.from.id.value()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_text_message() {
        let raw = r#"{
            "update_id": 10,
            "message": {
                "message_id": 3,
                "chat": {"id": -100},
                "from": {"id": 55, "username": "anna"},
                "text": "Berlin"
            }
        }"#;
        let update: Update = serde_json::from_str(raw).unwrap();
        let message = update.message.unwrap();
        assert_eq!(message.chat.id, ChatId(-100));
        assert_eq!(message.from.unwrap().id, ExternalUserId(55));
        assert_eq!(message.text.as_deref(), Some("Berlin"));
        assert!(update.callback_query.is_none());
    }

    #[test]
    fn test_callback_chat_falls_back_to_sender() {
        let raw = r#"{"callback_query": {"id": "cb1", "from": {"id": 77, "first_name": "Ivan"}, "data": "like_4"}}"#;
        let update: Update = serde_json::from_str(raw).unwrap();
        let query = update.callback_query.unwrap();
        assert_eq!(query.chat_id(), ChatId(77));
        assert_eq!(query.from.display_name(), "Ivan");
    }
}
