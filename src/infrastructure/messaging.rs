// Messaging contract - the narrow surface the core uses to talk to users.
// Delivery is fire-and-forget: no receipt flows back into the core, and any
// rate limiting belongs to the implementation, not to its callers.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::models::{ChatId, ExternalUserId, NotificationItem, User};

#[async_trait]
pub trait Messenger: Send + Sync {
    /// Deliver an ordered batch of notification items to a user
    async fn deliver(&self, user: &User, items: &[NotificationItem]) -> AppResult<()>;
    async fn send_text(&self, chat: ChatId, text: &str) -> AppResult<()>;
    async fn answer_callback(&self, callback_id: &str, text: &str) -> AppResult<()>;
    /// Replace the buttons of an already delivered item, e.g. after a toggle
    async fn refresh_actions(
        &self,
        chat: ChatId,
        message_id: Option<i64>,
        item: &NotificationItem,
    ) -> AppResult<()>;
}

/// Renders outbound traffic into the log. Used when no transport is wired.
#[derive(Debug, Default, Clone)]
pub struct LogMessenger;

#[async_trait]
impl Messenger for LogMessenger {
    async fn deliver(&self, user: &User, items: &[NotificationItem]) -> AppResult<()> {
        for item in items {
            info!(
                chat = %user.chat_id(),
                event = %item.event_id,
                score = item.score,
                "📌 {}",
                item.title
            );
            if !item.actions.is_empty() {
                info!("   [{}]", render_actions(item));
            }
        }
        Ok(())
    }

    async fn send_text(&self, chat: ChatId, text: &str) -> AppResult<()> {
        info!(chat = %chat, "💬 {}", text);
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str, text: &str) -> AppResult<()> {
        info!(callback = callback_id, "✔ {}", text);
        Ok(())
    }

    async fn refresh_actions(
        &self,
        chat: ChatId,
        message_id: Option<i64>,
        item: &NotificationItem,
    ) -> AppResult<()> {
        info!(chat = %chat, message = ?message_id, "🔄 [{}]", render_actions(item));
        Ok(())
    }
}

fn render_actions(item: &NotificationItem) -> String {
    item.actions
        .iter()
        .map(|action| format!("{} -> {}", action.label, action.callback))
        .collect::<Vec<_>>()
        .join(" | ")
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Digest {
        user: ExternalUserId,
        items: Vec<NotificationItem>,
    },
    Text {
        chat: ChatId,
        text: String,
    },
    CallbackAnswer {
        callback_id: String,
        text: String,
    },
    ActionsRefresh {
        chat: ChatId,
        message_id: Option<i64>,
        item: NotificationItem,
    },
}

/// Forwards every outbound call to a channel consumed by a transport task.
#[derive(Debug, Clone)]
pub struct ChannelMessenger {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl ChannelMessenger {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn push(&self, outbound: Outbound) -> AppResult<()> {
        self.tx
            .send(outbound)
            .map_err(|_| AppError::MessagingError("Outbound channel closed".to_string()))
    }
}

#[async_trait]
impl Messenger for ChannelMessenger {
    async fn deliver(&self, user: &User, items: &[NotificationItem]) -> AppResult<()> {
        self.push(Outbound::Digest {
            user: user.external_id,
            items: items.to_vec(),
        })
    }

    async fn send_text(&self, chat: ChatId, text: &str) -> AppResult<()> {
        self.push(Outbound::Text {
            chat,
            text: text.to_string(),
        })
    }

    async fn answer_callback(&self, callback_id: &str, text: &str) -> AppResult<()> {
        self.push(Outbound::CallbackAnswer {
            callback_id: callback_id.to_string(),
            text: text.to_string(),
        })
    }

    async fn refresh_actions(
        &self,
        chat: ChatId,
        message_id: Option<i64>,
        item: &NotificationItem,
    ) -> AppResult<()> {
        self.push(Outbound::ActionsRefresh {
            chat,
            message_id,
            item: item.clone(),
        })
    }
}
