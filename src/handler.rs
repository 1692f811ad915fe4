// Inbound update handling: slash commands, inline-button callbacks and the
// free-text replies that complete a pending profile edit.

use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::commands::{Command, SlashCommand};
use crate::config::{is_valid_clock, BotConfig};
use crate::conversation::{ConversationState, ConversationStates, ProfileField};
use crate::digest::DigestAssembler;
use crate::error::AppResult;
use crate::infrastructure::messaging::Messenger;
use crate::infrastructure::store::EngagementStore;
use crate::models::{ChatId, EventId, ExternalUserId, ProfileSummary, User};
use crate::updates::{CallbackQuery, IncomingMessage, Sender, Update};

pub const WELCOME_TEXT: &str = "👋 Welcome to MeetPing! Use /menu to set up your city, interests and digest time.";
pub const ACCESS_ERROR_TEXT: &str = "❌ Could not access your profile. Send /start and try again.";
pub const ACCESS_DENIED_TEXT: &str = "🚫 Access denied";
pub const INVALID_TIME_TEXT: &str = "Time must look like HH:MM, for example 10:00. Try again:";
pub const NO_SAMPLE_TEXT: &str = "No sample digest is available yet.";
pub const BLANK_INPUT_TEXT: &str = "Nothing to save: the reply was empty.";

pub struct UpdateHandler {
    store: Arc<dyn EngagementStore>,
    messenger: Arc<dyn Messenger>,
    conversations: Arc<ConversationStates>,
    digests: DigestAssembler,
    settings: BotConfig,
}

impl UpdateHandler {
    pub fn new(
        store: Arc<dyn EngagementStore>,
        messenger: Arc<dyn Messenger>,
        conversations: Arc<ConversationStates>,
        settings: BotConfig,
    ) -> Self {
        Self {
            digests: DigestAssembler::new(store.clone()),
            store,
            messenger,
            conversations,
            settings,
        }
    }

    #[instrument(skip(self, update), fields(update_id = update.update_id))]
    pub async fn handle_update(&self, update: Update) -> AppResult<()> {
        if let Some(query) = update.callback_query {
            return self.handle_callback(query).await;
        }

        match update.message {
            Some(message) => self.handle_message(message).await,
            None => {
                debug!("Ignoring update without message or callback");
                Ok(())
            }
        }
    }

    async fn handle_message(&self, message: IncomingMessage) -> AppResult<()> {
        // Photos, stickers and the like never complete a pending edit
        let Some(text) = message.text.as_deref() else {
            return Ok(());
        };
        let chat = message.chat.id;
        let sender = message.from.as_ref();

        match (SlashCommand::parse(text), sender) {
            (Some(command), Some(sender)) => {
                let user = self
                    .store
                    .upsert_user(
                        sender.id,
                        sender.display_name(),
                        &self.settings.default_digest_time,
                    )
                    .await?;
                self.handle_command(chat, sender, &user, command).await
            }
            (Some(_), None) => {
                debug!("Ignoring command without sender in chat {}", chat);
                Ok(())
            }
            (None, sender) => self.handle_text(chat, sender.map(|s| s.id), text.trim()).await,
        }
    }

    async fn handle_command(
        &self,
        chat: ChatId,
        sender: &Sender,
        user: &User,
        command: SlashCommand,
    ) -> AppResult<()> {
        match command {
            SlashCommand::Start => {
                // A fresh start drops any unfinished prompt
                self.conversations.clear(chat).await;
                self.messenger.send_text(chat, WELCOME_TEXT).await
            }
            SlashCommand::Menu => self.show_menu(chat, user).await,
            SlashCommand::Edit(field) => self.request_edit(chat, field).await,
            SlashCommand::AdminStats => {
                // Only the account handle counts; display names are user-chosen
                let is_admin = matches!(
                    (self.settings.admin_username.as_deref(), sender.username.as_deref()),
                    (Some(admin), Some(handle)) if admin == handle
                );
                if !is_admin {
                    warn!("User {} requested admin stats without permission", user.id);
                    return self.messenger.send_text(chat, ACCESS_DENIED_TEXT).await;
                }
                let stats = self.store.admin_stats().await?;
                let text = format!(
                    "📊 Stats\nUsers: {}\nEvents: {}\nActions: {}",
                    stats.users, stats.events, stats.actions
                );
                self.messenger.send_text(chat, &text).await
            }
            SlashCommand::Unknown(name) => {
                debug!("Ignoring unknown command /{}", name);
                Ok(())
            }
        }
    }

    /// Apply free text to whatever the chat was waiting for. The pending state
    /// is cleared before any store work, so a failed edit is not retried.
    async fn handle_text(
        &self,
        chat: ChatId,
        sender: Option<ExternalUserId>,
        text: &str,
    ) -> AppResult<()> {
        let state = self.conversations.take(chat).await;
        if state.is_idle() {
            return Ok(());
        }
        info!("Chat {} answered while {}", chat, state);

        let Some(sender) = sender else {
            return self.messenger.send_text(chat, ACCESS_ERROR_TEXT).await;
        };
        if text.is_empty() {
            return self.messenger.send_text(chat, BLANK_INPUT_TEXT).await;
        }

        let user = match self.store.user_by_external_id(sender).await {
            Ok(Some(user)) => user,
            Ok(None) => return self.messenger.send_text(chat, ACCESS_ERROR_TEXT).await,
            Err(e) => {
                if let Err(send_err) = self.messenger.send_text(chat, ACCESS_ERROR_TEXT).await {
                    warn!("Failed to report access error to chat {}: {}", chat, send_err);
                }
                return Err(e);
            }
        };

        let (action, reply) = match state {
            ConversationState::Idle => return Ok(()),
            ConversationState::AwaitingCity => {
                let city = self.store.ensure_city(text).await?;
                self.store.set_primary_city(user.id, city).await?;
                ("edit_city", "🏙 City updated!")
            }
            ConversationState::AwaitingInterests => {
                let mut ids = Vec::new();
                for name in split_interests(text) {
                    ids.push(self.store.ensure_interest(name).await?);
                }
                self.store.set_interests(user.id, &ids).await?;
                ("edit_interests", "🎯 Interests updated!")
            }
            ConversationState::AwaitingDigestTime => {
                if self.settings.strict_digest_time && !is_valid_clock(text) {
                    self.conversations
                        .set(chat, ConversationState::AwaitingDigestTime)
                        .await;
                    return self.messenger.send_text(chat, INVALID_TIME_TEXT).await;
                }
                self.store.set_digest_time(user.id, text).await?;
                ("edit_digest_time", "⏰ Digest time updated!")
            }
        };

        self.record_action(&user, action, text).await;
        self.messenger.send_text(chat, reply).await?;
        self.show_menu(chat, &user).await
    }

    async fn handle_callback(&self, query: CallbackQuery) -> AppResult<()> {
        let chat = query.chat_id();
        let command = Command::parse_callback(query.data.as_deref().unwrap_or_default());

        let event = match &command {
            Command::Unknown(raw) => {
                warn!("Ignoring unknown callback {:?} from {}", raw, query.from.id);
                return Ok(());
            }
            Command::EditField(field) => return self.request_edit(chat, *field).await,
            Command::ShowSample => None,
            Command::ToggleLike(event) | Command::ToggleRsvp(event) => Some(*event),
        };

        let Some(user) = self.store.user_by_external_id(query.from.id).await? else {
            return self.messenger.answer_callback(&query.id, ACCESS_ERROR_TEXT).await;
        };

        let Some(event) = event else {
            return self.send_sample(chat, &user).await;
        };

        let answer = if matches!(command, Command::ToggleLike(_)) {
            let state = self.store.toggle_like(user.id, event).await?;
            self.record_action(&user, "like", &event.to_string()).await;
            if state.liked {
                "❤️ Liked"
            } else {
                "Like removed"
            }
        } else {
            let state = self.store.toggle_rsvp(user.id, event).await?;
            self.record_action(&user, "rsvp", &event.to_string()).await;
            if state.rsvped {
                "✅ You're going"
            } else {
                "RSVP cancelled"
            }
        };
        self.messenger.answer_callback(&query.id, answer).await?;

        // Redraw the card so the like counter matches the toggle
        let message_id = query.message.as_ref().map(|m| m.message_id);
        if let Some(card) = self.digests.card(&user, event).await? {
            self.messenger.refresh_actions(chat, message_id, &card).await?;
        }
        self.show_menu(chat, &user).await
    }

    async fn request_edit(&self, chat: ChatId, field: ProfileField) -> AppResult<()> {
        let previous = self.conversations.request_edit(chat, field).await;
        if !previous.is_idle() {
            debug!("Chat {} abandoned {} for a new edit", chat, previous);
        }
        self.messenger.send_text(chat, field.prompt()).await
    }

    async fn send_sample(&self, chat: ChatId, user: &User) -> AppResult<()> {
        let sample_id: EventId = self.settings.sample_event_id;
        match self.digests.card(user, sample_id).await? {
            Some(item) => self.messenger.deliver(user, &[item]).await,
            None => self.messenger.send_text(chat, NO_SAMPLE_TEXT).await,
        }
    }

    pub async fn profile_summary(&self, user: &User) -> AppResult<ProfileSummary> {
        Ok(ProfileSummary {
            city: self.store.primary_city_name(user.id).await?,
            interests: self.store.interest_names(user.id).await?,
            digest_time: user.digest_time.clone(),
        })
    }

    async fn show_menu(&self, chat: ChatId, user: &User) -> AppResult<()> {
        // Re-read so the menu reflects an edit made in this same request
        let user = self
            .store
            .user_by_id(user.id)
            .await?
            .unwrap_or_else(|| user.clone());
        let summary = self.profile_summary(&user).await?;
        self.messenger.send_text(chat, &render_menu(&summary)).await
    }

    async fn record_action(&self, user: &User, action: &str, meta: &str) {
        if let Err(e) = self.store.log_user_action(user.id, action, meta).await {
            warn!("Failed to log action {} for user {}: {}", action, user.id, e);
        }
    }
}

/// Comma separated interest names, trimmed, blanks dropped
pub fn split_interests(text: &str) -> impl Iterator<Item = &str> {
    text.split(',').map(str::trim).filter(|name| !name.is_empty())
}

pub fn render_menu(summary: &ProfileSummary) -> String {
    let city = summary.city.as_deref().unwrap_or("not set");
    let interests = if summary.interests.is_empty() {
        "not set".to_string()
    } else {
        summary.interests.join(", ")
    };
    format!(
        "⚙️ Your settings\n🏙 City: {}\n🎯 Interests: {}\n⏰ Digest time: {}",
        city, interests, summary.digest_time
    )
}
