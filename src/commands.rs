// Inbound commands, parsed once at the boundary so the core never sees raw strings.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::conversation::ProfileField;
use crate::models::{EventId, ItemAction};

static TOGGLE_CALLBACK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(like|going|rsvp)_(\d+)$").expect("valid toggle pattern"));

/// Inline-button callback actions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    ToggleLike(EventId),
    ToggleRsvp(EventId),
    EditField(ProfileField),
    ShowSample,
    Unknown(String),
}

impl Command {
    pub fn parse_callback(data: &str) -> Self {
        let data = data.trim();

        if let Some(caps) = TOGGLE_CALLBACK.captures(data) {
            return match caps[2].parse::<i64>() {
                Ok(id) if &caps[1] == "like" => Command::ToggleLike(EventId(id)),
                Ok(id) => Command::ToggleRsvp(EventId(id)),
                Err(_) => Command::Unknown(data.to_string()),
            };
        }

        match data {
            "edit_city" => Command::EditField(ProfileField::City),
            "edit_interests" => Command::EditField(ProfileField::Interests),
            "edit_time" | "edit_digest_time" => Command::EditField(ProfileField::DigestTime),
            "show_sample_digest" => Command::ShowSample,
            other => Command::Unknown(other.to_string()),
        }
    }

    pub fn callback_data(&self) -> String {
        match self {
            Command::ToggleLike(id) => format!("like_{}", id),
            Command::ToggleRsvp(id) => format!("going_{}", id),
            Command::EditField(ProfileField::City) => "edit_city".to_string(),
            Command::EditField(ProfileField::Interests) => "edit_interests".to_string(),
            Command::EditField(ProfileField::DigestTime) => "edit_time".to_string(),
            Command::ShowSample => "show_sample_digest".to_string(),
            Command::Unknown(raw) => raw.clone(),
        }
    }
}

/// Like and RSVP buttons of an event card. The like label shows the live count.
pub fn event_actions(event: EventId, like_count: i64) -> Vec<ItemAction> {
    vec![
        ItemAction {
            label: format!("❤️ {}", like_count),
            callback: Command::ToggleLike(event).callback_data(),
        },
        ItemAction {
            label: "✅ I'm going".to_string(),
            callback: Command::ToggleRsvp(event).callback_data(),
        },
    ]
}

/// Slash commands typed into the chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    Start,
    Menu,
    Edit(ProfileField),
    AdminStats,
    Unknown(String),
}

impl SlashCommand {
    /// `None` when the text is not a command at all.
    pub fn parse(text: &str) -> Option<Self> {
        let token = text.split_whitespace().next()?;
        let name = token.strip_prefix('/')?;
        // "/menu@MeetPingBot" addresses a specific bot in group chats
        let name = name.split('@').next().unwrap_or(name);

        Some(match name {
            "start" => SlashCommand::Start,
            "menu" => SlashCommand::Menu,
            "edit_city" => SlashCommand::Edit(ProfileField::City),
            "edit_interests" => SlashCommand::Edit(ProfileField::Interests),
            "edit_time" => SlashCommand::Edit(ProfileField::DigestTime),
            "adminstats" => SlashCommand::AdminStats,
            other => SlashCommand::Unknown(other.to_string()),
        })
    }
}
