// Domain records shared by the store, the scheduler and the update handler.
// Identifiers are newtypes so a user id can never be bound where an event id is expected.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! strong_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub i64);

        impl $name {
            pub fn new(id: i64) -> Self {
                Self(id)
            }

            pub fn value(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

strong_id!(
    /// Row id of a user in the store
    UserId
);
strong_id!(
    /// Row id of an event
    EventId
);
strong_id!(CityId);
strong_id!(InterestId);
strong_id!(
    /// Opaque identity assigned by the messaging channel (e.g. a Telegram user id)
    ExternalUserId
);
strong_id!(
    /// Conversation key. Pending input is tracked per chat, not per user.
    ChatId
);

/// Digest time used when a user first talks to the bot
pub const DEFAULT_DIGEST_TIME: &str = "10:00";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub external_id: ExternalUserId,
    pub username: String,
    /// `HH:MM` local wall clock. Stored verbatim, so it may not parse.
    pub digest_time: String,
}

impl User {
    /// Chat to deliver private notifications to
    pub fn chat_id(&self) -> ChatId {
        ChatId(self.external_id.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub title: String,
    pub description: String,
    pub city_id: CityId,
    /// Denormalized counter maintained by like toggles
    pub like_count: i64,
    pub starts_at: DateTime<Utc>,
}

/// Input for the ingestion path. The store assigns the id.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub title: String,
    pub description: String,
    pub city_id: CityId,
    pub starts_at: DateTime<Utc>,
}

/// Engagement of one user with one event after a toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct EngagementState {
    pub liked: bool,
    pub rsvped: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UserEventPair {
    pub user_id: UserId,
    pub event_id: EventId,
}

/// Raw engagement counters for an event, as aggregated by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngagementCounts {
    pub likes: u64,
    pub rsvps: u64,
    pub fake_boost: u64,
}

#[derive(Debug, Clone)]
pub struct EventEngagement {
    pub event: Event,
    pub counts: EngagementCounts,
}

/// Kind tag of a synthetic engagement signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeSignal {
    Like,
}

impl FakeSignal {
    pub fn as_str(self) -> &'static str {
        match self {
            FakeSignal::Like => "like",
        }
    }
}

/// Inline button attached to a delivered item
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemAction {
    pub label: String,
    /// Callback data sent back when the button is pressed
    pub callback: String,
}

/// One entry of an outbound notification: a digest line, a reminder or a feedback prompt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationItem {
    pub event_id: EventId,
    pub title: String,
    pub description: String,
    pub starts_at: Option<DateTime<Utc>>,
    pub score: f64,
    pub like_count: i64,
    pub actions: Vec<ItemAction>,
}

impl NotificationItem {
    pub fn reminder(event: &Event) -> Self {
        Self {
            event_id: event.id,
            title: format!("⏰ Reminder: {}", event.title),
            description: event.description.clone(),
            starts_at: Some(event.starts_at),
            score: 0.0,
            like_count: event.like_count,
            actions: Vec::new(),
        }
    }

    pub fn feedback_prompt(event_id: EventId) -> Self {
        Self {
            event_id,
            title: "🙏 Share your impressions".to_string(),
            description: "How was the event?".to_string(),
            starts_at: None,
            score: 0.0,
            like_count: 0,
            actions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminStats {
    pub users: i64,
    pub events: i64,
    pub actions: i64,
}

/// Profile settings rendered by the menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileSummary {
    pub city: Option<String>,
    pub interests: Vec<String>,
    pub digest_time: String,
}

pub fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(millis).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}
