// Engagement Store - the repository contract the bot core consumes.
// Compound writes (RSVP + implied like, primary city switch, interest replace)
// are atomic to concurrent readers; implementations must run them in one transaction.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::error::AppResult;
use crate::models::{
    AdminStats, CityId, EngagementState, Event, EventEngagement, EventId, ExternalUserId,
    FakeSignal, InterestId, NewEvent, User, UserEventPair, UserId,
};

#[async_trait]
pub trait EngagementStore: Send + Sync {
    /// Create the schema if it does not exist yet
    async fn initialize(&self) -> AppResult<()>;

    /// Round-trip to the backing database
    async fn health_check(&self) -> AppResult<()>;

    // Users
    /// Insert on first contact, otherwise refresh the display name only.
    async fn upsert_user(
        &self,
        external_id: ExternalUserId,
        username: &str,
        default_digest_time: &str,
    ) -> AppResult<User>;
    async fn user_by_external_id(&self, external_id: ExternalUserId) -> AppResult<Option<User>>;
    async fn user_by_id(&self, id: UserId) -> AppResult<Option<User>>;
    async fn set_digest_time(&self, user: UserId, digest_time: &str) -> AppResult<()>;
    async fn users_with_digest_time(&self, clock: &str) -> AppResult<Vec<User>>;

    // Cities and interests
    /// Get-or-create by unique name. Concurrent calls resolve to one row.
    async fn ensure_city(&self, name: &str) -> AppResult<CityId>;
    async fn ensure_interest(&self, name: &str) -> AppResult<InterestId>;
    /// Unset every primary flag of the user and set the new one, atomically.
    async fn set_primary_city(&self, user: UserId, city: CityId) -> AppResult<()>;
    async fn primary_city(&self, user: UserId) -> AppResult<Option<CityId>>;
    async fn primary_city_name(&self, user: UserId) -> AppResult<Option<String>>;
    /// Full replace of the user's interest set.
    async fn set_interests(&self, user: UserId, interests: &[InterestId]) -> AppResult<()>;
    async fn interest_names(&self, user: UserId) -> AppResult<Vec<String>>;

    // Events
    async fn save_event(&self, event: NewEvent) -> AppResult<EventId>;
    async fn event_by_id(&self, id: EventId) -> AppResult<Option<Event>>;
    /// Events starting strictly after `now`
    async fn active_events(&self, now: DateTime<Utc>) -> AppResult<Vec<EventId>>;
    /// All events of a city with their aggregates, ordered by start time ascending.
    async fn events_with_engagement(&self, city: CityId) -> AppResult<Vec<EventEngagement>>;

    // Engagement
    /// Flip the like. Returns the state after the flip.
    async fn toggle_like(&self, user: UserId, event: EventId) -> AppResult<EngagementState>;
    /// Flip the RSVP; absent -> present also ensures a like in the same transaction.
    async fn toggle_rsvp(&self, user: UserId, event: EventId) -> AppResult<EngagementState>;
    async fn engagement(&self, user: UserId, event: EventId) -> AppResult<EngagementState>;
    /// Append one synthetic signal. Never attributed to a real user.
    async fn insert_fake_engagement(&self, event: EventId, signal: FakeSignal) -> AppResult<()>;
    /// RSVPs whose event starts within `[now, now + window]`
    async fn upcoming_rsvps(
        &self,
        now: DateTime<Utc>,
        window: Duration,
    ) -> AppResult<Vec<UserEventPair>>;
    /// RSVPs whose event started before `now` and that have no feedback yet
    async fn past_rsvps_without_feedback(&self, now: DateTime<Utc>)
        -> AppResult<Vec<UserEventPair>>;
    /// Returns false when the pair already has feedback.
    async fn record_feedback(&self, user: UserId, event: EventId, text: &str) -> AppResult<bool>;

    // Audit
    async fn log_user_action(&self, user: UserId, action: &str, meta: &str) -> AppResult<()>;
    async fn admin_stats(&self) -> AppResult<AdminStats>;
}
