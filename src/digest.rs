// Digest Assembly - ranked notification items for a user's city.

use std::sync::Arc;
use tracing::debug;

use crate::error::AppResult;
use crate::commands::event_actions;
use crate::infrastructure::store::EngagementStore;
use crate::models::{CityId, EventEngagement, EventId, NotificationItem, User};
use crate::ranking::digest_order;

#[derive(Clone)]
pub struct DigestAssembler {
    store: Arc<dyn EngagementStore>,
}

impl DigestAssembler {
    pub fn new(store: Arc<dyn EngagementStore>) -> Self {
        Self { store }
    }

    /// Every event of the city, past ones included, scored and ordered.
    /// Already-seen events are not filtered; repeats across runs are expected.
    pub async fn assemble(&self, user: &User, city: CityId) -> AppResult<Vec<NotificationItem>> {
        let rows = self.store.events_with_engagement(city).await?;
        let items = rank(rows);
        debug!(
            "Assembled digest for user {} in city {}: {} items",
            user.id,
            city,
            items.len()
        );
        Ok(items)
    }

    /// A single event scored against its city, as it would appear in a digest.
    pub async fn card(&self, user: &User, event: EventId) -> AppResult<Option<NotificationItem>> {
        let Some(event) = self.store.event_by_id(event).await? else {
            return Ok(None);
        };
        let item = self
            .assemble(user, event.city_id)
            .await?
            .into_iter()
            .find(|item| item.event_id == event.id);
        Ok(item)
    }
}

/// Score each row and sort. Rows arrive in start order, so the stable sort
/// keeps earlier events first among equal scores.
pub fn rank(rows: Vec<EventEngagement>) -> Vec<NotificationItem> {
    let mut items: Vec<NotificationItem> = rows
        .into_iter()
        .map(|row| NotificationItem {
            event_id: row.event.id,
            score: row.counts.score(),
            like_count: row.event.like_count,
            actions: event_actions(row.event.id, row.event.like_count),
            title: row.event.title,
            description: row.event.description,
            starts_at: Some(row.event.starts_at),
        })
        .collect();
    items.sort_by(digest_order);
    items
}
