// Ranking Engine - turns raw engagement counters into a comparable score.
// RSVPs weigh double a like, synthetic boosts half a like.

use std::cmp::Ordering;

use crate::models::{EngagementCounts, NotificationItem};

const LIKE_WEIGHT: f64 = 1.0;
const RSVP_WEIGHT: f64 = 2.0;
const FAKE_BOOST_WEIGHT: f64 = 0.5;

/// Deterministic score of an event. Counts are unsigned, so the score is never negative.
pub fn score(likes: u64, rsvps: u64, fake_boost: u64) -> f64 {
    LIKE_WEIGHT * likes as f64 + RSVP_WEIGHT * rsvps as f64 + FAKE_BOOST_WEIGHT * fake_boost as f64
}

impl EngagementCounts {
    pub fn score(&self) -> f64 {
        score(self.likes, self.rsvps, self.fake_boost)
    }
}

/// Digest order: higher score first, earlier start breaks ties.
pub fn digest_order(a: &NotificationItem, b: &NotificationItem) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.starts_at.cmp(&b.starts_at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventId;
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn test_score_weights() {
        assert_eq!(score(0, 0, 0), 0.0);
        assert_eq!(score(3, 0, 0), 3.0);
        assert_eq!(score(0, 2, 0), 4.0);
        assert_eq!(score(0, 0, 3), 1.5);
        assert_eq!(score(1, 2, 3), 1.0 + 4.0 + 1.5);
    }

    #[test]
    fn test_score_monotonic_in_each_argument() {
        for base in 0..20u64 {
            assert!(score(base + 1, 4, 4) >= score(base, 4, 4));
            assert!(score(4, base + 1, 4) >= score(4, base, 4));
            assert!(score(4, 4, base + 1) >= score(4, 4, base));
        }
    }

    #[test]
    fn test_rsvp_outweighs_like_and_fake() {
        assert!(score(0, 1, 0) > score(1, 0, 0));
        assert!(score(1, 0, 0) > score(0, 0, 1));
    }

    #[test]
    fn test_counts_score_matches_function() {
        let counts = EngagementCounts {
            likes: 5,
            rsvps: 1,
            fake_boost: 4,
        };
        assert_eq!(counts.score(), score(5, 1, 4));
        assert_eq!(counts.score(), counts.score());
    }

    #[test]
    fn test_digest_order_breaks_ties_by_start() {
        let early = Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap();
        let item = |id: i64, score: f64, offset_hours: i64| NotificationItem {
            event_id: EventId(id),
            title: format!("event {}", id),
            description: String::new(),
            starts_at: Some(early + Duration::hours(offset_hours)),
            score,
            like_count: 0,
            actions: Vec::new(),
        };

        let mut items = vec![item(1, 1.0, 0), item(2, 3.0, 5), item(3, 3.0, 1)];
        items.sort_by(digest_order);

        let ids: Vec<i64> = items.iter().map(|i| i.event_id.value()).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }
}
