// Scheduling Engine - four independent periodic tasks that scan the store and
// push notifications to the messenger. A failed scan skips the tick; the next
// tick retries. Work inside a tick is not transactional: rows already delivered
// stay delivered when a later row fails.

use chrono::{DateTime, Local, NaiveTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::digest::DigestAssembler;
use crate::error::{AppError, AppResult};
use crate::infrastructure::messaging::Messenger;
use crate::infrastructure::store::EngagementStore;
use crate::models::{FakeSignal, NotificationItem, UserEventPair};

/// Outcome of one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// Rows returned by the scan
    pub scanned: usize,
    pub delivered: usize,
    pub failed: usize,
}

pub struct Scheduler {
    store: Arc<dyn EngagementStore>,
    messenger: Arc<dyn Messenger>,
    digests: DigestAssembler,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn EngagementStore>,
        messenger: Arc<dyn Messenger>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            digests: DigestAssembler::new(store.clone()),
            store,
            messenger,
            config,
        }
    }

    /// Send digests to every user whose digest time equals `clock` (HH:MM).
    /// Users without a primary city or with an empty digest get nothing.
    #[instrument(skip(self), fields(tick = %Uuid::new_v4()))]
    pub async fn dispatch_digests(&self, clock: NaiveTime) -> AppResult<TickReport> {
        let clock = clock.format("%H:%M").to_string();
        let users = self.store.users_with_digest_time(&clock).await?;
        let mut report = TickReport {
            scanned: users.len(),
            ..TickReport::default()
        };

        for user in &users {
            let city = match self.store.primary_city(user.id).await {
                Ok(Some(city)) => city,
                Ok(None) => {
                    debug!("User {} has no primary city, skipping digest", user.id);
                    continue;
                }
                Err(e) => {
                    warn!("Failed to resolve city of user {}: {}", user.id, e);
                    report.failed += 1;
                    continue;
                }
            };

            let items = match self.digests.assemble(user, city).await {
                Ok(items) if items.is_empty() => continue,
                Ok(items) => items,
                Err(e) => {
                    warn!("Failed to assemble digest for user {}: {}", user.id, e);
                    report.failed += 1;
                    continue;
                }
            };

            match self.messenger.deliver(user, &items).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!("Failed to deliver digest to user {}: {}", user.id, e);
                    report.failed += 1;
                }
            }
        }

        info!(
            "Digest tick at {}: {} due, {} delivered, {} failed",
            clock, report.scanned, report.delivered, report.failed
        );
        Ok(report)
    }

    /// Append one synthetic like to every event that has not started yet.
    #[instrument(skip(self), fields(tick = %Uuid::new_v4()))]
    pub async fn inject_fake_engagement(&self, now: DateTime<Utc>) -> AppResult<TickReport> {
        let events = self.store.active_events(now).await?;
        let mut report = TickReport {
            scanned: events.len(),
            ..TickReport::default()
        };

        for event in events {
            match self.store.insert_fake_engagement(event, FakeSignal::Like).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!("Failed to boost event {}: {}", event, e);
                    report.failed += 1;
                }
            }
        }

        debug!("Fake engagement tick: {} events boosted", report.delivered);
        Ok(report)
    }

    /// Remind every RSVP whose event starts within the lookahead window.
    /// A pair still inside the window on the next tick is reminded again.
    #[instrument(skip(self), fields(tick = %Uuid::new_v4()))]
    pub async fn dispatch_reminders(&self, now: DateTime<Utc>) -> AppResult<TickReport> {
        let pairs = self
            .store
            .upcoming_rsvps(now, self.config.reminder_window())
            .await?;
        let report = self
            .deliver_per_pair(&pairs, |store, pair| async move {
                let event = store
                    .event_by_id(pair.event_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("Event {}", pair.event_id)))?;
                Ok::<_, AppError>(NotificationItem::reminder(&event))
            })
            .await;

        info!(
            "Reminder tick: {} upcoming, {} delivered, {} failed",
            report.scanned, report.delivered, report.failed
        );
        Ok(report)
    }

    /// Prompt for feedback on every past RSVP without a feedback record.
    /// Nothing is recorded here, so ignored prompts repeat every tick.
    #[instrument(skip(self), fields(tick = %Uuid::new_v4()))]
    pub async fn dispatch_feedback_requests(&self, now: DateTime<Utc>) -> AppResult<TickReport> {
        let pairs = self.store.past_rsvps_without_feedback(now).await?;
        let report = self
            .deliver_per_pair(&pairs, |_, pair| async move {
                Ok::<_, AppError>(NotificationItem::feedback_prompt(pair.event_id))
            })
            .await;

        info!(
            "Feedback tick: {} pending, {} delivered, {} failed",
            report.scanned, report.delivered, report.failed
        );
        Ok(report)
    }

    async fn deliver_per_pair<F, Fut>(&self, pairs: &[UserEventPair], build: F) -> TickReport
    where
        F: Fn(Arc<dyn EngagementStore>, UserEventPair) -> Fut,
        Fut: Future<Output = AppResult<NotificationItem>>,
    {
        let mut report = TickReport {
            scanned: pairs.len(),
            ..TickReport::default()
        };

        for pair in pairs {
            let user = match self.store.user_by_id(pair.user_id).await {
                Ok(Some(user)) => user,
                Ok(None) => {
                    warn!("RSVP references missing user {}", pair.user_id);
                    report.failed += 1;
                    continue;
                }
                Err(e) => {
                    warn!("Failed to load user {}: {}", pair.user_id, e);
                    report.failed += 1;
                    continue;
                }
            };

            let item = match build(self.store.clone(), *pair).await {
                Ok(item) => item,
                Err(e) => {
                    warn!(
                        "Failed to build notification for ({}, {}): {}",
                        pair.user_id, pair.event_id, e
                    );
                    report.failed += 1;
                    continue;
                }
            };

            match self.messenger.deliver(&user, std::slice::from_ref(&item)).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!("Failed to notify user {}: {}", user.id, e);
                    report.failed += 1;
                }
            }
        }
        report
    }

    /// Spawn the four periodic loops. They run until the handle shuts them down.
    pub fn start(self: Arc<Self>) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let digest = self.clone();
        let fake = self.clone();
        let reminders = self.clone();
        let feedback = self.clone();

        let handles = vec![
            spawn_periodic(
                "digest",
                self.config.digest_period(),
                // Land mid-period so a late wakeup still reads the intended minute
                Instant::now() + delay_to_mid_period(self.config.digest_period(), Utc::now()),
                shutdown_rx.clone(),
                move || {
                    let scheduler = digest.clone();
                    async move { scheduler.dispatch_digests(Local::now().time()).await }
                },
            ),
            spawn_periodic(
                "fake_engagement",
                self.config.fake_engagement_period(),
                Instant::now() + self.config.fake_engagement_period(),
                shutdown_rx.clone(),
                move || {
                    let scheduler = fake.clone();
                    async move { scheduler.inject_fake_engagement(Utc::now()).await }
                },
            ),
            spawn_periodic(
                "reminders",
                self.config.reminder_period(),
                Instant::now() + self.config.reminder_period(),
                shutdown_rx.clone(),
                move || {
                    let scheduler = reminders.clone();
                    async move { scheduler.dispatch_reminders(Utc::now()).await }
                },
            ),
            spawn_periodic(
                "feedback",
                self.config.feedback_period(),
                Instant::now() + self.config.feedback_period(),
                shutdown_rx,
                move || {
                    let scheduler = feedback.clone();
                    async move { scheduler.dispatch_feedback_requests(Utc::now()).await }
                },
            ),
        ];

        info!(
            "Scheduler started: digest every {:?}, fake engagement every {:?}, reminders every {:?} (lookahead {}m), feedback every {:?}",
            self.config.digest_period(),
            self.config.fake_engagement_period(),
            self.config.reminder_period(),
            self.config.reminder_window().num_minutes(),
            self.config.feedback_period(),
        );

        SchedulerHandle {
            shutdown_tx,
            handles,
        }
    }
}

fn spawn_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    first_tick: Instant,
    mut shutdown: watch::Receiver<bool>,
    tick: F,
) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = AppResult<TickReport>> + Send + 'static,
{
    tokio::spawn(async move {
        // Missed ticks are dropped, not replayed
        let mut interval = interval_at(first_tick, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = tick().await {
                        error!("{} tick failed, retrying next tick: {}", name, e);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("{} loop stopped", name);
    })
}

/// Time from `now` until the middle of the next wall-clock period, so that a
/// one-minute period ticks at hh:mm:30.
pub fn delay_to_mid_period(period: Duration, now: DateTime<Utc>) -> Duration {
    let period_ms = period.as_millis() as i64;
    if period_ms == 0 {
        return Duration::ZERO;
    }
    let offset = now.timestamp_millis().rem_euclid(period_ms);
    let delay = (period_ms / 2 - offset).rem_euclid(period_ms);
    Duration::from_millis(delay as u64)
}

/// Running loops of a started scheduler
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Stop the loops, letting in-flight ticks finish within `grace`.
    /// Ticks still running after that are aborted.
    pub async fn shutdown(self, grace: Duration) {
        let _ = self.shutdown_tx.send(true);
        let aborts: Vec<AbortHandle> = self.handles.iter().map(|h| h.abort_handle()).collect();

        if tokio::time::timeout(grace, join_all(self.handles)).await.is_err() {
            warn!("Scheduler did not stop within {:?}, aborting in-flight ticks", grace);
            for abort in aborts {
                abort.abort();
            }
        }
        info!("Scheduler stopped");
    }
}
