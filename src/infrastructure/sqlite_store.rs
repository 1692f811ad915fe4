use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, Transaction};
use std::str::FromStr;
use tracing::{debug, info};

use crate::error::{AppError, AppResult};
use crate::infrastructure::store::EngagementStore;
use crate::models::{
    millis_to_datetime, AdminStats, CityId, EngagementCounts, EngagementState, Event,
    EventEngagement, EventId, ExternalUserId, FakeSignal, InterestId, NewEvent, User,
    UserEventPair, UserId,
};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        external_id INTEGER NOT NULL UNIQUE,
        username TEXT NOT NULL DEFAULT '',
        digest_time TEXT NOT NULL,
        created_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS cities (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_cities (
        user_id INTEGER NOT NULL REFERENCES users(id),
        city_id INTEGER NOT NULL REFERENCES cities(id),
        is_primary INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (user_id, city_id)
    )
    "#,
    // At most one primary city per user, enforced by the database itself
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_user_cities_primary ON user_cities(user_id) WHERE is_primary = 1",
    r#"
    CREATE TABLE IF NOT EXISTS interests (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_interests (
        user_id INTEGER NOT NULL REFERENCES users(id),
        interest_id INTEGER NOT NULL REFERENCES interests(id),
        PRIMARY KEY (user_id, interest_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        city_id INTEGER NOT NULL REFERENCES cities(id),
        like_count INTEGER NOT NULL DEFAULT 0,
        starts_at INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_events_city_start ON events(city_id, starts_at)",
    "CREATE INDEX IF NOT EXISTS idx_events_start ON events(starts_at)",
    r#"
    CREATE TABLE IF NOT EXISTS likes (
        user_id INTEGER NOT NULL REFERENCES users(id),
        event_id INTEGER NOT NULL REFERENCES events(id),
        created_at INTEGER NOT NULL,
        PRIMARY KEY (user_id, event_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS rsvps (
        user_id INTEGER NOT NULL REFERENCES users(id),
        event_id INTEGER NOT NULL REFERENCES events(id),
        created_at INTEGER NOT NULL,
        PRIMARY KEY (user_id, event_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS event_score_fake (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        event_id INTEGER NOT NULL REFERENCES events(id),
        score_type TEXT NOT NULL,
        created_at INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_event_score_fake_event ON event_score_fake(event_id)",
    r#"
    CREATE TABLE IF NOT EXISTS event_feedback (
        user_id INTEGER NOT NULL REFERENCES users(id),
        event_id INTEGER NOT NULL REFERENCES events(id),
        feedback TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        PRIMARY KEY (user_id, event_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_actions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        action TEXT NOT NULL,
        meta TEXT NOT NULL DEFAULT '',
        created_at INTEGER NOT NULL
    )
    "#,
];

/// SQLite implementation of the engagement store
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect to a database file, creating it (and its directory) when missing.
    pub async fn connect(database_url: &str, max_connections: u32) -> AppResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| {
                AppError::ConfigurationError(format!(
                    "Invalid database URL {}: {}",
                    database_url, e
                ))
            })?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(std::time::Duration::from_secs(5));

        // get_filename consumes the options
        let filename = options.clone().get_filename();
        if let Some(parent) = filename.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    AppError::ConfigurationError(format!(
                        "Failed to create database directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to connect to {}: {}", database_url, e))
            })?;

        info!("Connected to SQLite database at {}", database_url);
        Ok(Self { pool })
    }

    /// Private in-memory database on a single pinned connection, schema included.
    pub async fn new_in_memory() -> AppResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to connect to in-memory SQLite: {}", e))
            })?;

        let store = Self { pool };
        store.initialize().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn ensure_named(&self, table: &'static str, name: &str) -> AppResult<i64> {
        // The UNIQUE(name) constraint makes concurrent creators converge on one row.
        sqlx::query(&format!(
            "INSERT INTO {} (name) VALUES (?) ON CONFLICT(name) DO NOTHING",
            table
        ))
        .bind(name)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to ensure {} {:?}: {}", table, name, e)))?;

        let row = sqlx::query(&format!("SELECT id FROM {} WHERE name = ?", table))
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to resolve {} {:?}: {}", table, name, e))
            })?;
        Ok(row.try_get("id")?)
    }

    async fn pair_exists_tx(
        tx: &mut Transaction<'_, Sqlite>,
        table: &'static str,
        user: UserId,
        event: EventId,
    ) -> AppResult<bool> {
        let row = sqlx::query(&format!(
            "SELECT 1 FROM {} WHERE user_id = ? AND event_id = ?",
            table
        ))
        .bind(user.0)
        .bind(event.0)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(row.is_some())
    }

    async fn insert_like_tx(
        tx: &mut Transaction<'_, Sqlite>,
        user: UserId,
        event: EventId,
    ) -> AppResult<bool> {
        let inserted = sqlx::query(
            "INSERT INTO likes (user_id, event_id, created_at) VALUES (?, ?, ?) ON CONFLICT(user_id, event_id) DO NOTHING",
        )
        .bind(user.0)
        .bind(event.0)
        .bind(Utc::now().timestamp_millis())
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(format!(
                "Failed to insert like ({}, {}): {}",
                user, event, e
            ))
        })?
        .rows_affected()
            > 0;

        if inserted {
            Self::adjust_like_count_tx(tx, event, 1).await?;
        }
        Ok(inserted)
    }

    async fn adjust_like_count_tx(
        tx: &mut Transaction<'_, Sqlite>,
        event: EventId,
        delta: i64,
    ) -> AppResult<()> {
        sqlx::query("UPDATE events SET like_count = MAX(like_count + ?, 0) WHERE id = ?")
            .bind(delta)
            .bind(event.0)
            .execute(&mut **tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!(
                    "Failed to update like count of event {}: {}",
                    event, e
                ))
            })?;
        Ok(())
    }

    async fn fetch_pairs(&self, sql: &str, binds: &[i64]) -> AppResult<Vec<UserEventPair>> {
        let mut query = sqlx::query(sql);
        for value in binds {
            query = query.bind(*value);
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to scan RSVPs: {}", e)))?;

        rows.iter()
            .map(|row| {
                Ok(UserEventPair {
                    user_id: UserId(row.try_get("user_id")?),
                    event_id: EventId(row.try_get("event_id")?),
                })
            })
            .collect()
    }
}

fn user_from_row(row: &SqliteRow) -> AppResult<User> {
    Ok(User {
        id: UserId(row.try_get("id")?),
        external_id: ExternalUserId(row.try_get("external_id")?),
        username: row.try_get("username")?,
        digest_time: row.try_get("digest_time")?,
    })
}

fn event_from_row(row: &SqliteRow) -> AppResult<Event> {
    Ok(Event {
        id: EventId(row.try_get("id")?),
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        city_id: CityId(row.try_get("city_id")?),
        like_count: row.try_get("like_count")?,
        starts_at: millis_to_datetime(row.try_get("starts_at")?),
    })
}

#[async_trait]
impl EngagementStore for SqliteStore {
    async fn initialize(&self) -> AppResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| AppError::DatabaseError(format!("Failed to apply schema: {}", e)))?;
        }
        debug!("Schema ready ({} statements)", SCHEMA.len());
        Ok(())
    }

    async fn health_check(&self) -> AppResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Database health check failed: {}", e)))?;
        Ok(())
    }

    async fn upsert_user(
        &self,
        external_id: ExternalUserId,
        username: &str,
        default_digest_time: &str,
    ) -> AppResult<User> {
        let row = sqlx::query(
            r#"
            INSERT INTO users (external_id, username, digest_time, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(external_id) DO UPDATE SET username = excluded.username
            RETURNING id, external_id, username, digest_time
            "#,
        )
        .bind(external_id.0)
        .bind(username)
        .bind(default_digest_time)
        .bind(Utc::now().timestamp_millis())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(format!("Failed to upsert user {}: {}", external_id, e))
        })?;
        user_from_row(&row)
    }

    async fn user_by_external_id(&self, external_id: ExternalUserId) -> AppResult<Option<User>> {
        let row = sqlx::query(
            "SELECT id, external_id, username, digest_time FROM users WHERE external_id = ?",
        )
        .bind(external_id.0)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn user_by_id(&self, id: UserId) -> AppResult<Option<User>> {
        let row = sqlx::query("SELECT id, external_id, username, digest_time FROM users WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn set_digest_time(&self, user: UserId, digest_time: &str) -> AppResult<()> {
        let result = sqlx::query("UPDATE users SET digest_time = ? WHERE id = ?")
            .bind(digest_time)
            .bind(user.0)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("User {} not found", user)));
        }
        Ok(())
    }

    async fn users_with_digest_time(&self, clock: &str) -> AppResult<Vec<User>> {
        let rows = sqlx::query(
            "SELECT id, external_id, username, digest_time FROM users WHERE digest_time = ? ORDER BY id",
        )
        .bind(clock)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(format!("Failed to load users for digest time {}: {}", clock, e))
        })?;
        rows.iter().map(user_from_row).collect()
    }

    async fn ensure_city(&self, name: &str) -> AppResult<CityId> {
        self.ensure_named("cities", name).await.map(CityId)
    }

    async fn ensure_interest(&self, name: &str) -> AppResult<InterestId> {
        self.ensure_named("interests", name).await.map(InterestId)
    }

    async fn set_primary_city(&self, user: UserId, city: CityId) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE user_cities SET is_primary = 0 WHERE user_id = ? AND is_primary = 1")
            .bind(user.0)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO user_cities (user_id, city_id, is_primary) VALUES (?, ?, 1)
            ON CONFLICT(user_id, city_id) DO UPDATE SET is_primary = 1
            "#,
        )
        .bind(user.0)
        .bind(city.0)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(format!(
                "Failed to set primary city {} for user {}: {}",
                city, user, e
            ))
        })?;

        tx.commit().await?;
        Ok(())
    }

    async fn primary_city(&self, user: UserId) -> AppResult<Option<CityId>> {
        let row = sqlx::query("SELECT city_id FROM user_cities WHERE user_id = ? AND is_primary = 1")
            .bind(user.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(match row {
            Some(row) => Some(CityId(row.try_get("city_id")?)),
            None => None,
        })
    }

    async fn primary_city_name(&self, user: UserId) -> AppResult<Option<String>> {
        let row = sqlx::query(
            r#"
            SELECT c.name FROM cities c
            JOIN user_cities uc ON uc.city_id = c.id
            WHERE uc.user_id = ? AND uc.is_primary = 1
            "#,
        )
        .bind(user.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(match row {
            Some(row) => Some(row.try_get("name")?),
            None => None,
        })
    }

    async fn set_interests(&self, user: UserId, interests: &[InterestId]) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM user_interests WHERE user_id = ?")
            .bind(user.0)
            .execute(&mut *tx)
            .await?;

        for interest in interests {
            sqlx::query("INSERT OR IGNORE INTO user_interests (user_id, interest_id) VALUES (?, ?)")
                .bind(user.0)
                .bind(interest.0)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(format!(
                        "Failed to add interest {} to user {}: {}",
                        interest, user, e
                    ))
                })?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn interest_names(&self, user: UserId) -> AppResult<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT i.name FROM interests i
            JOIN user_interests ui ON ui.interest_id = i.id
            WHERE ui.user_id = ?
            ORDER BY i.name
            "#,
        )
        .bind(user.0)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| row.try_get("name").map_err(AppError::from))
            .collect()
    }

    async fn save_event(&self, event: NewEvent) -> AppResult<EventId> {
        let result = sqlx::query(
            "INSERT INTO events (title, description, city_id, starts_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&event.title)
        .bind(&event.description)
        .bind(event.city_id.0)
        .bind(event.starts_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to save event {:?}: {}", event.title, e)))?;
        Ok(EventId(result.last_insert_rowid()))
    }

    async fn event_by_id(&self, id: EventId) -> AppResult<Option<Event>> {
        let row = sqlx::query(
            "SELECT id, title, description, city_id, like_count, starts_at FROM events WHERE id = ?",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(event_from_row).transpose()
    }

    async fn active_events(&self, now: DateTime<Utc>) -> AppResult<Vec<EventId>> {
        let rows = sqlx::query("SELECT id FROM events WHERE starts_at > ? ORDER BY starts_at, id")
            .bind(now.timestamp_millis())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to load active events: {}", e)))?;
        rows.iter()
            .map(|row| Ok(EventId(row.try_get("id")?)))
            .collect()
    }

    async fn events_with_engagement(&self, city: CityId) -> AppResult<Vec<EventEngagement>> {
        let rows = sqlx::query(
            r#"
            SELECT e.id, e.title, e.description, e.city_id, e.like_count, e.starts_at,
                IFNULL(l.like_count, 0) AS likes,
                IFNULL(r.rsvp_count, 0) AS rsvps,
                IFNULL(f.fake_boost, 0) AS fake_boost
            FROM events e
            LEFT JOIN (
                SELECT event_id, COUNT(*) AS like_count FROM likes GROUP BY event_id
            ) l ON e.id = l.event_id
            LEFT JOIN (
                SELECT event_id, COUNT(*) AS rsvp_count FROM rsvps GROUP BY event_id
            ) r ON e.id = r.event_id
            LEFT JOIN (
                SELECT event_id, COUNT(*) AS fake_boost FROM event_score_fake GROUP BY event_id
            ) f ON e.id = f.event_id
            WHERE e.city_id = ?
            ORDER BY e.starts_at ASC, e.id ASC
            "#,
        )
        .bind(city.0)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(format!("Failed to load events for city {}: {}", city, e))
        })?;

        rows.iter()
            .map(|row| {
                Ok(EventEngagement {
                    event: event_from_row(row)?,
                    counts: EngagementCounts {
                        likes: row.try_get::<i64, _>("likes")? as u64,
                        rsvps: row.try_get::<i64, _>("rsvps")? as u64,
                        fake_boost: row.try_get::<i64, _>("fake_boost")? as u64,
                    },
                })
            })
            .collect()
    }

    async fn toggle_like(&self, user: UserId, event: EventId) -> AppResult<EngagementState> {
        let mut tx = self.pool.begin().await?;

        // Write first so the transaction holds the write lock for the whole flip.
        let removed = sqlx::query("DELETE FROM likes WHERE user_id = ? AND event_id = ?")
            .bind(user.0)
            .bind(event.0)
            .execute(&mut *tx)
            .await?
            .rows_affected()
            > 0;

        let liked = if removed {
            Self::adjust_like_count_tx(&mut tx, event, -1).await?;
            false
        } else {
            Self::insert_like_tx(&mut tx, user, event).await?;
            true
        };
        let rsvped = Self::pair_exists_tx(&mut tx, "rsvps", user, event).await?;

        tx.commit().await?;
        debug!("User {} like on event {} -> {}", user, event, liked);
        Ok(EngagementState { liked, rsvped })
    }

    async fn toggle_rsvp(&self, user: UserId, event: EventId) -> AppResult<EngagementState> {
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query("DELETE FROM rsvps WHERE user_id = ? AND event_id = ?")
            .bind(user.0)
            .bind(event.0)
            .execute(&mut *tx)
            .await?
            .rows_affected()
            > 0;

        let state = if removed {
            // Un-RSVPing leaves the implied like in place
            let liked = Self::pair_exists_tx(&mut tx, "likes", user, event).await?;
            EngagementState {
                liked,
                rsvped: false,
            }
        } else {
            sqlx::query("INSERT INTO rsvps (user_id, event_id, created_at) VALUES (?, ?, ?)")
                .bind(user.0)
                .bind(event.0)
                .bind(Utc::now().timestamp_millis())
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(format!(
                        "Failed to insert RSVP ({}, {}): {}",
                        user, event, e
                    ))
                })?;
            Self::insert_like_tx(&mut tx, user, event).await?;
            EngagementState {
                liked: true,
                rsvped: true,
            }
        };

        tx.commit().await?;
        debug!("User {} RSVP on event {} -> {}", user, event, state.rsvped);
        Ok(state)
    }

    async fn engagement(&self, user: UserId, event: EventId) -> AppResult<EngagementState> {
        let row = sqlx::query(
            r#"
            SELECT
                EXISTS(SELECT 1 FROM likes WHERE user_id = ?1 AND event_id = ?2) AS liked,
                EXISTS(SELECT 1 FROM rsvps WHERE user_id = ?1 AND event_id = ?2) AS rsvped
            "#,
        )
        .bind(user.0)
        .bind(event.0)
        .fetch_one(&self.pool)
        .await?;
        Ok(EngagementState {
            liked: row.try_get::<i64, _>("liked")? != 0,
            rsvped: row.try_get::<i64, _>("rsvped")? != 0,
        })
    }

    async fn insert_fake_engagement(&self, event: EventId, signal: FakeSignal) -> AppResult<()> {
        sqlx::query("INSERT INTO event_score_fake (event_id, score_type, created_at) VALUES (?, ?, ?)")
            .bind(event.0)
            .bind(signal.as_str())
            .bind(Utc::now().timestamp_millis())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!(
                    "Failed to insert fake {} for event {}: {}",
                    signal.as_str(),
                    event,
                    e
                ))
            })?;
        Ok(())
    }

    async fn upcoming_rsvps(
        &self,
        now: DateTime<Utc>,
        window: Duration,
    ) -> AppResult<Vec<UserEventPair>> {
        let from = now.timestamp_millis();
        let until = (now + window).timestamp_millis();
        self.fetch_pairs(
            r#"
            SELECT r.user_id, r.event_id
            FROM rsvps r
            JOIN events e ON e.id = r.event_id
            WHERE e.starts_at BETWEEN ? AND ?
            ORDER BY e.starts_at, r.user_id
            "#,
            &[from, until],
        )
        .await
    }

    async fn past_rsvps_without_feedback(
        &self,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<UserEventPair>> {
        self.fetch_pairs(
            r#"
            SELECT r.user_id, r.event_id
            FROM rsvps r
            JOIN events e ON e.id = r.event_id
            WHERE e.starts_at < ?
            AND NOT EXISTS (
                SELECT 1 FROM event_feedback f
                WHERE f.user_id = r.user_id AND f.event_id = r.event_id
            )
            ORDER BY e.starts_at, r.user_id
            "#,
            &[now.timestamp_millis()],
        )
        .await
    }

    async fn record_feedback(&self, user: UserId, event: EventId, text: &str) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO event_feedback (user_id, event_id, feedback, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(user_id, event_id) DO NOTHING
            "#,
        )
        .bind(user.0)
        .bind(event.0)
        .bind(text)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(format!(
                "Failed to record feedback ({}, {}): {}",
                user, event, e
            ))
        })?;
        Ok(result.rows_affected() > 0)
    }

    async fn log_user_action(&self, user: UserId, action: &str, meta: &str) -> AppResult<()> {
        sqlx::query("INSERT INTO user_actions (user_id, action, meta, created_at) VALUES (?, ?, ?, ?)")
            .bind(user.0)
            .bind(action)
            .bind(meta)
            .bind(Utc::now().timestamp_millis())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn admin_stats(&self) -> AppResult<AdminStats> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM users) AS users,
                (SELECT COUNT(*) FROM events) AS events,
                (SELECT COUNT(*) FROM user_actions) AS actions
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(AdminStats {
            users: row.try_get("users")?,
            events: row.try_get("events")?,
            actions: row.try_get("actions")?,
        })
    }
}
