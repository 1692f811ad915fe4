use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{AppError, AppResult};
use crate::models::{EventId, DEFAULT_DIGEST_TIME};

static CLOCK_FORMAT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([01][0-9]|2[0-3]):[0-5][0-9]$").expect("valid clock pattern"));

/// True for `HH:MM` on a 24 hour clock
pub fn is_valid_clock(value: &str) -> bool {
    CLOCK_FORMAT.is_match(value)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub bot: BotConfig,
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Path secret of the update webhook (`/webhook/{secret}`)
    pub webhook_secret: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    pub admin_username: Option<String>,
    pub default_digest_time: String,
    pub sample_event_id: EventId,
    /// Reject digest times that are not `HH:MM` and re-prompt
    pub strict_digest_time: bool,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            admin_username: None,
            default_digest_time: DEFAULT_DIGEST_TIME.to_string(),
            sample_event_id: EventId(999),
            strict_digest_time: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TickUnit {
    Second,
    Minute,
}

impl TickUnit {
    pub fn as_duration(self) -> Duration {
        match self {
            TickUnit::Second => Duration::from_secs(1),
            TickUnit::Minute => Duration::from_secs(60),
        }
    }
}

impl FromStr for TickUnit {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "second" | "seconds" | "s" => Ok(TickUnit::Second),
            "minute" | "minutes" | "m" => Ok(TickUnit::Minute),
            other => Err(AppError::ConfigurationError(format!(
                "TICK_UNIT must be 'second' or 'minute', got {:?}",
                other
            ))),
        }
    }
}

/// Intervals of the periodic tasks, counted in tick units
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub tick_unit: TickUnit,
    pub digest_interval: u32,
    pub fake_engagement_interval: u32,
    pub reminder_interval: u32,
    pub feedback_interval: u32,
    pub reminder_lookahead: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_unit: TickUnit::Minute,
            digest_interval: 1,
            fake_engagement_interval: 5,
            reminder_interval: 5,
            feedback_interval: 10,
            reminder_lookahead: 30,
        }
    }
}

impl SchedulerConfig {
    pub fn period(&self, units: u32) -> Duration {
        self.tick_unit.as_duration() * units.max(1)
    }

    pub fn digest_period(&self) -> Duration {
        self.period(self.digest_interval)
    }

    pub fn fake_engagement_period(&self) -> Duration {
        self.period(self.fake_engagement_interval)
    }

    pub fn reminder_period(&self) -> Duration {
        self.period(self.reminder_interval)
    }

    pub fn feedback_period(&self) -> Duration {
        self.period(self.feedback_interval)
    }

    pub fn reminder_window(&self) -> chrono::Duration {
        let window = self.tick_unit.as_duration() * self.reminder_lookahead;
        chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::minutes(30))
    }
}

impl Config {
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any key/value source
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = SchedulerConfig::default();
        let bot_defaults = BotConfig::default();

        let default_digest_time =
            get("DEFAULT_DIGEST_TIME").unwrap_or(bot_defaults.default_digest_time);
        if !is_valid_clock(&default_digest_time) {
            return Err(AppError::ConfigurationError(format!(
                "DEFAULT_DIGEST_TIME must be HH:MM, got {:?}",
                default_digest_time
            )));
        }

        Ok(Self {
            database: DatabaseConfig {
                url: get("DATABASE_URL")
                    .unwrap_or_else(|| "sqlite:data/meetping.db".to_string()),
                max_connections: parse_or(get("DATABASE_MAX_CONNECTIONS"), "DATABASE_MAX_CONNECTIONS", 5)?,
            },
            server: ServerConfig {
                host: get("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: parse_or(get("SERVER_PORT"), "SERVER_PORT", 8443)?,
                webhook_secret: get("WEBHOOK_SECRET"),
            },
            bot: BotConfig {
                admin_username: get("ADMIN_USERNAME"),
                default_digest_time,
                sample_event_id: EventId(parse_or(
                    get("SAMPLE_EVENT_ID"),
                    "SAMPLE_EVENT_ID",
                    bot_defaults.sample_event_id.value(),
                )?),
                strict_digest_time: parse_or(get("STRICT_DIGEST_TIME"), "STRICT_DIGEST_TIME", false)?,
            },
            scheduler: SchedulerConfig {
                tick_unit: match get("TICK_UNIT") {
                    Some(raw) => raw.parse()?,
                    None => defaults.tick_unit,
                },
                digest_interval: parse_or(get("DIGEST_INTERVAL"), "DIGEST_INTERVAL", defaults.digest_interval)?,
                fake_engagement_interval: parse_or(
                    get("FAKE_ENGAGEMENT_INTERVAL"),
                    "FAKE_ENGAGEMENT_INTERVAL",
                    defaults.fake_engagement_interval,
                )?,
                reminder_interval: parse_or(get("REMINDER_INTERVAL"), "REMINDER_INTERVAL", defaults.reminder_interval)?,
                feedback_interval: parse_or(get("FEEDBACK_INTERVAL"), "FEEDBACK_INTERVAL", defaults.feedback_interval)?,
                reminder_lookahead: parse_or(
                    get("REMINDER_LOOKAHEAD"),
                    "REMINDER_LOOKAHEAD",
                    defaults.reminder_lookahead,
                )?,
            },
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn parse_or<T: FromStr>(raw: Option<String>, key: &str, default: T) -> AppResult<T> {
    match raw {
        Some(value) => value.trim().parse().map_err(|_| {
            AppError::ConfigurationError(format!("{} has an invalid value: {:?}", key, value))
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> AppResult<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.database.url, "sqlite:data/meetping.db");
        assert_eq!(config.server_address(), "0.0.0.0:8443");
        assert_eq!(config.bot.default_digest_time, "10:00");
        assert_eq!(config.bot.sample_event_id, EventId(999));
        assert!(!config.bot.strict_digest_time);

        let scheduler = &config.scheduler;
        assert_eq!(scheduler.digest_period(), Duration::from_secs(60));
        assert_eq!(scheduler.fake_engagement_period(), Duration::from_secs(300));
        assert_eq!(scheduler.reminder_period(), Duration::from_secs(300));
        assert_eq!(scheduler.feedback_period(), Duration::from_secs(600));
        assert_eq!(scheduler.reminder_window(), chrono::Duration::minutes(30));
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("TICK_UNIT", "second"),
            ("REMINDER_LOOKAHEAD", "90"),
            ("FEEDBACK_INTERVAL", "2"),
            ("WEBHOOK_SECRET", "s3cret"),
            ("ADMIN_USERNAME", "stan"),
            ("STRICT_DIGEST_TIME", "true"),
        ])
        .unwrap();

        assert_eq!(config.scheduler.tick_unit, TickUnit::Second);
        assert_eq!(config.scheduler.feedback_period(), Duration::from_secs(2));
        assert_eq!(config.scheduler.reminder_window(), chrono::Duration::seconds(90));
        assert_eq!(config.server.webhook_secret.as_deref(), Some("s3cret"));
        assert_eq!(config.bot.admin_username.as_deref(), Some("stan"));
        assert!(config.bot.strict_digest_time);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(matches!(
            config_from(&[("SERVER_PORT", "not-a-port")]),
            Err(AppError::ConfigurationError(_))
        ));
        assert!(matches!(
            config_from(&[("TICK_UNIT", "hour")]),
            Err(AppError::ConfigurationError(_))
        ));
        assert!(matches!(
            config_from(&[("DEFAULT_DIGEST_TIME", "25:00")]),
            Err(AppError::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_zero_interval_still_ticks() {
        let scheduler = SchedulerConfig {
            digest_interval: 0,
            ..SchedulerConfig::default()
        };
        assert_eq!(scheduler.digest_period(), Duration::from_secs(60));
    }

    #[test]
    fn test_clock_format() {
        assert!(is_valid_clock("00:00"));
        assert!(is_valid_clock("23:59"));
        assert!(!is_valid_clock("24:00"));
        assert!(!is_valid_clock("9:00"));
        assert!(!is_valid_clock("tomorrow"));
    }
}
