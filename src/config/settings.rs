//! Application settings loaded from the environment.

use std::collections::HashSet;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Default Bot API endpoint.
pub const DEFAULT_BOT_API_URL: &str = "https://api.telegram.org";

/// Telegram API configuration for the userbot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Telegram API ID (obtain from <https://my.telegram.org>).
    pub api_id: i32,

    /// Telegram API hash (obtain from <https://my.telegram.org>).
    pub api_hash: String,

    /// Path to the session file.
    #[serde(default = "default_session_path")]
    pub session_path: PathBuf,
}

fn default_session_path() -> PathBuf {
    PathBuf::from("session.db")
}

impl TelegramConfig {
    /// Creates a new Telegram configuration.
    #[must_use]
    pub fn new(api_id: i32, api_hash: String) -> Self {
        Self {
            api_id,
            api_hash,
            session_path: default_session_path(),
        }
    }

    /// Creates configuration from environment variables.
    ///
    /// Expects `TG_API_ID` and `TG_API_HASH` to be set.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_id: i32 = require_env("TG_API_ID")?
            .parse()
            .map_err(|_| ConfigError::InvalidApiId)?;

        let api_hash = require_env("TG_API_HASH")?;

        let session_path = std::env::var("TG_SESSION_PATH").map_or_else(|_| default_session_path(), PathBuf::from);

        Ok(Self {
            api_id,
            api_hash,
            session_path,
        })
    }
}

/// What happens once a referrer is at or above the reward threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RewardPolicy {
    /// Issue and send a fresh invite link on every credit or `/check`
    /// at or above the threshold.
    #[default]
    Resend,

    /// Issue the link once, when the threshold is first reached, and show
    /// the stored link afterwards.
    Once,
}

impl FromStr for RewardPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "resend" | "always" => Ok(Self::Resend),
            "once" | "send_once" => Ok(Self::Once),
            other => Err(ConfigError::InvalidValue {
                name: "REWARD_POLICY",
                value: other.to_owned(),
            }),
        }
    }
}

/// Settings of the referral gate bot.
#[derive(Debug, Clone)]
pub struct GateSettings {
    /// Bot API token.
    pub bot_token: String,

    /// `PostgreSQL` connection string.
    pub database_url: String,

    /// Accounts that bypass the gate and may manage channels.
    pub admin_ids: HashSet<i64>,

    /// Private group the reward invite links point to.
    pub secret_group_id: i64,

    /// Bot username used in referral links; fetched with `getMe` when unset.
    pub bot_username: Option<String>,

    /// Credits needed before the reward link is issued.
    pub referral_threshold: i32,

    /// Reward re-issue behavior past the threshold.
    pub reward_policy: RewardPolicy,

    /// Bot API base URL.
    pub api_url: String,

    /// Long-poll timeout for `getUpdates`.
    pub poll_timeout_secs: u64,
}

fn default_referral_threshold() -> i32 {
    5
}

fn default_poll_timeout() -> u64 {
    30
}

impl GateSettings {
    /// Loads gate settings from environment variables.
    ///
    /// `TOKEN` (or `BOT_TOKEN`), `DATABASE_URL` and `SECRET_GROUP_ID` are required.
    pub fn from_env() -> Result<Self, ConfigError> {
        let bot_token = std::env::var("TOKEN")
            .or_else(|_| std::env::var("BOT_TOKEN"))
            .map_err(|_| ConfigError::MissingEnvVar("TOKEN"))?;

        let database_url = require_env("DATABASE_URL")?;

        let secret_group_id = parse_env("SECRET_GROUP_ID", &require_env("SECRET_GROUP_ID")?)?;

        let referral_threshold = match std::env::var("REFERRAL_THRESHOLD") {
            Ok(raw) => {
                let value: i32 = parse_env("REFERRAL_THRESHOLD", &raw)?;
                if value <= 0 {
                    return Err(ConfigError::InvalidValue {
                        name: "REFERRAL_THRESHOLD",
                        value: raw,
                    });
                }
                value
            }
            Err(_) => default_referral_threshold(),
        };

        let reward_policy = match std::env::var("REWARD_POLICY") {
            Ok(raw) => raw.parse()?,
            Err(_) => RewardPolicy::default(),
        };

        Ok(Self {
            bot_token,
            database_url,
            admin_ids: parse_admin_ids(&std::env::var("ADMIN_IDS").unwrap_or_default()),
            secret_group_id,
            bot_username: std::env::var("BOT_USERNAME")
                .ok()
                .map(|name| name.trim().trim_start_matches('@').to_owned())
                .filter(|name| !name.is_empty()),
            referral_threshold,
            reward_policy,
            api_url: api_url_from_env(),
            poll_timeout_secs: std::env::var("POLL_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(default_poll_timeout),
        })
    }
}

/// Where the userbot sends its status notices.
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    /// Token of the bot that delivers notices.
    pub bot_token: String,

    /// Chat receiving the notices.
    pub chat_id: i64,

    /// Bot API base URL.
    pub api_url: String,
}

impl NotifierConfig {
    /// Loads the notifier configuration.
    ///
    /// Returns `Ok(None)` when `NOTIFIER_BOT_TOKEN` is not set.
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        let Ok(bot_token) = std::env::var("NOTIFIER_BOT_TOKEN") else {
            return Ok(None);
        };

        let chat_id = parse_env("NOTIFIER_CHAT_ID", &require_env("NOTIFIER_CHAT_ID")?)?;

        Ok(Some(Self {
            bot_token,
            chat_id,
            api_url: api_url_from_env(),
        }))
    }
}

/// Parses a comma-separated admin id list, skipping anything that is not a number.
#[must_use]
pub fn parse_admin_ids(raw: &str) -> HashSet<i64> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()))
        .filter_map(|part| part.parse().ok())
        .collect()
}

fn api_url_from_env() -> String {
    std::env::var("BOT_API_URL")
        .map(|url| url.trim_end_matches('/').to_owned())
        .unwrap_or_else(|_| DEFAULT_BOT_API_URL.to_owned())
}

fn require_env(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name))
}

fn parse_env<T: FromStr>(name: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        name,
        value: raw.to_owned(),
    })
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Invalid API ID format (must be a positive integer)")]
    InvalidApiId,

    #[error("Invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_telegram_config_new() {
        let config = TelegramConfig::new(12345, "abc123".to_owned());
        assert_eq!(config.api_id, 12345);
        assert_eq!(config.api_hash, "abc123");
        assert_eq!(config.session_path, PathBuf::from("session.db"));
    }

    #[test]
    fn test_parse_admin_ids() {
        let ids = parse_admin_ids("111, 222,abc,,-5, 333 ");
        assert_eq!(ids.len(), 3);
        assert!(ids.contains(&111));
        assert!(ids.contains(&222));
        assert!(ids.contains(&333));
    }

    #[test]
    fn test_parse_admin_ids_empty() {
        assert!(parse_admin_ids("").is_empty());
    }

    #[test]
    fn test_reward_policy_parse() {
        assert_eq!("resend".parse::<RewardPolicy>().ok(), Some(RewardPolicy::Resend));
        assert_eq!(" ONCE ".parse::<RewardPolicy>().ok(), Some(RewardPolicy::Once));
        assert!("sometimes".parse::<RewardPolicy>().is_err());
        assert_eq!(RewardPolicy::default(), RewardPolicy::Resend);
    }
}
