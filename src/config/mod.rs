//! Configuration module.
//!
//! Handles loading and validation of the gate's environment settings,
//! the userbot's Telegram credentials and the correlator's JSON file.

mod correlator;
mod settings;

pub use correlator::{bare_peer_id, ChannelLink, CorrelatorConfig, SearchSettings, ValidationError};
pub use settings::{
    parse_admin_ids, ConfigError, GateSettings, NotifierConfig, RewardPolicy, TelegramConfig,
    DEFAULT_BOT_API_URL,
};

/// Default hard deadline of one discussion-message search.
pub const DEFAULT_SEARCH_WINDOW_MS: u64 = 5_000;

/// Default pause between two discussion-group probes.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 300;

/// Default number of recent discussion messages scanned per probe.
pub const DEFAULT_SCAN_DEPTH: usize = 10;
