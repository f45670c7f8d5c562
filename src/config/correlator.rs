//! Post correlator configuration and validation.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{DEFAULT_POLL_INTERVAL_MS, DEFAULT_SCAN_DEPTH, DEFAULT_SEARCH_WINDOW_MS};

/// Errors that can occur during correlator configuration validation.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("No channels configured")]
    NoChannels,

    #[error("No comments configured")]
    NoComments,

    #[error("Comment at index {index} is blank")]
    BlankComment { index: usize },

    #[error("Channel mapping at index {index} has a zero id")]
    ZeroId { index: usize },

    #[error("Channel mapping at index {index} points channel {id} at itself")]
    SelfMapped { index: usize, id: i64 },

    #[error("Source channel {id} is mapped more than once")]
    DuplicateSource { id: i64 },

    #[error("Search window must be greater than 0 ms")]
    ZeroWindow,

    #[error("Poll interval must be between 1 ms and the search window ({window_ms} ms), got {interval_ms} ms")]
    InvalidInterval { interval_ms: u64, window_ms: u64 },

    #[error("Scan depth must be greater than 0")]
    ZeroScanDepth,

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse configuration file: {0}")]
    ParseError(#[from] serde_json::Error),
}

/// A source channel and the discussion group linked to it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelLink {
    /// Channel whose posts are watched (marked `-100…` or bare id).
    pub source: i64,

    /// Discussion group that mirrors the channel's posts.
    pub discussion: i64,

    /// Optional human-readable label used in notices.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl ChannelLink {
    /// Creates a new channel link.
    #[must_use]
    pub const fn new(source: i64, discussion: i64) -> Self {
        Self {
            source,
            discussion,
            label: None,
        }
    }
}

/// Timing of the discussion-message search.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchSettings {
    /// Hard deadline of one search, measured from its start.
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// Pause between two probes of the discussion group.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// How many of the most recent messages each probe scans.
    #[serde(default = "default_scan_depth")]
    pub scan_depth: usize,
}

fn default_window_ms() -> u64 {
    DEFAULT_SEARCH_WINDOW_MS
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_scan_depth() -> usize {
    DEFAULT_SCAN_DEPTH
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            window_ms: default_window_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            scan_depth: default_scan_depth(),
        }
    }
}

impl SearchSettings {
    /// Search deadline as a duration.
    #[must_use]
    pub const fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Poll interval as a duration.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Configuration of the post correlator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelatorConfig {
    /// Watched channels and their discussion groups.
    pub channels: Vec<ChannelLink>,

    /// Canned replies, one is picked at random per post.
    pub comments: Vec<String>,

    /// Search timing.
    #[serde(default)]
    pub search: SearchSettings,
}

impl CorrelatorConfig {
    /// Loads configuration from a JSON file.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ValidationError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Saves configuration to a JSON file.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ValidationError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validates the configuration.
    ///
    /// Returns the first validation error encountered.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.validate_all().into_iter().next().map_or(Ok(()), Err)
    }

    /// Returns every validation error in the configuration.
    #[must_use]
    pub fn validate_all(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.channels.is_empty() {
            errors.push(ValidationError::NoChannels);
        }

        let mut seen_sources = HashSet::new();
        for (index, link) in self.channels.iter().enumerate() {
            if link.source == 0 || link.discussion == 0 {
                errors.push(ValidationError::ZeroId { index });
                continue;
            }

            let source = bare_peer_id(link.source);
            if source == bare_peer_id(link.discussion) {
                errors.push(ValidationError::SelfMapped {
                    index,
                    id: link.source,
                });
                continue;
            }

            if !seen_sources.insert(source) {
                errors.push(ValidationError::DuplicateSource { id: link.source });
            }
        }

        if self.comments.is_empty() {
            errors.push(ValidationError::NoComments);
        }

        for (index, comment) in self.comments.iter().enumerate() {
            if comment.trim().is_empty() {
                errors.push(ValidationError::BlankComment { index });
            }
        }

        let search = &self.search;
        if search.window_ms == 0 {
            errors.push(ValidationError::ZeroWindow);
        } else if search.poll_interval_ms == 0 || search.poll_interval_ms > search.window_ms {
            errors.push(ValidationError::InvalidInterval {
                interval_ms: search.poll_interval_ms,
                window_ms: search.window_ms,
            });
        }

        if search.scan_depth == 0 {
            errors.push(ValidationError::ZeroScanDepth);
        }

        errors
    }

    /// Finds the discussion group linked to a source channel.
    ///
    /// Both ids are compared in their bare form.
    #[must_use]
    pub fn discussion_for(&self, source: i64) -> Option<&ChannelLink> {
        let source = bare_peer_id(source);
        self.channels
            .iter()
            .find(|link| bare_peer_id(link.source) == source)
    }

    /// Bare ids of every watched channel.
    #[must_use]
    pub fn source_ids(&self) -> HashSet<i64> {
        self.channels.iter().map(|link| bare_peer_id(link.source)).collect()
    }

    /// Bare ids of every peer the correlator talks to.
    #[must_use]
    pub fn peer_ids(&self) -> HashSet<i64> {
        self.channels
            .iter()
            .flat_map(|link| [bare_peer_id(link.source), bare_peer_id(link.discussion)])
            .collect()
    }

    /// Creates an example configuration for users to reference.
    #[must_use]
    pub fn example() -> Self {
        Self {
            channels: vec![
                ChannelLink {
                    source: -1_001_234_567_890,
                    discussion: -1_009_876_543_210,
                    label: Some("news".to_owned()),
                },
                ChannelLink::new(-1_001_111_111_111, -1_002_222_222_222),
            ],
            comments: vec![
                "🔥 Great post!".to_owned(),
                "👍 Thanks for sharing".to_owned(),
                "💯 Totally agree".to_owned(),
            ],
            search: SearchSettings::default(),
        }
    }
}

/// Strips the Bot API marking from a peer id.
///
/// `-100…` channel ids and negative basic-group ids become positive bare
/// ids; user ids are returned unchanged.
#[must_use]
#[allow(clippy::cast_possible_wrap)]
pub const fn bare_peer_id(id: i64) -> i64 {
    const CHANNEL_MARK: i64 = 1_000_000_000_000;

    if id <= -CHANNEL_MARK {
        // The magnitude is at most 2^63, so the difference always fits.
        (id.unsigned_abs() - CHANNEL_MARK.unsigned_abs()) as i64
    } else {
        id.abs()
    }
}
