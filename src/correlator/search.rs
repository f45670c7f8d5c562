//! Bounded search for the discussion copy of a channel post.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;

use crate::config::SearchSettings;
use crate::telegram::TelegramError;

/// Errors raised while reading or writing a discussion group.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Peer {0} is not among the resolved dialogs")]
    UnknownPeer(i64),

    #[error(transparent)]
    Telegram(#[from] TelegramError),
}

/// A message as seen in a discussion group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscussionMessage {
    /// Message id inside the discussion group.
    pub id: i32,

    /// Id of the channel post this message is an automatic forward of.
    pub forwarded_post: Option<i32>,
}

/// Read/write access to discussion groups.
#[async_trait]
pub trait DiscussionFeed: Send + Sync {
    /// Returns up to `limit` most recent messages, newest first.
    async fn recent_messages(
        &self,
        group_id: i64,
        limit: usize,
    ) -> Result<Vec<DiscussionMessage>, FeedError>;

    /// Posts `text` as a threaded reply to `reply_to`.
    async fn reply(&self, group_id: i64, reply_to: i32, text: &str) -> Result<(), FeedError>;

    /// Human-readable title of a peer.
    async fn title(&self, peer_id: i64) -> Option<String>;
}

/// Outcome of one search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOutcome {
    /// The discussion copy was found.
    Matched { message_id: i32, probes: u32 },

    /// The window elapsed without a match.
    TimedOut { probes: u32, elapsed: Duration },
}

/// Polls `group_id` until a message forwarded from `post_id` shows up or the
/// window elapses.
///
/// One probe always runs at (or just after) the deadline, so "not found" is
/// never reported early. Feed errors abort the search.
pub async fn correlation_search(
    feed: &dyn DiscussionFeed,
    group_id: i64,
    post_id: i32,
    settings: &SearchSettings,
) -> Result<SearchOutcome, FeedError> {
    let started = Instant::now();
    let deadline = started + settings.window();
    let mut probes = 0;

    loop {
        probes += 1;
        let recent = feed.recent_messages(group_id, settings.scan_depth).await?;

        if let Some(found) = recent
            .iter()
            .take(settings.scan_depth)
            .find(|message| message.forwarded_post == Some(post_id))
        {
            debug!(
                "Post {} matched discussion message {} after {} probe(s)",
                post_id, found.id, probes
            );
            return Ok(SearchOutcome::Matched {
                message_id: found.id,
                probes,
            });
        }

        let now = Instant::now();
        if now >= deadline {
            return Ok(SearchOutcome::TimedOut {
                probes,
                elapsed: now - started,
            });
        }

        tokio::time::sleep(settings.poll_interval().min(deadline - now)).await;
    }
}
