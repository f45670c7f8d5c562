//! Discussion feed backed by the userbot's dialogs.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use grammers_client::peer::Peer;
use grammers_client::message::InputMessage;
use tracing::{debug, info};

use super::client::{forwarded_channel_post, peer_title, TelegramBot, TelegramError};
use crate::config::bare_peer_id;
use crate::correlator::{DiscussionFeed, DiscussionMessage, FeedError};

/// Reads and replies in discussion groups through `MTProto`.
///
/// Peers are resolved once from the dialog list; the account must already
/// be a member of every configured channel and group.
pub struct TelegramDiscussionFeed {
    bot: Arc<TelegramBot>,
    peers: HashMap<i64, Peer>,
}

impl TelegramDiscussionFeed {
    /// Resolves the wanted peers among the account's dialogs.
    ///
    /// Returns the feed and the bare ids that could not be found.
    ///
    /// # Errors
    ///
    /// Returns an error if the dialog list cannot be loaded.
    pub async fn resolve(
        bot: Arc<TelegramBot>,
        wanted: &HashSet<i64>,
    ) -> Result<(Self, Vec<i64>), TelegramError> {
        let mut dialogs = bot.dialog_peers().await?;

        let mut peers = HashMap::with_capacity(wanted.len());
        let mut missing = Vec::new();

        for &id in wanted {
            let id = bare_peer_id(id);
            match dialogs.remove(&id) {
                Some(peer) => {
                    info!("Resolved {} as {:?}", id, peer_title(&peer));
                    peers.insert(id, peer);
                }
                None => missing.push(id),
            }
        }
        missing.sort_unstable();

        Ok((Self { bot, peers }, missing))
    }

    fn peer(&self, id: i64) -> Result<&Peer, FeedError> {
        self.peers
            .get(&bare_peer_id(id))
            .ok_or(FeedError::UnknownPeer(id))
    }
}

#[async_trait]
impl DiscussionFeed for TelegramDiscussionFeed {
    async fn recent_messages(
        &self,
        group_id: i64,
        limit: usize,
    ) -> Result<Vec<DiscussionMessage>, FeedError> {
        let peer = self.peer(group_id)?;
        let mut iter = self.bot.inner().iter_messages(peer).limit(limit);
        let mut messages = Vec::with_capacity(limit);

        while let Some(message) = iter.next().await.map_err(TelegramError::from)? {
            messages.push(DiscussionMessage {
                id: message.id(),
                forwarded_post: forwarded_channel_post(message.forward_header().as_ref()),
            });
        }

        debug!("Fetched {} message(s) from {}", messages.len(), group_id);
        Ok(messages)
    }

    async fn reply(&self, group_id: i64, reply_to: i32, text: &str) -> Result<(), FeedError> {
        let peer = self.peer(group_id)?;

        self.bot
            .inner()
            .send_message(peer, InputMessage::new().text(text).reply_to(Some(reply_to)))
            .await
            .map_err(TelegramError::from)?;

        Ok(())
    }

    async fn title(&self, peer_id: i64) -> Option<String> {
        self.peers.get(&bare_peer_id(peer_id)).map(peer_title)
    }
}

impl std::fmt::Debug for TelegramDiscussionFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramDiscussionFeed")
            .field("peers", &self.peers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
