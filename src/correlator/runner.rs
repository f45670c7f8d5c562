//! Per-post handling: locate the discussion copy and comment under it.

use std::sync::Arc;

use rand::seq::IndexedRandom;
use tracing::{error, info, warn};

use super::notifier::Notifier;
use super::search::{correlation_search, DiscussionFeed, FeedError, SearchOutcome};
use crate::config::{ChannelLink, CorrelatorConfig};

/// Final state of one new-post event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostOutcome {
    /// The source channel is not mapped.
    Ignored,

    /// A comment was posted under the discussion copy.
    Commented { message_id: i32, comment: String },

    /// No discussion copy showed up within the window.
    NotFound,

    /// Reading or writing the discussion group failed.
    Failed(String),
}

/// Picks one comment uniformly at random.
#[must_use]
pub fn pick_comment(comments: &[String]) -> Option<&str> {
    comments.choose(&mut rand::rng()).map(String::as_str)
}

/// Reacts to new channel posts.
pub struct PostCorrelator {
    feed: Arc<dyn DiscussionFeed>,
    notifier: Arc<dyn Notifier>,
    config: Arc<CorrelatorConfig>,
}

impl PostCorrelator {
    /// Creates a correlator over a validated configuration.
    #[must_use]
    pub fn new(
        feed: Arc<dyn DiscussionFeed>,
        notifier: Arc<dyn Notifier>,
        config: Arc<CorrelatorConfig>,
    ) -> Self {
        Self {
            feed,
            notifier,
            config,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &CorrelatorConfig {
        &self.config
    }

    /// Whether posts from `channel_id` are watched.
    #[must_use]
    pub fn watches(&self, channel_id: i64) -> bool {
        self.config.discussion_for(channel_id).is_some()
    }

    /// Handles one new post. Every outcome is reported to the notifier.
    pub async fn on_new_post(&self, channel_id: i64, post_id: i32) -> PostOutcome {
        let Some(link) = self.config.discussion_for(channel_id) else {
            return PostOutcome::Ignored;
        };

        let channel = self.display_name(link.source, link.label.as_deref()).await;
        info!("New post {} in {}", post_id, channel);
        self.notifier
            .notify(&format!("📝 New post {post_id} in {channel}"))
            .await;

        let outcome = match self.comment_on(link, post_id).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Handling post {} in {} failed: {}", post_id, channel, e);
                PostOutcome::Failed(e.to_string())
            }
        };

        let notice = match &outcome {
            PostOutcome::Commented {
                message_id,
                comment,
            } => format!("✅ Commented on post {post_id} in {channel} (message {message_id}): {comment}"),
            PostOutcome::NotFound => {
                format!("⚠️ Discussion copy of post {post_id} in {channel} was not found")
            }
            PostOutcome::Failed(reason) => {
                format!("❌ Failed to comment on post {post_id} in {channel}: {reason}")
            }
            PostOutcome::Ignored => return outcome,
        };
        self.notifier.notify(&notice).await;

        outcome
    }

    async fn comment_on(&self, link: &ChannelLink, post_id: i32) -> Result<PostOutcome, FeedError> {
        let search = correlation_search(
            self.feed.as_ref(),
            link.discussion,
            post_id,
            &self.config.search,
        )
        .await?;

        let message_id = match search {
            SearchOutcome::Matched { message_id, .. } => message_id,
            SearchOutcome::TimedOut { probes, elapsed } => {
                warn!(
                    "Post {} not found in discussion {} after {} probe(s) in {:?}",
                    post_id, link.discussion, probes, elapsed
                );
                return Ok(PostOutcome::NotFound);
            }
        };

        let Some(comment) = pick_comment(&self.config.comments) else {
            return Ok(PostOutcome::Failed("no comments configured".to_owned()));
        };

        self.feed.reply(link.discussion, message_id, comment).await?;
        info!("Replied to message {} in {}", message_id, link.discussion);

        Ok(PostOutcome::Commented {
            message_id,
            comment: comment.to_owned(),
        })
    }

    async fn display_name(&self, peer_id: i64, label: Option<&str>) -> String {
        if let Some(label) = label {
            return label.to_owned();
        }
        self.feed
            .title(peer_id)
            .await
            .unwrap_or_else(|| peer_id.to_string())
    }
}

impl std::fmt::Debug for PostCorrelator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostCorrelator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlator::notifier::testing::RecordingNotifier;
    use crate::correlator::search::testing::FakeFeed;
    use crate::correlator::search::DiscussionMessage;

    const SOURCE: i64 = 1_000;
    const GROUP: i64 = 2_000;

    fn correlator(
        comments: &[&str],
    ) -> (PostCorrelator, Arc<FakeFeed>, Arc<RecordingNotifier>) {
        let feed = Arc::new(FakeFeed::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let config = CorrelatorConfig {
            channels: vec![ChannelLink::new(SOURCE, GROUP)],
            comments: comments.iter().map(|c| (*c).to_owned()).collect(),
            search: Default::default(),
        };
        let correlator = PostCorrelator::new(feed.clone(), notifier.clone(), Arc::new(config));
        (correlator, feed, notifier)
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmapped_channel_is_ignored() {
        let (correlator, feed, notifier) = correlator(&["nice"]);

        assert_eq!(correlator.on_new_post(9_999, 1).await, PostOutcome::Ignored);
        assert!(notifier.notices().is_empty());
        assert_eq!(*feed.probes.lock().unwrap(), 0);
        assert!(!correlator.watches(9_999));
        assert!(correlator.watches(SOURCE));
    }

    #[tokio::test(start_paused = true)]
    async fn test_post_routed_by_channel_only() {
        let (correlator, feed, notifier) = correlator(&["hi"]);
        feed.push(
            GROUP,
            DiscussionMessage {
                id: 8,
                forwarded_post: Some(3),
            },
        );

        // Routing looks at the channel id alone, in either id form.
        let marked = -1_000_000_000_000 - SOURCE;
        assert!(correlator.watches(marked));
        assert!(!correlator.watches(GROUP));

        let outcome = correlator.on_new_post(marked, 3).await;
        assert!(matches!(outcome, PostOutcome::Commented { message_id: 8, .. }));
        assert_eq!(notifier.notices().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_matched_post_gets_comment() {
        let (correlator, feed, notifier) = correlator(&["first!"]);
        feed.push(
            GROUP,
            DiscussionMessage {
                id: 31,
                forwarded_post: Some(42),
            },
        );

        let outcome = correlator.on_new_post(SOURCE, 42).await;

        assert_eq!(
            outcome,
            PostOutcome::Commented {
                message_id: 31,
                comment: "first!".to_owned()
            }
        );
        assert_eq!(
            feed.replies.lock().unwrap().as_slice(),
            &[(GROUP, 31, "first!".to_owned())]
        );

        let notices = notifier.notices();
        assert_eq!(notices.len(), 2);
        assert!(notices[0].contains("New post 42"));
        assert!(notices[0].contains("peer-1000"));
        assert!(notices[1].contains("Commented"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_copy_is_reported() {
        let (correlator, feed, notifier) = correlator(&["hi"]);

        assert_eq!(correlator.on_new_post(SOURCE, 42).await, PostOutcome::NotFound);
        assert!(feed.replies.lock().unwrap().is_empty());
        assert!(notifier.notices()[1].contains("not found"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_comment_list_fails_after_match() {
        let (correlator, feed, notifier) = correlator(&[]);
        feed.push(
            GROUP,
            DiscussionMessage {
                id: 31,
                forwarded_post: Some(42),
            },
        );

        let outcome = correlator.on_new_post(SOURCE, 42).await;

        assert_eq!(
            outcome,
            PostOutcome::Failed("no comments configured".to_owned())
        );
        assert!(feed.replies.lock().unwrap().is_empty());
        assert!(notifier.notices()[1].contains("no comments configured"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_feed_error_is_caught_and_reported() {
        let (correlator, feed, notifier) = correlator(&["hi"]);
        *feed.fail_reads.lock().unwrap() = true;

        let outcome = correlator.on_new_post(SOURCE, 42).await;

        assert!(matches!(outcome, PostOutcome::Failed(_)));
        assert!(notifier.notices()[1].contains("Failed to comment"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_label_overrides_title() {
        let (_, feed, notifier) = correlator(&["hi"]);
        let mut link = ChannelLink::new(SOURCE, GROUP);
        link.label = Some("Daily News".to_owned());
        let config = CorrelatorConfig {
            channels: vec![link],
            comments: vec!["hi".to_owned()],
            search: Default::default(),
        };
        let correlator = PostCorrelator::new(feed, notifier.clone(), Arc::new(config));

        correlator.on_new_post(SOURCE, 5).await;
        assert!(notifier.notices()[0].contains("Daily News"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_posts_search_independently() {
        let (correlator, feed, notifier) = correlator(&["hi"]);
        for (id, post) in [(11, 1), (12, 2)] {
            feed.push(
                GROUP,
                DiscussionMessage {
                    id,
                    forwarded_post: Some(post),
                },
            );
        }

        let (a, b) = tokio::join!(
            correlator.on_new_post(SOURCE, 1),
            correlator.on_new_post(SOURCE, 2)
        );

        assert!(matches!(a, PostOutcome::Commented { message_id: 11, .. }));
        assert!(matches!(b, PostOutcome::Commented { message_id: 12, .. }));
        assert_eq!(notifier.notices().len(), 4);
    }

    #[test]
    fn test_pick_comment() {
        let comments = vec!["a".to_owned(), "b".to_owned(), "c".to_owned()];
        for _ in 0..50 {
            let picked = pick_comment(&comments).unwrap();
            assert!(comments.iter().any(|c| c == picked));
        }
        assert_eq!(pick_comment(&[]), None);
    }
}
