//! Post correlator.
//!
//! Watches source channels, finds the automatic copy of every new post in
//! the linked discussion group and replies under it with a canned comment.

mod notifier;
mod runner;
mod search;

pub use notifier::{HttpNotifier, LogNotifier, Notifier};
pub use runner::{pick_comment, PostCorrelator, PostOutcome};
pub use search::{correlation_search, DiscussionFeed, DiscussionMessage, FeedError, SearchOutcome};
