//! Referral Bots Library
//!
//! Two Telegram automations sharing one crate:
//! - a referral gate bot that requires channel subscriptions, credits
//!   inviters and rewards them with a private group invite link;
//! - a post correlator userbot that comments under the discussion copy
//!   of every new channel post.

pub mod commands;
pub mod config;
pub mod correlator;
pub mod referral;
pub mod telegram;
