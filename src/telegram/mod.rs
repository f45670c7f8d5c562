//! Telegram platform adapters.
//!
//! The Bot API client serves the referral gate and the notifier; the
//! `MTProto` client and discussion feed serve the post correlator.

mod bot_api;
mod client;
mod discussion;

pub use bot_api::{
    BotApi, BotApiError, CallbackQuery, Chat, InlineButton, Message, OutgoingMessage, Update, User,
};
pub use client::{
    forwarded_channel_post, peer_title, PwdToken as PasswordToken, RawUpdatesReceiver, TelegramBot,
    TelegramError, Token as LoginToken,
};
pub use discussion::TelegramDiscussionFeed;
pub use grammers_client::update::Update as MtprotoUpdate;
