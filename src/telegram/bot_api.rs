//! Minimal Telegram Bot API client.
//!
//! Covers what the referral gate and the status notifier need:
//! long polling, messages with inline keyboards, callback answers,
//! membership lookups and invite links.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::referral::{GatePlatform, MemberStatus};

/// Timeout for every call except long polling.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors returned by the Bot API client.
#[derive(Debug, Error)]
pub enum BotApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Bot API error {code}: {description}")]
    Api { code: i32, description: String },

    #[error("Flood wait required: {0} seconds")]
    FloodWait(u32),

    #[error("Bot API returned no result for {0}")]
    EmptyResult(&'static str),
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<i32>,
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    retry_after: Option<u32>,
}

impl<T> ApiResponse<T> {
    fn into_result(self, method: &'static str) -> Result<T, BotApiError> {
        if self.ok {
            return self.result.ok_or(BotApiError::EmptyResult(method));
        }

        if let Some(seconds) = self.parameters.and_then(|p| p.retry_after) {
            return Err(BotApiError::FloodWait(seconds));
        }

        Err(BotApiError::Api {
            code: self.error_code.unwrap_or_default(),
            description: self.description.unwrap_or_else(|| "unknown error".to_owned()),
        })
    }
}

/// An incoming update.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub callback_query: Option<CallbackQuery>,
}

/// A chat message.
#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub from: Option<User>,
    pub chat: Chat,
    pub text: Option<String>,
}

/// A Telegram account.
#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub username: Option<String>,
}

/// A chat.
#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
}

/// A press on an inline keyboard button.
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    pub message: Option<Message>,
    pub data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatMember {
    status: String,
}

#[derive(Debug, Deserialize)]
struct ChatInviteLink {
    invite_link: String,
}

/// An inline keyboard button opening a URL or sending callback data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InlineButton {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_data: Option<String>,
}

impl InlineButton {
    /// Creates a button that opens a URL.
    #[must_use]
    pub fn url(text: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            url: Some(url.into()),
            callback_data: None,
        }
    }

    /// Creates a button that sends callback data back to the bot.
    #[must_use]
    pub fn callback(text: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            url: None,
            callback_data: Some(data.into()),
        }
    }
}

#[derive(Debug, Serialize)]
struct InlineKeyboardMarkup<'a> {
    inline_keyboard: &'a [Vec<InlineButton>],
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<InlineKeyboardMarkup<'a>>,
    disable_web_page_preview: bool,
}

/// Outgoing message with optional HTML formatting and keyboard.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub text: String,
    pub html: bool,
    pub keyboard: Vec<Vec<InlineButton>>,
}

impl OutgoingMessage {
    /// Creates a plain text message.
    #[must_use]
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Creates an HTML-formatted message.
    #[must_use]
    pub fn html(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            html: true,
            keyboard: Vec::new(),
        }
    }

    /// Attaches an inline keyboard.
    #[must_use]
    pub fn with_keyboard(mut self, keyboard: Vec<Vec<InlineButton>>) -> Self {
        self.keyboard = keyboard;
        self
    }
}

/// Bot API client bound to one bot token.
#[derive(Clone)]
pub struct BotApi {
    http: reqwest::Client,
    base_url: String,
    poll_timeout: Duration,
}

impl BotApi {
    /// Creates a client for the given token.
    pub fn new(api_url: &str, token: &str, poll_timeout_secs: u64) -> Result<Self, BotApiError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base_url: format!("{}/bot{token}", api_url.trim_end_matches('/')),
            poll_timeout: Duration::from_secs(poll_timeout_secs),
        })
    }

    async fn call<P, R>(&self, method: &'static str, params: &P) -> Result<R, BotApiError>
    where
        P: Serialize + Sync + ?Sized,
        R: DeserializeOwned,
    {
        self.call_with_timeout(method, params, REQUEST_TIMEOUT).await
    }

    async fn call_with_timeout<P, R>(
        &self,
        method: &'static str,
        params: &P,
        timeout: Duration,
    ) -> Result<R, BotApiError>
    where
        P: Serialize + Sync + ?Sized,
        R: DeserializeOwned,
    {
        debug!("Bot API call: {}", method);

        let response: ApiResponse<R> = self
            .http
            .post(format!("{}/{method}", self.base_url))
            .json(params)
            .timeout(timeout)
            .send()
            .await?
            .json()
            .await?;

        let result = response.into_result(method);
        if let Err(BotApiError::FloodWait(seconds)) = &result {
            warn!("Flood wait on {}: {} seconds", method, seconds);
        }
        result
    }

    /// Returns the bot's own account.
    pub async fn get_me(&self) -> Result<User, BotApiError> {
        self.call("getMe", &serde_json::json!({})).await
    }

    /// Long-polls for updates after `offset`.
    pub async fn get_updates(&self, offset: i64) -> Result<Vec<Update>, BotApiError> {
        let params = serde_json::json!({
            "offset": offset,
            "timeout": self.poll_timeout.as_secs(),
            "allowed_updates": ["message", "callback_query"],
        });

        self.call_with_timeout("getUpdates", &params, self.poll_timeout + REQUEST_TIMEOUT)
            .await
    }

    /// Sends a message to a chat.
    pub async fn send_message(
        &self,
        chat_id: i64,
        message: &OutgoingMessage,
    ) -> Result<(), BotApiError> {
        let request = SendMessage {
            chat_id,
            text: &message.text,
            parse_mode: message.html.then_some("HTML"),
            reply_markup: (!message.keyboard.is_empty()).then_some(InlineKeyboardMarkup {
                inline_keyboard: &message.keyboard,
            }),
            disable_web_page_preview: true,
        };

        let _sent: serde_json::Value = self.call("sendMessage", &request).await?;
        Ok(())
    }

    /// Answers a callback query, optionally with a popup alert.
    pub async fn answer_callback_query(
        &self,
        callback_query_id: &str,
        alert: Option<&str>,
    ) -> Result<(), BotApiError> {
        let params = match alert {
            Some(text) => serde_json::json!({
                "callback_query_id": callback_query_id,
                "text": text,
                "show_alert": true,
            }),
            None => serde_json::json!({ "callback_query_id": callback_query_id }),
        };

        let _answered: bool = self.call("answerCallbackQuery", &params).await?;
        Ok(())
    }

    /// Looks up a user's membership status string in a chat.
    pub async fn get_chat_member(&self, chat: &str, user_id: i64) -> Result<String, BotApiError> {
        let params = serde_json::json!({ "chat_id": chat, "user_id": user_id });
        let member: ChatMember = self.call("getChatMember", &params).await?;
        Ok(member.status)
    }

    /// Creates a non-expiring invite link with an optional member cap.
    pub async fn create_chat_invite_link(
        &self,
        chat_id: i64,
        member_limit: Option<u32>,
    ) -> Result<String, BotApiError> {
        let params = match member_limit {
            Some(limit) => serde_json::json!({ "chat_id": chat_id, "member_limit": limit }),
            None => serde_json::json!({ "chat_id": chat_id }),
        };

        let link: ChatInviteLink = self.call("createChatInviteLink", &params).await?;
        Ok(link.invite_link)
    }
}

impl std::fmt::Debug for BotApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // base_url embeds the token
        f.debug_struct("BotApi")
            .field("poll_timeout", &self.poll_timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl GatePlatform for BotApi {
    async fn member_status(&self, channel: &str, user_id: i64) -> Result<MemberStatus, BotApiError> {
        let status = self.get_chat_member(&format!("@{channel}"), user_id).await?;
        Ok(MemberStatus::parse(&status))
    }

    async fn create_invite_link(&self, group_id: i64) -> Result<String, BotApiError> {
        self.create_chat_invite_link(group_id, Some(1)).await
    }

    async fn send_message(&self, chat_id: i64, message: &OutgoingMessage) -> Result<(), BotApiError> {
        Self::send_message(self, chat_id, message).await
    }
}
