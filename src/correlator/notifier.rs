//! Status notices for the operator.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::NotifierConfig;
use crate::telegram::{BotApi, BotApiError, OutgoingMessage};

/// Sink for status lines. Delivery is best effort and never fails the caller.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, text: &str);
}

/// Sends notices to a chat through a dedicated bot.
#[derive(Debug)]
pub struct HttpNotifier {
    api: BotApi,
    chat_id: i64,
}

impl HttpNotifier {
    /// Builds a notifier from its configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: &NotifierConfig) -> Result<Self, BotApiError> {
        Ok(Self {
            api: BotApi::new(&config.api_url, &config.bot_token, 0)?,
            chat_id: config.chat_id,
        })
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn notify(&self, text: &str) {
        if let Err(e) = self
            .api
            .send_message(self.chat_id, &OutgoingMessage::plain(text))
            .await
        {
            warn!("Failed to deliver notice to {}: {}", self.chat_id, e);
        }
    }
}

/// Writes notices to the log when no notifier bot is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, text: &str) {
        info!("Notice: {}", text);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Records every notice.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingNotifier {
        pub(crate) notices: Mutex<Vec<String>>,
    }

    impl RecordingNotifier {
        pub(crate) fn notices(&self) -> Vec<String> {
            self.notices.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, text: &str) {
            self.notices.lock().unwrap().push(text.to_owned());
        }
    }
}
