//! Update dispatcher for the referral gate.
//!
//! Long-polls the Bot API and runs every update on its own task, so
//! handlers only interleave at I/O boundaries. A `Shutdown` message stops
//! polling; in-flight handlers are awaited before `run` returns.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::{CommandHandler, Response};
use crate::referral::GateError;
use crate::telegram::{BotApi, BotApiError, CallbackQuery, Message, OutgoingMessage, Update};

/// Pause after a failed `getUpdates` call.
const RETRY_DELAY: Duration = Duration::from_secs(5);

const GENERIC_ERROR: &str = "⚠️ Something went wrong. Please try again later.";

/// Messages that can be sent to the dispatcher.
#[derive(Debug, Clone)]
pub enum DispatcherMessage {
    /// Stop polling.
    Shutdown,
}

/// Routes Bot API updates to the command handler.
#[derive(Debug)]
pub struct UpdateDispatcher {
    api: Arc<BotApi>,
    handler: Arc<CommandHandler>,
}

impl UpdateDispatcher {
    /// Creates a new dispatcher.
    #[must_use]
    pub const fn new(api: Arc<BotApi>, handler: Arc<CommandHandler>) -> Self {
        Self { api, handler }
    }

    /// Runs the polling loop until shutdown.
    pub async fn run(&self, mut rx: mpsc::Receiver<DispatcherMessage>) {
        info!("Update dispatcher started");

        let mut offset = 0;
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    match msg {
                        Some(DispatcherMessage::Shutdown) | None => {
                            info!("Dispatcher shutting down");
                            break;
                        }
                    }
                }
                result = self.api.get_updates(offset) => {
                    match result {
                        Ok(updates) => {
                            for update in updates {
                                offset = offset.max(update.update_id + 1);
                                let api = Arc::clone(&self.api);
                                let handler = Arc::clone(&self.handler);
                                tasks.spawn(async move {
                                    handle_update(&api, &handler, update).await;
                                });
                            }
                        }
                        Err(BotApiError::FloodWait(seconds)) => {
                            tokio::time::sleep(Duration::from_secs(u64::from(seconds))).await;
                        }
                        Err(e) => {
                            warn!("Failed to fetch updates: {}", e);
                            tokio::time::sleep(RETRY_DELAY).await;
                        }
                    }
                }
            }

            // Reap finished handlers so the set does not grow unbounded.
            while let Some(joined) = tasks.try_join_next() {
                if let Err(e) = joined {
                    error!("Update handler panicked: {}", e);
                }
            }
        }

        if !tasks.is_empty() {
            info!("Waiting for {} in-flight handler(s)", tasks.len());
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!("Update handler panicked: {}", e);
            }
        }
    }
}

/// Handles a single update; errors are logged and answered, never propagated.
async fn handle_update(api: &BotApi, handler: &CommandHandler, update: Update) {
    if let Some(message) = update.message {
        handle_message(api, handler, message).await;
    } else if let Some(query) = update.callback_query {
        handle_callback_query(api, handler, query).await;
    }
}

/// Sender id and text of a message that may carry a command, in any chat.
fn command_input(message: &Message) -> Option<(i64, &str)> {
    let (Some(from), Some(text)) = (message.from.as_ref(), message.text.as_deref()) else {
        return None;
    };
    (!from.is_bot).then_some((from.id, text))
}

async fn handle_message(api: &BotApi, handler: &CommandHandler, message: Message) {
    let Some((user_id, text)) = command_input(&message) else {
        return;
    };

    let Some(result) = handler.try_handle(user_id, text).await else {
        return;
    };

    let chat_id = message.chat.id;
    match result {
        Ok(Response::Reply(reply)) => send(api, chat_id, &reply).await,
        Ok(Response::Alert(text)) => send(api, chat_id, &OutgoingMessage::plain(text)).await,
        Ok(Response::Nothing) => {}
        Err(e) => report_failure(api, chat_id, &e).await,
    }
}

async fn handle_callback_query(api: &BotApi, handler: &CommandHandler, query: CallbackQuery) {
    let data = query.data.as_deref().unwrap_or_default();
    let chat_id = query
        .message
        .as_ref()
        .map_or(query.from.id, |message| message.chat.id);

    let result = handler.handle_callback(query.from.id, data).await;

    let alert = match &result {
        Ok(Response::Alert(text)) => Some(text.as_str()),
        _ => None,
    };
    if let Err(e) = api.answer_callback_query(&query.id, alert).await {
        debug!("Failed to answer callback query {}: {}", query.id, e);
    }

    match result {
        Ok(Response::Reply(reply)) => send(api, chat_id, &reply).await,
        Ok(Response::Alert(_) | Response::Nothing) => {}
        Err(e) => report_failure(api, chat_id, &e).await,
    }
}

async fn send(api: &BotApi, chat_id: i64, message: &OutgoingMessage) {
    if let Err(e) = api.send_message(chat_id, message).await {
        warn!("Failed to reply to {}: {}", chat_id, e);
    }
}

async fn report_failure(api: &BotApi, chat_id: i64, e: &GateError) {
    error!("Request from {} failed: {}", chat_id, e);
    send(api, chat_id, &OutgoingMessage::plain(GENERIC_ERROR)).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(chat_type: &str, is_bot: bool, text: Option<&str>) -> Message {
        serde_json::from_value(serde_json::json!({
            "message_id": 7,
            "from": {"id": 42, "is_bot": is_bot, "username": "alice"},
            "chat": {"id": -100_123, "type": chat_type},
            "text": text,
        }))
        .unwrap()
    }

    #[test]
    fn test_command_input_from_any_chat() {
        for chat_type in ["private", "group", "supergroup"] {
            let message = message(chat_type, false, Some("/start 555"));
            assert_eq!(command_input(&message), Some((42, "/start 555")));
        }
    }

    #[test]
    fn test_command_input_skips_bots_and_non_text() {
        assert_eq!(command_input(&message("group", true, Some("/check"))), None);
        assert_eq!(command_input(&message("private", false, None)), None);
    }
}
