//! Command handler implementation.

use std::sync::Arc;

use tracing::{debug, info};

use super::types::{normalize_channel, GateCommand, Response, CHECK_SUBSCRIPTION};
use crate::referral::{GateDecision, GateError, ReferralGate, ReferralStatus};
use crate::telegram::{InlineButton, OutgoingMessage};

const ADMIN_ONLY: &str = "❌ This command is for admins only!";

/// Turns commands and button presses into gate operations and replies.
#[derive(Debug)]
pub struct CommandHandler {
    gate: Arc<ReferralGate>,
}

impl CommandHandler {
    /// Creates a new command handler.
    #[must_use]
    pub const fn new(gate: Arc<ReferralGate>) -> Self {
        Self { gate }
    }

    /// Tries to parse and execute a command from a message.
    ///
    /// Returns `None` if the message is not a command.
    pub async fn try_handle(
        &self,
        user_id: i64,
        message_text: &str,
    ) -> Option<Result<Response, GateError>> {
        let command = GateCommand::parse(message_text, &self.gate.policy().bot_username)?;

        debug!("Handling command from {}: {}", user_id, command);
        Some(self.execute(user_id, command).await)
    }

    /// Executes a parsed command.
    pub async fn execute(&self, user_id: i64, command: GateCommand) -> Result<Response, GateError> {
        if command.is_admin_only() && !self.gate.is_admin(user_id) {
            return Ok(match command {
                GateCommand::Admin => Response::Nothing,
                _ => Response::text(ADMIN_ONLY),
            });
        }

        match command {
            GateCommand::Start(referrer) => self.handle_start(user_id, referrer).await,
            GateCommand::Check => self.handle_check(user_id).await,
            GateCommand::Admin => Ok(Self::handle_admin()),
            GateCommand::AddChannel(name) => self.handle_add_channel(name.as_deref()).await,
            GateCommand::RemoveChannel(name) => self.handle_remove_channel(name.as_deref()).await,
            GateCommand::Channels => self.handle_channels().await,
        }
    }

    /// Handles an inline button press.
    pub async fn handle_callback(&self, user_id: i64, data: &str) -> Result<Response, GateError> {
        if data != CHECK_SUBSCRIPTION {
            debug!("Ignoring callback data {:?} from {}", data, user_id);
            return Ok(Response::Nothing);
        }

        self.gate.entry(user_id, None).await?;

        Ok(match self.gate.gate_pass(user_id).await? {
            GateDecision::Admin => Response::Alert("👑 You are an admin, no subscription required.".to_owned()),
            GateDecision::Subscribed { .. } => Response::text(
                "✅ You are subscribed!\nRun /start again to get your referral link.",
            ),
            GateDecision::NotSubscribed { .. } => {
                Response::Alert("❌ You are not subscribed yet!".to_owned())
            }
        })
    }

    async fn handle_start(&self, user_id: i64, referrer: Option<i64>) -> Result<Response, GateError> {
        let entry = self.gate.entry(user_id, referrer).await?;

        Ok(match self.gate.gate_pass(user_id).await? {
            GateDecision::Admin => {
                Response::text("👑 You are an admin, no subscription required.\n\nAdmin commands => /admin")
            }
            GateDecision::NotSubscribed { channels } => Self::subscribe_prompt(&channels),
            GateDecision::Subscribed { credit } => {
                if let Some(credit) = credit {
                    info!("Start by {} credited referrer {}", user_id, credit.referrer_id);
                }
                Self::welcome(&entry.referral_link)
            }
        })
    }

    fn subscribe_prompt(channels: &[String]) -> Response {
        let mut keyboard: Vec<Vec<InlineButton>> = channels
            .iter()
            .map(|channel| {
                vec![InlineButton::url(
                    format!("✅ Join @{channel}"),
                    format!("https://t.me/{channel}"),
                )]
            })
            .collect();
        keyboard.push(vec![InlineButton::callback("🔄 Check", CHECK_SUBSCRIPTION)]);

        Response::Reply(
            OutgoingMessage::html("⚠️ To use the bot, join the channels below:")
                .with_keyboard(keyboard),
        )
    }

    fn welcome(referral_link: &str) -> Response {
        let share_url = format!(
            "https://t.me/share/url?url={}",
            urlencoding::encode(referral_link)
        );

        Response::Reply(
            OutgoingMessage::html(format!(
                "👋 Hello!\nYour personal referral link:\n\n<code>{referral_link}</code>\n\nUse /check to see your progress"
            ))
            .with_keyboard(vec![vec![InlineButton::url("📢 Share with friends", share_url)]]),
        )
    }

    async fn handle_check(&self, user_id: i64) -> Result<Response, GateError> {
        Ok(match self.gate.status(user_id).await? {
            ReferralStatus::Progress { invited, threshold } => Response::text(format!(
                "📊 You have invited {invited}/{threshold} people.\n👥 Invite {} more!",
                threshold - invited
            )),
            ReferralStatus::Rewarded {
                invited,
                invite_link,
            } => Response::text(format!(
                "🎉 You have invited {invited} people!\n🔗 Private group link: {invite_link}"
            )),
        })
    }

    fn handle_admin() -> Response {
        let mut lines = vec!["🔧 <b>Admin commands:</b>".to_owned(), String::new()];
        for (cmd, desc) in GateCommand::admin_commands() {
            lines.push(format!("{cmd} - {desc}"));
        }
        Response::text(lines.join("\n"))
    }

    async fn handle_add_channel(&self, name: Option<&str>) -> Result<Response, GateError> {
        let Some(raw) = name else {
            return Ok(Response::text(
                "❌ Enter a channel username: <code>/add_channel ChannelUsername</code>",
            ));
        };
        let Some(channel) = normalize_channel(raw) else {
            return Ok(Response::text("❌ Invalid channel username."));
        };

        Ok(if self.gate.add_channel(&channel).await? {
            Response::text(format!("✅ @{channel} added!"))
        } else {
            Response::text(format!("⚠️ @{channel} is already in the list."))
        })
    }

    async fn handle_remove_channel(&self, name: Option<&str>) -> Result<Response, GateError> {
        let Some(raw) = name else {
            return Ok(Response::text(
                "❌ Enter a channel username: <code>/remove_channel ChannelUsername</code>",
            ));
        };
        let Some(channel) = normalize_channel(raw) else {
            return Ok(Response::text("❌ Invalid channel username."));
        };

        Ok(if self.gate.remove_channel(&channel).await? {
            Response::text(format!("🚫 @{channel} removed!"))
        } else {
            Response::text(format!("⚠️ @{channel} was not found."))
        })
    }

    async fn handle_channels(&self) -> Result<Response, GateError> {
        let channels = self.gate.channels().await?;

        if channels.is_empty() {
            return Ok(Response::text("⚠️ No channels added yet."));
        }

        let list = channels
            .iter()
            .map(|channel| format!("@{channel}"))
            .collect::<Vec<_>>()
            .join("\n");

        Ok(Response::text(format!("📌 Current channels:\n{list}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RewardPolicy;
    use crate::referral::memory::MemoryStore;
    use crate::referral::testing::{policy, FakePlatform};
    use crate::referral::{MemberStatus, ReferralStore};

    const ADMIN: i64 = 1;

    fn handler(channels: &[&str]) -> (CommandHandler, Arc<FakePlatform>, Arc<MemoryStore>) {
        let platform = Arc::new(FakePlatform::default());
        let store = Arc::new(MemoryStore::with_channels(channels));
        let gate = ReferralGate::new(platform.clone(), store.clone(), policy(RewardPolicy::Resend));
        (CommandHandler::new(Arc::new(gate)), platform, store)
    }

    async fn run(handler: &CommandHandler, user_id: i64, text: &str) -> Response {
        handler.try_handle(user_id, text).await.unwrap().unwrap()
    }

    fn reply(response: Response) -> OutgoingMessage {
        match response {
            Response::Reply(message) => message,
            other => panic!("expected a reply, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_start_referral_end_to_end() {
        let (handler, platform, store) = handler(&["news", "deals"]);
        run(&handler, 555, "/start").await;

        let prompt = reply(run(&handler, 42, "/start 555").await);
        assert!(prompt.text.contains("join the channels"));
        assert_eq!(prompt.keyboard.len(), 3);
        assert_eq!(prompt.keyboard[0][0].url.as_deref(), Some("https://t.me/news"));
        assert_eq!(
            prompt.keyboard[2][0].callback_data.as_deref(),
            Some(CHECK_SUBSCRIPTION)
        );
        assert!(!store.user(42).unwrap().is_subscriber);

        let alert = handler.handle_callback(42, CHECK_SUBSCRIPTION).await.unwrap();
        assert!(matches!(alert, Response::Alert(_)));

        platform.join("news", 42, MemberStatus::Member);
        platform.join("deals", 42, MemberStatus::Member);
        let confirmed = reply(handler.handle_callback(42, CHECK_SUBSCRIPTION).await.unwrap());
        assert!(confirmed.text.contains("subscribed"));

        let user = store.user(42).unwrap();
        assert!(user.is_subscriber);
        assert!(user.referrer_given);
        assert_eq!(store.user(555).unwrap().invited_count, 1);

        let welcome = reply(run(&handler, 42, "/start").await);
        assert!(welcome.text.contains("https://t.me/referral_test_bot?start=42"));
        assert_eq!(store.user(555).unwrap().invited_count, 1);
    }

    #[tokio::test]
    async fn test_welcome_share_button_encodes_link() {
        let (handler, _, _) = handler(&[]);
        let welcome = reply(run(&handler, 42, "/start").await);
        assert_eq!(
            welcome.keyboard[0][0].url.as_deref(),
            Some("https://t.me/share/url?url=https%3A%2F%2Ft.me%2Freferral_test_bot%3Fstart%3D42")
        );
    }

    #[tokio::test]
    async fn test_admin_start_bypasses_gate() {
        let (handler, _, _) = handler(&["news"]);
        let response = reply(run(&handler, ADMIN, "/start").await);
        assert!(response.text.contains("admin"));
        assert!(response.keyboard.is_empty());
    }

    #[tokio::test]
    async fn test_check_progress() {
        let (handler, _, _) = handler(&[]);
        let response = reply(run(&handler, 42, "/check").await);
        assert!(response.text.contains("0/5"));
        assert!(response.text.contains("Invite 5 more"));
    }

    #[tokio::test]
    async fn test_admin_commands_refused_for_users() {
        let (handler, _, store) = handler(&["news"]);

        let refused = reply(run(&handler, 42, "/add_channel promo").await);
        assert_eq!(refused.text, ADMIN_ONLY);
        assert_eq!(run(&handler, 42, "/admin").await, Response::Nothing);

        assert_eq!(store.list_channels().await.unwrap(), vec!["news"]);
    }

    #[tokio::test]
    async fn test_channel_management_replies() {
        let (handler, _, _) = handler(&["news"]);

        let added = reply(run(&handler, ADMIN, "/add_channel @promo").await);
        assert!(added.text.contains("@promo added"));

        let duplicate = reply(run(&handler, ADMIN, "/add_channel promo").await);
        assert!(duplicate.text.contains("already"));

        let listed = reply(run(&handler, ADMIN, "/channels").await);
        assert!(listed.text.contains("@news\n@promo"));

        let removed = reply(run(&handler, ADMIN, "/remove_channel promo").await);
        assert!(removed.text.contains("removed"));

        let missing = reply(run(&handler, ADMIN, "/remove_channel promo").await);
        assert!(missing.text.contains("not found"));

        let usage = reply(run(&handler, ADMIN, "/remove_channel").await);
        assert!(usage.text.contains("/remove_channel ChannelUsername"));
    }

    #[tokio::test]
    async fn test_unknown_callback_is_ignored() {
        let (handler, _, _) = handler(&[]);
        assert_eq!(
            handler.handle_callback(42, "something_else").await.unwrap(),
            Response::Nothing
        );
    }

    #[tokio::test]
    async fn test_non_command_is_not_handled() {
        let (handler, _, _) = handler(&[]);
        assert!(handler.try_handle(42, "hello there").await.is_none());
    }
}
