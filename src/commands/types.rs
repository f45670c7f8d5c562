//! Command types and definitions.

use std::fmt;

use crate::telegram::OutgoingMessage;

/// Callback data of the "check subscription" button.
pub const CHECK_SUBSCRIPTION: &str = "check_sub";

/// Commands understood by the referral gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateCommand {
    /// First contact, optionally carrying the inviter's id.
    Start(Option<i64>),

    /// Show referral progress or the reward link.
    Check,

    /// Show admin commands.
    Admin,

    /// Add a required channel.
    AddChannel(Option<String>),

    /// Remove a required channel.
    RemoveChannel(Option<String>),

    /// List required channels.
    Channels,
}

impl GateCommand {
    /// Parses a command from a message text.
    ///
    /// Accepts an optional `@bot_username` suffix on the command word.
    /// Returns `None` if the message is not a known command.
    #[must_use]
    pub fn parse(text: &str, bot_username: &str) -> Option<Self> {
        let text = text.trim();
        let after_slash = text.strip_prefix('/')?;

        let (word, args) = match after_slash.split_once(char::is_whitespace) {
            Some((word, args)) => (word, Some(args.trim())),
            None => (after_slash, None),
        };

        let cmd = match word.split_once('@') {
            Some((cmd, target)) if target.eq_ignore_ascii_case(bot_username) => cmd,
            Some(_) => return None,
            None => word,
        };

        let first_arg = args
            .and_then(|a| a.split_whitespace().next())
            .map(str::to_owned);

        match cmd.to_lowercase().as_str() {
            "start" => Some(Self::Start(first_arg.as_deref().and_then(parse_referrer))),
            "check" => Some(Self::Check),
            "admin" => Some(Self::Admin),
            "add_channel" => Some(Self::AddChannel(first_arg)),
            "remove_channel" => Some(Self::RemoveChannel(first_arg)),
            "channels" => Some(Self::Channels),
            _ => None,
        }
    }

    /// Returns the command name as it appears in help.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Start(_) => "start",
            Self::Check => "check",
            Self::Admin => "admin",
            Self::AddChannel(_) => "add_channel",
            Self::RemoveChannel(_) => "remove_channel",
            Self::Channels => "channels",
        }
    }

    /// Whether only admins may run the command.
    #[must_use]
    pub const fn is_admin_only(&self) -> bool {
        matches!(
            self,
            Self::Admin | Self::AddChannel(_) | Self::RemoveChannel(_) | Self::Channels
        )
    }

    /// Admin commands with their descriptions.
    #[must_use]
    pub fn admin_commands() -> Vec<(&'static str, &'static str)> {
        vec![
            ("/add_channel", "Add a required channel"),
            ("/remove_channel", "Remove a required channel"),
            ("/channels", "List all required channels"),
        ]
    }
}

impl fmt::Display for GateCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start(Some(referrer)) => write!(f, "start {referrer}"),
            Self::AddChannel(Some(name)) => write!(f, "add_channel {name}"),
            Self::RemoveChannel(Some(name)) => write!(f, "remove_channel {name}"),
            _ => write!(f, "{}", self.name()),
        }
    }
}

/// Parses a `/start` payload; only plain decimal ids are accepted.
fn parse_referrer(payload: &str) -> Option<i64> {
    if payload.is_empty() || !payload.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    payload.parse().ok()
}

/// Normalizes a channel handle typed by an admin.
///
/// Strips `@` and rejects anything that is not a plain Telegram username.
#[must_use]
pub fn normalize_channel(raw: &str) -> Option<String> {
    let name = raw.trim().replace('@', "");
    let valid = !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    valid.then_some(name)
}

/// What the dispatcher should do in reply to an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Send a message to the chat.
    Reply(OutgoingMessage),

    /// Show a popup alert on the pressed button.
    Alert(String),

    /// Stay silent.
    Nothing,
}

impl Response {
    /// A plain HTML reply without keyboard.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Reply(OutgoingMessage::html(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOT: &str = "referral_test_bot";

    #[test]
    fn test_parse_start() {
        assert_eq!(GateCommand::parse("/start", BOT), Some(GateCommand::Start(None)));
        assert_eq!(
            GateCommand::parse("/start 555", BOT),
            Some(GateCommand::Start(Some(555)))
        );
    }

    #[test]
    fn test_parse_start_ignores_non_numeric_payload() {
        assert_eq!(
            GateCommand::parse("/start promo", BOT),
            Some(GateCommand::Start(None))
        );
        assert_eq!(
            GateCommand::parse("/start -5", BOT),
            Some(GateCommand::Start(None))
        );
    }

    #[test]
    fn test_parse_with_bot_suffix() {
        assert_eq!(
            GateCommand::parse("/check@Referral_Test_Bot", BOT),
            Some(GateCommand::Check)
        );
        assert_eq!(GateCommand::parse("/check@other_bot", BOT), None);
    }

    #[test]
    fn test_parse_channel_commands() {
        assert_eq!(
            GateCommand::parse("/add_channel @news", BOT),
            Some(GateCommand::AddChannel(Some("@news".to_owned())))
        );
        assert_eq!(
            GateCommand::parse("/remove_channel", BOT),
            Some(GateCommand::RemoveChannel(None))
        );
        assert_eq!(GateCommand::parse("/channels", BOT), Some(GateCommand::Channels));
    }

    #[test]
    fn test_parse_case_insensitive_and_whitespace() {
        assert_eq!(GateCommand::parse("  /CHECK  ", BOT), Some(GateCommand::Check));
        assert_eq!(GateCommand::parse("/Admin", BOT), Some(GateCommand::Admin));
    }

    #[test]
    fn test_parse_not_a_command() {
        assert_eq!(GateCommand::parse("hello", BOT), None);
        assert_eq!(GateCommand::parse("/unknown", BOT), None);
        assert_eq!(GateCommand::parse("", BOT), None);
    }

    #[test]
    fn test_normalize_channel() {
        assert_eq!(normalize_channel("@news_daily"), Some("news_daily".to_owned()));
        assert_eq!(normalize_channel("news"), Some("news".to_owned()));
        assert_eq!(normalize_channel("@"), None);
        assert_eq!(normalize_channel("<b>x</b>"), None);
    }

    #[test]
    fn test_admin_only() {
        assert!(GateCommand::Channels.is_admin_only());
        assert!(GateCommand::AddChannel(None).is_admin_only());
        assert!(!GateCommand::Check.is_admin_only());
        assert!(!GateCommand::Start(None).is_admin_only());
    }
}
