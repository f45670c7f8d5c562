//! `MTProto` client wrapper for the post correlator userbot.

use std::collections::HashMap;
use std::sync::Arc;

use grammers_client::client::{LoginToken, PasswordToken, UpdateStream, UpdatesConfiguration};
use grammers_client::peer::Peer;
use grammers_client::{sender, Client, InvocationError, SenderPool, SignInError};
use grammers_session::storages::SqliteSession;
use grammers_session::updates::UpdatesLike;
use grammers_tl_types as tl;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::TelegramConfig;

/// Re-export types for external use.
pub use grammers_client::client::{LoginToken as Token, PasswordToken as PwdToken};

/// Raw updates produced by the sender pool.
pub type RawUpdatesReceiver = mpsc::UnboundedReceiver<UpdatesLike>;

/// Errors that can occur during Telegram operations.
#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("Not authorized. Please sign in first.")]
    NotAuthorized,

    #[error("Sign in failed: {0}")]
    SignInFailed(String),

    #[error("Password required for 2FA")]
    PasswordRequired(PasswordToken),

    #[error("Invalid password")]
    InvalidPassword(PasswordToken),

    #[error("Update stream was already taken")]
    UpdatesTaken,

    #[error("Flood wait required: {0} seconds")]
    FloodWait(u32),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("API invocation error: {0}")]
    Invocation(String),
}

impl From<InvocationError> for TelegramError {
    fn from(err: InvocationError) -> Self {
        let err_str = err.to_string();

        if (err_str.contains("FLOOD_WAIT") || err_str.contains("flood"))
            && let Some(seconds) = extract_flood_wait_seconds(&err_str)
        {
            return Self::FloodWait(seconds);
        }

        Self::Invocation(err_str)
    }
}

/// Extracts flood wait seconds from an error message.
fn extract_flood_wait_seconds(err_msg: &str) -> Option<u32> {
    let patterns = ["FLOOD_WAIT_", "flood wait "];
    let lowered = err_msg.to_lowercase();

    for pattern in patterns {
        if let Some(idx) = lowered.find(&pattern.to_lowercase()) {
            let start = idx + pattern.len();
            let num_str: String = err_msg[start..]
                .chars()
                .take_while(char::is_ascii_digit)
                .collect();
            if let Ok(seconds) = num_str.parse() {
                return Some(seconds);
            }
        }
    }
    None
}

/// Channel post id carried by the forward header of an automatic copy.
#[must_use]
pub fn forwarded_channel_post(header: Option<&tl::enums::MessageFwdHeader>) -> Option<i32> {
    match header? {
        tl::enums::MessageFwdHeader::Header(header) => header.channel_post,
    }
}

/// Display title of a dialog peer.
#[must_use]
pub fn peer_title(peer: &Peer) -> String {
    match peer {
        Peer::User(u) => u.full_name(),
        Peer::Group(g) => g.title().unwrap_or("Group").to_owned(),
        Peer::Channel(c) => c.title().to_owned(),
    }
}

/// High-level Telegram client wrapper.
pub struct TelegramBot {
    /// The underlying grammers client.
    client: Client,

    /// Handle to the sender pool for disconnection.
    handle: sender::SenderPoolHandle,

    /// Raw updates, handed out once to [`TelegramBot::updates`].
    updates: Mutex<Option<RawUpdatesReceiver>>,

    /// Background task running the sender pool.
    _pool_task: JoinHandle<()>,
}

impl TelegramBot {
    /// Connects to Telegram with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if connection fails.
    pub async fn connect(config: &TelegramConfig) -> Result<Self, TelegramError> {
        info!("Connecting to Telegram...");

        let session = Arc::new(
            SqliteSession::open(&config.session_path)
                .await
                .map_err(|e| TelegramError::Session(e.to_string()))?,
        );

        let SenderPool {
            runner,
            updates,
            handle,
        } = SenderPool::new(Arc::clone(&session), config.api_id);

        let client = Client::new(handle.clone());

        let pool_task = tokio::spawn(async move {
            runner.run().await;
        });

        let is_authorized = client
            .is_authorized()
            .await
            .map_err(|e| TelegramError::Connection(e.to_string()))?;

        info!("Connected to Telegram. Authorized: {}", is_authorized);

        Ok(Self {
            client,
            handle: handle.thin,
            updates: Mutex::new(Some(updates)),
            _pool_task: pool_task,
        })
    }

    /// Checks if the client is authorized.
    ///
    /// # Errors
    ///
    /// Returns an error if the check fails.
    pub async fn is_authorized(&self) -> Result<bool, TelegramError> {
        self.client
            .is_authorized()
            .await
            .map_err(|e| TelegramError::Connection(e.to_string()))
    }

    /// Requests a login code to be sent to the phone number.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn request_login_code(
        &self,
        phone: &str,
        api_hash: &str,
    ) -> Result<LoginToken, TelegramError> {
        info!("Requesting login code for phone: {}...", mask_phone(phone));

        self.client
            .request_login_code(phone, api_hash)
            .await
            .map_err(|e| TelegramError::SignInFailed(e.to_string()))
    }

    /// Signs in with the login code.
    ///
    /// # Errors
    ///
    /// Returns an error if sign in fails.
    pub async fn sign_in(&self, token: &LoginToken, code: &str) -> Result<(), TelegramError> {
        info!("Signing in with login code...");

        match self.client.sign_in(token, code).await {
            Ok(_user) => {
                info!("Successfully signed in!");
                Ok(())
            }
            Err(SignInError::PasswordRequired(password_token)) => {
                debug!("2FA password required, hint: {:?}", password_token.hint());
                Err(TelegramError::PasswordRequired(password_token))
            }
            Err(SignInError::InvalidCode) => {
                Err(TelegramError::SignInFailed("Invalid code".to_owned()))
            }
            Err(e) => Err(TelegramError::SignInFailed(e.to_string())),
        }
    }

    /// Checks the 2FA password.
    ///
    /// # Errors
    ///
    /// Returns an error if the password is invalid.
    pub async fn check_password(
        &self,
        password_token: PasswordToken,
        password: &str,
    ) -> Result<(), TelegramError> {
        info!("Checking 2FA password...");

        match self.client.check_password(password_token, password).await {
            Ok(_user) => {
                info!("Successfully authenticated with 2FA!");
                Ok(())
            }
            Err(SignInError::InvalidPassword(token)) => Err(TelegramError::InvalidPassword(token)),
            Err(e) => Err(TelegramError::SignInFailed(e.to_string())),
        }
    }

    /// Starts the stream of new updates. Can only be called once.
    ///
    /// Updates missed while offline are not replayed.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream was already started.
    pub async fn updates(&self) -> Result<UpdateStream, TelegramError> {
        let receiver = self
            .updates
            .lock()
            .await
            .take()
            .ok_or(TelegramError::UpdatesTaken)?;

        Ok(self
            .client
            .stream_updates(
                receiver,
                UpdatesConfiguration {
                    catch_up: false,
                    ..Default::default()
                },
            )
            .await)
    }

    /// Collects every dialog peer keyed by its bare id.
    ///
    /// # Errors
    ///
    /// Returns an error if not authorized or the dialog list cannot be read.
    pub async fn dialog_peers(&self) -> Result<HashMap<i64, Peer>, TelegramError> {
        if !self.is_authorized().await? {
            return Err(TelegramError::NotAuthorized);
        }

        let mut peers = HashMap::new();
        let mut dialogs = self.client.iter_dialogs();

        while let Some(dialog) = dialogs.next().await? {
            peers.insert(dialog.peer.id().bare_id(), dialog.peer);
        }

        debug!("Loaded {} dialog(s)", peers.len());
        Ok(peers)
    }

    /// Returns a reference to the underlying client for advanced operations.
    #[must_use]
    pub const fn inner(&self) -> &Client {
        &self.client
    }

    /// Disconnects from Telegram.
    pub fn disconnect(&self) {
        info!("Disconnecting from Telegram...");
        self.handle.quit();
    }
}

impl std::fmt::Debug for TelegramBot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramBot").finish_non_exhaustive()
    }
}

/// Masks a phone number for logging (shows last 4 digits).
fn mask_phone(phone: &str) -> String {
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    if digits.len() > 4 {
        format!("***{}", &digits[digits.len() - 4..])
    } else {
        "****".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_phone() {
        assert_eq!(mask_phone("+1234567890"), "***7890");
        assert_eq!(mask_phone("123"), "****");
        assert_eq!(mask_phone("+7 (999) 123-45-67"), "***4567");
    }

    #[test]
    fn test_extract_flood_wait() {
        assert_eq!(extract_flood_wait_seconds("FLOOD_WAIT_120"), Some(120));
        assert_eq!(extract_flood_wait_seconds("flood wait 60 seconds"), Some(60));
        assert_eq!(extract_flood_wait_seconds("some other error"), None);
    }

    fn fwd_header(channel_post: Option<i32>, saved_from_msg_id: Option<i32>) -> tl::enums::MessageFwdHeader {
        tl::types::MessageFwdHeader {
            imported: false,
            saved_out: false,
            from_id: None,
            from_name: None,
            date: 1_700_000_000,
            channel_post,
            post_author: None,
            saved_from_peer: None,
            saved_from_msg_id,
            saved_from_id: None,
            saved_from_name: None,
            saved_date: None,
            psa_type: None,
        }
        .into()
    }

    #[test]
    fn test_forwarded_channel_post_without_header() {
        assert_eq!(forwarded_channel_post(None), None);
    }

    #[test]
    fn test_forwarded_channel_post_reads_channel_post() {
        let header = fwd_header(Some(42), Some(42));
        assert_eq!(forwarded_channel_post(Some(&header)), Some(42));
    }

    #[test]
    fn test_forwarded_channel_post_ignores_saved_from() {
        let header = fwd_header(None, Some(42));
        assert_eq!(forwarded_channel_post(Some(&header)), None);
    }
}
