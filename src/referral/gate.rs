//! Subscription gate and referral crediting.
//!
//! Per-user state moves from unknown (no row) to pending (row with
//! `is_subscriber = false`) to subscribed. Crediting is tracked separately by
//! `referrer_given` and happens at most once per referred user.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::store::{ReferralStore, StoreError};
use super::types::{Entry, GateDecision, MemberStatus, ReferralCredit, ReferralStatus, UserRecord};
use crate::config::RewardPolicy;
use crate::telegram::{BotApiError, OutgoingMessage};

/// Chat-platform operations the gate depends on.
#[async_trait]
pub trait GatePlatform: Send + Sync {
    /// Looks up a user's status in a channel given by handle (without `@`).
    async fn member_status(&self, channel: &str, user_id: i64) -> Result<MemberStatus, BotApiError>;

    /// Creates a single-use, non-expiring invite link to a group.
    async fn create_invite_link(&self, group_id: i64) -> Result<String, BotApiError>;

    /// Sends a message to a user.
    async fn send_message(&self, chat_id: i64, message: &OutgoingMessage) -> Result<(), BotApiError>;
}

/// Errors that abort a gate operation.
#[derive(Debug, Error)]
pub enum GateError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Telegram request failed: {0}")]
    Platform(#[from] BotApiError),
}

/// Static gate configuration.
#[derive(Debug, Clone)]
pub struct GatePolicy {
    pub admin_ids: HashSet<i64>,
    pub bot_username: String,
    pub secret_group_id: i64,
    pub threshold: i32,
    pub reward_policy: RewardPolicy,
}

/// The gate: owns the platform client and the datastore.
pub struct ReferralGate {
    platform: Arc<dyn GatePlatform>,
    store: Arc<dyn ReferralStore>,
    policy: GatePolicy,
}

impl ReferralGate {
    /// Creates a new gate.
    #[must_use]
    pub fn new(
        platform: Arc<dyn GatePlatform>,
        store: Arc<dyn ReferralStore>,
        policy: GatePolicy,
    ) -> Self {
        Self {
            platform,
            store,
            policy,
        }
    }

    /// Gate configuration.
    #[must_use]
    pub const fn policy(&self) -> &GatePolicy {
        &self.policy
    }

    /// Whether the account bypasses the gate.
    #[must_use]
    pub fn is_admin(&self, user_id: i64) -> bool {
        self.policy.admin_ids.contains(&user_id)
    }

    /// Deterministic referral link of a user.
    #[must_use]
    pub fn referral_link(&self, user_id: i64) -> String {
        format!("https://t.me/{}?start={user_id}", self.policy.bot_username)
    }

    /// Records first contact. An existing user's referrer is left untouched.
    pub async fn entry(&self, user_id: i64, referrer_id: Option<i64>) -> Result<Entry, GateError> {
        let referral_link = self.referral_link(user_id);

        let is_new = if self.store.find_user(user_id).await?.is_some() {
            false
        } else {
            let record = UserRecord::new(user_id, referral_link.clone(), referrer_id);
            self.store.insert_user(&record).await?
        };

        if is_new {
            info!("New user {} (referrer: {:?})", user_id, referrer_id);
        }

        Ok(Entry {
            referral_link,
            is_new,
        })
    }

    /// Checks membership in every required channel.
    ///
    /// Any lookup error counts as not subscribed.
    pub async fn subscription_check(&self, user_id: i64) -> Result<bool, GateError> {
        let channels = self.store.list_channels().await?;
        Ok(self.subscribed_to_all(user_id, &channels).await)
    }

    async fn subscribed_to_all(&self, user_id: i64, channels: &[String]) -> bool {
        for channel in channels {
            match self.platform.member_status(channel, user_id).await {
                Ok(status) if status.counts_as_subscribed() => {}
                Ok(status) => {
                    debug!("User {} is {} in @{}", user_id, status, channel);
                    return false;
                }
                Err(e) => {
                    warn!("Membership lookup for user {} in @{} failed: {}", user_id, channel, e);
                    return false;
                }
            }
        }
        true
    }

    /// Runs the gate for a user, crediting the referrer on success.
    pub async fn gate_pass(&self, user_id: i64) -> Result<GateDecision, GateError> {
        if self.is_admin(user_id) {
            return Ok(GateDecision::Admin);
        }

        let channels = self.store.list_channels().await?;
        if !self.subscribed_to_all(user_id, &channels).await {
            self.store.set_subscriber(user_id, false).await?;
            return Ok(GateDecision::NotSubscribed { channels });
        }

        self.store.set_subscriber(user_id, true).await?;
        let credit = self.credit_referrer(user_id).await?;

        Ok(GateDecision::Subscribed { credit })
    }

    /// Claims the credit owed to the user's referrer and pays out the reward
    /// when the referrer's count reaches the threshold.
    async fn credit_referrer(&self, user_id: i64) -> Result<Option<ReferralCredit>, GateError> {
        let Some(credit) = self.store.claim_credit(user_id).await? else {
            return Ok(None);
        };

        info!(
            "User {} credited referrer {} (count: {:?})",
            user_id, credit.referrer_id, credit.invited_count
        );

        match credit.invited_count {
            Some(count) if self.reward_due_on_credit(count) => {
                self.deliver_reward(credit.referrer_id, count).await;
            }
            Some(_) => {}
            None => warn!("Referrer {} has no record, count not tracked", credit.referrer_id),
        }

        Ok(Some(credit))
    }

    const fn reward_due_on_credit(&self, count: i32) -> bool {
        match self.policy.reward_policy {
            RewardPolicy::Resend => count >= self.policy.threshold,
            RewardPolicy::Once => count == self.policy.threshold,
        }
    }

    /// Issues a reward link and sends it to the referrer. Failures are logged;
    /// the credit is already committed and `/check` can re-issue the link.
    async fn deliver_reward(&self, referrer_id: i64, count: i32) {
        let link = match self.issue_reward_link(referrer_id).await {
            Ok(link) => link,
            Err(e) => {
                warn!("Failed to issue reward link for {}: {}", referrer_id, e);
                return;
            }
        };

        let message = OutgoingMessage::html(format!(
            "🎉 You have invited {count} people!\n🔗 Private group link: {link}"
        ));

        if let Err(e) = self.platform.send_message(referrer_id, &message).await {
            warn!("Failed to deliver reward link to {}: {}", referrer_id, e);
        }
    }

    async fn issue_reward_link(&self, user_id: i64) -> Result<String, GateError> {
        let link = self
            .platform
            .create_invite_link(self.policy.secret_group_id)
            .await?;
        self.store.set_reward_link(user_id, &link).await?;
        info!("Issued reward link for user {}", user_id);
        Ok(link)
    }

    /// Reports referral progress, issuing the reward link at or above the threshold.
    pub async fn status(&self, user_id: i64) -> Result<ReferralStatus, GateError> {
        let invited = self.store.invited_count(user_id).await?;

        if invited < self.policy.threshold {
            return Ok(ReferralStatus::Progress {
                invited,
                threshold: self.policy.threshold,
            });
        }

        let stored = match self.policy.reward_policy {
            RewardPolicy::Once => self
                .store
                .find_user(user_id)
                .await?
                .and_then(|user| user.reward_link),
            RewardPolicy::Resend => None,
        };

        let invite_link = match stored {
            Some(link) => link,
            None => self.issue_reward_link(user_id).await?,
        };

        Ok(ReferralStatus::Rewarded {
            invited,
            invite_link,
        })
    }

    /// Required channels.
    pub async fn channels(&self) -> Result<Vec<String>, GateError> {
        Ok(self.store.list_channels().await?)
    }

    /// Adds a required channel. Returns `false` for duplicates.
    pub async fn add_channel(&self, username: &str) -> Result<bool, GateError> {
        let added = self.store.add_channel(username).await?;
        if added {
            info!("Channel @{} added", username);
        }
        Ok(added)
    }

    /// Removes a required channel. Returns `false` if it was not configured.
    pub async fn remove_channel(&self, username: &str) -> Result<bool, GateError> {
        let removed = self.store.remove_channel(username).await?;
        if removed {
            info!("Channel @{} removed", username);
        }
        Ok(removed)
    }
}

impl std::fmt::Debug for ReferralGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferralGate")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
