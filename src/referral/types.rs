//! Referral domain types.

use std::fmt;

use sqlx::FromRow;

/// A user row as stored in the `users` table.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct UserRecord {
    pub user_id: i64,
    pub invited_count: i32,
    pub referral_link: Option<String>,
    pub is_subscriber: bool,
    pub referrer_id: Option<i64>,
    pub referrer_given: bool,
    pub reward_link: Option<String>,
}

impl UserRecord {
    /// Creates a fresh record as written on first contact.
    #[must_use]
    pub fn new(user_id: i64, referral_link: String, referrer_id: Option<i64>) -> Self {
        Self {
            user_id,
            invited_count: 0,
            referral_link: Some(referral_link),
            is_subscriber: false,
            referrer_id,
            referrer_given: false,
            reward_link: None,
        }
    }

    /// Whether this user's referrer is still owed a credit.
    #[must_use]
    pub fn owes_credit(&self) -> bool {
        !self.referrer_given && self.referrer_id.is_some_and(|referrer| referrer != self.user_id)
    }
}

/// Membership status of a user in a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberStatus {
    Creator,
    Administrator,
    Member,
    Restricted,
    Left,
    Kicked,
    Other(String),
}

impl MemberStatus {
    /// Parses a Bot API status string.
    #[must_use]
    pub fn parse(status: &str) -> Self {
        match status {
            "creator" => Self::Creator,
            "administrator" => Self::Administrator,
            "member" => Self::Member,
            "restricted" => Self::Restricted,
            "left" => Self::Left,
            "kicked" => Self::Kicked,
            other => Self::Other(other.to_owned()),
        }
    }

    /// Only creators, administrators and plain members count as subscribed.
    #[must_use]
    pub const fn counts_as_subscribed(&self) -> bool {
        matches!(self, Self::Creator | Self::Administrator | Self::Member)
    }
}

impl fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Creator => write!(f, "creator"),
            Self::Administrator => write!(f, "administrator"),
            Self::Member => write!(f, "member"),
            Self::Restricted => write!(f, "restricted"),
            Self::Left => write!(f, "left"),
            Self::Kicked => write!(f, "kicked"),
            Self::Other(status) => write!(f, "{status}"),
        }
    }
}

/// A credit that was claimed for a referred user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferralCredit {
    /// The user whose count was incremented.
    pub referrer_id: i64,

    /// Count after the increment, `None` when the referrer has no record.
    pub invited_count: Option<i32>,
}

/// Result of the first-contact step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub referral_link: String,
    pub is_new: bool,
}

/// Result of running the gate for a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Admins skip the membership check.
    Admin,

    /// Subscribed to every channel; carries the credit paid to the referrer, if any.
    Subscribed { credit: Option<ReferralCredit> },

    /// Missing at least one channel; carries the channels to join.
    NotSubscribed { channels: Vec<String> },
}

/// What `/check` reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferralStatus {
    /// Still below the threshold.
    Progress { invited: i32, threshold: i32 },

    /// At or above the threshold, with the reward link.
    Rewarded { invited: i32, invite_link: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_status_parse() {
        assert_eq!(MemberStatus::parse("member"), MemberStatus::Member);
        assert_eq!(MemberStatus::parse("creator"), MemberStatus::Creator);
        assert_eq!(
            MemberStatus::parse("owner"),
            MemberStatus::Other("owner".to_owned())
        );
    }

    #[test]
    fn test_counts_as_subscribed() {
        assert!(MemberStatus::Member.counts_as_subscribed());
        assert!(MemberStatus::Administrator.counts_as_subscribed());
        assert!(MemberStatus::Creator.counts_as_subscribed());
        assert!(!MemberStatus::Restricted.counts_as_subscribed());
        assert!(!MemberStatus::Left.counts_as_subscribed());
        assert!(!MemberStatus::Kicked.counts_as_subscribed());
    }

    #[test]
    fn test_owes_credit() {
        let mut user = UserRecord::new(1, "link".to_owned(), Some(2));
        assert!(user.owes_credit());

        user.referrer_given = true;
        assert!(!user.owes_credit());

        let self_referred = UserRecord::new(1, "link".to_owned(), Some(1));
        assert!(!self_referred.owes_credit());

        let unreferred = UserRecord::new(1, "link".to_owned(), None);
        assert!(!unreferred.owes_credit());
    }
}
