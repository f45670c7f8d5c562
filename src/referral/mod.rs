//! Referral gate module.
//!
//! Subscription gating, one-time referral crediting and the reward
//! invite link, backed by a relational store.

mod gate;
mod store;
mod types;

pub use gate::{GateError, GatePlatform, GatePolicy, ReferralGate};
pub use store::{PgReferralStore, ReferralStore, StoreError, MIGRATOR};
pub use types::{
    Entry, GateDecision, MemberStatus, ReferralCredit, ReferralStatus, UserRecord,
};

#[cfg(test)]
pub(crate) use gate::testing;
#[cfg(test)]
pub(crate) use store::memory;
