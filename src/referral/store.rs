//! Persistence of users and required channels.

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{debug, info};

use super::types::{ReferralCredit, UserRecord};

/// Schema migrations, applied on connect.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Errors raised by the datastore.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Storage operations used by the referral gate.
///
/// Every method is one atomic statement except [`ReferralStore::claim_credit`],
/// which runs in a single transaction.
#[async_trait]
pub trait ReferralStore: Send + Sync {
    /// Fetches a user by id.
    async fn find_user(&self, user_id: i64) -> Result<Option<UserRecord>, StoreError>;

    /// Inserts a user unless one with the same id exists.
    ///
    /// Returns `true` if the row was created.
    async fn insert_user(&self, user: &UserRecord) -> Result<bool, StoreError>;

    /// Records the outcome of the latest subscription check.
    async fn set_subscriber(&self, user_id: i64, subscribed: bool) -> Result<(), StoreError>;

    /// Marks the user's referral as paid and increments the referrer's count,
    /// only if the user has an uncredited referrer other than themselves.
    async fn claim_credit(&self, user_id: i64) -> Result<Option<ReferralCredit>, StoreError>;

    /// Returns the user's invite count, zero for unknown users.
    async fn invited_count(&self, user_id: i64) -> Result<i32, StoreError>;

    /// Remembers the last reward link issued to a user.
    async fn set_reward_link(&self, user_id: i64, link: &str) -> Result<(), StoreError>;

    /// Lists required channel handles in insertion order.
    async fn list_channels(&self) -> Result<Vec<String>, StoreError>;

    /// Adds a channel. Returns `false` if it was already present.
    async fn add_channel(&self, username: &str) -> Result<bool, StoreError>;

    /// Removes a channel. Returns `false` if it was not present.
    async fn remove_channel(&self, username: &str) -> Result<bool, StoreError>;
}

/// `PostgreSQL`-backed store.
#[derive(Debug, Clone)]
pub struct PgReferralStore {
    pool: PgPool,
}

impl PgReferralStore {
    /// Connects to the database and applies pending migrations.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        info!("Connecting to database...");

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        MIGRATOR.run(&pool).await?;
        info!("Database ready");

        Ok(Self { pool })
    }

    /// Wraps an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Closes every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl ReferralStore for PgReferralStore {
    async fn find_user(&self, user_id: i64) -> Result<Option<UserRecord>, StoreError> {
        let user = sqlx::query_as::<_, UserRecord>(
            "SELECT user_id, COALESCE(invited_count, 0) AS invited_count, referral_link, \
             COALESCE(is_subscriber, FALSE) AS is_subscriber, referrer_id, \
             COALESCE(referrer_given, FALSE) AS referrer_given, reward_link \
             FROM users WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn insert_user(&self, user: &UserRecord) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "INSERT INTO users (user_id, referral_link, referrer_id) VALUES ($1, $2, $3) \
             ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(user.user_id)
        .bind(&user.referral_link)
        .bind(user.referrer_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn set_subscriber(&self, user_id: i64, subscribed: bool) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET is_subscriber = $2 WHERE user_id = $1")
            .bind(user_id)
            .bind(subscribed)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn claim_credit(&self, user_id: i64) -> Result<Option<ReferralCredit>, StoreError> {
        let mut tx = self.pool.begin().await?;

        // The row lock taken here makes a concurrent claim for the same user
        // re-check `referrer_given` after this transaction commits.
        let referrer_id: Option<i64> = sqlx::query_scalar(
            "UPDATE users SET referrer_given = TRUE \
             WHERE user_id = $1 AND NOT COALESCE(referrer_given, FALSE) \
             AND referrer_id IS NOT NULL AND referrer_id <> user_id \
             RETURNING referrer_id",
        )
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(referrer_id) = referrer_id else {
            tx.commit().await?;
            return Ok(None);
        };

        let invited_count: Option<i32> = sqlx::query_scalar(
            "UPDATE users SET invited_count = COALESCE(invited_count, 0) + 1 \
             WHERE user_id = $1 RETURNING invited_count",
        )
        .bind(referrer_id)
        .fetch_optional(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!(
            "Credited referrer {} for user {} (count: {:?})",
            referrer_id, user_id, invited_count
        );

        Ok(Some(ReferralCredit {
            referrer_id,
            invited_count,
        }))
    }

    async fn invited_count(&self, user_id: i64) -> Result<i32, StoreError> {
        let count: Option<i32> = sqlx::query_scalar(
            "SELECT COALESCE(invited_count, 0) FROM users WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(count.unwrap_or_default())
    }

    async fn set_reward_link(&self, user_id: i64, link: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET reward_link = $2 WHERE user_id = $1")
            .bind(user_id)
            .bind(link)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn list_channels(&self) -> Result<Vec<String>, StoreError> {
        let channels = sqlx::query_scalar("SELECT username FROM channels ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        Ok(channels)
    }

    async fn add_channel(&self, username: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "INSERT INTO channels (username) VALUES ($1) ON CONFLICT (username) DO NOTHING",
        )
        .bind(username)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn remove_channel(&self, username: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM channels WHERE username = $1")
            .bind(username)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// In-memory store with the same semantics, for tests.
#[cfg(test)]
pub(crate) mod memory {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    #[derive(Debug, Default)]
    pub(crate) struct MemoryStore {
        users: Mutex<HashMap<i64, UserRecord>>,
        channels: Mutex<Vec<String>>,
    }

    impl MemoryStore {
        pub(crate) fn with_channels(channels: &[&str]) -> Self {
            let store = Self::default();
            *store.channels.lock().unwrap() = channels.iter().map(|c| (*c).to_owned()).collect();
            store
        }

        pub(crate) fn user(&self, user_id: i64) -> Option<UserRecord> {
            self.users.lock().unwrap().get(&user_id).cloned()
        }

        pub(crate) fn put_user(&self, user: UserRecord) {
            self.users.lock().unwrap().insert(user.user_id, user);
        }
    }

    #[async_trait]
    impl ReferralStore for MemoryStore {
        async fn find_user(&self, user_id: i64) -> Result<Option<UserRecord>, StoreError> {
            Ok(self.user(user_id))
        }

        async fn insert_user(&self, user: &UserRecord) -> Result<bool, StoreError> {
            let mut users = self.users.lock().unwrap();
            if users.contains_key(&user.user_id) {
                return Ok(false);
            }
            users.insert(user.user_id, user.clone());
            Ok(true)
        }

        async fn set_subscriber(&self, user_id: i64, subscribed: bool) -> Result<(), StoreError> {
            if let Some(user) = self.users.lock().unwrap().get_mut(&user_id) {
                user.is_subscriber = subscribed;
            }
            Ok(())
        }

        async fn claim_credit(&self, user_id: i64) -> Result<Option<ReferralCredit>, StoreError> {
            let mut users = self.users.lock().unwrap();

            let Some(user) = users.get_mut(&user_id) else {
                return Ok(None);
            };
            if !user.owes_credit() {
                return Ok(None);
            }
            user.referrer_given = true;
            let Some(referrer_id) = user.referrer_id else {
                return Ok(None);
            };

            let invited_count = users.get_mut(&referrer_id).map(|referrer| {
                referrer.invited_count += 1;
                referrer.invited_count
            });

            Ok(Some(ReferralCredit {
                referrer_id,
                invited_count,
            }))
        }

        async fn invited_count(&self, user_id: i64) -> Result<i32, StoreError> {
            Ok(self.user(user_id).map_or(0, |user| user.invited_count))
        }

        async fn set_reward_link(&self, user_id: i64, link: &str) -> Result<(), StoreError> {
            if let Some(user) = self.users.lock().unwrap().get_mut(&user_id) {
                user.reward_link = Some(link.to_owned());
            }
            Ok(())
        }

        async fn list_channels(&self) -> Result<Vec<String>, StoreError> {
            Ok(self.channels.lock().unwrap().clone())
        }

        async fn add_channel(&self, username: &str) -> Result<bool, StoreError> {
            let mut channels = self.channels.lock().unwrap();
            if channels.iter().any(|c| c == username) {
                return Ok(false);
            }
            channels.push(username.to_owned());
            Ok(true)
        }

        async fn remove_channel(&self, username: &str) -> Result<bool, StoreError> {
            let mut channels = self.channels.lock().unwrap();
            let before = channels.len();
            channels.retain(|c| c != username);
            Ok(channels.len() != before)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Connects to `DATABASE_URL`; these tests are skipped by default.
    async fn pg_store() -> PgReferralStore {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        PgReferralStore::connect(&url).await.unwrap()
    }

    async fn remove_users(store: &PgReferralStore, ids: &[i64]) {
        sqlx::query("DELETE FROM users WHERE user_id = ANY($1)")
            .bind(ids)
            .execute(&store.pool)
            .await
            .unwrap();
    }

    #[tokio::test]
    #[ignore = "needs a PostgreSQL database in DATABASE_URL"]
    async fn test_pg_concurrent_claims_credit_once() {
        let store = pg_store().await;
        let referrer = 9_000_000_000 + i64::from(rand::random::<u32>());
        let invitee = referrer + 1;

        store
            .insert_user(&UserRecord::new(referrer, "r".to_owned(), None))
            .await
            .unwrap();
        store
            .insert_user(&UserRecord::new(invitee, "i".to_owned(), Some(referrer)))
            .await
            .unwrap();

        let (a, b) = tokio::join!(store.claim_credit(invitee), store.claim_credit(invitee));
        let claims: Vec<_> = [a.unwrap(), b.unwrap()].into_iter().flatten().collect();

        assert_eq!(
            claims,
            vec![ReferralCredit {
                referrer_id: referrer,
                invited_count: Some(1),
            }]
        );
        assert_eq!(store.invited_count(referrer).await.unwrap(), 1);
        assert!(store.find_user(invitee).await.unwrap().unwrap().referrer_given);
        assert_eq!(store.claim_credit(invitee).await.unwrap(), None);

        remove_users(&store, &[referrer, invitee]).await;
        store.close().await;
    }

    #[tokio::test]
    #[ignore = "needs a PostgreSQL database in DATABASE_URL"]
    async fn test_pg_self_and_unknown_referrers() {
        let store = pg_store().await;
        let own = 9_000_000_000 + i64::from(rand::random::<u32>());
        let orphan = own + 1;
        let missing = own + 2;

        store
            .insert_user(&UserRecord::new(own, "s".to_owned(), Some(own)))
            .await
            .unwrap();
        store
            .insert_user(&UserRecord::new(orphan, "o".to_owned(), Some(missing)))
            .await
            .unwrap();

        assert_eq!(store.claim_credit(own).await.unwrap(), None);
        assert_eq!(
            store.claim_credit(orphan).await.unwrap(),
            Some(ReferralCredit {
                referrer_id: missing,
                invited_count: None,
            })
        );
        assert_eq!(store.claim_credit(orphan).await.unwrap(), None);

        remove_users(&store, &[own, orphan]).await;
        store.close().await;
    }
}
