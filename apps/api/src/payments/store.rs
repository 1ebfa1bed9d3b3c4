use async_trait::async_trait;
use sqlx::PgPool;

use crate::models::profile::Entitlement;

/// Durable entitlement state. Only the reconciler writes through this.
#[async_trait]
pub trait EntitlementStore: Send + Sync {
    /// Sets `is_pro = true` and `credits = credits` for `user_id` in one conditional update.
    /// Returns `None` when no profile exists for the user.
    async fn grant_pro(&self, user_id: &str, credits: i32)
        -> Result<Option<Entitlement>, sqlx::Error>;

    async fn get(&self, user_id: &str) -> Result<Option<Entitlement>, sqlx::Error>;
}

#[derive(Clone)]
pub struct PgEntitlementStore {
    pool: PgPool,
}

impl PgEntitlementStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EntitlementStore for PgEntitlementStore {
    async fn grant_pro(
        &self,
        user_id: &str,
        credits: i32,
    ) -> Result<Option<Entitlement>, sqlx::Error> {
        sqlx::query_as::<_, Entitlement>(
            r#"
            UPDATE user_profiles
            SET is_pro = TRUE, credits = $2, updated_at = NOW()
            WHERE user_id = $1
            RETURNING user_id, is_pro, credits
            "#,
        )
        .bind(user_id)
        .bind(credits)
        .fetch_optional(&self.pool)
        .await
    }

    async fn get(&self, user_id: &str) -> Result<Option<Entitlement>, sqlx::Error> {
        sqlx::query_as::<_, Entitlement>(
            "SELECT user_id, is_pro, credits FROM user_profiles WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }
}
