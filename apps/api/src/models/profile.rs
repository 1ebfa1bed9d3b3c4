use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// A user's stored profile: generation context plus entitlement columns.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserProfileRow {
    pub id: Uuid,
    /// Identity-provider user id, e.g. `user_2abc...`.
    pub user_id: String,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    /// Comma-separated skills, as extracted from the uploaded résumé.
    pub skills: Option<String>,
    pub tone_preference: Option<String>,
    pub resume_profile: Option<Value>,
    pub is_pro: bool,
    pub credits: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The entitlement columns of a profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Entitlement {
    pub user_id: String,
    pub is_pro: bool,
    pub credits: i32,
}
