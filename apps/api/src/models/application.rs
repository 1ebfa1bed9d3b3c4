use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct JobApplicationRow {
    pub id: Uuid,
    pub user_id: String,
    pub company_name: String,
    pub job_title: String,
    pub job_description: Option<String>,
    pub proposal: Option<String>,
    pub cover_letter: Option<String>,
    /// Stored as the serialized `{subject, body}` JSON string.
    pub cold_email: Option<String>,
    pub tailored_resume: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
