use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::application::JobApplicationRow;
use crate::models::profile::UserProfileRow;

/// A finished artifact, ready to be written to its column.
#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactValue {
    Proposal(String),
    CoverLetter(String),
    /// Serialized `{subject, body}` JSON.
    ColdEmail(String),
    TailoredResume(Value),
}

impl ArtifactValue {
    pub fn column(&self) -> &'static str {
        match self {
            ArtifactValue::Proposal(_) => "proposal",
            ArtifactValue::CoverLetter(_) => "cover_letter",
            ArtifactValue::ColdEmail(_) => "cold_email",
            ArtifactValue::TailoredResume(_) => "tailored_resume",
        }
    }
}

/// Read access to generation context and write access to artifact columns.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Loads an application only if it belongs to `user_id`.
    async fn load_application(
        &self,
        application_id: Uuid,
        user_id: &str,
    ) -> Result<Option<JobApplicationRow>, sqlx::Error>;

    async fn load_profile(&self, user_id: &str) -> Result<Option<UserProfileRow>, sqlx::Error>;

    /// Writes one artifact column. Returns false when no owned application matched.
    async fn save_artifact(
        &self,
        application_id: Uuid,
        user_id: &str,
        artifact: ArtifactValue,
    ) -> Result<bool, sqlx::Error>;

    async fn record_proposal_history(
        &self,
        user_id: &str,
        source_text: &str,
        generated_output: &str,
    ) -> Result<(), sqlx::Error>;
}

#[derive(Clone)]
pub struct PgArtifactStore {
    pool: PgPool,
}

impl PgArtifactStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ArtifactStore for PgArtifactStore {
    async fn load_application(
        &self,
        application_id: Uuid,
        user_id: &str,
    ) -> Result<Option<JobApplicationRow>, sqlx::Error> {
        sqlx::query_as::<_, JobApplicationRow>(
            r#"
            SELECT id, user_id, company_name, job_title, job_description,
                   proposal, cover_letter, cold_email, tailored_resume,
                   created_at, updated_at
            FROM job_applications
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(application_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn load_profile(&self, user_id: &str) -> Result<Option<UserProfileRow>, sqlx::Error> {
        sqlx::query_as::<_, UserProfileRow>(
            r#"
            SELECT id, user_id, display_name, bio, skills, tone_preference, resume_profile,
                   is_pro, credits, created_at, updated_at
            FROM user_profiles
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn save_artifact(
        &self,
        application_id: Uuid,
        user_id: &str,
        artifact: ArtifactValue,
    ) -> Result<bool, sqlx::Error> {
        // One statement per column; column names are never interpolated.
        let result = match artifact {
            ArtifactValue::Proposal(text) => {
                sqlx::query(
                    "UPDATE job_applications SET proposal = $1, updated_at = NOW() \
                     WHERE id = $2 AND user_id = $3",
                )
                .bind(text)
                .bind(application_id)
                .bind(user_id)
                .execute(&self.pool)
                .await?
            }
            ArtifactValue::CoverLetter(text) => {
                sqlx::query(
                    "UPDATE job_applications SET cover_letter = $1, updated_at = NOW() \
                     WHERE id = $2 AND user_id = $3",
                )
                .bind(text)
                .bind(application_id)
                .bind(user_id)
                .execute(&self.pool)
                .await?
            }
            ArtifactValue::ColdEmail(json) => {
                sqlx::query(
                    "UPDATE job_applications SET cold_email = $1, updated_at = NOW() \
                     WHERE id = $2 AND user_id = $3",
                )
                .bind(json)
                .bind(application_id)
                .bind(user_id)
                .execute(&self.pool)
                .await?
            }
            ArtifactValue::TailoredResume(value) => {
                sqlx::query(
                    "UPDATE job_applications SET tailored_resume = $1, updated_at = NOW() \
                     WHERE id = $2 AND user_id = $3",
                )
                .bind(value)
                .bind(application_id)
                .bind(user_id)
                .execute(&self.pool)
                .await?
            }
        };
        Ok(result.rows_affected() > 0)
    }

    async fn record_proposal_history(
        &self,
        user_id: &str,
        source_text: &str,
        generated_output: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO proposal_history (user_id, source_text, generated_output) VALUES ($1, $2, $3)",
        )
        .bind(user_id)
        .bind(source_text)
        .bind(generated_output)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
