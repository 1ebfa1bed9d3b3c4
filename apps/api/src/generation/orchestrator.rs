//! Generation Orchestrator: composes artifact prompts and persists finished artifacts.
//!
//! Proposals and cover letters are streamed through the `StreamingGenerator` and turned
//! into protocol `Frame`s. Cold emails and tailored résumés go through the
//! `ExtractionEngine` in freeform mode and come back whole.
//!
//! Nothing is written until an artifact is complete and non-empty. A failed, empty or
//! abandoned generation leaves the stored value exactly as it was.

use std::sync::Arc;

use futures::stream::BoxStream;
use futures::StreamExt;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::extraction::engine::{ExtractionEngine, ExtractionError, ExtractionRequest, ResponseMode};
use crate::extraction::models::{ColdEmail, TailoredResume};
use crate::extraction::schema::{COLD_EMAIL, TAILORED_RESUME};
use crate::generation::error::GenerationError;
use crate::generation::prompts::{
    ANONYMOUS_CANDIDATE, COLD_EMAIL_INSTRUCTIONS, COLD_EMAIL_PERSONA, COPYWRITER_SYSTEM,
    COVER_LETTER_PROMPT_TEMPLATE, MISSING_JOB_DESCRIPTION, MISSING_RESUME,
    PROPOSAL_PROMPT_TEMPLATE, TAILOR_INSTRUCTIONS, TAILOR_PERSONA,
};
use crate::generation::protocol::Frame;
use crate::generation::store::{ArtifactStore, ArtifactValue};
use crate::generation::streaming::{ComposedPrompt, GenerationStream, StreamingGenerator};
use crate::llm_client::prompts::{fill_template, DEFAULT_TONE, PLAIN_TEXT_RULES};
use crate::models::application::JobApplicationRow;
use crate::models::profile::UserProfileRow;

pub type FrameStream = BoxStream<'static, Frame>;

const NO_CONTENT: &str = "model returned no content";

#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error("application {0} not found")]
    ApplicationNotFound(Uuid),

    #[error("no résumé profile on file; upload your résumé first")]
    MissingResume,

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("artifact store failure: {0}")]
    Store(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamedArtifact {
    Proposal,
    CoverLetter,
}

/// A stateless proposal request: the caller supplies the job text directly.
#[derive(Debug, Clone, Default)]
pub struct ProposalRequest {
    pub job_description: String,
    pub tone: Option<String>,
    pub bio: Option<String>,
    pub skills: Option<String>,
    /// When present, a history row is recorded after completion.
    pub user_id: Option<String>,
}

/// What happens to the full text once a stream completes cleanly.
enum CompletionSink {
    History {
        user_id: Option<String>,
        source_text: String,
    },
    Artifact {
        application_id: Uuid,
        user_id: String,
        kind: StreamedArtifact,
    },
}

impl CompletionSink {
    async fn persist(&self, store: &dyn ArtifactStore, text: String) -> Result<(), String> {
        match self {
            CompletionSink::History {
                user_id: Some(user_id),
                source_text,
            } => {
                // History is best-effort; the proposal itself was delivered.
                if let Err(e) = store
                    .record_proposal_history(user_id, source_text, &text)
                    .await
                {
                    warn!(%user_id, "Failed to record proposal history: {e}");
                }
                Ok(())
            }
            CompletionSink::History { user_id: None, .. } => Ok(()),
            CompletionSink::Artifact {
                application_id,
                user_id,
                kind,
            } => {
                let value = match kind {
                    StreamedArtifact::Proposal => ArtifactValue::Proposal(text),
                    StreamedArtifact::CoverLetter => ArtifactValue::CoverLetter(text),
                };
                let column = value.column();
                match store.save_artifact(*application_id, user_id, value).await {
                    Ok(true) => {
                        info!(%application_id, column, "Artifact saved");
                        Ok(())
                    }
                    Ok(false) => Err(format!("application {application_id} no longer exists")),
                    Err(e) => {
                        error!(%application_id, column, "Failed to save artifact: {e}");
                        Err("result could not be saved".to_string())
                    }
                }
            }
        }
    }
}

#[derive(Clone)]
pub struct GenerationOrchestrator {
    streaming: StreamingGenerator,
    extractor: ExtractionEngine,
    store: Arc<dyn ArtifactStore>,
}

impl GenerationOrchestrator {
    pub fn new(
        streaming: StreamingGenerator,
        extractor: ExtractionEngine,
        store: Arc<dyn ArtifactStore>,
    ) -> Self {
        Self {
            streaming,
            extractor,
            store,
        }
    }

    /// Streams a proposal for caller-supplied job text.
    pub async fn stream_proposal(
        &self,
        request: ProposalRequest,
    ) -> Result<FrameStream, OrchestrationError> {
        let stored = match (&request.user_id, &request.bio, &request.skills) {
            (Some(user_id), None, None) => self.store.load_profile(user_id).await?,
            _ => None,
        };
        let profile = ProfileContext {
            name: stored.as_ref().and_then(|p| p.display_name.clone()),
            bio: request
                .bio
                .clone()
                .or_else(|| stored.as_ref().and_then(|p| p.bio.clone())),
            skills: request
                .skills
                .clone()
                .or_else(|| stored.as_ref().and_then(|p| p.skills.clone())),
        };
        let tone = resolve_tone(request.tone.as_deref(), stored.as_ref());

        let prompt = compose_proposal(&request.job_description, tone, &profile);
        let upstream = self.streaming.start(&prompt).await?;

        Ok(self.frames(
            upstream,
            CompletionSink::History {
                user_id: request.user_id,
                source_text: request.job_description,
            },
        ))
    }

    /// Streams a proposal or cover letter for a stored application.
    pub async fn stream_application_artifact(
        &self,
        kind: StreamedArtifact,
        application_id: Uuid,
        user_id: &str,
        tone: Option<&str>,
    ) -> Result<FrameStream, OrchestrationError> {
        let (application, profile) = self.load_context(application_id, user_id).await?;

        let prompt = match kind {
            StreamedArtifact::Proposal => {
                let context = ProfileContext::from_row(profile.as_ref());
                let tone = resolve_tone(tone, profile.as_ref());
                compose_proposal(job_description(&application), tone, &context)
            }
            StreamedArtifact::CoverLetter => compose_cover_letter(&application, profile.as_ref()),
        };

        info!(%application_id, ?kind, "Starting streamed generation");
        let upstream = self.streaming.start(&prompt).await?;

        Ok(self.frames(
            upstream,
            CompletionSink::Artifact {
                application_id,
                user_id: user_id.to_string(),
                kind,
            },
        ))
    }

    pub async fn generate_cold_email(
        &self,
        application_id: Uuid,
        user_id: &str,
        tone: Option<&str>,
    ) -> Result<ColdEmail, OrchestrationError> {
        let (application, profile) = self.load_context(application_id, user_id).await?;

        let source = format!(
            "Company: {}\nRole: {}\nMy Name: {}\nTone: {}\n\nJOB DESCRIPTION:\n{}",
            application.company_name,
            application.job_title,
            candidate_name(profile.as_ref()),
            resolve_tone(tone, profile.as_ref()),
            job_description(&application),
        );

        let payload = self
            .extractor
            .extract(ExtractionRequest {
                schema: &COLD_EMAIL,
                instructions: COLD_EMAIL_INSTRUCTIONS,
                source_text: &source,
                context: None,
                persona: Some(COLD_EMAIL_PERSONA),
                mode: ResponseMode::Freeform,
            })
            .await?;

        let value = payload.clone().into_value();
        let email: ColdEmail = payload.into_typed()?;
        self.persist(application_id, user_id, ArtifactValue::ColdEmail(value.to_string()))
            .await?;
        Ok(email)
    }

    pub async fn generate_tailored_resume(
        &self,
        application_id: Uuid,
        user_id: &str,
    ) -> Result<TailoredResume, OrchestrationError> {
        let (application, profile) = self.load_context(application_id, user_id).await?;
        let resume = profile
            .as_ref()
            .and_then(|p| p.resume_profile.as_ref())
            .ok_or(OrchestrationError::MissingResume)?
            .to_string();

        let payload = self
            .extractor
            .extract(ExtractionRequest {
                schema: &TAILORED_RESUME,
                instructions: TAILOR_INSTRUCTIONS,
                source_text: job_description(&application),
                context: Some(&resume),
                persona: Some(TAILOR_PERSONA),
                mode: ResponseMode::Freeform,
            })
            .await?;

        let value = payload.clone().into_value();
        let tailored: TailoredResume = payload.into_typed()?;
        self.persist(application_id, user_id, ArtifactValue::TailoredResume(value))
            .await?;
        Ok(tailored)
    }

    async fn load_context(
        &self,
        application_id: Uuid,
        user_id: &str,
    ) -> Result<(JobApplicationRow, Option<UserProfileRow>), OrchestrationError> {
        let application = self
            .store
            .load_application(application_id, user_id)
            .await?
            .ok_or(OrchestrationError::ApplicationNotFound(application_id))?;
        let profile = self.store.load_profile(user_id).await?;
        Ok((application, profile))
    }

    async fn persist(
        &self,
        application_id: Uuid,
        user_id: &str,
        value: ArtifactValue,
    ) -> Result<(), OrchestrationError> {
        let column = value.column();
        if !self.store.save_artifact(application_id, user_id, value).await? {
            return Err(OrchestrationError::ApplicationNotFound(application_id));
        }
        info!(%application_id, column, "Artifact saved");
        Ok(())
    }

    /// Re-emits generator output as frames and persists on clean completion.
    /// Dropping the returned stream drops the generator, which stops the upstream call.
    fn frames(&self, mut upstream: GenerationStream, sink: CompletionSink) -> FrameStream {
        let store = self.store.clone();
        Box::pin(async_stream::stream! {
            let mut text = String::new();
            while let Some(item) = upstream.next().await {
                match item {
                    Ok(fragment) => {
                        text.push_str(&fragment);
                        yield Frame::Fragment(fragment);
                    }
                    Err(e) => {
                        warn!(code = e.code(), "Streamed generation failed: {e}");
                        yield Frame::Failed(e);
                        return;
                    }
                }
            }

            if text.trim().is_empty() {
                warn!("Streamed generation finished without content");
                yield Frame::Failed(GenerationError::GenerationFailed(NO_CONTENT.to_string()));
                return;
            }

            match sink.persist(store.as_ref(), text).await {
                Ok(()) => yield Frame::Completed,
                Err(reason) => yield Frame::Failed(GenerationError::GenerationFailed(reason)),
            }
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Prompt composition
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct ProfileContext {
    name: Option<String>,
    bio: Option<String>,
    skills: Option<String>,
}

impl ProfileContext {
    fn from_row(row: Option<&UserProfileRow>) -> Self {
        Self {
            name: row.and_then(|p| p.display_name.clone()),
            bio: row.and_then(|p| p.bio.clone()),
            skills: row.and_then(|p| p.skills.clone()),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn resolve_tone<'a>(requested: Option<&'a str>, profile: Option<&'a UserProfileRow>) -> &'a str {
    non_blank(requested)
        .or_else(|| non_blank(profile.and_then(|p| p.tone_preference.as_deref())))
        .unwrap_or(DEFAULT_TONE)
}

fn candidate_name(profile: Option<&UserProfileRow>) -> &str {
    non_blank(profile.and_then(|p| p.display_name.as_deref())).unwrap_or(ANONYMOUS_CANDIDATE)
}

fn job_description(application: &JobApplicationRow) -> &str {
    non_blank(application.job_description.as_deref()).unwrap_or(MISSING_JOB_DESCRIPTION)
}

fn compose_proposal(job_description: &str, tone: &str, profile: &ProfileContext) -> ComposedPrompt {
    let mut about = String::new();
    if let Some(name) = non_blank(profile.name.as_deref()) {
        about.push_str(&format!("Name: {name}\n"));
    }
    if let Some(bio) = non_blank(profile.bio.as_deref()) {
        about.push_str(&format!("Bio: {bio}\n"));
    }
    if let Some(skills) = non_blank(profile.skills.as_deref()) {
        about.push_str(&format!("Skills: {skills}\n"));
    }
    let profile_block = if about.is_empty() {
        String::new()
    } else {
        format!("\nABOUT ME (use to personalize, do not copy verbatim):\n{about}\n")
    };

    ComposedPrompt {
        system: COPYWRITER_SYSTEM.to_string(),
        user: fill_template(
            PROPOSAL_PROMPT_TEMPLATE,
            &[
                ("rules", PLAIN_TEXT_RULES),
                ("tone", tone),
                ("profile", &profile_block),
                ("job_description", job_description.trim()),
            ],
        ),
    }
}

fn compose_cover_letter(
    application: &JobApplicationRow,
    profile: Option<&UserProfileRow>,
) -> ComposedPrompt {
    let resume_context = profile
        .and_then(|p| p.resume_profile.as_ref().map(|r| r.to_string()))
        .or_else(|| non_blank(profile.and_then(|p| p.bio.as_deref())).map(str::to_string))
        .unwrap_or_else(|| MISSING_RESUME.to_string());

    ComposedPrompt {
        system: COPYWRITER_SYSTEM.to_string(),
        user: fill_template(
            COVER_LETTER_PROMPT_TEMPLATE,
            &[
                ("rules", PLAIN_TEXT_RULES),
                ("job_title", &application.job_title),
                ("company_name", &application.company_name),
                ("candidate_name", candidate_name(profile)),
                ("resume_context", &resume_context),
                ("job_description", job_description(application)),
            ],
        ),
    }
}
