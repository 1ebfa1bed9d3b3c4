//! Scripted fakes shared by unit and handler tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use uuid::Uuid;

use crate::config::Config;
use crate::generation::store::{ArtifactStore, ArtifactValue};
use crate::llm_client::{LanguageModel, LlmError, TextStream, ToolSpec};
use crate::models::application::JobApplicationRow;
use crate::models::profile::{Entitlement, UserProfileRow};
use crate::payments::store::EntitlementStore;
use crate::routes::build_router;
use crate::state::AppState;

pub fn test_config() -> Config {
    let env: HashMap<&str, &str> = HashMap::from([
        ("DATABASE_URL", "postgres://localhost/pitchkit_test"),
        ("ANTHROPIC_API_KEY", "test-key"),
        ("LEMONSQUEEZY_WEBHOOK_SECRET", "secure_lemon_123"),
        ("LEMONSQUEEZY_API_KEY", "ls-test-key"),
        ("LEMONSQUEEZY_STORE_ID", "1234"),
        ("LEMONSQUEEZY_VARIANT_ID", "5678"),
        ("APP_URL", "http://localhost:3000"),
    ]);
    Config::from_lookup(|key| env.get(key).map(|v| v.to_string())).unwrap()
}

// ────────────────────────────────────────────────────────────────────────────
// Language model
// ────────────────────────────────────────────────────────────────────────────

/// One scripted upstream stream.
pub enum ScriptedStream {
    /// Yields the items in order, then ends.
    Open(Vec<Result<String, LlmError>>),
    /// The stream cannot be opened at all.
    FailToOpen(LlmError),
    /// Yields the fragments, then never produces another item.
    Stall(Vec<String>),
    /// Produces fragments forever, reporting through the tracker.
    Endless(StreamTracker),
    /// Yields the items in order, reporting through the tracker.
    Tracked(Vec<Result<String, LlmError>>, StreamTracker),
}

#[derive(Clone, Default)]
pub struct StreamTracker {
    pub produced: Arc<AtomicUsize>,
    pub upstream_dropped: Arc<AtomicBool>,
}

impl ScriptedStream {
    pub fn fragments(parts: &[&str]) -> Self {
        ScriptedStream::Open(parts.iter().map(|p| Ok(p.to_string())).collect())
    }

    pub fn endless() -> (Self, StreamTracker) {
        let tracker = StreamTracker::default();
        (ScriptedStream::Endless(tracker.clone()), tracker)
    }

    pub fn tracked(items: Vec<Result<String, LlmError>>) -> (Self, StreamTracker) {
        let tracker = StreamTracker::default();
        (ScriptedStream::Tracked(items, tracker.clone()), tracker)
    }

    fn into_text_stream(self) -> Result<TextStream, LlmError> {
        match self {
            ScriptedStream::Open(items) => Ok(stream::iter(items).boxed()),
            ScriptedStream::FailToOpen(e) => Err(e),
            ScriptedStream::Stall(parts) => Ok(stream::iter(parts.into_iter().map(Ok))
                .chain(stream::pending())
                .boxed()),
            ScriptedStream::Endless(tracker) => {
                let guard = DropFlag(tracker.upstream_dropped.clone());
                let produced = tracker.produced.clone();
                Ok(stream::unfold((0usize, guard, produced), |(n, guard, produced)| async move {
                    tokio::task::yield_now().await;
                    produced.fetch_add(1, Ordering::SeqCst);
                    Some((Ok::<_, LlmError>(format!("token{n} ")), (n + 1, guard, produced)))
                })
                .boxed())
            }
            ScriptedStream::Tracked(items, tracker) => {
                let guard = DropFlag(tracker.upstream_dropped.clone());
                let produced = tracker.produced.clone();
                Ok(stream::unfold(
                    (items.into_iter(), guard, produced),
                    |(mut items, guard, produced)| async move {
                        let item = items.next()?;
                        produced.fetch_add(1, Ordering::SeqCst);
                        Some((item, (items, guard, produced)))
                    },
                )
                .boxed())
            }
        }
    }
}

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub system: String,
    pub prompt: String,
    pub tool: Option<ToolSpec>,
}

/// A `LanguageModel` that replays queued responses and records every call.
#[derive(Default)]
pub struct ScriptedModel {
    completions: Mutex<VecDeque<Result<String, LlmError>>>,
    tool_calls: Mutex<VecDeque<Result<Value, LlmError>>>,
    streams: Mutex<VecDeque<ScriptedStream>>,
    calls: Mutex<Vec<RecordedCall>>,
    delay: Option<Duration>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_completion(self, response: Result<String, LlmError>) -> Self {
        self.completions.lock().unwrap().push_back(response);
        self
    }

    pub fn with_tool_call(self, response: Result<Value, LlmError>) -> Self {
        self.tool_calls.lock().unwrap().push_back(response);
        self
    }

    pub fn with_stream(self, stream: ScriptedStream) -> Self {
        self.streams.lock().unwrap().push_back(stream);
        self
    }

    /// Every call sleeps this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    async fn record(&self, prompt: &str, system: &str, tool: Option<&ToolSpec>) {
        self.calls.lock().unwrap().push(RecordedCall {
            system: system.to_string(),
            prompt: prompt.to_string(),
            tool: tool.cloned(),
        });
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, prompt: &str, system: &str) -> Result<String, LlmError> {
        self.record(prompt, system, None).await;
        let next = self.completions.lock().unwrap().pop_front();
        next.unwrap_or(Err(LlmError::EmptyContent))
    }

    async fn complete_with_tool(
        &self,
        prompt: &str,
        system: &str,
        tool: &ToolSpec,
    ) -> Result<Value, LlmError> {
        self.record(prompt, system, Some(tool)).await;
        let next = self.tool_calls.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Err(LlmError::MissingToolCall(tool.name.clone())))
    }

    async fn stream(&self, prompt: &str, system: &str) -> Result<TextStream, LlmError> {
        self.record(prompt, system, None).await;
        let next = self.streams.lock().unwrap().pop_front();
        next.ok_or(LlmError::EmptyContent)?.into_text_stream()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Stores
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryEntitlementStore {
    rows: Mutex<HashMap<String, Entitlement>>,
    fail: bool,
    writes: AtomicUsize,
    pro_transitions: AtomicUsize,
}

impl MemoryEntitlementStore {
    pub fn with_users(user_ids: &[&str]) -> Self {
        let rows = user_ids
            .iter()
            .map(|id| {
                (
                    id.to_string(),
                    Entitlement {
                        user_id: id.to_string(),
                        is_pro: false,
                        credits: 0,
                    },
                )
            })
            .collect();
        Self {
            rows: Mutex::new(rows),
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn pro_transitions(&self) -> usize {
        self.pro_transitions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EntitlementStore for MemoryEntitlementStore {
    async fn grant_pro(
        &self,
        user_id: &str,
        credits: i32,
    ) -> Result<Option<Entitlement>, sqlx::Error> {
        if self.fail {
            return Err(sqlx::Error::PoolTimedOut);
        }
        let mut rows = self.rows.lock().unwrap();
        let Some(row) = rows.get_mut(user_id) else {
            return Ok(None);
        };
        if !row.is_pro {
            self.pro_transitions.fetch_add(1, Ordering::SeqCst);
        }
        row.is_pro = true;
        row.credits = credits;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(Some(row.clone()))
    }

    async fn get(&self, user_id: &str) -> Result<Option<Entitlement>, sqlx::Error> {
        if self.fail {
            return Err(sqlx::Error::PoolTimedOut);
        }
        Ok(self.rows.lock().unwrap().get(user_id).cloned())
    }
}

pub fn application_row(
    user_id: &str,
    company_name: &str,
    job_title: &str,
    job_description: Option<&str>,
) -> JobApplicationRow {
    JobApplicationRow {
        id: Uuid::new_v4(),
        user_id: user_id.to_string(),
        company_name: company_name.to_string(),
        job_title: job_title.to_string(),
        job_description: job_description.map(str::to_string),
        proposal: None,
        cover_letter: None,
        cold_email: None,
        tailored_resume: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub fn profile_row(user_id: &str) -> UserProfileRow {
    UserProfileRow {
        id: Uuid::new_v4(),
        user_id: user_id.to_string(),
        display_name: None,
        bio: None,
        skills: None,
        tone_preference: None,
        resume_profile: None,
        is_pro: false,
        credits: 0,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

#[derive(Default)]
pub struct MemoryArtifactStore {
    applications: Mutex<HashMap<Uuid, JobApplicationRow>>,
    profiles: Mutex<HashMap<String, UserProfileRow>>,
    history: Mutex<Vec<(String, String, String)>>,
    writes: AtomicUsize,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_application(self, row: JobApplicationRow) -> Self {
        self.applications.lock().unwrap().insert(row.id, row);
        self
    }

    pub fn with_profile(self, row: UserProfileRow) -> Self {
        self.profiles
            .lock()
            .unwrap()
            .insert(row.user_id.clone(), row);
        self
    }

    pub fn application(&self, id: Uuid) -> Option<JobApplicationRow> {
        self.applications.lock().unwrap().get(&id).cloned()
    }

    /// Seeds a prior proposal without counting as a write.
    pub fn set_proposal(&self, id: Uuid, text: &str) {
        if let Some(row) = self.applications.lock().unwrap().get_mut(&id) {
            row.proposal = Some(text.to_string());
        }
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn history(&self) -> Vec<(String, String, String)> {
        self.history.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn load_application(
        &self,
        application_id: Uuid,
        user_id: &str,
    ) -> Result<Option<JobApplicationRow>, sqlx::Error> {
        Ok(self
            .applications
            .lock()
            .unwrap()
            .get(&application_id)
            .filter(|row| row.user_id == user_id)
            .cloned())
    }

    async fn load_profile(&self, user_id: &str) -> Result<Option<UserProfileRow>, sqlx::Error> {
        Ok(self.profiles.lock().unwrap().get(user_id).cloned())
    }

    async fn save_artifact(
        &self,
        application_id: Uuid,
        user_id: &str,
        artifact: ArtifactValue,
    ) -> Result<bool, sqlx::Error> {
        let mut applications = self.applications.lock().unwrap();
        let Some(row) = applications
            .get_mut(&application_id)
            .filter(|row| row.user_id == user_id)
        else {
            return Ok(false);
        };
        match artifact {
            ArtifactValue::Proposal(text) => row.proposal = Some(text),
            ArtifactValue::CoverLetter(text) => row.cover_letter = Some(text),
            ArtifactValue::ColdEmail(json) => row.cold_email = Some(json),
            ArtifactValue::TailoredResume(value) => row.tailored_resume = Some(value),
        }
        row.updated_at = Utc::now();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    async fn record_proposal_history(
        &self,
        user_id: &str,
        source_text: &str,
        generated_output: &str,
    ) -> Result<(), sqlx::Error> {
        self.history.lock().unwrap().push((
            user_id.to_string(),
            source_text.to_string(),
            generated_output.to_string(),
        ));
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Router
// ────────────────────────────────────────────────────────────────────────────

pub struct TestApp {
    pub router: Router,
    pub model: Arc<ScriptedModel>,
    pub entitlements: Arc<MemoryEntitlementStore>,
    pub artifacts: Arc<MemoryArtifactStore>,
}

/// The real router over fakes; `user_42` has a free profile.
pub fn test_app() -> TestApp {
    test_app_with(ScriptedModel::new(), MemoryArtifactStore::new())
}

pub fn test_app_with(model: ScriptedModel, artifacts: MemoryArtifactStore) -> TestApp {
    let model = Arc::new(model);
    let entitlements = Arc::new(MemoryEntitlementStore::with_users(&["user_42"]));
    let artifacts = Arc::new(artifacts);
    let state = AppState::build(
        &test_config(),
        model.clone(),
        entitlements.clone(),
        artifacts.clone(),
    )
    .unwrap();
    TestApp {
        router: build_router(state),
        model,
        entitlements,
        artifacts,
    }
}
