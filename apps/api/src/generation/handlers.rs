use std::convert::Infallible;

use axum::{
    body::Body,
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use futures::StreamExt;
use serde::Deserialize;
use uuid::Uuid;

use crate::errors::AppError;
use crate::extraction::models::{ColdEmail, TailoredResume};
use crate::generation::orchestrator::{FrameStream, ProposalRequest, StreamedArtifact};
use crate::state::AppState;

/// Body of the stateless proposal endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub prompt: String,
    pub tone: Option<String>,
    pub user_bio: Option<String>,
    pub user_skills: Option<String>,
    pub user_id: Option<String>,
}

/// Body of the per-application artifact endpoints.
#[derive(Debug, Deserialize)]
pub struct ArtifactRequest {
    pub user_id: String,
    pub tone: Option<String>,
}

fn require_user_id(user_id: &str) -> Result<&str, AppError> {
    let trimmed = user_id.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation("user_id is required".to_string()));
    }
    Ok(trimmed)
}

/// Writes frames as a chunked `text/plain` body.
fn framed_response(frames: FrameStream) -> Response {
    let body = Body::from_stream(frames.map(|frame| Ok::<_, Infallible>(frame.encode())));
    (
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
        ],
        body,
    )
        .into_response()
}

/// POST /api/v1/generate
pub async fn handle_generate(
    State(state): State<AppState>,
    Json(req): Json<GenerateRequest>,
) -> Result<Response, AppError> {
    if req.prompt.trim().is_empty() {
        return Err(AppError::Validation("prompt is required".to_string()));
    }
    let frames = state
        .orchestrator
        .stream_proposal(ProposalRequest {
            job_description: req.prompt,
            tone: req.tone,
            bio: req.user_bio,
            skills: req.user_skills,
            user_id: req.user_id.filter(|u| !u.trim().is_empty()),
        })
        .await?;
    Ok(framed_response(frames))
}

/// POST /api/v1/applications/:id/proposal
pub async fn handle_application_proposal(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ArtifactRequest>,
) -> Result<Response, AppError> {
    let user_id = require_user_id(&req.user_id)?;
    let frames = state
        .orchestrator
        .stream_application_artifact(StreamedArtifact::Proposal, id, user_id, req.tone.as_deref())
        .await?;
    Ok(framed_response(frames))
}

/// POST /api/v1/applications/:id/cover-letter
pub async fn handle_cover_letter(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ArtifactRequest>,
) -> Result<Response, AppError> {
    let user_id = require_user_id(&req.user_id)?;
    let frames = state
        .orchestrator
        .stream_application_artifact(StreamedArtifact::CoverLetter, id, user_id, req.tone.as_deref())
        .await?;
    Ok(framed_response(frames))
}

/// POST /api/v1/applications/:id/cold-email
pub async fn handle_cold_email(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ArtifactRequest>,
) -> Result<Json<ColdEmail>, AppError> {
    let user_id = require_user_id(&req.user_id)?;
    let email = state
        .orchestrator
        .generate_cold_email(id, user_id, req.tone.as_deref())
        .await?;
    Ok(Json(email))
}

/// POST /api/v1/applications/:id/tailored-resume
pub async fn handle_tailored_resume(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ArtifactRequest>,
) -> Result<Json<TailoredResume>, AppError> {
    let user_id = require_user_id(&req.user_id)?;
    let tailored = state.orchestrator.generate_tailored_resume(id, user_id).await?;
    Ok(Json(tailored))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::generation::protocol::{Assembled, StreamAssembler};
    use crate::llm_client::LlmError;
    use crate::test_support::{
        application_row, profile_row, test_app_with, MemoryArtifactStore, ScriptedModel,
        ScriptedStream, TestApp,
    };

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn read_json(response: axum::response::Response) -> Value {
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_generate_streams_framed_text() {
        let model = ScriptedModel::new().with_stream(ScriptedStream::fragments(&["Hi ", "Acme"]));
        let TestApp { router, .. } = test_app_with(model, MemoryArtifactStore::new());

        let response = router
            .oneshot(post_json("/api/v1/generate", json!({"prompt": "Need a dev", "tone": "Casual"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"],
            "text/plain; charset=utf-8"
        );
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let mut assembler = StreamAssembler::new();
        assembler.push(&body);
        assert_eq!(assembler.finish(), Assembled::Complete("Hi Acme".to_string()));
    }

    #[tokio::test]
    async fn test_generate_rejects_blank_prompt() {
        let TestApp { router, model, .. } = test_app_with(ScriptedModel::new(), MemoryArtifactStore::new());

        let response = router
            .oneshot(post_json("/api/v1/generate", json!({"prompt": "   "})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(model.calls().is_empty());
    }

    #[tokio::test]
    async fn test_upstream_down_before_first_fragment_is_503_retryable() {
        let model = ScriptedModel::new()
            .with_stream(ScriptedStream::FailToOpen(LlmError::RateLimited { retries: 3 }));
        let TestApp { router, .. } = test_app_with(model, MemoryArtifactStore::new());

        let response = router
            .oneshot(post_json("/api/v1/generate", json!({"prompt": "Need a dev"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = read_json(response).await;
        assert_eq!(body["error"]["code"], "UPSTREAM_UNAVAILABLE");
        assert_eq!(body["error"]["retryable"], true);
    }

    #[tokio::test]
    async fn test_mid_stream_failure_ends_with_error_frame() {
        let application = application_row("u1", "Acme", "Engineer", Some("Rust"));
        let id = application.id;
        let store = MemoryArtifactStore::new().with_application(application);
        let model = ScriptedModel::new().with_stream(ScriptedStream::Open(vec![
            Ok("Dear".to_string()),
            Err(LlmError::Stream("overloaded".to_string())),
        ]));
        let TestApp { router, artifacts, .. } = test_app_with(model, store);

        let response = router
            .oneshot(post_json(
                &format!("/api/v1/applications/{id}/cover-letter"),
                json!({"user_id": "u1"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let mut assembler = StreamAssembler::new();
        assembler.push(&body);
        match assembler.finish() {
            Assembled::Failed { partial, reason } => {
                assert_eq!(partial, "Dear");
                assert!(reason.starts_with("GENERATION_FAILED"));
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(artifacts.application(id).unwrap().cover_letter, None);
    }

    #[tokio::test]
    async fn test_cold_email_for_unknown_application_is_404() {
        let TestApp { router, .. } = test_app_with(ScriptedModel::new(), MemoryArtifactStore::new());

        let response = router
            .oneshot(post_json(
                &format!("/api/v1/applications/{}/cold-email", uuid::Uuid::new_v4()),
                json!({"user_id": "u1"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(read_json(response).await["error"]["retryable"], false);
    }

    #[tokio::test]
    async fn test_cold_email_returns_json_and_persists() {
        let application = application_row("u1", "Acme", "Engineer", None);
        let id = application.id;
        let store = MemoryArtifactStore::new()
            .with_application(application)
            .with_profile(profile_row("u1"));
        let model = ScriptedModel::new()
            .with_completion(Ok(r#"{"subject":"Hello Acme","body":"Short pitch"}"#.to_string()));
        let TestApp { router, artifacts, .. } = test_app_with(model, store);

        let response = router
            .oneshot(post_json(
                &format!("/api/v1/applications/{id}/cold-email"),
                json!({"user_id": "u1", "tone": "Urgent"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            read_json(response).await,
            json!({"subject": "Hello Acme", "body": "Short pitch"})
        );
        assert!(artifacts.application(id).unwrap().cold_email.is_some());
    }

    #[tokio::test]
    async fn test_malformed_cold_email_is_502() {
        let application = application_row("u1", "Acme", "Engineer", None);
        let id = application.id;
        let store = MemoryArtifactStore::new().with_application(application);
        let model = ScriptedModel::new().with_completion(Ok("not json".to_string()));
        let TestApp { router, .. } = test_app_with(model, store);

        let response = router
            .oneshot(post_json(
                &format!("/api/v1/applications/{id}/cold-email"),
                json!({"user_id": "u1"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = read_json(response).await;
        assert_eq!(body["error"]["code"], "MALFORMED_OUTPUT");
        assert_eq!(body["error"]["retryable"], true);
    }

    #[tokio::test]
    async fn test_tailored_resume_without_upload_is_400() {
        let application = application_row("u1", "Acme", "Engineer", None);
        let id = application.id;
        let store = MemoryArtifactStore::new()
            .with_application(application)
            .with_profile(profile_row("u1"));
        let TestApp { router, .. } = test_app_with(ScriptedModel::new(), store);

        let response = router
            .oneshot(post_json(
                &format!("/api/v1/applications/{id}/tailored-resume"),
                json!({"user_id": "u1"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = read_json(response).await;
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("upload your résumé"));
    }

    #[tokio::test]
    async fn test_blank_user_id_is_rejected() {
        let TestApp { router, .. } = test_app_with(ScriptedModel::new(), MemoryArtifactStore::new());

        let response = router
            .oneshot(post_json(
                &format!("/api/v1/applications/{}/proposal", uuid::Uuid::new_v4()),
                json!({"user_id": " "}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
