use axum::{
    body::Bytes,
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::errors::AppError;
use crate::models::profile::Entitlement;
use crate::payments::checkout::CheckoutSession;
use crate::payments::event::{PaymentEvent, EVENT_NAME_HEADER};
use crate::payments::reconciler::ReconcileOutcome;
use crate::payments::signature::{Verification, SIGNATURE_HEADER};
use crate::state::AppState;

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// POST /api/v1/webhooks/lemon
/// The body is taken as raw bytes: the signature covers exactly what was sent.
pub async fn handle_lemon_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let verified = match state.verifier.verify(&body, header_str(&headers, SIGNATURE_HEADER)) {
        Verification::Valid(verified) => verified,
        Verification::Invalid(reason) => {
            warn!(?reason, body_len = body.len(), "Rejected webhook with invalid signature");
            return Err(AppError::InvalidSignature);
        }
    };

    let event = PaymentEvent::parse(verified, header_str(&headers, EVENT_NAME_HEADER))
        .map_err(|e| AppError::Validation(format!("Invalid webhook payload: {e}")))?;

    match state.reconciler.apply(&event).await? {
        ReconcileOutcome::Upgraded(entitlement) => {
            info!(user_id = %entitlement.user_id, "Webhook applied");
        }
        ReconcileOutcome::Ignored { event_name } => {
            info!(%event_name, "Webhook acknowledged without changes");
        }
    }

    Ok(Json(json!({ "received": true })))
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub user_id: String,
    pub email: String,
}

/// POST /api/v1/billing/checkout
pub async fn handle_create_checkout(
    State(state): State<AppState>,
    Json(req): Json<CheckoutRequest>,
) -> Result<Json<CheckoutSession>, AppError> {
    let user_id = req.user_id.trim();
    let email = req.email.trim();
    if user_id.is_empty() || email.is_empty() {
        return Err(AppError::Validation(
            "user_id and email are required".to_string(),
        ));
    }
    let session = state.checkout.create_checkout(user_id, email).await?;
    Ok(Json(session))
}

#[derive(Debug, Deserialize)]
pub struct UserIdQuery {
    pub user_id: String,
}

/// GET /api/v1/billing/entitlement
pub async fn handle_get_entitlement(
    State(state): State<AppState>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<Entitlement>, AppError> {
    let entitlement = state
        .entitlements
        .get(&params.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No profile for user {}", params.user_id)))?;
    Ok(Json(entitlement))
}
