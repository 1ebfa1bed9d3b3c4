pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::extraction::handlers as extraction;
use crate::generation::handlers as generation;
use crate::payments::handlers as payments;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Payments
        .route("/api/v1/webhooks/lemon", post(payments::handle_lemon_webhook))
        .route(
            "/api/v1/billing/checkout",
            post(payments::handle_create_checkout),
        )
        .route(
            "/api/v1/billing/entitlement",
            get(payments::handle_get_entitlement),
        )
        // Extraction
        .route(
            "/api/v1/extract/resume",
            post(extraction::handle_extract_resume),
        )
        // Generation
        .route("/api/v1/generate", post(generation::handle_generate))
        .route(
            "/api/v1/applications/:id/proposal",
            post(generation::handle_application_proposal),
        )
        .route(
            "/api/v1/applications/:id/cover-letter",
            post(generation::handle_cover_letter),
        )
        .route(
            "/api/v1/applications/:id/cold-email",
            post(generation::handle_cold_email),
        )
        .route(
            "/api/v1/applications/:id/tailored-resume",
            post(generation::handle_tailored_resume),
        )
        .with_state(state)
}
