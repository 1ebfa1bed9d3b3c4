use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::Config;
use crate::extraction::engine::ExtractionEngine;
use crate::generation::orchestrator::GenerationOrchestrator;
use crate::generation::store::ArtifactStore;
use crate::generation::streaming::StreamingGenerator;
use crate::llm_client::LanguageModel;
use crate::payments::checkout::CheckoutClient;
use crate::payments::reconciler::EntitlementReconciler;
use crate::payments::signature::SignatureVerifier;
use crate::payments::store::EntitlementStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Keyed once at startup from `LEMONSQUEEZY_WEBHOOK_SECRET`.
    pub verifier: Arc<SignatureVerifier>,
    pub reconciler: EntitlementReconciler,
    pub entitlements: Arc<dyn EntitlementStore>,
    pub checkout: CheckoutClient,
    pub extractor: ExtractionEngine,
    pub orchestrator: GenerationOrchestrator,
}

impl AppState {
    /// Wires every component from its dependencies.
    pub fn build(
        config: &Config,
        model: Arc<dyn LanguageModel>,
        entitlements: Arc<dyn EntitlementStore>,
        artifacts: Arc<dyn ArtifactStore>,
    ) -> Result<Self> {
        let verifier = SignatureVerifier::new(&config.webhook_secret)
            .map_err(|e| anyhow::anyhow!("Invalid webhook secret: {e}"))?;
        let checkout = CheckoutClient::new(config).context("Failed to build checkout client")?;

        let extractor = ExtractionEngine::new(
            model.clone(),
            config.extraction_timeout,
            config.extraction_char_ceiling,
        );
        let streaming = StreamingGenerator::new(model, config.generation_timeout);
        let orchestrator = GenerationOrchestrator::new(streaming, extractor.clone(), artifacts);

        Ok(Self {
            verifier: Arc::new(verifier),
            reconciler: EntitlementReconciler::new(entitlements.clone()),
            entitlements,
            checkout,
            extractor,
            orchestrator,
        })
    }
}
