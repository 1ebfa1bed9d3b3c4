//! Entitlement Reconciler: applies verified payment events to durable user state.
//!
//! Only `UPGRADE_EVENTS` change anything. Every other event name is acknowledged and
//! ignored so the processor never retries deliveries we do not care about.
//! Applying the same event twice rewrites the same values.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::models::profile::Entitlement;
use crate::payments::event::PaymentEvent;
use crate::payments::store::EntitlementStore;

/// Event names that unlock Pro.
pub const UPGRADE_EVENTS: &[&str] = &["order_created"];

/// Credits granted with Pro. Effectively unlimited for the generation UI.
pub const PRO_CREDIT_CEILING: i32 = 100_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Upgraded(Entitlement),
    Ignored { event_name: String },
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("event '{event_name}' carries no user id in custom data")]
    MissingSubject {
        event_name: String,
        custom_data: Value,
    },

    #[error("no user profile for user '{user_id}'")]
    SubjectNotFound { user_id: String },

    #[error("entitlement store failure: {0}")]
    Store(#[from] sqlx::Error),
}

#[derive(Clone)]
pub struct EntitlementReconciler {
    store: Arc<dyn EntitlementStore>,
}

impl EntitlementReconciler {
    pub fn new(store: Arc<dyn EntitlementStore>) -> Self {
        Self { store }
    }

    pub async fn apply(&self, event: &PaymentEvent) -> Result<ReconcileOutcome, ReconcileError> {
        let event_name = event.event_name_or_unknown();

        if !UPGRADE_EVENTS.contains(&event_name) {
            info!(event_name, "Ignoring payment event");
            return Ok(ReconcileOutcome::Ignored {
                event_name: event_name.to_string(),
            });
        }

        let Some(user_id) = event.subject() else {
            let custom_data = Value::Object(event.custom_data.clone());
            warn!(
                event_name,
                custom_data = %custom_data,
                "Payment event has no resolvable user id"
            );
            return Err(ReconcileError::MissingSubject {
                event_name: event_name.to_string(),
                custom_data,
            });
        };

        info!(event_name, user_id, "Upgrading user to Pro");

        match self.store.grant_pro(user_id, PRO_CREDIT_CEILING).await? {
            Some(entitlement) => {
                info!(
                    user_id,
                    credits = entitlement.credits,
                    "User upgraded to Pro"
                );
                Ok(ReconcileOutcome::Upgraded(entitlement))
            }
            None => {
                // Paid but unknown locally: needs manual reconciliation.
                let custom_data = Value::Object(event.custom_data.clone());
                error!(
                    event_name,
                    user_id,
                    custom_data = %custom_data,
                    "Paid event for unknown user profile"
                );
                Err(ReconcileError::SubjectNotFound {
                    user_id: user_id.to_string(),
                })
            }
        }
    }
}
