//! Inbound payment events, parsed only from verified bytes.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::payments::signature::VerifiedBody;

/// Header the processor may also use to carry the event name.
pub const EVENT_NAME_HEADER: &str = "X-Event-Name";

/// Keys that may carry the subject user id inside `custom_data`, in priority order.
/// Checkout sessions created by this service write `user_id`; older client-side
/// checkouts used `userId`.
pub const SUBJECT_KEYS: &[&str] = &["user_id", "userId"];

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    meta: Meta,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Default, Deserialize)]
struct Meta {
    event_name: Option<String>,
    custom_data: Option<Map<String, Value>>,
}

/// A payment processor notification whose signature has been verified.
#[derive(Debug, Clone)]
pub struct PaymentEvent {
    pub event_name: Option<String>,
    /// Custom data attached at checkout. Empty when the processor sent none.
    pub custom_data: Map<String, Value>,
    pub data: Value,
}

impl PaymentEvent {
    /// Parses a verified webhook body.
    ///
    /// The event name comes from `meta.event_name`, falling back to the event-name header.
    /// Custom data comes from `meta.custom_data`, falling back to `data.attributes.custom_data`.
    pub fn parse(
        body: VerifiedBody<'_>,
        event_name_header: Option<&str>,
    ) -> Result<Self, serde_json::Error> {
        let envelope: Envelope = serde_json::from_slice(body.bytes())?;

        let event_name = envelope
            .meta
            .event_name
            .filter(|n| !n.trim().is_empty())
            .or_else(|| {
                event_name_header
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .map(str::to_string)
            });

        let custom_data = envelope
            .meta
            .custom_data
            .or_else(|| {
                envelope
                    .data
                    .pointer("/attributes/custom_data")
                    .and_then(Value::as_object)
                    .cloned()
            })
            .unwrap_or_default();

        Ok(Self {
            event_name,
            custom_data,
            data: envelope.data,
        })
    }

    /// The first non-empty string found under `SUBJECT_KEYS`, in order.
    pub fn subject(&self) -> Option<&str> {
        SUBJECT_KEYS.iter().find_map(|key| {
            self.custom_data
                .get(*key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|id| !id.is_empty())
        })
    }

    pub fn event_name_or_unknown(&self) -> &str {
        self.event_name.as_deref().unwrap_or("<unnamed>")
    }
}
