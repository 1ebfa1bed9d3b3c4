//! Checkout sessions with the payment processor.
//!
//! The user id is written into the checkout's custom data under `user_id`, which is
//! the first key the reconciler looks for when the `order_created` webhook arrives.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{error, info};

use crate::config::Config;

const LEMONSQUEEZY_CHECKOUTS_URL: &str = "https://api.lemonsqueezy.com/v1/checkouts";
const JSON_API: &str = "application/vnd.api+json";

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("payment processor rejected checkout: {0}")]
    Rejected(String),

    #[error("payment processor response had no checkout URL")]
    MissingUrl,
}

#[derive(Debug, Deserialize)]
struct CheckoutResponse {
    #[serde(default)]
    data: Option<CheckoutData>,
    #[serde(default)]
    errors: Vec<ApiError>,
}

#[derive(Debug, Deserialize)]
struct CheckoutData {
    attributes: CheckoutAttributes,
}

#[derive(Debug, Deserialize)]
struct CheckoutAttributes {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    detail: Option<String>,
    title: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckoutSession {
    pub url: String,
}

#[derive(Clone)]
pub struct CheckoutClient {
    client: Client,
    api_key: String,
    store_id: String,
    variant_id: String,
    redirect_url: String,
}

impl CheckoutClient {
    pub fn new(config: &Config) -> Result<Self, CheckoutError> {
        Ok(Self {
            client: Client::builder().timeout(Duration::from_secs(20)).build()?,
            api_key: config.lemonsqueezy_api_key.clone(),
            store_id: config.lemonsqueezy_store_id.clone(),
            variant_id: config.lemonsqueezy_variant_id.clone(),
            redirect_url: format!("{}/payment/success", config.app_url.trim_end_matches('/')),
        })
    }

    /// Creates a hosted checkout for the Pro variant and returns its URL.
    pub async fn create_checkout(
        &self,
        user_id: &str,
        email: &str,
    ) -> Result<CheckoutSession, CheckoutError> {
        let body = self.checkout_body(user_id, email);

        let response = self
            .client
            .post(LEMONSQUEEZY_CHECKOUTS_URL)
            .bearer_auth(&self.api_key)
            .header("content-type", JSON_API)
            .header("accept", JSON_API)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let parsed: CheckoutResponse = response.json().await?;
        let url = extract_checkout_url(parsed).map_err(|e| {
            error!("Checkout creation failed (status {status}): {e}");
            e
        })?;

        info!(user_id, "Checkout session created");
        Ok(CheckoutSession { url })
    }

    fn checkout_body(&self, user_id: &str, email: &str) -> serde_json::Value {
        json!({
            "data": {
                "type": "checkouts",
                "attributes": {
                    "checkout_data": {
                        "email": email,
                        "custom": {
                            "user_id": user_id,
                            "user_email": email
                        }
                    },
                    "product_options": {
                        "redirect_url": self.redirect_url
                    }
                },
                "relationships": {
                    "store": { "data": { "type": "stores", "id": self.store_id } },
                    "variant": { "data": { "type": "variants", "id": self.variant_id } }
                }
            }
        })
    }
}

fn extract_checkout_url(response: CheckoutResponse) -> Result<String, CheckoutError> {
    if let Some(first) = response.errors.into_iter().next() {
        return Err(CheckoutError::Rejected(
            first
                .detail
                .or(first.title)
                .unwrap_or_else(|| "unknown error".to_string()),
        ));
    }
    response
        .data
        .and_then(|d| d.attributes.url)
        .filter(|u| !u.is_empty())
        .ok_or(CheckoutError::MissingUrl)
}
