use std::fmt;
use std::time::Duration;

use anyhow::{bail, Context, Result};

/// Application configuration loaded from environment variables.
/// Startup fails if any required variable is missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub anthropic_api_key: String,
    pub webhook_secret: WebhookSecret,
    pub lemonsqueezy_api_key: String,
    pub lemonsqueezy_store_id: String,
    pub lemonsqueezy_variant_id: String,
    /// Public base URL of the web app, used for the post-checkout redirect.
    pub app_url: String,
    pub port: u16,
    pub rust_log: String,
    pub generation_timeout: Duration,
    pub extraction_timeout: Duration,
    /// Extraction input is cut to this many characters before it reaches the model.
    pub extraction_char_ceiling: usize,
}

/// Shared secret for webhook signatures. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct WebhookSecret(String);

impl WebhookSecret {
    pub fn new(secret: impl Into<String>) -> Result<Self> {
        let secret = secret.into();
        if secret.trim().is_empty() {
            bail!("Webhook secret must not be empty");
        }
        Ok(Self(secret))
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for WebhookSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WebhookSecret(<redacted>)")
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |key: &str| -> Result<String> {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .with_context(|| format!("Required environment variable '{key}' is not set"))
        };

        Ok(Config {
            database_url: require("DATABASE_URL")?,
            database_max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?,
            anthropic_api_key: require("ANTHROPIC_API_KEY")?,
            webhook_secret: WebhookSecret::new(require("LEMONSQUEEZY_WEBHOOK_SECRET")?)?,
            lemonsqueezy_api_key: require("LEMONSQUEEZY_API_KEY")?,
            lemonsqueezy_store_id: require("LEMONSQUEEZY_STORE_ID")?,
            lemonsqueezy_variant_id: require("LEMONSQUEEZY_VARIANT_ID")?,
            app_url: require("APP_URL")?,
            port: lookup("PORT")
                .unwrap_or_else(|| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            generation_timeout: Duration::from_secs(parse_or(
                &lookup,
                "GENERATION_TIMEOUT_SECS",
                30,
            )?),
            extraction_timeout: Duration::from_secs(parse_or(
                &lookup,
                "EXTRACTION_TIMEOUT_SECS",
                60,
            )?),
            extraction_char_ceiling: parse_or(&lookup, "EXTRACTION_CHAR_CEILING", 15_000)?,
        })
    }
}

/// Parse an optional numeric setting. Zero is rejected; no caller can run with it.
fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr + Default + PartialEq,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    let value = raw
        .trim()
        .parse::<T>()
        .with_context(|| format!("'{key}' must be a positive number, got '{raw}'"))?;
    if value == T::default() {
        bail!("'{key}' must be a positive number, got '{raw}'");
    }
    Ok(value)
}
