//! Server Configuration
//!
//! Everything is read from the environment once at startup. Provider
//! sections are optional: a missing Square token disables checkout and a
//! missing FCM project disables notifications, but the server still runs.

use std::path::PathBuf;

use anyhow::Context;
use cupids_notify::FcmConfig;
use cupids_payments::SquareConfig;
use secrecy::SecretString;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bind_addr: String,
    pub square: Option<SquareConfig>,
    pub admin_key: Option<SecretString>,
    pub fcm: Option<FcmConfig>,
    /// JSON file to preload the in-memory store from
    pub seed_file: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let square = SquareConfig::from_lookup(&lookup).context("Invalid Square configuration")?;
        if let Some(square) = &square {
            if square.credentials.webhook_signature_key.is_some() && square.webhook_url.is_none() {
                anyhow::bail!("SQUARE_WEBHOOK_URL is required when a webhook signature key is set");
            }
        }

        Ok(Self {
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            square,
            admin_key: get("ADMIN_KEY").map(SecretString::from),
            fcm: FcmConfig::from_lookup(&lookup),
            seed_file: get("CUPIDS_SEED_FILE").map(PathBuf::from),
        })
    }

    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}
