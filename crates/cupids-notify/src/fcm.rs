//! Firebase Cloud Messaging Client
//!
//! Sends through the FCM HTTP v1 API. The OAuth access token is supplied by
//! the deployment (metadata server or `gcloud auth print-access-token`);
//! minting it is outside this crate.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::{NotifyError, Result};
use crate::push::{PushMessage, PushSender};

const FCM_BASE_URL: &str = "https://fcm.googleapis.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Site the relative click links are resolved against
pub const DEFAULT_APP_URL: &str = "https://cupids-seven.vercel.app";

/// FCM credentials
#[derive(Clone, Debug)]
pub struct FcmConfig {
    pub project_id: String,
    pub access_token: SecretString,
    pub app_url: String,
}

impl FcmConfig {
    /// `None` when FCM is not configured (notifications disabled)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Some(Self {
            project_id: get("FCM_PROJECT_ID")?,
            access_token: SecretString::from(get("FCM_ACCESS_TOKEN")?),
            app_url: get("APP_URL").unwrap_or_else(|| DEFAULT_APP_URL.to_string()),
        })
    }
}

/// FCM HTTP v1 client
pub struct FcmClient {
    http: reqwest::Client,
    config: FcmConfig,
    base_url: String,
}

impl FcmClient {
    pub fn new(config: FcmConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| NotifyError::Config(format!("HTTP client: {e}")))?;

        Ok(Self {
            http,
            config,
            base_url: FCM_BASE_URL.to_string(),
        })
    }

    /// Overrides the base URL (for testing with wiremock).
    #[cfg(test)]
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    fn absolute_link(&self, link: &str) -> String {
        if link.starts_with("https://") {
            link.to_string()
        } else {
            format!("{}{}", self.config.app_url.trim_end_matches('/'), link)
        }
    }

    fn envelope<'a>(&self, message: &'a PushMessage) -> SendRequest<'a> {
        SendRequest {
            message: FcmMessage {
                token: &message.token,
                notification: FcmNotification {
                    title: &message.title,
                    body: &message.body,
                },
                data: &message.data,
                webpush: message.link.as_deref().map(|link| WebpushConfig {
                    fcm_options: WebpushFcmOptions {
                        link: self.absolute_link(link),
                    },
                }),
            },
        }
    }
}

#[async_trait]
impl PushSender for FcmClient {
    async fn send(&self, message: &PushMessage) -> Result<String> {
        let url = format!(
            "{}/v1/projects/{}/messages:send",
            self.base_url, self.config.project_id
        );

        let response = self
            .http
            .post(url)
            .bearer_auth(self.config.access_token.expose_secret())
            .json(&self.envelope(message))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let sent: SendResponse = response.json().await?;
            return Ok(sent.name);
        }

        let text = response.text().await.unwrap_or_default();
        let error: ErrorResponse = serde_json::from_str(&text).unwrap_or_default();

        if error.error.status == "NOT_FOUND" || error.error.status == "UNREGISTERED" {
            return Err(NotifyError::Unregistered);
        }

        Err(NotifyError::Push {
            status: status.as_u16(),
            details: if error.error.message.is_empty() {
                text
            } else {
                error.error.message
            },
        })
    }

    fn name(&self) -> &str {
        "fcm"
    }
}

#[derive(Serialize)]
struct SendRequest<'a> {
    message: FcmMessage<'a>,
}

#[derive(Serialize)]
struct FcmMessage<'a> {
    token: &'a str,
    notification: FcmNotification<'a>,
    data: &'a BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    webpush: Option<WebpushConfig>,
}

#[derive(Serialize)]
struct FcmNotification<'a> {
    title: &'a str,
    body: &'a str,
}

#[derive(Serialize)]
struct WebpushConfig {
    fcm_options: WebpushFcmOptions,
}

#[derive(Serialize)]
struct WebpushFcmOptions {
    link: String,
}

#[derive(Deserialize)]
struct SendResponse {
    name: String,
}

#[derive(Default, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    error: ErrorBody,
}

#[derive(Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}
