//! Square Checkout Integration
//!
//! Creates hosted payment links ("quick pay" checkout). The purchase intent
//! rides along as the payment note; see [`crate::note`].

use async_trait::async_trait;
use cupids_core::{SharedClock, UserId};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::SquareConfig;
use crate::error::{PaymentError, Result};
use crate::note::{OrderNote, idempotency_key};

/// Square API version the request shapes below follow
pub const SQUARE_VERSION: &str = "2024-12-18";

/// Points are sold in yen only
pub const CURRENCY: &str = "JPY";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Request to create a checkout session
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckoutRequest {
    pub user_id: UserId,

    /// Charge in yen
    pub amount: i64,

    /// Points granted once paid
    pub points: u64,

    /// Optional client nonce for the idempotency key
    pub nonce: Option<String>,
}

/// Result of creating a checkout session
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    /// Payment link ID
    pub id: String,

    /// URL to redirect the buyer to
    pub checkout_url: String,

    pub idempotency_key: String,
}

/// Payment provider seam, so handlers can run against a fake in tests
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Mint a hosted payment link for the request
    async fn create_checkout(&self, request: CheckoutRequest) -> Result<CheckoutSession>;

    /// Provider name, for logs and health output
    fn name(&self) -> &str;
}

/// Square REST client
pub struct SquareClient {
    http: reqwest::Client,
    config: SquareConfig,
    base_url: String,
    clock: SharedClock,
}

impl SquareClient {
    /// Create a new Square client
    pub fn new(config: SquareConfig, clock: SharedClock) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| PaymentError::Config(format!("HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.environment.base_url().to_string(),
            config,
            clock,
        })
    }

    /// Overrides the base URL (for testing with wiremock).
    #[cfg(test)]
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    fn payment_link_request(&self, request: &CheckoutRequest) -> Result<CreatePaymentLinkRequest> {
        let now = self.clock.utc();
        let note = OrderNote::new(request.user_id.clone(), request.points, now);

        Ok(CreatePaymentLinkRequest {
            idempotency_key: idempotency_key(&request.user_id, now, request.nonce.as_deref()),
            quick_pay: QuickPay {
                name: format!("Cupids {} points", request.points),
                price_money: Money {
                    amount: request.amount,
                    currency: CURRENCY.to_string(),
                },
                location_id: self.config.credentials.location_id.clone(),
            },
            checkout_options: CheckoutOptions {
                redirect_url: self.config.redirect_url.clone(),
                ask_for_shipping_address: false,
            },
            pre_populated_data: PrePopulatedData {
                buyer_email: String::new(),
            },
            payment_note: note.encode()?,
        })
    }
}

#[async_trait]
impl PaymentProvider for SquareClient {
    async fn create_checkout(&self, request: CheckoutRequest) -> Result<CheckoutSession> {
        let body = self.payment_link_request(&request)?;

        tracing::debug!(
            user_id = %request.user_id,
            points = request.points,
            amount = request.amount,
            idempotency_key = %body.idempotency_key,
            "Creating Square payment link"
        );

        let response = self
            .http
            .post(format!("{}/v2/online-checkout/payment-links", self.base_url))
            .bearer_auth(self.config.access_token.expose_secret())
            .header("Square-Version", SQUARE_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        let parsed: CreatePaymentLinkResponse = serde_json::from_str(&text).unwrap_or_default();

        if !status.is_success() || !parsed.errors.is_empty() {
            let details = if parsed.errors.is_empty() {
                text
            } else {
                parsed
                    .errors
                    .iter()
                    .map(SquareApiError::describe)
                    .collect::<Vec<_>>()
                    .join("; ")
            };
            return Err(PaymentError::Square {
                status: status.as_u16(),
                details,
            });
        }

        let link = parsed.payment_link.ok_or_else(|| PaymentError::Square {
            status: status.as_u16(),
            details: "No payment link returned".into(),
        })?;

        tracing::info!(
            user_id = %request.user_id,
            payment_link_id = %link.id,
            "Created Square payment link"
        );

        Ok(CheckoutSession {
            id: link.id,
            checkout_url: link.url,
            idempotency_key: body.idempotency_key,
        })
    }

    fn name(&self) -> &str {
        "square"
    }
}

// ============================================================================
// Wire types
// ============================================================================

/// Money amount in the currency's smallest unit
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Serialize)]
struct CreatePaymentLinkRequest {
    idempotency_key: String,
    quick_pay: QuickPay,
    checkout_options: CheckoutOptions,
    pre_populated_data: PrePopulatedData,
    payment_note: String,
}

#[derive(Debug, Serialize)]
struct QuickPay {
    name: String,
    price_money: Money,
    location_id: String,
}

#[derive(Debug, Serialize)]
struct CheckoutOptions {
    redirect_url: String,
    ask_for_shipping_address: bool,
}

#[derive(Debug, Serialize)]
struct PrePopulatedData {
    buyer_email: String,
}

#[derive(Debug, Default, Deserialize)]
struct CreatePaymentLinkResponse {
    #[serde(default)]
    payment_link: Option<PaymentLink>,
    #[serde(default)]
    errors: Vec<SquareApiError>,
}

#[derive(Debug, Deserialize)]
struct PaymentLink {
    id: String,
    url: String,
}

#[derive(Debug, Deserialize)]
struct SquareApiError {
    #[serde(default)]
    category: String,
    #[serde(default)]
    code: String,
    #[serde(default)]
    detail: Option<String>,
}

impl SquareApiError {
    fn describe(&self) -> String {
        match &self.detail {
            Some(detail) => format!("{}/{}: {}", self.category, self.code, detail),
            None => format!("{}/{}", self.category, self.code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SquareCredentials, SquareEnvironment};
    use chrono::{TimeZone, Utc};
    use cupids_core::ManualClock;
    use secrecy::SecretString;
    use std::sync::Arc;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(base_url: &str) -> SquareClient {
        let config = SquareConfig {
            environment: SquareEnvironment::Sandbox,
            access_token: SecretString::from("sq-test-token".to_string()),
            credentials: SquareCredentials {
                application_id: "sandbox-app".into(),
                location_id: "LTEST".into(),
                webhook_signature_key: None,
            },
            redirect_url: "https://example.com/done".into(),
            webhook_url: None,
        };
        let clock = ManualClock::at(Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap());
        SquareClient::new(config, Arc::new(clock))
            .unwrap()
            .with_base_url(base_url.to_string())
    }

    fn request() -> CheckoutRequest {
        CheckoutRequest {
            user_id: "U1".into(),
            amount: 5000,
            points: 50,
            nonce: None,
        }
    }

    #[tokio::test]
    async fn test_create_checkout_success() {
        let server = MockServer::start().await;
        let millis = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap().timestamp_millis();

        Mock::given(method("POST"))
            .and(path("/v2/online-checkout/payment-links"))
            .and(header("authorization", "Bearer sq-test-token"))
            .and(header("square-version", SQUARE_VERSION))
            .and(body_partial_json(serde_json::json!({
                "idempotency_key": format!("U1-{millis}"),
                "quick_pay": {
                    "price_money": {"amount": 5000, "currency": "JPY"},
                    "location_id": "LTEST"
                },
                "checkout_options": {"ask_for_shipping_address": false},
                "payment_note": format!(r#"{{"userId":"U1","points":50,"timestamp":{millis}}}"#)
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "payment_link": {
                    "id": "PL1",
                    "version": 1,
                    "url": "https://sandbox.square.link/u/abc"
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let session = test_client(&server.uri())
            .create_checkout(request())
            .await
            .unwrap();

        assert_eq!(session.id, "PL1");
        assert_eq!(session.checkout_url, "https://sandbox.square.link/u/abc");
    }

    #[tokio::test]
    async fn test_create_checkout_provider_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v2/online-checkout/payment-links"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "errors": [{
                    "category": "INVALID_REQUEST_ERROR",
                    "code": "INVALID_VALUE",
                    "detail": "location_id is invalid"
                }]
            })))
            .mount(&server)
            .await;

        let err = test_client(&server.uri())
            .create_checkout(request())
            .await
            .unwrap_err();

        match err {
            PaymentError::Square { status, details } => {
                assert_eq!(status, 400);
                assert!(details.contains("location_id is invalid"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_nonce_overrides_timestamp_key() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({"idempotency_key": "U1-n-123"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "payment_link": {"id": "PL2", "url": "https://sandbox.square.link/u/n"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut req = request();
        req.nonce = Some("n-123".into());
        let session = test_client(&server.uri()).create_checkout(req).await.unwrap();
        assert_eq!(session.idempotency_key, "U1-n-123");
    }
}
