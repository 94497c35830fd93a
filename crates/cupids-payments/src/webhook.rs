//! Square Webhook Handling
//!
//! Turns payment webhooks into ledger credits. Only `payment.created` and
//! `payment.updated` events whose payment is `COMPLETED` are acted on.
//! Everything else, including events we cannot read, is acknowledged so
//! Square does not keep redelivering it. Only a failed ledger transaction
//! is reported back as an error, which lets Square retry.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use cupids_core::{CreditOutcome, Ledger, PaymentId, PurchaseCredit};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::Sha256;

use crate::checkout::Money;
use crate::error::{PaymentError, Result};
use crate::note::OrderNote;

/// Header carrying the webhook signature
pub const SIGNATURE_HEADER: &str = "x-square-hmacsha256-signature";

const COMPLETED: &str = "COMPLETED";

type HmacSha256 = Hmac<Sha256>;

/// Raw webhook envelope
#[derive(Clone, Debug, Deserialize)]
pub struct SquareEvent {
    #[serde(rename = "type")]
    pub event_type: String,

    #[serde(default)]
    pub event_id: Option<String>,

    #[serde(default)]
    pub data: Option<EventData>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct EventData {
    #[serde(default)]
    pub object: Option<EventObject>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct EventObject {
    #[serde(default)]
    pub payment: Option<Payment>,
}

/// The subset of a Square payment we read
#[derive(Clone, Debug, Deserialize)]
pub struct Payment {
    pub id: String,

    #[serde(default)]
    pub status: String,

    #[serde(default)]
    pub note: Option<String>,

    #[serde(default, alias = "totalMoney")]
    pub total_money: Option<Money>,
}

/// Parsed webhook event
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebhookEvent {
    /// Payment completed with a readable note - credit it
    PaymentCompleted {
        payment_id: PaymentId,
        amount: i64,
        note: OrderNote,
    },

    /// Payment completed but the note is missing or unreadable
    UnreadableNote { payment_id: PaymentId, reason: String },

    /// Anything we do not act on
    Ignored { event_type: String, reason: String },
}

/// What handling an event did
#[derive(Clone, Debug, PartialEq)]
pub enum WebhookOutcome {
    Credited(CreditOutcome),
    /// Dropped for good (no dead-letter retry)
    Dropped { reason: String },
    Ignored,
}

/// Webhook signature verifier
///
/// Square signs `notification_url + body` with HMAC-SHA256 and sends the
/// base64 digest.
#[derive(Clone, Debug)]
pub struct SignatureVerifier {
    key: SecretString,
    notification_url: String,
}

impl SignatureVerifier {
    pub fn new(key: SecretString, notification_url: impl Into<String>) -> Self {
        Self {
            key,
            notification_url: notification_url.into(),
        }
    }

    fn mac(&self, body: &[u8]) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(self.key.expose_secret().as_bytes())
            .map_err(|e| PaymentError::Config(format!("webhook signature key: {e}")))?;
        mac.update(self.notification_url.as_bytes());
        mac.update(body);
        Ok(mac)
    }

    /// Signature Square would send for this body
    pub fn sign(&self, body: impl AsRef<[u8]>) -> Result<String> {
        Ok(BASE64.encode(self.mac(body.as_ref())?.finalize().into_bytes()))
    }

    /// Verify a signature header in constant time
    pub fn verify(&self, body: impl AsRef<[u8]>, signature: Option<&str>) -> Result<()> {
        let signature = signature
            .ok_or_else(|| PaymentError::WebhookSignature("missing signature header".into()))?;
        let expected = BASE64
            .decode(signature.trim())
            .map_err(|_| PaymentError::WebhookSignature("signature is not base64".into()))?;

        self.mac(body.as_ref())?
            .verify_slice(&expected)
            .map_err(|_| PaymentError::WebhookSignature("signature mismatch".into()))
    }
}

/// Webhook handler
#[derive(Clone)]
pub struct WebhookHandler {
    ledger: Ledger,
    verifier: Option<SignatureVerifier>,
}

impl WebhookHandler {
    pub fn new(ledger: Ledger) -> Self {
        Self {
            ledger,
            verifier: None,
        }
    }

    /// Require signed webhooks
    pub fn with_verifier(mut self, verifier: SignatureVerifier) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Check the signature, if signing is configured
    pub fn authenticate(&self, body: impl AsRef<[u8]>, signature: Option<&str>) -> Result<()> {
        match &self.verifier {
            Some(verifier) => verifier.verify(body, signature),
            None => Ok(()),
        }
    }

    /// Parse a raw body into our event type. Never fails: unreadable
    /// payloads become [`WebhookEvent::Ignored`].
    pub fn parse_event(&self, body: impl AsRef<[u8]>) -> WebhookEvent {
        match serde_json::from_slice::<SquareEvent>(body.as_ref()) {
            Ok(event) => classify(event),
            Err(e) => WebhookEvent::Ignored {
                event_type: "unknown".into(),
                reason: format!("unparseable envelope: {e}"),
            },
        }
    }

    /// Process a webhook event
    pub async fn handle(&self, event: WebhookEvent) -> Result<WebhookOutcome> {
        match event {
            WebhookEvent::PaymentCompleted {
                payment_id,
                amount,
                note,
            } => {
                tracing::info!(
                    payment_id = %payment_id,
                    user_id = %note.user_id,
                    points = note.points,
                    "Processing completed payment"
                );

                let credit = PurchaseCredit {
                    user_id: note.user_id,
                    points: note.points,
                    amount,
                    payment_id,
                };
                let outcome = self.ledger.credit_purchase(&credit).await?;
                Ok(WebhookOutcome::Credited(outcome))
            }

            WebhookEvent::UnreadableNote { payment_id, reason } => {
                tracing::error!(
                    payment_id = %payment_id,
                    reason = %reason,
                    "Completed payment has no usable order note, dropping"
                );
                Ok(WebhookOutcome::Dropped { reason })
            }

            WebhookEvent::Ignored { event_type, reason } => {
                tracing::debug!(event_type = %event_type, reason = %reason, "Ignoring webhook event");
                Ok(WebhookOutcome::Ignored)
            }
        }
    }
}

fn classify(event: SquareEvent) -> WebhookEvent {
    tracing::info!(
        event_type = %event.event_type,
        event_id = ?event.event_id,
        "Received Square webhook"
    );

    if !matches!(event.event_type.as_str(), "payment.created" | "payment.updated") {
        return WebhookEvent::Ignored {
            reason: "not a payment event".into(),
            event_type: event.event_type,
        };
    }

    let Some(payment) = event.data.and_then(|d| d.object).and_then(|o| o.payment) else {
        return WebhookEvent::Ignored {
            reason: "payment object missing".into(),
            event_type: event.event_type,
        };
    };

    if payment.status != COMPLETED {
        return WebhookEvent::Ignored {
            reason: format!("payment status {}", payment.status),
            event_type: event.event_type,
        };
    }

    let payment_id = PaymentId::new(payment.id);
    match OrderNote::decode(payment.note.as_deref()) {
        Ok(note) => WebhookEvent::PaymentCompleted {
            payment_id,
            amount: payment.total_money.map(|m| m.amount).unwrap_or_default(),
            note,
        },
        Err(e) => WebhookEvent::UnreadableNote {
            payment_id,
            reason: e.to_string(),
        },
    }
}
