//! # cupids-payments
//!
//! Point purchases through Square's hosted checkout.
//!
//! ## Flow
//!
//! ```text
//! ┌──────────┐  createCheckout  ┌──────────────┐   pays   ┌──────────────┐
//! │  Client  │─────────────────▶│ Square link  │─────────▶│ Square       │
//! └──────────┘   (note embeds   └──────────────┘          └──────┬───────┘
//!                 userId+points)                                 │ payment.updated
//!                                                                ▼
//!                            ┌────────────┐   credit once  ┌──────────────┐
//!                            │   Ledger   │◀───────────────│   Webhook    │
//!                            └────────────┘                └──────────────┘
//! ```
//!
//! Nothing is persisted at checkout time: the intent lives only in the
//! payment note until the webhook brings it back. The ledger credits each
//! Square payment id at most once, so redelivered webhooks are harmless.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cupids_payments::{CheckoutRequest, PaymentProvider, SquareClient, SquareConfig};
//!
//! let config = SquareConfig::from_lookup(|key| std::env::var(key).ok())?
//!     .expect("SQUARE_ACCESS_TOKEN set");
//! let square = SquareClient::new(config, cupids_core::clock::system())?;
//!
//! let session = square.create_checkout(CheckoutRequest {
//!     user_id: "U1".into(),
//!     amount: 5000,
//!     points: 50,
//!     nonce: None,
//! }).await?;
//!
//! // Redirect the buyer to: session.checkout_url
//! ```

mod admin;
mod checkout;
mod config;
mod error;
mod input;
mod note;
mod webhook;

pub use admin::{AdminKey, ManualCredit, ManualCreditReceipt, ManualCreditRequest};
pub use checkout::{
    CURRENCY, CheckoutRequest, CheckoutSession, Money, PaymentProvider, SquareClient,
};
pub use config::{SquareConfig, SquareCredentials, SquareEnvironment};
pub use error::{PaymentError, Result};
pub use input::FieldValue;
pub use note::{OrderNote, idempotency_key};
pub use webhook::{
    SIGNATURE_HEADER, SignatureVerifier, SquareEvent, WebhookEvent, WebhookHandler,
    WebhookOutcome,
};
