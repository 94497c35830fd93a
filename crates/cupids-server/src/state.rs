//! Application State

use std::sync::Arc;

use cupids_core::{DocumentStore, Ledger, SharedClock};
use cupids_notify::{FcmClient, Notifier, PushRegistry, PushSender};
use cupids_payments::{
    AdminKey, ManualCredit, PaymentProvider, SignatureVerifier, SquareClient, WebhookHandler,
};
use secrecy::SecretString;

use crate::config::AppConfig;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Document store shared by every pipeline
    pub store: Arc<dyn DocumentStore>,

    pub clock: SharedClock,

    /// Checkout provider (optional - None if Square is not configured)
    pub checkout: Option<Arc<dyn PaymentProvider>>,

    pub webhook: WebhookHandler,

    pub manual_credit: ManualCredit,

    /// New-message notifier (optional - None if push is not configured)
    pub notifier: Option<Notifier>,

    pub push_registry: PushRegistry,
}

impl AppState {
    /// State with no external providers: checkout and push disabled,
    /// webhooks unsigned.
    pub fn new(store: Arc<dyn DocumentStore>, clock: SharedClock, admin_key: AdminKey) -> Self {
        let ledger = Ledger::new(store.clone(), clock.clone());

        Self {
            checkout: None,
            webhook: WebhookHandler::new(ledger.clone()),
            manual_credit: ManualCredit::new(ledger, admin_key),
            notifier: None,
            push_registry: PushRegistry::new(store.clone(), clock.clone()),
            store,
            clock,
        }
    }

    pub fn with_checkout(mut self, provider: Arc<dyn PaymentProvider>) -> Self {
        self.checkout = Some(provider);
        self
    }

    pub fn with_push_sender(mut self, sender: Arc<dyn PushSender>) -> Self {
        self.notifier = Some(Notifier::new(self.store.clone(), sender, self.clock.clone()));
        self
    }

    pub fn with_webhook_verifier(mut self, verifier: SignatureVerifier) -> Self {
        self.webhook = self.webhook.with_verifier(verifier);
        self
    }

    /// Wire real providers from configuration
    pub fn from_config(
        config: &AppConfig,
        store: Arc<dyn DocumentStore>,
        clock: SharedClock,
    ) -> anyhow::Result<Self> {
        let admin_key = match &config.admin_key {
            Some(key) => AdminKey::new(key.clone()),
            None => {
                tracing::warn!("⚠ ADMIN_KEY not set - manual credits will be rejected");
                AdminKey::new(SecretString::from(String::new()))
            }
        };

        let mut state = Self::new(store, clock.clone(), admin_key);

        match &config.square {
            Some(square) => {
                if let (Some(key), Some(url)) =
                    (&square.credentials.webhook_signature_key, &square.webhook_url)
                {
                    state = state.with_webhook_verifier(SignatureVerifier::new(key.clone(), url.clone()));
                    tracing::info!("✓ Square webhook signatures verified");
                } else {
                    tracing::warn!("⚠ No webhook signature key - Square webhooks are not verified");
                }

                tracing::info!(
                    environment = square.environment.as_str(),
                    location_id = %square.credentials.location_id,
                    "✓ Square configured"
                );
                let client = SquareClient::new(square.clone(), clock)?;
                state = state.with_checkout(Arc::new(client));
            }
            None => {
                tracing::warn!("⚠ Square not configured - checkout disabled");
                tracing::warn!("  Set SQUARE_ACCESS_TOKEN and SQUARE_SANDBOX_LOCATION_ID in .env");
            }
        }

        match &config.fcm {
            Some(fcm) => {
                tracing::info!(project_id = %fcm.project_id, "✓ FCM configured");
                state = state.with_push_sender(Arc::new(FcmClient::new(fcm.clone())?));
            }
            None => {
                tracing::warn!("⚠ FCM not configured - push notifications disabled");
            }
        }

        Ok(state)
    }
}
