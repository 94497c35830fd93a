//! Push Token Registration
//!
//! Devices register their FCM token against the signed-in account, and can
//! opt out again. Both edits leave the throttle timestamp alone.

use cupids_core::transaction::{self, MAX_ATTEMPTS};
use cupids_core::{DocumentStore, Role, SharedClock, StoreError, UserId, Write};
use std::sync::Arc;

use crate::error::{NotifyError, Result};

#[derive(Clone)]
pub struct PushRegistry {
    store: Arc<dyn DocumentStore>,
    clock: SharedClock,
}

impl PushRegistry {
    pub fn new(store: Arc<dyn DocumentStore>, clock: SharedClock) -> Self {
        Self { store, clock }
    }

    /// Store `token` for the account and enable notifications
    pub async fn register_token(&self, role: Role, user_id: &UserId, token: &str) -> Result<()> {
        let token = token.trim();
        if token.is_empty() {
            return Err(NotifyError::InvalidToken);
        }

        let store = self.store.as_ref();
        let now = self.clock.utc();

        transaction::run(MAX_ATTEMPTS, || async move {
            let Some(current) = store.account(role, user_id).await? else {
                return Err(StoreError::UserNotFound(user_id.to_string()));
            };

            let mut account = current.doc;
            let push = account.push_mut();
            push.fcm_token = Some(token.to_string());
            push.fcm_token_updated_at = Some(now);
            push.notifications_enabled = true;

            store.commit(vec![Write::account(account, current.version)]).await
        })
        .await?;

        tracing::info!(user_id = %user_id, role = %role, "Registered push token");
        Ok(())
    }

    /// Turn notifications off; the token is kept so re-enabling is one call
    pub async fn disable(&self, role: Role, user_id: &UserId) -> Result<()> {
        let store = self.store.as_ref();

        transaction::run(MAX_ATTEMPTS, || async move {
            let Some(current) = store.account(role, user_id).await? else {
                return Err(StoreError::UserNotFound(user_id.to_string()));
            };

            let mut account = current.doc;
            account.push_mut().notifications_enabled = false;
            store.commit(vec![Write::account(account, current.version)]).await
        })
        .await?;

        tracing::info!(user_id = %user_id, role = %role, "Disabled notifications");
        Ok(())
    }
}
