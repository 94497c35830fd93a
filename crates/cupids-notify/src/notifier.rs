//! New-Message Notifier
//!
//! Runs once per created chat message. Only client-authored messages
//! notify, and the recipient is the conversation's fortune teller.

use cupids_core::{ChatMessage, DocumentStore, Role, SharedClock, UserId};
use serde::Serialize;
use std::sync::Arc;

use crate::error::Result;
use crate::push::{PushMessage, PushSender};
use crate::throttle::{ClaimOutcome, Throttle};

/// Sender name used when the client's profile can't be read
pub const FALLBACK_SENDER_NAME: &str = "Customer";

/// What happened to one message
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum NotifyOutcome {
    Sent { recipient: UserId, push_id: String },
    /// Recipient was notified inside the current window
    Throttled { recipient: UserId },
    /// Sender is not a client
    NotClientMessage,
    ConversationMissing,
    RecipientMissing { recipient: UserId },
    /// Notifications disabled or no token
    RecipientUnreachable { recipient: UserId },
    /// Push service failed; the window was released
    SendFailed { recipient: UserId, error: String },
}

/// Message-created trigger handler
#[derive(Clone)]
pub struct Notifier {
    store: Arc<dyn DocumentStore>,
    sender: Arc<dyn PushSender>,
    clock: SharedClock,
    throttle: Throttle,
}

impl Notifier {
    pub fn new(store: Arc<dyn DocumentStore>, sender: Arc<dyn PushSender>, clock: SharedClock) -> Self {
        Self {
            store,
            sender,
            clock,
            throttle: Throttle::default(),
        }
    }

    /// Handle a newly created message.
    ///
    /// Push failures are reported in the outcome, not as errors; only store
    /// failures surface as `Err`.
    pub async fn on_message_created(&self, message: &ChatMessage) -> Result<NotifyOutcome> {
        if message.sender_role != Role::Client {
            tracing::debug!(message_id = %message.id, "Message not from a client, no notification");
            return Ok(NotifyOutcome::NotClientMessage);
        }

        let Some(conversation) = self.store.conversation(&message.conversation_id).await? else {
            tracing::warn!(
                conversation_id = %message.conversation_id,
                "Conversation not found for message"
            );
            return Ok(NotifyOutcome::ConversationMissing);
        };

        let recipient_role = message.sender_role.counterpart();
        let recipient = conversation.participant(recipient_role).clone();
        let now = self.clock.utc();

        let claim = match self
            .throttle
            .claim(self.store.as_ref(), recipient_role, &recipient, now)
            .await?
        {
            ClaimOutcome::Claimed(claim) => claim,
            ClaimOutcome::Throttled { remaining } => {
                tracing::info!(
                    recipient = %recipient,
                    remaining_minutes = remaining.num_minutes(),
                    "Notification throttled"
                );
                return Ok(NotifyOutcome::Throttled { recipient });
            }
            ClaimOutcome::Unreachable => {
                tracing::debug!(recipient = %recipient, "Recipient has notifications off or no token");
                return Ok(NotifyOutcome::RecipientUnreachable { recipient });
            }
            ClaimOutcome::Missing => {
                tracing::warn!(recipient = %recipient, "Recipient account not found");
                return Ok(NotifyOutcome::RecipientMissing { recipient });
            }
        };

        let sender_name = self.sender_name(&conversation.client_id).await;
        let token = claim.recipient.push().deliverable_token().unwrap_or_default();
        let push = PushMessage::new_message(
            token,
            &sender_name,
            &message.text,
            &conversation.id,
            &message.id,
            recipient_role,
        );

        match self.sender.send(&push).await {
            Ok(push_id) => {
                tracing::info!(
                    recipient = %recipient,
                    conversation_id = %conversation.id,
                    provider = self.sender.name(),
                    push_id = %push_id,
                    "Sent new-message notification"
                );
                Ok(NotifyOutcome::Sent { recipient, push_id })
            }
            Err(e) => {
                tracing::error!(
                    recipient = %recipient,
                    provider = self.sender.name(),
                    error = %e,
                    retryable = e.is_retryable(),
                    "Push send failed"
                );
                if let Err(release_err) = self.throttle.release(self.store.as_ref(), &claim).await {
                    tracing::error!(
                        recipient = %recipient,
                        error = %release_err,
                        "Failed to release notification window"
                    );
                }
                Ok(NotifyOutcome::SendFailed {
                    recipient,
                    error: e.to_string(),
                })
            }
        }
    }

    async fn sender_name(&self, client_id: &UserId) -> String {
        match self.store.client(client_id).await {
            Ok(Some(client)) => client
                .doc
                .display_name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| FALLBACK_SENDER_NAME.to_string()),
            Ok(None) => FALLBACK_SENDER_NAME.to_string(),
            Err(e) => {
                tracing::warn!(client_id = %client_id, error = %e, "Sender lookup failed");
                FALLBACK_SENDER_NAME.to_string()
            }
        }
    }
}
