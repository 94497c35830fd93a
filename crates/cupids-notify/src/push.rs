//! Push Messages
//!
//! Payload shape and the sender trait. [`FcmClient`](crate::FcmClient) is
//! the production sender; [`MemoryPushSender`] records sends for tests and
//! demos.

use async_trait::async_trait;
use cupids_core::{ConversationId, MessageId, Role};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::error::{NotifyError, Result};

/// `data.type` of a new-message notification
pub const NEW_MESSAGE: &str = "new_message";

/// A push notification addressed to one device token
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PushMessage {
    pub token: String,
    pub title: String,
    pub body: String,

    /// String-only key/value payload read by the service worker
    pub data: BTreeMap<String, String>,

    /// Page opened when the notification is clicked
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl PushMessage {
    /// "New message" notification for the given recipient role
    pub fn new_message(
        token: impl Into<String>,
        sender_name: &str,
        preview: &str,
        conversation_id: &ConversationId,
        message_id: &MessageId,
        recipient_role: Role,
    ) -> Self {
        let mut data = BTreeMap::new();
        data.insert("type".to_string(), NEW_MESSAGE.to_string());
        data.insert("conversationId".to_string(), conversation_id.to_string());
        data.insert("userType".to_string(), recipient_role.to_string());
        data.insert("messageId".to_string(), message_id.to_string());

        Self {
            token: token.into(),
            title: format!("New message from {sender_name}"),
            body: preview_text(preview),
            data,
            link: Some(chat_link(recipient_role, conversation_id)),
        }
    }
}

/// Longest message preview shown in a notification, in characters
pub const PREVIEW_CHARS: usize = 80;

fn preview_text(text: &str) -> String {
    let text = text.trim();
    if text.is_empty() {
        return "You have a new message".to_string();
    }
    let preview: String = text.chars().take(PREVIEW_CHARS).collect();
    if text.chars().count() > PREVIEW_CHARS {
        format!("{preview}...")
    } else {
        preview
    }
}

/// Chat page for the recipient's side of the conversation
pub fn chat_link(recipient_role: Role, conversation_id: &ConversationId) -> String {
    match recipient_role {
        Role::FortuneTeller => format!("/fortune-chat.html?id={conversation_id}"),
        Role::Client => format!("/mail-chat.html?id={conversation_id}"),
    }
}

/// Push service trait (Strategy pattern)
#[async_trait]
pub trait PushSender: Send + Sync {
    /// Deliver one message. Returns the provider's message id.
    async fn send(&self, message: &PushMessage) -> Result<String>;

    fn name(&self) -> &str;
}

/// Records messages instead of sending them
#[derive(Default)]
pub struct MemoryPushSender {
    sent: Mutex<Vec<PushMessage>>,
    fail: bool,
}

impl MemoryPushSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sender whose every send fails with a 503
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    /// Messages sent so far
    pub fn sent(&self) -> Vec<PushMessage> {
        self.sent
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl PushSender for MemoryPushSender {
    async fn send(&self, message: &PushMessage) -> Result<String> {
        if self.fail {
            return Err(NotifyError::Push {
                status: 503,
                details: "push service unavailable".into(),
            });
        }
        let mut sent = self
            .sent
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        sent.push(message.clone());
        Ok(format!("memory/{}", sent.len()))
    }

    fn name(&self) -> &str {
        "memory"
    }
}
