//! Document Model
//!
//! Shapes of the documents stored in the `clients`, `fortune-tellers`,
//! `purchases` and `conversations` collections. Field names serialize in
//! camelCase to match what the web clients write.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! document_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

document_id!(
    /// Account identifier (auth uid), shared by clients and fortune tellers
    UserId
);
document_id!(
    /// Payment identifier assigned by the payment provider
    PaymentId
);
document_id!(PurchaseId);
document_id!(ConversationId);
document_id!(MessageId);

impl PurchaseId {
    /// Fresh random id, like an auto-generated document id
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }
}

/// Which side of the marketplace an account or message belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Client,
    FortuneTeller,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::FortuneTeller => "fortune-teller",
        }
    }

    /// Collection holding accounts of this role
    pub fn collection(&self) -> &'static str {
        match self {
            Role::Client => "clients",
            Role::FortuneTeller => "fortune-tellers",
        }
    }

    /// The role on the other end of a conversation
    pub fn counterpart(&self) -> Self {
        match self {
            Role::Client => Role::FortuneTeller,
            Role::FortuneTeller => Role::Client,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "client" => Ok(Role::Client),
            "fortune-teller" => Ok(Role::FortuneTeller),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Push notification state embedded in every account document
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRegistration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fcm_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fcm_token_updated_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub notifications_enabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_notification_sent_at: Option<DateTime<Utc>>,
}

impl PushRegistration {
    /// Token to deliver to, if notifications are enabled and a token is registered
    pub fn deliverable_token(&self) -> Option<&str> {
        if !self.notifications_enabled {
            return None;
        }
        self.fcm_token.as_deref().filter(|t| !t.is_empty())
    }
}

/// `clients/{id}`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientAccount {
    pub id: UserId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Point balance
    #[serde(default)]
    pub points: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_purchase_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_manual_add_at: Option<DateTime<Utc>>,

    #[serde(flatten)]
    pub push: PushRegistration,
}

impl ClientAccount {
    pub fn new(id: impl Into<UserId>, points: u64) -> Self {
        Self {
            id: id.into(),
            display_name: None,
            points,
            last_purchase_at: None,
            last_manual_add_at: None,
            push: PushRegistration::default(),
        }
    }
}

/// `fortune-tellers/{id}`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FortuneTeller {
    pub id: UserId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    #[serde(flatten)]
    pub push: PushRegistration,
}

impl FortuneTeller {
    pub fn new(id: impl Into<UserId>) -> Self {
        Self {
            id: id.into(),
            display_name: None,
            push: PushRegistration::default(),
        }
    }
}

/// Purchase lifecycle. Only completed purchases are ever written.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PurchaseStatus {
    Completed,
}

/// `purchases/{id}`, one per reconciled payment
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Purchase {
    pub id: PurchaseId,
    pub user_id: UserId,

    /// Amount charged, in the currency's smallest unit as reported by the provider
    pub amount: i64,

    pub points: u64,
    pub payment_id: PaymentId,
    pub status: PurchaseStatus,
    pub created_at: DateTime<Utc>,
}

impl Purchase {
    pub fn completed(
        user_id: UserId,
        amount: i64,
        points: u64,
        payment_id: PaymentId,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PurchaseId::generate(),
            user_id,
            amount,
            points,
            payment_id,
            status: PurchaseStatus::Completed,
            created_at,
        }
    }
}

/// `conversations/{id}`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: ConversationId,
    pub client_id: UserId,
    pub fortune_teller_id: UserId,
}

impl Conversation {
    /// Account on the given side of this conversation
    pub fn participant(&self, role: Role) -> &UserId {
        match role {
            Role::Client => &self.client_id,
            Role::FortuneTeller => &self.fortune_teller_id,
        }
    }
}

/// `conversations/{id}/messages/{id}`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: MessageId,
    pub conversation_id: ConversationId,

    #[serde(alias = "senderType")]
    pub sender_role: Role,

    #[serde(default)]
    pub text: String,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}
