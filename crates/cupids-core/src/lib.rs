//! # cupids-core
//!
//! Document model, storage abstraction and point ledger shared by the
//! Cupids payment and notification pipelines.
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────┐     ┌──────────────────┐
//! │  Payment webhook │────▶│    Ledger    │────▶│  DocumentStore   │
//! │  Manual credit   │     │ (optimistic  │     │  (versioned docs,│
//! └──────────────────┘     │  txn + retry)│     │   atomic commit) │
//!                          └──────────────┘     └──────────────────┘
//!                                                        ▲
//! ┌──────────────────┐                                   │
//! │ Message notifier │───────────────────────────────────┘
//! └──────────────────┘
//! ```

pub mod clock;
pub mod error;
pub mod ledger;
pub mod model;
pub mod store;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod transaction;

pub use clock::{ManualClock, SharedClock};
pub use error::{Result, StoreError};
pub use ledger::{CreditOutcome, Ledger, PurchaseCredit};
pub use model::{
    ChatMessage, ClientAccount, Conversation, ConversationId, FortuneTeller, MessageId, PaymentId,
    Purchase, PurchaseId, PurchaseStatus, PushRegistration, Role, UserId,
};
pub use store::{Account, DocumentStore, MemoryStore, Precondition, Seed, Versioned, Write};
