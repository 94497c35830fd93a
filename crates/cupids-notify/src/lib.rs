//! # cupids-notify
//!
//! Push notifications for new chat messages.
//!
//! When a client writes to a fortune teller, the fortune teller's devices
//! get a push through FCM, at most once every six hours. Messages from
//! fortune tellers never notify.
//!
//! ```text
//! message created ─▶ Notifier ─▶ Throttle::claim ─▶ PushSender::send
//!                                     ▲                    │ failed
//!                                     └── Throttle::release┘
//! ```

mod error;
mod fcm;
mod notifier;
mod push;
mod registration;
mod throttle;

pub use error::{NotifyError, Result};
pub use fcm::{DEFAULT_APP_URL, FcmClient, FcmConfig};
pub use notifier::{FALLBACK_SENDER_NAME, Notifier, NotifyOutcome};
pub use push::{MemoryPushSender, NEW_MESSAGE, PREVIEW_CHARS, PushMessage, PushSender, chat_link};
pub use registration::PushRegistry;
pub use throttle::{ClaimOutcome, Eligibility, Throttle, WINDOW_HOURS, WindowClaim};
