//! Notification Error Types

use cupids_core::StoreError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, NotifyError>;

#[derive(Error, Debug)]
pub enum NotifyError {
    /// Push service rejected the message
    #[error("Push service error ({status}): {details}")]
    Push { status: u16, details: String },

    /// Transport failure talking to the push service
    #[error("Push request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Registration token is no longer valid
    #[error("Push token unregistered")]
    Unregistered,

    /// Empty or malformed device token
    #[error("Invalid push token")]
    InvalidToken,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl NotifyError {
    pub fn is_retryable(&self) -> bool {
        match self {
            NotifyError::Http(_) => true,
            NotifyError::Push { status, .. } => *status == 429 || *status >= 500,
            NotifyError::Store(e) => e.is_retryable(),
            _ => false,
        }
    }
}
