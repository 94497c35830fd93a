//! Store and Ledger Error Types

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, StoreError>;

/// Document store and ledger errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// A document changed between read and commit
    #[error("Write conflict: {0}")]
    Conflict(String),

    /// A purchase already exists for this payment
    #[error("Duplicate payment: {0}")]
    DuplicatePayment(String),

    /// Transaction kept conflicting until the attempt budget ran out
    #[error("Transaction contention: gave up after {attempts} attempts")]
    Contention { attempts: usize },

    /// Client account does not exist
    #[error("User not found: {0}")]
    UserNotFound(String),

    /// Generic missing document
    #[error("Document not found: {0}")]
    NotFound(String),

    /// Balance arithmetic would overflow
    #[error("Point balance overflow for user {0}")]
    BalanceOverflow(String),

    /// Backend unavailable (lock poisoned, connection lost, ...)
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Seed/document (de)serialization
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Whether the transaction runner should retry after this error
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_) | StoreError::DuplicatePayment(_))
    }

    /// Check if a caller (e.g. the payment provider) may retry the whole request
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::Conflict(_) | StoreError::Contention { .. } | StoreError::Unavailable(_)
        )
    }
}
