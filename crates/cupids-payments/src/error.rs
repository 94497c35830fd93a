//! Payment Error Types

use cupids_core::StoreError;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Payment-related errors
#[derive(Error, Debug)]
pub enum PaymentError {
    /// Square answered with an error payload
    #[error("Square error ({status}): {details}")]
    Square { status: u16, details: String },

    /// Transport failure talking to Square
    #[error("Square request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Webhook signature verification failed
    #[error("Webhook signature invalid: {0}")]
    WebhookSignature(String),

    /// Checkout intent note could not be read back
    #[error("Order note invalid: {0}")]
    Note(String),

    /// Request is missing fields or has invalid values
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Admin key mismatch
    #[error("Unauthorized")]
    Unauthorized,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Ledger transaction failed
    #[error("Ledger error: {0}")]
    Ledger(#[from] StoreError),
}

impl PaymentError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            PaymentError::Http(_) => true,
            PaymentError::Square { status, .. } => *status == 429 || *status >= 500,
            PaymentError::Ledger(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Get user-friendly message
    pub fn user_message(&self) -> &str {
        match self {
            PaymentError::Square { .. } | PaymentError::Http(_) => "Failed to create checkout",
            PaymentError::InvalidRequest(_) => "Missing required fields",
            PaymentError::Unauthorized => "Unauthorized",
            PaymentError::Ledger(StoreError::UserNotFound(_)) => "User not found",
            PaymentError::Config(_) => "Service configuration error.",
            _ => "An error occurred processing your request.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable() {
        let throttled = PaymentError::Square {
            status: 429,
            details: "RATE_LIMITED".into(),
        };
        assert!(throttled.is_retryable());

        let rejected = PaymentError::Square {
            status: 400,
            details: "INVALID_VALUE".into(),
        };
        assert!(!rejected.is_retryable());
        assert!(!PaymentError::Unauthorized.is_retryable());
    }

    #[test]
    fn test_user_messages_do_not_leak_details() {
        assert_eq!(PaymentError::Unauthorized.user_message(), "Unauthorized");
        let missing = PaymentError::Ledger(StoreError::UserNotFound("U1".into()));
        assert_eq!(missing.user_message(), "User not found");
    }
}
