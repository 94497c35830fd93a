//! Checkout Intent Note
//!
//! The purchase intent travels through Square as the payment note, a JSON
//! string, and comes back on the payment in the webhook. Nothing is stored
//! locally before the webhook fires.

use chrono::{DateTime, Utc};
use cupids_core::UserId;
use serde::{Deserialize, Serialize};

use crate::error::{PaymentError, Result};

/// `{userId, points, timestamp}` embedded in the payment link
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderNote {
    pub user_id: UserId,
    pub points: u64,
    /// Milliseconds since the epoch when checkout was requested
    pub timestamp: i64,
}

/// Lenient shape for reading notes back; fields are checked by hand
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawNote {
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    points: Option<u64>,
    #[serde(default)]
    timestamp: Option<i64>,
}

impl OrderNote {
    pub fn new(user_id: UserId, points: u64, at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            points,
            timestamp: at.timestamp_millis(),
        }
    }

    /// Serialize for the payment link
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| PaymentError::Note(e.to_string()))
    }

    /// Read a note back from a payment. An absent note is treated like `{}`.
    pub fn decode(note: Option<&str>) -> Result<Self> {
        let raw = note.filter(|n| !n.trim().is_empty()).unwrap_or("{}");
        let parsed: RawNote =
            serde_json::from_str(raw).map_err(|e| PaymentError::Note(e.to_string()))?;

        let user_id = parsed
            .user_id
            .filter(|u| !u.is_empty())
            .ok_or_else(|| PaymentError::Note("missing userId".into()))?;
        let points = parsed
            .points
            .filter(|p| *p > 0)
            .ok_or_else(|| PaymentError::Note("missing points".into()))?;

        Ok(Self {
            user_id: UserId::new(user_id),
            points,
            timestamp: parsed.timestamp.unwrap_or_default(),
        })
    }
}

/// Idempotency key for a payment link request
///
/// Defaults to `{userId}-{millis}`, which only distinguishes requests a
/// millisecond apart. A client-generated nonce takes precedence.
pub fn idempotency_key(user_id: &UserId, at: DateTime<Utc>, nonce: Option<&str>) -> String {
    match nonce.map(str::trim).filter(|n| !n.is_empty()) {
        Some(nonce) => format!("{user_id}-{nonce}"),
        None => format!("{user_id}-{}", at.timestamp_millis()),
    }
}
