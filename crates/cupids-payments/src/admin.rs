//! Manual Point Credits
//!
//! Support tool for crediting points without a payment, gated by a shared
//! admin key.

use cupids_core::{Ledger, UserId};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::{PaymentError, Result};
use crate::input::{self, FieldValue};

type HmacSha256 = Hmac<Sha256>;

const COMPARE_DOMAIN: &[u8] = b"cupids-admin-key";

/// Shared admin secret
#[derive(Clone, Debug)]
pub struct AdminKey(SecretString);

impl AdminKey {
    pub fn new(key: SecretString) -> Self {
        Self(key)
    }

    fn digest(value: &str) -> Option<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(COMPARE_DOMAIN).ok()?;
        mac.update(value.as_bytes());
        Some(mac)
    }

    /// Constant-time comparison. An empty configured key matches nothing.
    pub fn matches(&self, candidate: Option<&str>) -> bool {
        let expected = self.0.expose_secret();
        let Some(candidate) = candidate else {
            return false;
        };
        if expected.is_empty() {
            return false;
        }

        let (Some(expected), Some(candidate)) = (Self::digest(expected), Self::digest(candidate))
        else {
            return false;
        };
        let expected = expected.finalize().into_bytes();
        candidate.verify_slice(&expected).is_ok()
    }
}

/// Manual credit request body
///
/// Fields accept any JSON shape so that a mistyped body with a wrong key
/// is still refused as unauthorized. `points` may be a numeric string.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualCreditRequest {
    #[serde(default)]
    pub user_id: Option<FieldValue>,
    #[serde(default)]
    pub points: Option<FieldValue>,
    #[serde(default)]
    pub admin_key: Option<FieldValue>,
}

/// Manual credit result
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualCreditReceipt {
    pub success: bool,
    pub user_id: UserId,
    pub added_points: u64,
    pub new_total: u64,
}

/// Manual credit service
#[derive(Clone)]
pub struct ManualCredit {
    ledger: Ledger,
    admin_key: AdminKey,
}

impl ManualCredit {
    pub fn new(ledger: Ledger, admin_key: AdminKey) -> Self {
        Self { ledger, admin_key }
    }

    /// Authorize, validate, then credit.
    ///
    /// Errors: [`PaymentError::Unauthorized`], [`PaymentError::InvalidRequest`],
    /// or a ledger error (`UserNotFound` when the account is missing).
    pub async fn credit(&self, request: ManualCreditRequest) -> Result<ManualCreditReceipt> {
        if !self.admin_key.matches(input::text(request.admin_key.as_ref())) {
            tracing::warn!("Manual credit rejected: bad admin key");
            return Err(PaymentError::Unauthorized);
        }

        let user_id = input::text(request.user_id.as_ref())
            .map(UserId::new)
            .ok_or_else(|| PaymentError::InvalidRequest("userId is required".into()))?;
        let points = input::count(request.points.as_ref())
            .ok_or_else(|| PaymentError::InvalidRequest("points is required".into()))?;

        let new_total = self.ledger.credit_manual(&user_id, points).await?;

        Ok(ManualCreditReceipt {
            success: true,
            user_id,
            added_points: points,
            new_total,
        })
    }
}
