//! HTTP Handlers

use axum::{
    Json,
    body::Bytes,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
};
use serde::{Deserialize, Serialize};

use cupids_core::{ChatMessage, Role, StoreError, UserId};
use cupids_notify::NotifyError;
use cupids_payments::{
    CheckoutRequest, FieldValue, ManualCreditReceipt, ManualCreditRequest, PaymentError,
    SIGNATURE_HEADER, WebhookOutcome,
};

use crate::state::AppState;

type ApiError = (StatusCode, Json<ErrorResponse>);

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub square_configured: bool,
    pub notifications_configured: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

fn error(status: StatusCode, message: impl Into<String>, code: &str) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
            code: code.into(),
            details: None,
        }),
    )
}

fn bad_json(rejection: &JsonRejection) -> ApiError {
    tracing::debug!(error = %rejection, "Rejected request body");
    let (status, Json(mut body)) = error(StatusCode::BAD_REQUEST, "Invalid request body", "INVALID_BODY");
    body.details = Some(rejection.body_text());
    (status, Json(body))
}

/// Counts may arrive as numbers or numeric strings
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCheckoutBody {
    #[serde(default)]
    pub user_id: Option<FieldValue>,
    #[serde(default)]
    pub amount: Option<FieldValue>,
    #[serde(default)]
    pub points: Option<FieldValue>,
    /// Client nonce, preferred over the timestamp in the idempotency key
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCheckoutResponse {
    pub success: bool,
    pub checkout_url: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushTokenBody {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub user_type: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        square_configured: state.checkout.is_some(),
        notifications_configured: state.notifier.is_some(),
    })
}

/// Create a Square payment link for a point purchase
pub async fn create_checkout(
    State(state): State<AppState>,
    payload: Result<Json<CreateCheckoutBody>, JsonRejection>,
) -> Result<Json<CreateCheckoutResponse>, ApiError> {
    let Json(payload) = payload.map_err(|e| bad_json(&e))?;

    let (Some(user_id), Some(amount), Some(points)) = (
        payload.user_id.as_ref().and_then(FieldValue::text),
        payload
            .amount
            .as_ref()
            .and_then(FieldValue::integer)
            .filter(|a| *a > 0),
        payload.points.as_ref().and_then(FieldValue::count),
    ) else {
        return Err(error(StatusCode::BAD_REQUEST, "Missing required fields", "MISSING_FIELDS"));
    };

    let provider = state.checkout.as_ref().ok_or_else(|| {
        error(
            StatusCode::SERVICE_UNAVAILABLE,
            "Payments not configured",
            "PAYMENTS_DISABLED",
        )
    })?;

    let request = CheckoutRequest {
        user_id: UserId::new(user_id),
        amount,
        points,
        nonce: payload.idempotency_key.filter(|k| !k.is_empty()),
    };

    let session = provider.create_checkout(request).await.map_err(|e| {
        tracing::error!(provider = provider.name(), error = %e, "Checkout error");
        let (status, Json(mut body)) = error(
            StatusCode::INTERNAL_SERVER_ERROR,
            e.user_message(),
            "CHECKOUT_ERROR",
        );
        body.details = Some(e.to_string());
        (status, Json(body))
    })?;

    Ok(Json(CreateCheckoutResponse {
        success: true,
        checkout_url: session.checkout_url,
    }))
}

/// Square payment webhook
///
/// Takes raw bytes: the signature covers them as sent, and a body that is
/// not UTF-8 is acknowledged like any other unreadable event.
pub async fn square_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<&'static str, ApiError> {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());

    state.webhook.authenticate(&body, signature).map_err(|e| {
        tracing::warn!(error = %e, "Webhook signature failed");
        error(StatusCode::FORBIDDEN, "Invalid signature", "INVALID_SIGNATURE")
    })?;

    let event = state.webhook.parse_event(&body);

    let outcome = state.webhook.handle(event).await.map_err(|e| {
        tracing::error!(error = %e, retryable = e.is_retryable(), "Webhook processing error");
        error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Webhook processing failed",
            "WEBHOOK_ERROR",
        )
    })?;

    if let WebhookOutcome::Dropped { reason } = &outcome {
        tracing::warn!(reason = %reason, "Webhook acknowledged without credit");
    }

    Ok("OK")
}

/// Support tool: credit points without a payment
pub async fn add_points_manually(
    State(state): State<AppState>,
    payload: Result<Json<ManualCreditRequest>, JsonRejection>,
) -> Result<Json<ManualCreditReceipt>, ApiError> {
    // An unreadable body carries no usable key
    let payload = match payload {
        Ok(Json(payload)) => payload,
        Err(e) => {
            tracing::warn!(error = %e, "Manual credit rejected: unreadable body");
            return Err(error(
                StatusCode::FORBIDDEN,
                PaymentError::Unauthorized.user_message(),
                "UNAUTHORIZED",
            ));
        }
    };

    let receipt = state.manual_credit.credit(payload).await.map_err(|e| {
        let (status, code) = match &e {
            PaymentError::Unauthorized => (StatusCode::FORBIDDEN, "UNAUTHORIZED"),
            PaymentError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "MISSING_FIELDS"),
            PaymentError::Ledger(StoreError::UserNotFound(_)) => {
                (StatusCode::NOT_FOUND, "USER_NOT_FOUND")
            }
            _ => {
                tracing::error!(error = %e, "Manual credit failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "CREDIT_ERROR")
            }
        };
        error(status, e.user_message(), code)
    })?;

    Ok(Json(receipt))
}

/// Structured 405 for known paths hit with the wrong method
pub async fn method_not_allowed() -> ApiError {
    error(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed", "METHOD_NOT_ALLOWED")
}

/// Message-created trigger. Always 204: failures are logged, never returned.
pub async fn on_message_created(
    State(state): State<AppState>,
    payload: Result<Json<ChatMessage>, JsonRejection>,
) -> StatusCode {
    let message = match payload {
        Ok(Json(message)) => message,
        Err(e) => {
            tracing::warn!(error = %e, "Unreadable message document, skipping notification");
            return StatusCode::NO_CONTENT;
        }
    };

    let Some(notifier) = &state.notifier else {
        tracing::debug!(message_id = %message.id, "Push not configured, skipping notification");
        return StatusCode::NO_CONTENT;
    };

    match notifier.on_message_created(&message).await {
        Ok(outcome) => {
            tracing::debug!(message_id = %message.id, outcome = ?outcome, "Message trigger handled");
        }
        Err(e) => {
            tracing::error!(message_id = %message.id, error = %e, "Notification error");
        }
    }

    StatusCode::NO_CONTENT
}

/// Store a device's push token and enable notifications
pub async fn register_push_token(
    State(state): State<AppState>,
    payload: Result<Json<PushTokenBody>, JsonRejection>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let Json(payload) = payload.map_err(|e| bad_json(&e))?;
    let (role, user_id) = account_ref(&payload)?;
    let token = payload
        .token
        .ok_or_else(|| error(StatusCode::BAD_REQUEST, "Missing required fields", "MISSING_FIELDS"))?;

    state
        .push_registry
        .register_token(role, &user_id, &token)
        .await
        .map_err(registry_error)?;

    Ok(Json(SuccessResponse { success: true }))
}

/// Turn notifications off for an account
pub async fn disable_notifications(
    State(state): State<AppState>,
    payload: Result<Json<PushTokenBody>, JsonRejection>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let Json(payload) = payload.map_err(|e| bad_json(&e))?;
    let (role, user_id) = account_ref(&payload)?;

    state
        .push_registry
        .disable(role, &user_id)
        .await
        .map_err(registry_error)?;

    Ok(Json(SuccessResponse { success: true }))
}

fn account_ref(payload: &PushTokenBody) -> Result<(Role, UserId), ApiError> {
    let (Some(user_id), Some(user_type)) = (
        payload.user_id.as_deref().filter(|u| !u.is_empty()),
        payload.user_type.as_deref(),
    ) else {
        return Err(error(StatusCode::BAD_REQUEST, "Missing required fields", "MISSING_FIELDS"));
    };

    let role = user_type
        .parse::<Role>()
        .map_err(|e| error(StatusCode::BAD_REQUEST, e, "INVALID_USER_TYPE"))?;

    Ok((role, UserId::new(user_id)))
}

fn registry_error(e: NotifyError) -> ApiError {
    match e {
        NotifyError::InvalidToken => {
            error(StatusCode::BAD_REQUEST, "Invalid push token", "INVALID_TOKEN")
        }
        NotifyError::Store(StoreError::UserNotFound(_)) => {
            error(StatusCode::NOT_FOUND, "User not found", "USER_NOT_FOUND")
        }
        e => {
            tracing::error!(error = %e, "Push registration failed");
            error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Push registration failed",
                "REGISTRATION_ERROR",
            )
        }
    }
}
