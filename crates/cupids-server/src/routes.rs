//! Router

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::handlers::{
    add_points_manually, create_checkout, disable_notifications, health_check, method_not_allowed,
    on_message_created, register_push_token, square_webhook,
};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        // Payments
        .route("/createCheckout", post(create_checkout))
        .route("/squareWebhook", post(square_webhook))
        .route("/addPointsManually", post(add_points_manually))
        // Notifications
        .route("/onMessageCreated", post(on_message_created))
        .route("/registerPushToken", post(register_push_token))
        .route("/disableNotifications", post(disable_notifications))
        .method_not_allowed_fallback(method_not_allowed)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
