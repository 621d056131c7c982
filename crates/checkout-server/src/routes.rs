//! Router

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post, put},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::handlers::{
    create_checkout, get_order_by_session, get_order_files, health_check, stripe_webhook,
    update_order_status, upload_order_files,
};
use crate::state::AppState;

/// Largest multipart body accepted for one order's files
pub const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health
        .route("/health", get(health_check))

        // Payments
        .route("/api/checkout", post(create_checkout))
        .route("/webhook/stripe", post(stripe_webhook))

        // Orders
        .route("/api/orders/session/{session_id}", get(get_order_by_session))
        .route("/api/orders/{order_id}/status", put(update_order_status))
        .route(
            "/api/orders/{order_id}/files",
            get(get_order_files)
                .post(upload_order_files)
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )

        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
