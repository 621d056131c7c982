//! checkout-server
//!
//! Axum server for the order side of the checkout flow: creates Stripe
//! checkout sessions, turns completed sessions into orders via the webhook,
//! answers the client's order lookups and accepts the order's files.

pub mod handlers;
pub mod routes;
pub mod state;

pub use routes::router;
pub use state::AppState;

/// Serve the checkout API on `listener` until the task is dropped
pub async fn serve(listener: tokio::net::TcpListener, state: AppState) -> std::io::Result<()> {
    axum::serve(listener, router(state)).await
}
