//! checkout-server binary

use std::sync::Arc;

use checkout_core::DirectoryUploadSink;
use checkout_payments::{MemoryOrderStore, StripeClient};
use checkout_server::AppState;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Initialize payments
    let stripe = match StripeClient::from_env() {
        Ok(client) => {
            tracing::info!("Stripe configured");
            Some(Arc::new(client))
        }
        Err(e) => {
            tracing::warn!(error = %e, "Stripe not configured - checkout and webhook disabled");
            tracing::warn!("Set STRIPE_SECRET_KEY and STRIPE_WEBHOOK_SECRET in .env");
            None
        }
    };

    // File intake
    let upload_root = std::env::var("UPLOAD_ROOT").unwrap_or_else(|_| "uploads".into());
    tokio::fs::create_dir_all(&upload_root).await?;
    tracing::info!(root = %upload_root, "Storing order files");

    let state = AppState {
        orders: Arc::new(MemoryOrderStore::new()),
        storage: Arc::new(DirectoryUploadSink::new(upload_root)),
        stripe,
    };

    // Start server
    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("checkout-server running on http://{}", addr);
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health                          - Health check");
    tracing::info!("  POST /api/checkout                    - Create Stripe checkout");
    tracing::info!("  POST /webhook/stripe                  - Stripe webhook");
    tracing::info!("  GET  /api/orders/session/{{id}}         - Order by payment session");
    tracing::info!("  PUT  /api/orders/{{id}}/status          - Update order status");
    tracing::info!("  GET  /api/orders/{{id}}/files           - Stored files for order");
    tracing::info!("  POST /api/orders/{{id}}/files           - Upload order files");

    checkout_server::serve(listener, state).await?;

    Ok(())
}
