//! Application State

use std::sync::Arc;

use checkout_core::DirectoryUploadSink;
use checkout_payments::{MemoryOrderStore, StripeClient};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Orders created by the webhook, looked up by the client
    pub orders: Arc<MemoryOrderStore>,

    /// Where uploaded order files land
    pub storage: Arc<DirectoryUploadSink>,

    /// Stripe client (optional - None if not configured)
    pub stripe: Option<Arc<StripeClient>>,
}
