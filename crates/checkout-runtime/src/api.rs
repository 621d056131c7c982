//! Checkout API Client
//!
//! Starts a payment session on the server. The returned URL is where the
//! user goes to pay; the server arranges for the return trip to carry the
//! session id.

use checkout_core::{CheckoutError, Result};
use serde::{Deserialize, Serialize};

use crate::config::ServerConfig;

/// Body of `POST /api/checkout`
#[derive(Clone, Debug, Serialize)]
pub struct CheckoutRequest {
    pub package: String,
    pub customer_email: String,
    pub success_url: String,
    pub cancel_url: String,
    pub file_count: usize,
}

/// Payment session created by the server
#[derive(Clone, Debug, Deserialize)]
pub struct CheckoutLink {
    /// Payment session id
    pub session_id: String,
    /// Hosted payment page
    pub checkout_url: String,
}

pub struct CheckoutApi {
    client: reqwest::Client,
    config: ServerConfig,
}

impl CheckoutApi {
    pub fn new(config: ServerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| CheckoutError::Config(format!("HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    /// Create a payment session for the staged files
    pub async fn create_checkout(&self, request: &CheckoutRequest) -> Result<CheckoutLink> {
        let url = self.config.endpoint("/api/checkout")?;

        let response = self
            .client
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(|e| CheckoutError::Gateway(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CheckoutError::Gateway(format!(
                "checkout returned {status}: {body}"
            )));
        }

        let link = response
            .json::<CheckoutLink>()
            .await
            .map_err(|e| CheckoutError::Gateway(format!("invalid checkout body: {e}")))?;

        tracing::info!(session_id = %link.session_id, "Checkout session created");
        Ok(link)
    }
}
