//! Stripe Checkout Integration
//!
//! Creates hosted checkout sessions for one-time package purchases. The
//! success URL carries the session id back to the client, which is all the
//! client needs to find its order afterwards.

use serde::{Deserialize, Serialize};
use stripe::{
    CheckoutSession as StripeCheckoutSession, CheckoutSessionMode, Client,
    CreateCheckoutSession, CreateCheckoutSessionLineItems,
    CreateCheckoutSessionLineItemsPriceData,
    CreateCheckoutSessionLineItemsPriceDataProductData, Currency,
};

use crate::error::{PaymentError, Result};
use crate::orders::Package;

/// Placeholder Stripe replaces with the real session id on redirect
pub const SESSION_ID_TEMPLATE: &str = "{CHECKOUT_SESSION_ID}";

/// Stripe client wrapper
pub struct StripeClient {
    client: Client,
    webhook_secret: String,
}

impl StripeClient {
    /// Create a new Stripe client
    pub fn new(secret_key: &str, webhook_secret: &str) -> Self {
        Self {
            client: Client::new(secret_key),
            webhook_secret: webhook_secret.to_string(),
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        let secret_key = std::env::var("STRIPE_SECRET_KEY")
            .map_err(|_| PaymentError::Config("STRIPE_SECRET_KEY not set".into()))?;
        let webhook_secret = std::env::var("STRIPE_WEBHOOK_SECRET")
            .map_err(|_| PaymentError::Config("STRIPE_WEBHOOK_SECRET not set".into()))?;

        Ok(Self::new(&secret_key, &webhook_secret))
    }

    /// Get the webhook secret
    pub fn webhook_secret(&self) -> &str {
        &self.webhook_secret
    }

    /// Create a Stripe Checkout session for a package
    ///
    /// Returns a URL to redirect the user to Stripe's hosted checkout page.
    pub async fn create_checkout_session(&self, request: CheckoutRequest) -> Result<CheckoutSession> {
        let pricing = request.package.pricing();
        let success_url = with_session_id(&request.success_url);

        let mut params = CreateCheckoutSession::new();
        params.customer_email = Some(&request.customer_email);
        params.success_url = Some(&success_url);
        params.cancel_url = Some(&request.cancel_url);
        params.mode = Some(CheckoutSessionMode::Payment);

        // Read back by the webhook when it creates the order
        let mut metadata = std::collections::HashMap::new();
        metadata.insert("package".to_string(), request.package.as_str().to_string());
        metadata.insert("file_count".to_string(), request.file_count.to_string());
        params.metadata = Some(metadata);

        params.line_items = Some(vec![CreateCheckoutSessionLineItems {
            quantity: Some(1),
            price_data: Some(CreateCheckoutSessionLineItemsPriceData {
                currency: Currency::USD,
                unit_amount: Some(pricing.cents),
                product_data: Some(CreateCheckoutSessionLineItemsPriceDataProductData {
                    name: pricing.name.clone(),
                    description: Some(pricing.description.clone()),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }]);

        let session = StripeCheckoutSession::create(&self.client, params)
            .await
            .map_err(|e| PaymentError::Stripe(e.to_string()))?;

        let checkout_url = session.url.ok_or_else(|| {
            PaymentError::Stripe("No checkout URL returned".into())
        })?;

        tracing::info!(
            session_id = %session.id,
            package = %request.package,
            files = request.file_count,
            "Created checkout session"
        );

        Ok(CheckoutSession {
            id: session.id.to_string(),
            checkout_url,
        })
    }
}

/// Append `session_id={CHECKOUT_SESSION_ID}` unless the URL already asks for it
pub fn with_session_id(success_url: &str) -> String {
    if success_url.contains(SESSION_ID_TEMPLATE) {
        return success_url.to_string();
    }
    let separator = if success_url.contains('?') { '&' } else { '?' };
    format!("{success_url}{separator}session_id={SESSION_ID_TEMPLATE}")
}

/// Request to create a checkout session
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckoutRequest {
    /// Package to purchase
    pub package: Package,

    /// Customer email
    pub customer_email: String,

    /// URL to redirect after successful payment
    pub success_url: String,

    /// URL to redirect if checkout is cancelled
    pub cancel_url: String,

    /// Number of files staged for this purchase
    #[serde(default)]
    pub file_count: usize,
}

impl CheckoutRequest {
    /// Reject requests the package cannot cover
    pub fn validate(&self) -> Result<()> {
        if self.customer_email.trim().is_empty() || !self.customer_email.contains('@') {
            return Err(PaymentError::Config(format!(
                "invalid customer email: {:?}",
                self.customer_email
            )));
        }
        if self.file_count == 0 {
            return Err(PaymentError::Config("no files staged for checkout".into()));
        }
        if self.file_count > self.package.max_files() {
            return Err(PaymentError::Config(format!(
                "{} files exceed the {} package limit of {}",
                self.file_count,
                self.package,
                self.package.max_files()
            )));
        }
        Ok(())
    }
}

/// Result of creating a checkout session
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckoutSession {
    /// Stripe session ID
    pub id: String,

    /// URL to redirect user to
    pub checkout_url: String,
}

/// Pricing information
#[derive(Clone, Debug)]
pub struct PackagePricing {
    pub name: String,
    pub description: String,
    pub cents: i64,
}

impl Package {
    /// Get pricing for this package
    pub fn pricing(&self) -> PackagePricing {
        match self {
            Package::Starter => PackagePricing {
                name: "Starter".into(),
                description: format!("Up to {} photos", self.max_files()),
                cents: 1900,
            },
            Package::Standard => PackagePricing {
                name: "Standard".into(),
                description: format!("Up to {} photos, priority processing", self.max_files()),
                cents: 3900,
            },
            Package::Premium => PackagePricing {
                name: "Premium".into(),
                description: format!("Up to {} photos, priority processing and retouching", self.max_files()),
                cents: 7900,
            },
        }
    }
}
