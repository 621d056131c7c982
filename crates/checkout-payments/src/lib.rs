//! # checkout-payments
//!
//! Server side of the checkout: hosted Stripe checkout sessions, the webhook
//! that turns a completed session into an order, and the order store the
//! client polls.
//!
//! ## Flow
//!
//! ```text
//! ┌─────────────┐     ┌─────────────────┐     ┌──────────────────────────┐
//! │   Client    │────▶│  Stripe Hosted  │────▶│  Client (success URL)    │
//! │ (staged)    │     │  Checkout Page  │     │  ?session_id=cs_...      │
//! └─────────────┘     └────────┬────────┘     └────────────┬─────────────┘
//!                              │ webhook (async)           │ polls
//!                              ▼                           ▼
//!                     ┌─────────────────┐         ┌─────────────────┐
//!                     │ WebhookHandler  │────────▶│   OrderStore    │
//!                     │ creates Order   │         │ get_by_session  │
//!                     └─────────────────┘         └─────────────────┘
//! ```
//!
//! There is no channel from the webhook to the client; the client cannot
//! know when the order exists and has to look.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use checkout_payments::{StripeClient, CheckoutRequest, Package};
//!
//! let client = StripeClient::new("sk_test_xxx", "whsec_xxx");
//!
//! let session = client.create_checkout_session(CheckoutRequest {
//!     package: Package::Standard,
//!     customer_email: "user@example.com".into(),
//!     success_url: "https://yoursite.com/success".into(),
//!     cancel_url: "https://yoursite.com/packages".into(),
//!     file_count: 4,
//! }).await?;
//!
//! // Redirect user to: session.checkout_url
//! ```

mod checkout;
mod error;
mod orders;
mod webhook;

pub use checkout::{
    CheckoutRequest, CheckoutSession, PackagePricing, SESSION_ID_TEMPLATE, StripeClient,
    with_session_id,
};
pub use error::{PaymentError, Result};
pub use orders::{MemoryOrderStore, OrderStore, Package};
pub use webhook::{WebhookEvent, WebhookHandler};
