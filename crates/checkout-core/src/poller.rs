//! Reconciliation Poller
//!
//! After the payment redirect returns, the order may not exist yet: the
//! webhook that creates it runs on its own schedule. The poller looks the
//! order up by payment session id with bounded, backed-off retries.
//!
//! ```text
//! Searching --lookup hit--> Found
//!     |
//!     +--attempts spent--> NotFound (terminal for this attempt; staging untouched)
//! ```

use std::sync::Arc;

use crate::error::{CheckoutError, Result};
use crate::order::{Order, OrderGateway};
use crate::retry::{PollOutcome, PollProgress, RetryPolicy, poll_until_found};

/// Finds the order created for a payment session
pub struct ReconciliationPoller {
    gateway: Arc<dyn OrderGateway>,
    policy: RetryPolicy,
}

impl ReconciliationPoller {
    pub fn new(gateway: Arc<dyn OrderGateway>, policy: RetryPolicy) -> Self {
        Self { gateway, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Poll for the order and report the terminal outcome
    pub async fn poll<P>(&self, session_id: &str, on_wait: P) -> Result<PollOutcome<Order>>
    where
        P: FnMut(&PollProgress),
    {
        if session_id.trim().is_empty() {
            return Err(CheckoutError::Config("missing payment session id".into()));
        }

        tracing::info!(
            session_id = %session_id,
            max_attempts = self.policy.max_attempts,
            "Reconciling order for payment session"
        );

        let gateway = &self.gateway;
        let outcome = poll_until_found(
            &self.policy,
            |_attempt| gateway.get_order(session_id),
            on_wait,
        )
        .await;

        match &outcome {
            PollOutcome::Found { value, attempts } => {
                tracing::info!(
                    session_id = %session_id,
                    order_id = %value.id,
                    attempts,
                    "Order found"
                );
            }
            PollOutcome::NotFound {
                attempts,
                last_error,
            } => {
                tracing::warn!(
                    session_id = %session_id,
                    attempts,
                    last_error = ?last_error,
                    "Order not found, giving up for this attempt"
                );
            }
        }

        Ok(outcome)
    }

    /// Poll for the order; exhausting the budget is `OrderNotFound`
    pub async fn find_order<P>(&self, session_id: &str, on_wait: P) -> Result<Order>
    where
        P: FnMut(&PollProgress),
    {
        match self.poll(session_id, on_wait).await? {
            PollOutcome::Found { value, .. } => Ok(value),
            PollOutcome::NotFound { attempts, .. } => Err(CheckoutError::OrderNotFound {
                session_id: session_id.to_string(),
                attempts,
            }),
        }
    }
}
