//! Payment Error Types

use checkout_core::OrderStatus;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Payment-related errors
#[derive(Error, Debug)]
pub enum PaymentError {
    /// Stripe API error
    #[error("Stripe error: {0}")]
    Stripe(String),

    /// Webhook signature verification failed
    #[error("Webhook signature invalid: {0}")]
    WebhookSignature(String),

    /// Webhook payload parsing failed
    #[error("Webhook parse error: {0}")]
    WebhookParse(String),

    /// Order not found
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    /// Status change would move the order backwards
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PaymentError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, PaymentError::Stripe(_))
    }

    /// Get user-friendly message
    pub fn user_message(&self) -> &str {
        match self {
            PaymentError::Stripe(_) => "Payment processing failed. Please try again.",
            PaymentError::OrderNotFound(_) => "Order not found.",
            PaymentError::InvalidTransition { .. } => "This order can no longer be changed.",
            PaymentError::Config(_) => "Service configuration error.",
            _ => "An error occurred processing your request.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_stripe_failures_are_retryable() {
        assert!(PaymentError::Stripe("timeout".into()).is_retryable());
        assert!(!PaymentError::Config("bad email".into()).is_retryable());
        assert!(!PaymentError::OrderNotFound("o-1".into()).is_retryable());
    }
}
