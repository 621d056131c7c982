//! Orders
//!
//! The order record is created server-side by the payment webhook. The client
//! only reads it and nudges its status forward.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Order lifecycle status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Completed => "completed",
            OrderStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(OrderStatus::Pending),
            "processing" => Some(OrderStatus::Processing),
            "completed" => Some(OrderStatus::Completed),
            "failed" => Some(OrderStatus::Failed),
            _ => None,
        }
    }

    /// Whether moving to `next` goes forward (or stays put)
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        match (self, next) {
            (a, b) if *a == b => true,
            (OrderStatus::Pending, _) => true,
            (OrderStatus::Processing, OrderStatus::Completed | OrderStatus::Failed) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An order record
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Order identifier
    pub id: String,

    /// Payment session that created the order
    pub session_id: String,

    /// Customer email
    pub customer_email: String,

    /// Lifecycle status
    pub status: OrderStatus,

    /// Purchased package, if recorded
    #[serde(default)]
    pub package: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Create a new pending order
    pub fn new(session_id: impl Into<String>, customer_email: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            customer_email: customer_email.into(),
            status: OrderStatus::Pending,
            package: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        self.package = Some(package.into());
        self
    }
}

/// Order lookup and status updates (Strategy pattern)
///
/// Implemented over HTTP on the client and directly over the order store
/// on the server.
#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// Find the order created for a payment session. Safe to call repeatedly.
    async fn get_order(&self, session_id: &str) -> Result<Option<Order>>;

    /// Persist a status change. Best-effort from the caller's view.
    async fn set_order_status(&self, order_id: &str, status: OrderStatus) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_order_is_pending() {
        let order = Order::new("cs_test_1", "buyer@example.com").with_package("standard");
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.package.as_deref(), Some("standard"));
    }

    #[test]
    fn test_status_transitions() {
        use OrderStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Processing));
        assert!(!Failed.can_transition_to(Pending));
    }

    #[test]
    fn test_status_serde() {
        let json = serde_json::to_string(&OrderStatus::Processing).unwrap();
        assert_eq!(json, "\"processing\"");
        assert_eq!(OrderStatus::parse("COMPLETED"), Some(OrderStatus::Completed));
        assert_eq!(OrderStatus::parse("shipped"), None);
    }
}
