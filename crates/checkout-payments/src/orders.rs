//! Order Store
//!
//! Server-side order records, created by the webhook and read by the client
//! through the `OrderGateway` interface.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use checkout_core::{CheckoutError, Order, OrderGateway, OrderStatus};
use serde::{Deserialize, Serialize};

use crate::error::{PaymentError, Result};

/// Purchasable packages
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Package {
    Starter,
    Standard,
    Premium,
}

impl Package {
    pub fn as_str(&self) -> &'static str {
        match self {
            Package::Starter => "starter",
            Package::Standard => "standard",
            Package::Premium => "premium",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "starter" => Some(Package::Starter),
            "standard" => Some(Package::Standard),
            "premium" => Some(Package::Premium),
            _ => None,
        }
    }

    /// Maximum number of files the package covers
    pub fn max_files(&self) -> usize {
        match self {
            Package::Starter => 5,
            Package::Standard => 15,
            Package::Premium => 30,
        }
    }
}

impl std::fmt::Display for Package {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order storage trait
pub trait OrderStore: Send + Sync {
    /// Save or update an order
    fn save(&self, order: &Order) -> Result<()>;

    /// Save `order` unless its session already has one; returns the stored order
    fn insert_if_absent(&self, order: Order) -> Result<Order>;

    /// Get order by id
    fn get(&self, order_id: &str) -> Result<Option<Order>>;

    /// Get order by payment session id
    fn get_by_session(&self, session_id: &str) -> Result<Option<Order>>;

    /// Move an order forward; backwards moves are rejected
    fn update_status(&self, order_id: &str, status: OrderStatus) -> Result<Order>;
}

/// In-memory order store (for development)
pub struct MemoryOrderStore {
    orders: RwLock<HashMap<String, Order>>,
    by_session: RwLock<HashMap<String, String>>,
}

impl Default for MemoryOrderStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self {
            orders: RwLock::new(HashMap::new()),
            by_session: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.orders.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl OrderStore for MemoryOrderStore {
    fn save(&self, order: &Order) -> Result<()> {
        let mut orders = self.orders.write().unwrap();
        let mut by_session = self.by_session.write().unwrap();

        by_session.insert(order.session_id.clone(), order.id.clone());
        orders.insert(order.id.clone(), order.clone());

        Ok(())
    }

    fn insert_if_absent(&self, order: Order) -> Result<Order> {
        let mut orders = self.orders.write().unwrap();
        let mut by_session = self.by_session.write().unwrap();

        if let Some(existing) = by_session
            .get(&order.session_id)
            .and_then(|order_id| orders.get(order_id))
        {
            return Ok(existing.clone());
        }

        by_session.insert(order.session_id.clone(), order.id.clone());
        orders.insert(order.id.clone(), order.clone());
        Ok(order)
    }

    fn get(&self, order_id: &str) -> Result<Option<Order>> {
        let orders = self.orders.read().unwrap();
        Ok(orders.get(order_id).cloned())
    }

    fn get_by_session(&self, session_id: &str) -> Result<Option<Order>> {
        let orders = self.orders.read().unwrap();
        let by_session = self.by_session.read().unwrap();

        Ok(by_session
            .get(session_id)
            .and_then(|order_id| orders.get(order_id))
            .cloned())
    }

    fn update_status(&self, order_id: &str, status: OrderStatus) -> Result<Order> {
        let mut orders = self.orders.write().unwrap();

        let order = orders
            .get_mut(order_id)
            .ok_or_else(|| PaymentError::OrderNotFound(order_id.to_string()))?;

        if !order.status.can_transition_to(status) {
            return Err(PaymentError::InvalidTransition {
                from: order.status,
                to: status,
            });
        }

        order.status = status;
        Ok(order.clone())
    }
}

#[async_trait]
impl OrderGateway for MemoryOrderStore {
    async fn get_order(&self, session_id: &str) -> checkout_core::Result<Option<Order>> {
        self.get_by_session(session_id)
            .map_err(|e| CheckoutError::Gateway(e.to_string()))
    }

    async fn set_order_status(&self, order_id: &str, status: OrderStatus) -> checkout_core::Result<()> {
        self.update_status(order_id, status)
            .map(|_| ())
            .map_err(|e| CheckoutError::Gateway(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_session() {
        let store = MemoryOrderStore::new();
        let order = Order::new("cs_test_1", "buyer@example.com");
        store.save(&order).unwrap();

        let found = store.get_by_session("cs_test_1").unwrap().unwrap();
        assert_eq!(found.id, order.id);
        assert!(store.get_by_session("cs_other").unwrap().is_none());
    }

    #[test]
    fn test_insert_if_absent_keeps_first_order() {
        let store = MemoryOrderStore::new();
        let first = store.insert_if_absent(Order::new("cs_test_1", "buyer@example.com")).unwrap();
        let second = store.insert_if_absent(Order::new("cs_test_1", "buyer@example.com")).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_status_moves_forward_only() {
        let store = MemoryOrderStore::new();
        let order = Order::new("cs_test_1", "buyer@example.com");
        store.save(&order).unwrap();

        let updated = store.update_status(&order.id, OrderStatus::Processing).unwrap();
        assert_eq!(updated.status, OrderStatus::Processing);
        store.update_status(&order.id, OrderStatus::Completed).unwrap();

        let result = store.update_status(&order.id, OrderStatus::Processing);
        assert!(matches!(result, Err(PaymentError::InvalidTransition { .. })));
    }

    #[test]
    fn test_unknown_order() {
        let store = MemoryOrderStore::new();
        let result = store.update_status("nope", OrderStatus::Processing);
        assert!(matches!(result, Err(PaymentError::OrderNotFound(_))));
    }

    #[tokio::test]
    async fn test_gateway_view() {
        let store = MemoryOrderStore::new();
        let order = Order::new("cs_test_1", "buyer@example.com");
        store.save(&order).unwrap();

        let found = store.get_order("cs_test_1").await.unwrap().unwrap();
        store.set_order_status(&found.id, OrderStatus::Processing).await.unwrap();
        assert_eq!(store.get(&order.id).unwrap().unwrap().status, OrderStatus::Processing);
    }

    #[test]
    fn test_package_parse() {
        assert_eq!(Package::parse("Premium"), Some(Package::Premium));
        assert_eq!(Package::parse("gold"), None);
        assert!(Package::Starter.max_files() < Package::Premium.max_files());
    }
}
