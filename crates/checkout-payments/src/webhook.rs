//! Stripe Webhook Handling
//!
//! Creates the order record when a checkout session completes. This runs on
//! Stripe's schedule, not the client's; the client finds the order later by
//! polling with the session id.

use std::sync::Arc;

use checkout_core::Order;
use stripe::{Event, EventObject, EventType, Webhook};

use crate::error::{PaymentError, Result};
use crate::orders::{OrderStore, Package};

/// Parsed webhook event
#[derive(Clone, Debug)]
pub enum WebhookEvent {
    /// Checkout completed - order created (or already present)
    CheckoutCompleted {
        session_id: String,
        customer_email: String,
        package: Option<Package>,
    },

    /// Checkout session expired before payment
    CheckoutExpired { session_id: String },

    /// Unhandled event type
    Other { event_type: String },
}

/// Webhook handler
pub struct WebhookHandler<S: OrderStore> {
    order_store: Arc<S>,
}

impl<S: OrderStore> WebhookHandler<S> {
    pub fn new(order_store: Arc<S>) -> Self {
        Self { order_store }
    }

    /// Verify webhook signature and parse event
    pub fn parse_event(&self, payload: &str, signature: &str, secret: &str) -> Result<Event> {
        Webhook::construct_event(payload, signature, secret)
            .map_err(|e| PaymentError::WebhookSignature(e.to_string()))
    }

    /// Process a webhook event
    pub async fn handle(&self, event: Event) -> Result<WebhookEvent> {
        tracing::info!(event_type = ?event.type_, "Processing Stripe webhook");

        let parsed = Self::parse_webhook_event(&event)?;

        match &parsed {
            WebhookEvent::CheckoutCompleted {
                session_id,
                customer_email,
                package,
            } => {
                self.record_checkout(session_id, customer_email, *package)?;
            }

            WebhookEvent::CheckoutExpired { session_id } => {
                tracing::info!(session_id = %session_id, "Checkout session expired, no order created");
            }

            WebhookEvent::Other { event_type } => {
                tracing::debug!(event_type = %event_type, "Unhandled webhook event");
            }
        }

        Ok(parsed)
    }

    /// Create the pending order for a completed session.
    ///
    /// Stripe redelivers events; a session that already has an order gets
    /// that order back unchanged.
    pub fn record_checkout(
        &self,
        session_id: &str,
        customer_email: &str,
        package: Option<Package>,
    ) -> Result<Order> {
        if session_id.is_empty() {
            return Err(PaymentError::WebhookParse("checkout session without id".into()));
        }

        let mut order = Order::new(session_id, customer_email);
        if let Some(package) = package {
            order = order.with_package(package.as_str());
        }
        let candidate_id = order.id.clone();
        let order = self.order_store.insert_if_absent(order)?;

        if order.id == candidate_id {
            tracing::info!(
                order_id = %order.id,
                session_id = %session_id,
                email = %customer_email,
                package = ?package,
                "Created order"
            );
        } else {
            tracing::debug!(
                session_id = %session_id,
                order_id = %order.id,
                "Order already recorded for session"
            );
        }

        Ok(order)
    }

    /// Parse Stripe event into our event type
    fn parse_webhook_event(event: &Event) -> Result<WebhookEvent> {
        match event.type_ {
            EventType::CheckoutSessionCompleted => {
                if let EventObject::CheckoutSession(session) = &event.data.object {
                    let package = session
                        .metadata
                        .as_ref()
                        .and_then(|m| m.get("package"))
                        .and_then(|p| Package::parse(p));

                    Ok(WebhookEvent::CheckoutCompleted {
                        session_id: session.id.to_string(),
                        customer_email: session.customer_email.clone().unwrap_or_default(),
                        package,
                    })
                } else {
                    Err(PaymentError::WebhookParse("Invalid checkout session data".into()))
                }
            }

            EventType::CheckoutSessionExpired => {
                if let EventObject::CheckoutSession(session) = &event.data.object {
                    Ok(WebhookEvent::CheckoutExpired {
                        session_id: session.id.to_string(),
                    })
                } else {
                    Err(PaymentError::WebhookParse("Invalid checkout session data".into()))
                }
            }

            _ => Ok(WebhookEvent::Other {
                event_type: format!("{:?}", event.type_),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::MemoryOrderStore;
    use checkout_core::OrderStatus;

    #[test]
    fn test_record_checkout_creates_pending_order() {
        let store = Arc::new(MemoryOrderStore::new());
        let handler = WebhookHandler::new(store.clone());

        let order = handler
            .record_checkout("cs_test_1", "buyer@example.com", Some(Package::Standard))
            .unwrap();

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.package.as_deref(), Some("standard"));
        assert_eq!(store.get_by_session("cs_test_1").unwrap().unwrap().id, order.id);
    }

    #[test]
    fn test_redelivery_is_idempotent() {
        let store = Arc::new(MemoryOrderStore::new());
        let handler = WebhookHandler::new(store.clone());

        let first = handler.record_checkout("cs_test_1", "buyer@example.com", None).unwrap();
        let second = handler.record_checkout("cs_test_1", "buyer@example.com", None).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_concurrent_redelivery_creates_one_order() {
        let store = Arc::new(MemoryOrderStore::new());
        let handler = WebhookHandler::new(store.clone());

        let ids: Vec<String> = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        handler
                            .record_checkout("cs_test_race", "buyer@example.com", None)
                            .unwrap()
                            .id
                    })
                })
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });

        assert!(ids.iter().all(|id| *id == ids[0]));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get_by_session("cs_test_race").unwrap().unwrap().id, ids[0]);
    }

    #[test]
    fn test_bad_signature_rejected() {
        let store = Arc::new(MemoryOrderStore::new());
        let handler = WebhookHandler::new(store);

        let result = handler.parse_event(
            r#"{"type":"checkout.session.completed"}"#,
            "t=1,v1=deadbeef",
            "whsec_test",
        );
        assert!(matches!(result, Err(PaymentError::WebhookSignature(_))));
    }
}
