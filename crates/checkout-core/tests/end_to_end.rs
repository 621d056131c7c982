//! Stage, pay, reconcile, upload

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use checkout_core::{
    Checkout, CheckoutConfig, CheckoutError, FileKeyValueStore, KeyValueStore,
    MemoryKeyValueStore, MemoryUploadSink, Order, OrderGateway, OrderStatus, Result, RetryPolicy,
    StagingFile, StagingStore, UploadCoordinator,
};

/// Order gateway where the webhook "lands" after a number of lookups
struct WebhookLagGateway {
    order: Mutex<Order>,
    misses_before_visible: u32,
    lookups: AtomicU32,
}

impl WebhookLagGateway {
    fn new(order: Order, misses_before_visible: u32) -> Self {
        Self {
            order: Mutex::new(order),
            misses_before_visible,
            lookups: AtomicU32::new(0),
        }
    }

    fn status(&self) -> OrderStatus {
        self.order.lock().unwrap().status
    }
}

#[async_trait]
impl OrderGateway for WebhookLagGateway {
    async fn get_order(&self, session_id: &str) -> Result<Option<Order>> {
        let n = self.lookups.fetch_add(1, Ordering::SeqCst);
        let order = self.order.lock().unwrap();
        if n < self.misses_before_visible || order.session_id != session_id {
            return Ok(None);
        }
        Ok(Some(order.clone()))
    }

    async fn set_order_status(&self, order_id: &str, status: OrderStatus) -> Result<()> {
        let mut order = self.order.lock().unwrap();
        if order.id != order_id {
            return Err(CheckoutError::Gateway(format!("unknown order {order_id}")));
        }
        order.status = status;
        Ok(())
    }
}

fn config() -> CheckoutConfig {
    CheckoutConfig {
        retry: RetryPolicy::new(5, Duration::from_millis(500), 2.0),
        ..Default::default()
    }
}

fn photos() -> Vec<StagingFile> {
    vec![
        StagingFile::new("front.jpg", "image/jpeg", vec![0xFF, 0xD8, 0xFF, 0xE0, 1, 2, 3]),
        StagingFile::new("side.png", "image/png", vec![0x89, b'P', b'N', b'G', 9, 9]),
    ]
}

#[tokio::test(start_paused = true)]
async fn test_order_appears_after_two_misses() {
    let kv = Arc::new(MemoryKeyValueStore::new());
    let staging = Arc::new(StagingStore::from_config(kv.clone(), &config()));
    let ids = staging.stage_all(photos()).await.unwrap();
    assert!(staging.verify_complete(&ids).unwrap().is_empty());

    let gateway = Arc::new(WebhookLagGateway::new(
        Order::new("cs_test_e2e", "buyer@example.com"),
        2,
    ));
    let sink = Arc::new(MemoryUploadSink::new());
    let checkout = Checkout::new(config(), staging.clone(), gateway.clone(), sink.clone());

    let mut waits = 0;
    let result = checkout.resume("cs_test_e2e", |_| waits += 1).await;

    assert!(result.success, "unexpected failure: {result:?}");
    assert_eq!(result.error, None);
    assert_eq!(gateway.lookups.load(Ordering::SeqCst), 3);
    assert_eq!(waits, 2);
    assert!(kv.is_empty());
    assert_eq!(gateway.status(), OrderStatus::Processing);

    let order_id = gateway.order.lock().unwrap().id.clone();
    let stored = sink.stored(&order_id).unwrap();
    assert_eq!(stored.files.len(), 2);
    let mut types: Vec<_> = stored.files.values().map(|f| f.content_type.clone()).collect();
    types.sort();
    assert_eq!(types, vec!["image/jpeg".to_string(), "image/png".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_order_never_appears_leaves_staging_alone() {
    let kv = Arc::new(MemoryKeyValueStore::new());
    let staging = Arc::new(StagingStore::from_config(kv.clone(), &config()));
    staging.stage_all(photos()).await.unwrap();

    let gateway = Arc::new(WebhookLagGateway::new(
        Order::new("cs_other", "buyer@example.com"),
        0,
    ));
    let sink = Arc::new(MemoryUploadSink::new());
    let checkout = Checkout::new(config(), staging.clone(), gateway.clone(), sink.clone());

    let result = checkout.try_resume("cs_test_lost", |_| {}).await;

    assert!(matches!(result, Err(CheckoutError::OrderNotFound { attempts: 5, .. })));
    assert_eq!(gateway.lookups.load(Ordering::SeqCst), 5);
    assert_eq!(sink.calls(), 0);
    assert_eq!(staging.read_all().unwrap().files.len(), 2);
}

#[tokio::test]
async fn test_repeated_completion_is_idempotent() {
    let kv = Arc::new(MemoryKeyValueStore::new());
    let staging = Arc::new(StagingStore::from_config(kv.clone(), &config()));
    let sink = Arc::new(MemoryUploadSink::new());
    let order = Order::new("cs_test_twice", "buyer@example.com");
    let gateway = Arc::new(WebhookLagGateway::new(order.clone(), 0));
    let coordinator = UploadCoordinator::new(staging.clone(), sink.clone(), gateway);

    staging.stage_all(photos()).await.unwrap();
    assert!(coordinator.complete(&order).await.success);

    // A crash before cleanup would leave the same files staged
    staging.stage_all(photos()).await.unwrap();
    assert!(coordinator.complete(&order).await.success);

    assert_eq!(sink.calls(), 2);
    assert_eq!(sink.file_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_reloaded_success_page_reports_success() {
    let kv = Arc::new(MemoryKeyValueStore::new());
    let staging = Arc::new(StagingStore::from_config(kv.clone(), &config()));
    staging.stage_all(photos()).await.unwrap();

    let gateway = Arc::new(WebhookLagGateway::new(
        Order::new("cs_test_reload", "buyer@example.com"),
        0,
    ));
    let sink = Arc::new(MemoryUploadSink::new());
    let checkout = Checkout::new(config(), staging.clone(), gateway.clone(), sink.clone());

    let first = checkout.try_resume("cs_test_reload", |_| {}).await.unwrap();
    let second = checkout.try_resume("cs_test_reload", |_| {}).await.unwrap();

    assert!(!first.already_uploaded);
    assert!(second.already_uploaded);
    assert_eq!(sink.calls(), 1);
    assert_eq!(gateway.status(), OrderStatus::Processing);
}

#[tokio::test]
async fn test_interrupted_staging_is_invisible_after_restart() {
    let dir = tempfile::tempdir().unwrap();

    {
        // Payloads reached storage, the manifest never did
        let kv = FileKeyValueStore::open(dir.path()).unwrap();
        kv.set("checkout:file:1700000000000-deadbeef", "data:image/png;base64,AAAA")
            .unwrap();
        kv.set("checkout:file:1700000000001-feedface", "data:image/png;base64,AAAA")
            .unwrap();
    }

    let kv = Arc::new(FileKeyValueStore::open(dir.path()).unwrap());
    let staging = StagingStore::from_config(kv.clone(), &config());

    assert!(staging.read_all().unwrap().is_empty());
    assert_eq!(staging.sweep_orphans().unwrap(), 2);
    assert!(kv.keys_with_prefix("checkout:").unwrap().is_empty());
}
