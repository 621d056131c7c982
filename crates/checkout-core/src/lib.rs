//! # checkout-core
//!
//! Stage files before a payment redirect, then reconcile them with the order
//! the payment webhook creates, and upload them exactly once.
//!
//! ## Flow
//!
//! ```text
//!  select files ──▶ StagingStore::stage_all ──▶ [payment redirect] ──┐
//!                   (codec + manifest commit)                        │
//!                                                                    ▼
//!  Order status ◀── UploadCoordinator::complete ◀── ReconciliationPoller::find_order
//!  (processing)     (decode, upload, clear)         (bounded backoff lookup)
//! ```
//!
//! The session id from the return URL is the only state that crosses the
//! redirect. Staged files sit in a `KeyValueStore`; the order lives behind an
//! `OrderGateway`; files go to an `UploadSink`. All three are traits so the
//! same flow runs against browser storage, HTTP services, or in-memory fakes.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use checkout_core::{CheckoutConfig, MemoryKeyValueStore, StagingStore, Checkout};
//!
//! let config = CheckoutConfig::from_env();
//! let staging = Arc::new(StagingStore::from_config(Arc::new(MemoryKeyValueStore::new()), &config));
//! let ids = staging.stage_all(files).await?;
//!
//! // ... user pays, comes back with ?session_id=cs_...
//!
//! let checkout = Checkout::new(config, staging, gateway, sink);
//! let result = checkout.resume("cs_test_123", |p| println!("attempt {}", p.attempt)).await;
//! ```

pub mod codec;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod kv;
pub mod order;
pub mod poller;
pub mod retry;
pub mod staging;
pub mod storage;
pub mod upload;

pub use config::CheckoutConfig;
pub use coordinator::{CompletedUpload, UploadCoordinator};
pub use error::{CheckoutError, Result};
pub use kv::{FileKeyValueStore, KeyValueStore, MemoryKeyValueStore};
pub use order::{Order, OrderGateway, OrderStatus};
pub use poller::ReconciliationPoller;
pub use retry::{PollOutcome, PollProgress, RetryPolicy, poll_until_found};
pub use staging::{StagedBatch, StagedFile, StagingFile, StagingManifest, StagingStore};
pub use storage::DirectoryUploadSink;
pub use upload::{
    MemoryUploadSink, ProgressFn, UploadBatch, UploadFile, UploadProgress, UploadResult,
    UploadSink,
};

use std::sync::Arc;

/// Post-redirect flow: find the order, then complete its upload
pub struct Checkout {
    poller: ReconciliationPoller,
    coordinator: UploadCoordinator,
}

impl Checkout {
    pub fn new(
        config: CheckoutConfig,
        staging: Arc<StagingStore>,
        gateway: Arc<dyn OrderGateway>,
        sink: Arc<dyn UploadSink>,
    ) -> Self {
        Self {
            poller: ReconciliationPoller::new(gateway.clone(), config.retry),
            coordinator: UploadCoordinator::new(staging, sink, gateway),
        }
    }

    /// Report upload progress to `progress`
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.coordinator = self.coordinator.with_progress(progress);
        self
    }

    /// Reconcile and upload, surfacing every failure as a typed error
    pub async fn try_resume<P>(&self, session_id: &str, on_wait: P) -> Result<CompletedUpload>
    where
        P: FnMut(&PollProgress),
    {
        let order = self.poller.find_order(session_id, on_wait).await?;
        self.coordinator.try_complete(&order).await
    }

    /// Reconcile and upload, reporting the outcome for display
    pub async fn resume<P>(&self, session_id: &str, on_wait: P) -> UploadResult
    where
        P: FnMut(&PollProgress),
    {
        match self.try_resume(session_id, on_wait).await {
            Ok(_) => UploadResult::success(),
            Err(e) => UploadResult::failure(&e),
        }
    }
}
