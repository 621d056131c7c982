//! Upload Sink
//!
//! Durable destination for an order's files. One call uploads the whole
//! batch; the destination keys it by order id so a repeated call stores the
//! same files again rather than adding copies.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{CheckoutError, Result};

/// A decoded file ready for upload
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadFile {
    /// Staged id the file came from
    pub id: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    /// Hex SHA-256 of the content
    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(&self.bytes))
    }
}

/// Everything uploaded for one order
#[derive(Clone, Debug)]
pub struct UploadBatch {
    pub order_id: String,
    pub customer_email: String,
    pub files: Vec<UploadFile>,
}

impl UploadBatch {
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.bytes.len() as u64).sum()
    }
}

/// Fractional upload progress
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UploadProgress {
    pub files_done: usize,
    pub files_total: usize,
    pub bytes_done: u64,
    pub bytes_total: u64,
}

impl UploadProgress {
    /// Completed fraction in `0.0..=1.0`, by bytes
    #[allow(clippy::cast_precision_loss)]
    pub fn fraction(&self) -> f64 {
        if self.bytes_total == 0 {
            return if self.files_done >= self.files_total { 1.0 } else { 0.0 };
        }
        (self.bytes_done as f64 / self.bytes_total as f64).min(1.0)
    }
}

/// Progress callback
pub type ProgressFn = Arc<dyn Fn(UploadProgress) + Send + Sync>;

/// Progress callback that ignores updates
pub fn no_progress() -> ProgressFn {
    Arc::new(|_| {})
}

/// Outcome of an upload attempt, as shown to the user
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResult {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Machine-readable error code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// Staged files were kept and the same step can be run again
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub retryable: bool,
}

impl UploadResult {
    pub fn success() -> Self {
        Self {
            success: true,
            error: None,
            code: None,
            retryable: false,
        }
    }

    pub fn failure(err: &CheckoutError) -> Self {
        Self {
            success: false,
            error: Some(err.user_message()),
            code: Some(err.code().to_string()),
            retryable: err.is_retryable(),
        }
    }
}

/// Upload destination trait (Strategy pattern)
#[async_trait]
pub trait UploadSink: Send + Sync {
    /// Upload the whole batch as one logical operation, idempotent per order id
    async fn upload_files(&self, batch: UploadBatch, progress: ProgressFn) -> Result<()>;

    /// Whether a batch has already been stored for `order_id`
    async fn has_order(&self, order_id: &str) -> Result<bool>;
}

/// Files stored for one order
#[derive(Clone, Debug, Default)]
pub struct StoredOrder {
    pub customer_email: String,
    /// Files keyed by content digest
    pub files: BTreeMap<String, UploadFile>,
}

/// In-memory upload sink (for development/testing)
pub struct MemoryUploadSink {
    orders: RwLock<HashMap<String, StoredOrder>>,
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl Default for MemoryUploadSink {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryUploadSink {
    pub fn new() -> Self {
        Self {
            orders: RwLock::new(HashMap::new()),
            calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        }
    }

    /// Reject every upload until switched back
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of `upload_files` calls so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Files stored for an order
    pub fn stored(&self, order_id: &str) -> Option<StoredOrder> {
        self.orders.read().unwrap().get(order_id).cloned()
    }

    /// Total files stored across all orders
    pub fn file_count(&self) -> usize {
        self.orders.read().unwrap().values().map(|o| o.files.len()).sum()
    }
}

#[async_trait]
impl UploadSink for MemoryUploadSink {
    async fn upload_files(&self, batch: UploadBatch, progress: ProgressFn) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.failing.load(Ordering::SeqCst) {
            return Err(CheckoutError::UploadFailed("storage unavailable".into()));
        }

        let files_total = batch.files.len();
        let bytes_total = batch.total_bytes();
        let mut bytes_done = 0;

        let mut stored = StoredOrder {
            customer_email: batch.customer_email.clone(),
            files: BTreeMap::new(),
        };
        for (i, file) in batch.files.into_iter().enumerate() {
            bytes_done += file.bytes.len() as u64;
            stored.files.insert(file.digest(), file);
            progress(UploadProgress {
                files_done: i + 1,
                files_total,
                bytes_done,
                bytes_total,
            });
        }

        self.orders.write().unwrap().insert(batch.order_id, stored);
        Ok(())
    }

    async fn has_order(&self, order_id: &str) -> Result<bool> {
        Ok(self.orders.read().unwrap().contains_key(order_id))
    }
}
