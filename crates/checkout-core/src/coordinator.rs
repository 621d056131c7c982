//! Upload Coordinator
//!
//! Turns a found order plus the staged files into a durable upload:
//!
//! 1. read the staged batch; with nothing staged the call succeeds only if
//!    the order already left `pending` or the sink already holds its files
//! 2. decode every file; one bad or missing payload aborts the batch
//! 3. upload all files as one operation scoped to the order
//! 4. clear staging, then move the order to `processing` (best-effort)
//!
//! An upload failure keeps staging intact so step 3 can be retried without
//! re-staging. Bad staged data is discarded once reported, since retrying
//! it can never succeed.

use std::sync::Arc;

use crate::codec;
use crate::error::{CheckoutError, Result};
use crate::order::{Order, OrderGateway, OrderStatus};
use crate::staging::{StagedBatch, StagingStore};
use crate::upload::{ProgressFn, UploadBatch, UploadFile, UploadResult, UploadSink, no_progress};

/// Summary of a successful completion
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletedUpload {
    pub order_id: String,
    pub files: usize,
    pub bytes: u64,
    /// Whether the `processing` status was persisted
    pub status_updated: bool,
    /// Nothing was staged because an earlier completion already uploaded
    pub already_uploaded: bool,
}

/// Drives decode, upload, cleanup and status update for one order
pub struct UploadCoordinator {
    staging: Arc<StagingStore>,
    sink: Arc<dyn UploadSink>,
    gateway: Arc<dyn OrderGateway>,
    progress: ProgressFn,
}

impl UploadCoordinator {
    pub fn new(
        staging: Arc<StagingStore>,
        sink: Arc<dyn UploadSink>,
        gateway: Arc<dyn OrderGateway>,
    ) -> Self {
        Self {
            staging,
            sink,
            gateway,
            progress: no_progress(),
        }
    }

    /// Report upload progress to `progress`
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = progress;
        self
    }

    /// Complete the upload for `order`, reporting the outcome for display
    pub async fn complete(&self, order: &Order) -> UploadResult {
        match self.try_complete(order).await {
            Ok(_) => UploadResult::success(),
            Err(e) => UploadResult::failure(&e),
        }
    }

    /// Complete the upload for `order`
    pub async fn try_complete(&self, order: &Order) -> Result<CompletedUpload> {
        let files = match self.read_staged() {
            Ok(Some(files)) => files,
            Ok(None) => return self.complete_without_staging(order).await,
            Err(e) if e.is_terminal_for_staging() => {
                tracing::error!(order_id = %order.id, error = %e, "Staged files unusable");
                self.discard_staging();
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let upload = UploadBatch {
            order_id: order.id.clone(),
            customer_email: order.customer_email.clone(),
            files,
        };
        let file_count = upload.files.len();
        let bytes = upload.total_bytes();

        tracing::info!(
            order_id = %order.id,
            files = file_count,
            bytes,
            "Uploading staged files"
        );

        if let Err(e) = self.sink.upload_files(upload, self.progress.clone()).await {
            let e = match e {
                CheckoutError::UploadFailed(_) => e,
                other => CheckoutError::UploadFailed(other.to_string()),
            };
            tracing::warn!(order_id = %order.id, error = %e, "Upload failed, keeping staged files");
            return Err(e);
        }

        // The upload is the source of truth from here on
        if let Err(e) = self.staging.clear() {
            tracing::warn!(order_id = %order.id, error = %e, "Uploaded, but clearing staging failed");
        }

        let status_updated = self.advance_status(order).await;

        Ok(CompletedUpload {
            order_id: order.id.clone(),
            files: file_count,
            bytes,
            status_updated,
            already_uploaded: false,
        })
    }

    fn read_staged(&self) -> Result<Option<Vec<UploadFile>>> {
        let batch = self.staging.read_all()?;
        if batch.is_empty() {
            return Ok(None);
        }
        decode_batch(batch).map(Some)
    }

    /// Nothing staged: fine if this order's files were uploaded earlier
    async fn complete_without_staging(&self, order: &Order) -> Result<CompletedUpload> {
        let uploaded = order.status != OrderStatus::Pending
            || self
                .sink
                .has_order(&order.id)
                .await
                .map_err(|e| CheckoutError::UploadFailed(e.to_string()))?;
        if !uploaded {
            tracing::warn!(order_id = %order.id, "Order found but nothing is staged");
            return Err(CheckoutError::NoStagedFiles);
        }

        tracing::info!(order_id = %order.id, status = %order.status, "Order files already uploaded");
        let status_updated = order.status == OrderStatus::Pending && self.advance_status(order).await;
        Ok(CompletedUpload {
            order_id: order.id.clone(),
            files: 0,
            bytes: 0,
            status_updated,
            already_uploaded: true,
        })
    }

    async fn advance_status(&self, order: &Order) -> bool {
        if !order.status.can_transition_to(OrderStatus::Processing) {
            tracing::debug!(
                order_id = %order.id,
                status = %order.status,
                "Order already past processing, leaving status"
            );
            return false;
        }

        match self
            .gateway
            .set_order_status(&order.id, OrderStatus::Processing)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                let e = CheckoutError::StatusUpdateFailed(e.to_string());
                tracing::warn!(order_id = %order.id, error = %e, "Files uploaded; status not updated");
                false
            }
        }
    }

    fn discard_staging(&self) {
        if let Err(e) = self.staging.clear() {
            tracing::warn!(error = %e, "Failed to discard unusable staged files");
        }
    }
}

/// Decode a whole staged batch or nothing
fn decode_batch(batch: StagedBatch) -> Result<Vec<UploadFile>> {
    if !batch.is_complete() {
        return Err(CheckoutError::StagingIncomplete {
            missing: batch.missing,
        });
    }

    batch
        .files
        .into_iter()
        .map(|staged| -> Result<UploadFile> {
            let decoded =
                codec::decode(&staged.encoded_payload).map_err(|e| e.for_id(&staged.id))?;
            Ok(UploadFile {
                id: staged.id,
                content_type: decoded.content_type,
                bytes: decoded.bytes,
            })
        })
        .collect()
}
