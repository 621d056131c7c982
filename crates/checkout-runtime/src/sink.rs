//! HTTP Upload Sink
//!
//! Sends an order's files as one multipart request:
//!
//! ```text
//! POST /api/orders/{order_id}/files
//!   customer_email = buyer@example.com
//!   file           = <bytes>  (filename "{staged id}.{ext}", part content type)
//!   file           = ...
//!
//! GET  /api/orders/{order_id}/files   200 stored record | 404 nothing stored
//! ```
//!
//! Each file part is streamed in chunks so progress follows the bytes that
//! actually leave the client.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use checkout_core::storage::extension_for;
use checkout_core::{
    CheckoutError, ProgressFn, Result, UploadBatch, UploadProgress, UploadSink,
};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use crate::config::{ServerConfig, path_segment};

const CHUNK_SIZE: usize = 64 * 1024;

/// Error body returned by the server
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    #[serde(default)]
    code: Option<String>,
}

/// Shared byte and file counters behind the progress callback
struct ProgressTracker {
    files_done: AtomicUsize,
    bytes_done: AtomicU64,
    files_total: usize,
    bytes_total: u64,
    progress: ProgressFn,
}

impl ProgressTracker {
    fn advance(&self, bytes: u64, file_finished: bool) {
        let bytes_done = self.bytes_done.fetch_add(bytes, Ordering::SeqCst) + bytes;
        let files_done = if file_finished {
            self.files_done.fetch_add(1, Ordering::SeqCst) + 1
        } else {
            self.files_done.load(Ordering::SeqCst)
        };

        (self.progress)(UploadProgress {
            files_done,
            files_total: self.files_total,
            bytes_done,
            bytes_total: self.bytes_total,
        });
    }
}

/// `UploadSink` over the checkout server's multipart endpoint
pub struct HttpUploadSink {
    client: reqwest::Client,
    config: ServerConfig,
}

impl HttpUploadSink {
    pub fn new(config: ServerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.upload_timeout)
            .build()
            .map_err(|e| CheckoutError::Config(format!("HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(ServerConfig::from_env())
    }

    fn build_form(batch: UploadBatch, tracker: &Arc<ProgressTracker>) -> Result<Form> {
        let mut form = Form::new().text("customer_email", batch.customer_email);

        for file in batch.files {
            let file_name = format!("{}.{}", file.id, extension_for(&file.content_type));
            let length = file.bytes.len() as u64;

            let mut chunks: Vec<Vec<u8>> =
                file.bytes.chunks(CHUNK_SIZE).map(<[u8]>::to_vec).collect();
            if chunks.is_empty() {
                chunks.push(Vec::new());
            }
            let last = chunks.len() - 1;

            let tracker = tracker.clone();
            let stream = futures::stream::iter(chunks.into_iter().enumerate().map(
                move |(index, chunk)| {
                    tracker.advance(chunk.len() as u64, index == last);
                    Ok::<_, std::io::Error>(chunk)
                },
            ));

            let part = Part::stream_with_length(reqwest::Body::wrap_stream(stream), length)
                .file_name(file_name)
                .mime_str(&file.content_type)
                .map_err(|e| CheckoutError::UploadFailed(format!("content type for {}: {e}", file.id)))?;

            form = form.part("file", part);
        }

        Ok(form)
    }
}

#[async_trait]
impl UploadSink for HttpUploadSink {
    async fn upload_files(&self, batch: UploadBatch, progress: ProgressFn) -> Result<()> {
        let url = self
            .config
            .endpoint(&format!("/api/orders/{}/files", path_segment(&batch.order_id)))?;
        let order_id = batch.order_id.clone();

        let tracker = Arc::new(ProgressTracker {
            files_done: AtomicUsize::new(0),
            bytes_done: AtomicU64::new(0),
            files_total: batch.files.len(),
            bytes_total: batch.total_bytes(),
            progress,
        });
        let form = Self::build_form(batch, &tracker)?;

        tracing::info!(
            order_id = %order_id,
            files = tracker.files_total,
            bytes = tracker.bytes_total,
            "Uploading files"
        );

        let response = self
            .client
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| CheckoutError::UploadFailed(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let detail = match response.json::<ErrorBody>().await {
            Ok(body) => match body.code {
                Some(code) => format!("{} ({code})", body.error),
                None => body.error,
            },
            Err(_) => format!("server returned {status}"),
        };
        Err(CheckoutError::UploadFailed(detail))
    }

    async fn has_order(&self, order_id: &str) -> Result<bool> {
        let url = self
            .config
            .endpoint(&format!("/api/orders/{}/files", path_segment(order_id)))?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CheckoutError::UploadFailed(e.to_string()))?;

        match response.status() {
            reqwest::StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(CheckoutError::UploadFailed(format!(
                "upload lookup returned {status}"
            ))),
        }
    }
}
