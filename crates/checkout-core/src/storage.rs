//! Directory Storage
//!
//! Durable upload sink on the local filesystem:
//!
//! ```text
//! <root>/<order_id>/order.json
//! <root>/<order_id>/000-<sha256[..16]>.jpg
//! <root>/<order_id>/001-<sha256[..16]>.png
//! ```
//!
//! Names depend only on position and content, so uploading the same batch
//! again rewrites the same files. Files left from an earlier, different
//! batch for the order are removed once the new batch is written.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CheckoutError, Result};
use crate::upload::{ProgressFn, UploadBatch, UploadProgress, UploadSink};

const RECORD_FILE: &str = "order.json";

/// Metadata written next to an order's files
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredOrderRecord {
    pub order_id: String,
    pub customer_email: String,
    pub files: Vec<StoredFileRecord>,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFileRecord {
    /// Staged id the file was uploaded under
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub content_type: String,
    pub size: u64,
    pub sha256: String,
}

/// Filesystem upload sink
pub struct DirectoryUploadSink {
    root: PathBuf,
}

impl DirectoryUploadSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn order_dir(&self, order_id: &str) -> Result<PathBuf> {
        let valid = !order_id.is_empty()
            && order_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(CheckoutError::UploadFailed(format!("invalid order id: {order_id:?}")));
        }
        Ok(self.root.join(order_id))
    }

    /// Read the stored record for an order
    pub async fn record(&self, order_id: &str) -> Result<Option<StoredOrderRecord>> {
        let path = self.order_dir(order_id)?.join(RECORD_FILE);
        match tokio::fs::read(&path).await {
            Ok(body) => Ok(Some(serde_json::from_slice(&body)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// File extension for a content type
pub fn extension_for(content_type: &str) -> &'static str {
    match content_type.to_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "image/heic" => "heic",
        "application/pdf" => "pdf",
        _ => "bin",
    }
}

#[async_trait]
impl UploadSink for DirectoryUploadSink {
    async fn upload_files(&self, batch: UploadBatch, progress: ProgressFn) -> Result<()> {
        let dir = self.order_dir(&batch.order_id)?;
        let upload_err = |e: std::io::Error| CheckoutError::UploadFailed(e.to_string());

        tokio::fs::create_dir_all(&dir).await.map_err(upload_err)?;

        let files_total = batch.files.len();
        let bytes_total = batch.total_bytes();
        let mut bytes_done = 0;
        let mut records = Vec::with_capacity(files_total);

        for (index, file) in batch.files.iter().enumerate() {
            let sha256 = file.digest();
            let name = format!(
                "{index:03}-{}.{}",
                &sha256[..16],
                extension_for(&file.content_type)
            );
            tokio::fs::write(dir.join(&name), &file.bytes)
                .await
                .map_err(upload_err)?;

            bytes_done += file.bytes.len() as u64;
            progress(UploadProgress {
                files_done: index + 1,
                files_total,
                bytes_done,
                bytes_total,
            });

            records.push(StoredFileRecord {
                id: file.id.clone(),
                name,
                content_type: file.content_type.clone(),
                size: file.bytes.len() as u64,
                sha256,
            });
        }

        let keep: HashSet<&str> = records.iter().map(|r| r.name.as_str()).collect();
        let mut entries = tokio::fs::read_dir(&dir).await.map_err(upload_err)?;
        while let Some(entry) = entries.next_entry().await.map_err(upload_err)? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name != RECORD_FILE && !keep.contains(name) {
                tracing::debug!(order_id = %batch.order_id, file = %name, "Removing stale upload");
                tokio::fs::remove_file(entry.path()).await.map_err(upload_err)?;
            }
        }

        // Record last; it marks the batch as fully written
        let record = StoredOrderRecord {
            order_id: batch.order_id.clone(),
            customer_email: batch.customer_email.clone(),
            files: records,
            uploaded_at: Utc::now(),
        };
        let body = serde_json::to_vec_pretty(&record)?;
        tokio::fs::write(dir.join(RECORD_FILE), body)
            .await
            .map_err(upload_err)?;

        tracing::info!(
            order_id = %batch.order_id,
            files = files_total,
            bytes = bytes_total,
            "Stored order files"
        );
        Ok(())
    }

    async fn has_order(&self, order_id: &str) -> Result<bool> {
        Ok(self.record(order_id).await?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::{UploadFile, no_progress};

    fn batch(contents: &[&[u8]]) -> UploadBatch {
        UploadBatch {
            order_id: "order-42".into(),
            customer_email: "buyer@example.com".into(),
            files: contents
                .iter()
                .enumerate()
                .map(|(i, bytes)| UploadFile {
                    id: format!("staged-{i}"),
                    content_type: "image/jpeg".into(),
                    bytes: bytes.to_vec(),
                })
                .collect(),
        }
    }

    async fn file_names(dir: &Path) -> Vec<String> {
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_repeated_upload_does_not_duplicate() {
        let root = tempfile::tempdir().unwrap();
        let sink = DirectoryUploadSink::new(root.path());

        sink.upload_files(batch(&[b"one", b"two"]), no_progress()).await.unwrap();
        let first = file_names(&root.path().join("order-42")).await;
        sink.upload_files(batch(&[b"one", b"two"]), no_progress()).await.unwrap();
        let second = file_names(&root.path().join("order-42")).await;

        assert_eq!(first, second);
        assert_eq!(second.len(), 3);
        assert!(second.contains(&"order.json".to_string()));

        let record = sink.record("order-42").await.unwrap().unwrap();
        assert_eq!(record.files.len(), 2);
        assert_eq!(record.customer_email, "buyer@example.com");
        assert!(record.files[0].name.ends_with(".jpg"));
        assert_eq!(record.files[1].id, "staged-1");
    }

    #[tokio::test]
    async fn test_has_order_follows_record() {
        let root = tempfile::tempdir().unwrap();
        let sink = DirectoryUploadSink::new(root.path());

        assert!(!sink.has_order("order-42").await.unwrap());
        sink.upload_files(batch(&[b"one"]), no_progress()).await.unwrap();
        assert!(sink.has_order("order-42").await.unwrap());
        assert!(!sink.has_order("order-43").await.unwrap());
    }

    #[tokio::test]
    async fn test_different_batch_replaces_files() {
        let root = tempfile::tempdir().unwrap();
        let sink = DirectoryUploadSink::new(root.path());

        sink.upload_files(batch(&[b"one", b"two", b"three"]), no_progress()).await.unwrap();
        sink.upload_files(batch(&[b"four"]), no_progress()).await.unwrap();

        let names = file_names(&root.path().join("order-42")).await;
        assert_eq!(names.len(), 2);
    }

    #[tokio::test]
    async fn test_rejects_path_like_order_ids() {
        let root = tempfile::tempdir().unwrap();
        let sink = DirectoryUploadSink::new(root.path());

        let mut bad = batch(&[b"x"]);
        bad.order_id = "../escape".into();
        let result = sink.upload_files(bad, no_progress()).await;
        assert!(matches!(result, Err(CheckoutError::UploadFailed(_))));
    }

    #[test]
    fn test_extension_for() {
        assert_eq!(extension_for("image/JPEG"), "jpg");
        assert_eq!(extension_for("application/zip"), "bin");
    }
}
