//! Staging Store
//!
//! Holds encoded files across the payment redirect.
//!
//! ```text
//! <prefix>:file:<id>   encoded payload, one entry per file
//! <prefix>:manifest    ordered ids of the current batch (commit record)
//! ```
//!
//! The manifest is written only after every payload write succeeded, and it is
//! deleted only after every payload it names is gone. A reader never sees a
//! manifest pointing at payloads that were never written; a crash at worst
//! leaves unreferenced payloads behind, which `sweep_orphans` reclaims.
//!
//! One consumer per staging area is assumed. Two tabs (or processes) running
//! `read_all` and `clear` against the same area at once can race; nothing here
//! locks against that.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::codec;
use crate::error::{CheckoutError, Result};
use crate::kv::KeyValueStore;

/// A file selected by the user, before staging
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StagingFile {
    pub name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl StagingFile {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }
}

/// A file as held in the staging area
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedFile {
    pub id: String,
    pub encoded_payload: String,
    pub content_type: String,
}

/// Commit record for one checkout attempt
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingManifest {
    pub ids: Vec<String>,
    pub staged_at: DateTime<Utc>,
}

/// Result of resolving the manifest
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StagedBatch {
    /// Resolved files, in manifest order
    pub files: Vec<StagedFile>,
    /// Manifest ids with no stored payload
    pub missing: Vec<String>,
}

impl StagedBatch {
    /// Number of ids the manifest listed
    pub fn expected(&self) -> usize {
        self.files.len() + self.missing.len()
    }

    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.expected() == 0
    }
}

/// Staging store over any key-value backend
pub struct StagingStore {
    kv: Arc<dyn KeyValueStore>,
    prefix: String,
    max_staged_bytes: usize,
}

impl StagingStore {
    pub fn new(kv: Arc<dyn KeyValueStore>, prefix: impl Into<String>, max_staged_bytes: usize) -> Self {
        Self {
            kv,
            prefix: prefix.into(),
            max_staged_bytes,
        }
    }

    pub fn from_config(kv: Arc<dyn KeyValueStore>, config: &crate::config::CheckoutConfig) -> Self {
        Self::new(kv, config.key_prefix.clone(), config.max_staged_bytes)
    }

    fn manifest_key(&self) -> String {
        format!("{}:manifest", self.prefix)
    }

    fn file_prefix(&self) -> String {
        format!("{}:file:", self.prefix)
    }

    fn file_key(&self, id: &str) -> String {
        format!("{}{}", self.file_prefix(), id)
    }

    /// Generate a staged file id: millisecond timestamp plus random suffix
    pub fn generate_id() -> String {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        format!("{}-{}", Utc::now().timestamp_millis(), &suffix[..8])
    }

    /// Encode and stage every file, then commit the manifest.
    ///
    /// The encoded size is known from the raw lengths, so an oversized batch
    /// is rejected before anything is encoded. Encoding fans out across
    /// blocking tasks and all of it finishes before the first write. On any
    /// failure nothing from this batch stays visible.
    pub async fn stage_all(&self, files: Vec<StagingFile>) -> Result<Vec<String>> {
        let size: usize = files
            .iter()
            .map(|f| codec::encoded_len(f.bytes.len(), &f.content_type))
            .sum();
        if size > self.max_staged_bytes {
            return Err(CheckoutError::StagingTooLarge {
                size,
                limit: self.max_staged_bytes,
            });
        }

        // A corrupt manifest names no batch we could replace; its payloads are swept below
        let (previous, sweep_after_commit) = match self.manifest() {
            Ok(previous) => (previous, false),
            Err(CheckoutError::CorruptManifest(reason)) => {
                tracing::warn!(reason = %reason, "Replacing corrupt staging manifest");
                (None, true)
            }
            Err(e) => return Err(e),
        };

        let encoded = encode_all(files).await?;

        let mut written = Vec::with_capacity(encoded.len());
        for (id, payload) in &encoded {
            if let Err(e) = self.kv.set(&self.file_key(id), payload) {
                tracing::warn!(id = %id, error = %e, "Staging write failed, rolling back batch");
                self.rollback(&written);
                return Err(e);
            }
            written.push(id.clone());
        }

        let manifest = StagingManifest {
            ids: written.clone(),
            staged_at: Utc::now(),
        };
        let body = serde_json::to_string(&manifest)?;
        if let Err(e) = self.kv.set(&self.manifest_key(), &body) {
            tracing::warn!(error = %e, "Manifest write failed, rolling back batch");
            self.rollback(&written);
            return Err(e);
        }

        // The new manifest is committed; payloads of a replaced batch are garbage now
        if let Some(previous) = previous {
            let current: HashSet<&String> = manifest.ids.iter().collect();
            let stale: Vec<String> = previous
                .ids
                .into_iter()
                .filter(|id| !current.contains(id))
                .collect();
            self.rollback(&stale);
        }
        if sweep_after_commit {
            if let Err(e) = self.sweep_orphans() {
                tracing::warn!(error = %e, "Failed to sweep payloads of corrupt manifest");
            }
        }

        tracing::info!(files = written.len(), bytes = size, "Staged files");
        Ok(written)
    }

    fn rollback(&self, ids: &[String]) {
        for id in ids {
            if let Err(e) = self.kv.delete(&self.file_key(id)) {
                tracing::warn!(id = %id, error = %e, "Failed to remove staged payload");
            }
        }
    }

    /// Ids from `ids` that have no stored payload
    pub fn verify_complete(&self, ids: &[String]) -> Result<Vec<String>> {
        let mut missing = Vec::new();
        for id in ids {
            if self.kv.get(&self.file_key(id))?.is_none() {
                missing.push(id.clone());
            }
        }
        Ok(missing)
    }

    /// Fail with `StagingIncomplete` unless every id has a stored payload.
    ///
    /// Run before sending the user to payment.
    pub fn ensure_complete(&self, ids: &[String]) -> Result<()> {
        let missing = self.verify_complete(ids)?;
        if missing.is_empty() {
            return Ok(());
        }
        tracing::error!(missing = ?missing, "Staged batch incomplete, blocking checkout");
        Err(CheckoutError::StagingIncomplete { missing })
    }

    /// Read the committed manifest, if any
    pub fn manifest(&self) -> Result<Option<StagingManifest>> {
        match self.kv.get(&self.manifest_key())? {
            Some(body) => serde_json::from_str(&body)
                .map(Some)
                .map_err(|e| CheckoutError::CorruptManifest(e.to_string())),
            None => Ok(None),
        }
    }

    /// Resolve manifest ids to payloads.
    ///
    /// Unresolvable ids are reported in `missing` rather than dropped quietly.
    pub fn read_all(&self) -> Result<StagedBatch> {
        let Some(manifest) = self.manifest()? else {
            return Ok(StagedBatch::default());
        };

        let mut batch = StagedBatch::default();
        for id in manifest.ids {
            match self.kv.get(&self.file_key(&id))? {
                Some(encoded_payload) => {
                    let content_type = codec::content_type_of(&encoded_payload)
                        .unwrap_or_else(|_| codec::DEFAULT_CONTENT_TYPE.to_string());
                    batch.files.push(StagedFile {
                        id,
                        encoded_payload,
                        content_type,
                    });
                }
                None => batch.missing.push(id),
            }
        }

        if !batch.is_complete() {
            tracing::warn!(
                expected = batch.expected(),
                found = batch.files.len(),
                missing = ?batch.missing,
                "Staged manifest references missing payloads"
            );
        }

        Ok(batch)
    }

    /// Delete every payload named in the manifest, then the manifest.
    ///
    /// A corrupt manifest names nothing usable, so every payload under the
    /// prefix goes instead.
    pub fn clear(&self) -> Result<()> {
        let ids = match self.manifest() {
            Ok(Some(manifest)) => manifest.ids,
            Ok(None) => return Ok(()),
            Err(CheckoutError::CorruptManifest(reason)) => {
                tracing::warn!(reason = %reason, "Clearing staging with corrupt manifest");
                let removed = self.delete_all_payloads()?;
                self.kv.delete(&self.manifest_key())?;
                tracing::debug!(files = removed, "Cleared staged files");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        for id in &ids {
            self.kv.delete(&self.file_key(id))?;
        }
        self.kv.delete(&self.manifest_key())?;

        tracing::debug!(files = ids.len(), "Cleared staged files");
        Ok(())
    }

    fn delete_all_payloads(&self) -> Result<usize> {
        let keys = self.kv.keys_with_prefix(&self.file_prefix())?;
        for key in &keys {
            self.kv.delete(key)?;
        }
        Ok(keys.len())
    }

    /// Delete payloads the manifest does not reference. Returns how many went.
    ///
    /// A corrupt manifest references nothing.
    pub fn sweep_orphans(&self) -> Result<usize> {
        let referenced: HashSet<String> = match self.manifest() {
            Ok(manifest) => manifest.map(|m| m.ids.into_iter().collect()).unwrap_or_default(),
            Err(CheckoutError::CorruptManifest(_)) => HashSet::new(),
            Err(e) => return Err(e),
        };

        let file_prefix = self.file_prefix();
        let mut removed = 0;
        for key in self.kv.keys_with_prefix(&file_prefix)? {
            let id = &key[file_prefix.len()..];
            if !referenced.contains(id) {
                self.kv.delete(&key)?;
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::info!(removed, "Swept orphaned staged payloads");
        }
        Ok(removed)
    }
}

async fn encode_all(files: Vec<StagingFile>) -> Result<Vec<(String, String)>> {
    let tasks = files.into_iter().map(|file| {
        tokio::task::spawn_blocking(move || {
            (
                StagingStore::generate_id(),
                codec::encode(&file.bytes, &file.content_type),
            )
        })
    });

    futures::future::try_join_all(tasks)
        .await
        .map_err(|e| CheckoutError::Storage(format!("encoding task failed: {e}")))
}
