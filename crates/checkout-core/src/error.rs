//! Error Types

use thiserror::Error;

/// Result type alias for checkout operations
pub type Result<T> = std::result::Result<T, CheckoutError>;

/// Checkout staging and reconciliation errors
#[derive(Error, Debug)]
pub enum CheckoutError {
    /// Encoded payload could not be turned back into bytes
    #[error("Malformed payload for staged file {id}: {reason}")]
    MalformedPayload { id: String, reason: String },

    /// Manifest names ids that have no stored payload
    #[error("Staging incomplete: {} file(s) missing ({})", .missing.len(), .missing.join(", "))]
    StagingIncomplete { missing: Vec<String> },

    /// Manifest entry exists but cannot be parsed
    #[error("Staging manifest is corrupt: {0}")]
    CorruptManifest(String),

    /// Encoded batch would exceed the staging ceiling
    #[error("Staged files too large: {size} bytes encoded (limit: {limit})")]
    StagingTooLarge { size: usize, limit: usize },

    /// Polling exhausted without the order appearing
    #[error("Order not found for session {session_id} after {attempts} attempts")]
    OrderNotFound { session_id: String, attempts: u32 },

    /// Order exists but there is nothing staged to upload
    #[error("No staged files to upload")]
    NoStagedFiles,

    /// Upload sink rejected the batch or the network failed
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    /// Order status could not be persisted (non-fatal)
    #[error("Status update failed: {0}")]
    StatusUpdateFailed(String),

    /// Key-value backend failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Order gateway failure
    #[error("Order gateway error: {0}")]
    Gateway(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CheckoutError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            CheckoutError::MalformedPayload { .. } => "MALFORMED_PAYLOAD",
            CheckoutError::StagingIncomplete { .. } => "STAGING_INCOMPLETE",
            CheckoutError::CorruptManifest(_) => "CORRUPT_MANIFEST",
            CheckoutError::StagingTooLarge { .. } => "STAGING_TOO_LARGE",
            CheckoutError::OrderNotFound { .. } => "ORDER_NOT_FOUND",
            CheckoutError::NoStagedFiles => "NO_STAGED_FILES",
            CheckoutError::UploadFailed(_) => "UPLOAD_FAILED",
            CheckoutError::StatusUpdateFailed(_) => "STATUS_UPDATE_FAILED",
            CheckoutError::Storage(_) => "STORAGE_ERROR",
            CheckoutError::Gateway(_) => "GATEWAY_ERROR",
            CheckoutError::Config(_) => "CONFIG_ERROR",
            CheckoutError::Json(_) => "JSON_ERROR",
        }
    }

    /// Check if the failed step can be attempted again without re-staging
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CheckoutError::UploadFailed(_)
                | CheckoutError::Gateway(_)
                | CheckoutError::Storage(_)
        )
    }

    /// Staged data is permanently unusable and should be discarded
    pub fn is_terminal_for_staging(&self) -> bool {
        matches!(
            self,
            CheckoutError::MalformedPayload { .. }
                | CheckoutError::StagingIncomplete { .. }
                | CheckoutError::CorruptManifest(_)
        )
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            CheckoutError::MalformedPayload { .. } => {
                "One of your files could not be read back. Please contact support with your order details.".into()
            }
            CheckoutError::StagingIncomplete { .. } => {
                "Some of your files could not be saved. Please select them again before paying.".into()
            }
            CheckoutError::CorruptManifest(_) => {
                "Your saved files could not be read back. Please select them again.".into()
            }
            CheckoutError::StagingTooLarge { limit, .. } => format!(
                "Your files are too large to hold during checkout (limit {} MB). Please choose fewer or smaller files.",
                limit / (1024 * 1024)
            ),
            CheckoutError::OrderNotFound { .. } => {
                "We could not confirm your order yet. If you were charged, reload this page later or contact support.".into()
            }
            CheckoutError::NoStagedFiles => {
                "Your order was found, but no files were waiting to be uploaded.".into()
            }
            CheckoutError::UploadFailed(_) => {
                "Uploading your files failed. Please try again.".into()
            }
            _ => "An unexpected error occurred.".into(),
        }
    }
}

impl From<std::io::Error> for CheckoutError {
    fn from(err: std::io::Error) -> Self {
        CheckoutError::Storage(err.to_string())
    }
}
