//! Configuration

use serde::{Deserialize, Serialize};

use crate::error::{CheckoutError, Result};
use crate::retry::RetryPolicy;

/// Default ceiling for encoded staged bytes.
///
/// Browser session storage typically allows ~5 MB per origin; base64 adds a
/// third, so this admits roughly 3 MB of raw files.
pub const DEFAULT_MAX_STAGED_BYTES: usize = 4 * 1024 * 1024;

/// Checkout staging and reconciliation settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CheckoutConfig {
    /// Ceiling for the encoded size of one staged batch
    pub max_staged_bytes: usize,

    /// Key namespace inside the staging area
    pub key_prefix: String,

    /// Order lookup retry policy
    pub retry: RetryPolicy,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            max_staged_bytes: DEFAULT_MAX_STAGED_BYTES,
            key_prefix: "checkout".into(),
            retry: RetryPolicy::default(),
        }
    }
}

impl CheckoutConfig {
    pub fn from_env() -> Self {
        let max_staged_bytes = std::env::var("CHECKOUT_MAX_STAGED_BYTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_STAGED_BYTES);
        let key_prefix =
            std::env::var("CHECKOUT_KEY_PREFIX").unwrap_or_else(|_| "checkout".into());

        Self {
            max_staged_bytes,
            key_prefix,
            retry: RetryPolicy::from_env(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_staged_bytes == 0 {
            return Err(CheckoutError::Config("max_staged_bytes must be positive".into()));
        }
        if self.key_prefix.is_empty() || self.key_prefix.contains(':') {
            return Err(CheckoutError::Config(format!(
                "key_prefix must be non-empty and without ':', got {:?}",
                self.key_prefix
            )));
        }
        self.retry.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = CheckoutConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.retry.max_attempts, 5);
    }

    #[test]
    fn test_rejects_bad_prefix() {
        let config = CheckoutConfig {
            key_prefix: "a:b".into(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(CheckoutError::Config(_))));
    }
}
