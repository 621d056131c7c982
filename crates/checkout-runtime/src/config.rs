//! Server Connection Settings

use std::time::Duration;

use checkout_core::{CheckoutError, Result};

/// Checkout server connection configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Base URL of the checkout server
    pub base_url: String,

    /// Timeout for order lookups and status updates
    pub request_timeout: Duration,

    /// Timeout for a whole upload
    pub upload_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".into(),
            request_timeout: Duration::from_secs(10),
            upload_timeout: Duration::from_secs(300),
        }
    }
}

impl ServerConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn from_env() -> Self {
        let base_url = std::env::var("CHECKOUT_SERVER_URL")
            .unwrap_or_else(|_| "http://localhost:3000".into());
        let upload_timeout = std::env::var("CHECKOUT_UPLOAD_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map_or(Duration::from_secs(300), Duration::from_secs);

        Self {
            base_url,
            upload_timeout,
            ..Default::default()
        }
    }

    /// Join an API path onto the base URL
    pub fn endpoint(&self, path: &str) -> Result<url::Url> {
        let base = url::Url::parse(&self.base_url)
            .map_err(|e| CheckoutError::Config(format!("invalid server URL {:?}: {e}", self.base_url)))?;
        base.join(path)
            .map_err(|e| CheckoutError::Config(format!("invalid endpoint {path:?}: {e}")))
    }
}

/// Percent-encode a single path segment
pub(crate) fn path_segment(segment: &str) -> String {
    url::form_urlencoded::byte_serialize(segment.as_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_join() {
        let config = ServerConfig::new("http://localhost:3000");
        assert_eq!(
            config.endpoint("/api/orders/session/cs_1").unwrap().as_str(),
            "http://localhost:3000/api/orders/session/cs_1"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let config = ServerConfig::new("not a url");
        assert!(matches!(config.endpoint("/health"), Err(CheckoutError::Config(_))));
    }

    #[test]
    fn test_path_segment_escapes() {
        assert_eq!(path_segment("cs_test/../x"), "cs_test%2F..%2Fx");
    }
}
