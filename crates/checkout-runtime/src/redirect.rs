//! Redirect Boundary
//!
//! The payment session id is the only state that survives the trip to the
//! payment page and back. It arrives as `?session_id=` on the return URL.

use checkout_core::{CheckoutError, Result};

/// Query parameter carrying the payment session id
pub const SESSION_ID_PARAM: &str = "session_id";

/// Extract the payment session id from a return URL
pub fn session_id_from_return_url(return_url: &str) -> Result<String> {
    let url = url::Url::parse(return_url)
        .map_err(|e| CheckoutError::Config(format!("invalid return URL: {e}")))?;

    url.query_pairs()
        .find(|(key, _)| key == SESSION_ID_PARAM)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| CheckoutError::Config(format!("return URL has no {SESSION_ID_PARAM}")))
}
