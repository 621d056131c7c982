//! Byte Codec
//!
//! Converts raw file bytes into a string form that a string-only key-value
//! area can hold, and back again.
//!
//! Two encoded forms are accepted on decode:
//!
//! ```text
//! data:image/png;base64,iVBORw0KGgo...   (content type embedded)
//! iVBORw0KGgo...                         (bare, DEFAULT_CONTENT_TYPE assumed)
//! ```
//!
//! `encode` always produces the first form.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use thiserror::Error;

use crate::error::CheckoutError;

/// Content type assumed for bare payloads without a `data:` header
pub const DEFAULT_CONTENT_TYPE: &str = "image/jpeg";

const DATA_SCHEME: &str = "data:";
const BASE64_MARKER: &str = ";base64";

/// Decoded bytes with their content type
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedPayload {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Payload could not be parsed; the caller attaches the staged id
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct PayloadError(String);

impl PayloadError {
    /// Attach the offending staged file id
    pub fn for_id(self, id: impl Into<String>) -> CheckoutError {
        CheckoutError::MalformedPayload {
            id: id.into(),
            reason: self.0,
        }
    }
}

/// Encode raw bytes with their content type
pub fn encode(bytes: &[u8], content_type: &str) -> String {
    let content_type = effective_content_type(content_type);
    format!("{DATA_SCHEME}{content_type}{BASE64_MARKER},{}", BASE64.encode(bytes))
}

/// Length of the string `encode` would produce, without encoding
pub fn encoded_len(raw_len: usize, content_type: &str) -> usize {
    let header =
        DATA_SCHEME.len() + effective_content_type(content_type).len() + BASE64_MARKER.len() + 1;
    header + raw_len.div_ceil(3) * 4
}

/// Decode either encoded form.
///
/// Fails before any bytes are handed back; there is no partial result.
pub fn decode(encoded: &str) -> Result<DecodedPayload, PayloadError> {
    let (content_type, data) = split_header(encoded)?;

    let bytes = BASE64
        .decode(data.trim())
        .map_err(|e| PayloadError(format!("invalid base64: {e}")))?;

    Ok(DecodedPayload {
        bytes,
        content_type,
    })
}

/// Read the content type of an encoded payload without decoding it
pub fn content_type_of(encoded: &str) -> Result<String, PayloadError> {
    split_header(encoded).map(|(content_type, _)| content_type)
}

fn effective_content_type(content_type: &str) -> &str {
    let trimmed = content_type.trim();
    if trimmed.is_empty() {
        DEFAULT_CONTENT_TYPE
    } else {
        trimmed
    }
}

fn split_header(encoded: &str) -> Result<(String, &str), PayloadError> {
    let Some(rest) = encoded.strip_prefix(DATA_SCHEME) else {
        if encoded.trim().is_empty() {
            return Err(PayloadError("empty payload".into()));
        }
        return Ok((DEFAULT_CONTENT_TYPE.to_string(), encoded));
    };

    let (header, data) = rest
        .split_once(',')
        .ok_or_else(|| PayloadError("data URL without ',' separator".into()))?;

    let media = header
        .strip_suffix(BASE64_MARKER)
        .ok_or_else(|| PayloadError("only base64 data URLs are supported".into()))?;

    // Drop parameters such as ";charset=..." after the media type
    let content_type = effective_content_type(media.split(';').next().unwrap_or_default());

    Ok((content_type.to_string(), data))
}
