//! Text-safe encoding for judge payloads.
//!
//! The judge is always addressed with `base64_encoded=true`: submitted source
//! code and every output field travel as standard base64. Program output is
//! arbitrary bytes, so decoding replaces invalid UTF-8 instead of failing.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;

/// A payload field is not valid base64.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Failed to decode {field}: {reason}")]
pub struct DecodeError {
    /// Name of the field that failed to decode.
    pub field: String,
    /// Why decoding failed.
    pub reason: String,
}

impl DecodeError {
    /// Creates a new `DecodeError` for the named field.
    #[must_use]
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Encodes text for transmission to the judge.
#[must_use]
pub fn encode(text: &str) -> String {
    BASE64_STANDARD.encode(text.as_bytes())
}

/// Decodes a judge payload back into text.
///
/// Line breaks inside the encoded text are ignored; Judge0 wraps long base64
/// output at 60 columns. Bytes that are not UTF-8 become U+FFFD.
///
/// # Errors
///
/// Returns a [`DecodeError`] if the text is not valid base64.
pub fn decode(encoded: &str) -> Result<String, DecodeError> {
    decode_named("payload", encoded)
}

/// Decodes an optional judge field.
///
/// A missing field means "no output" and stays `None`; an empty field decodes
/// to `Some("")`.
///
/// # Errors
///
/// Returns a [`DecodeError`] if the field is not valid base64.
pub fn decode_field(field: &str, encoded: Option<&str>) -> Result<Option<String>, DecodeError> {
    encoded.map(|value| decode_named(field, value)).transpose()
}

fn decode_named(field: &str, encoded: &str) -> Result<String, DecodeError> {
    let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = BASE64_STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| DecodeError::new(field, e.to_string()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
