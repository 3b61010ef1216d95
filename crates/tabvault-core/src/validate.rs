//! Payload hashing and validation.
//!
//! [`digest`] is the identity used for deduplication: a SHA-256 over the raw
//! bytes, independent of file name and arrival time. [`validate`] decodes the
//! bytes as UTF-8 JSON and checks the session contract (a top-level object
//! with a `tabs` array of `{title, url}` objects).

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::models::{ContentDigest, RejectReason, SessionRecord};

/// Why a payload could not become a [`SessionRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    #[error("encoding error: {0}")]
    EncodingError(String),
}

impl ValidationError {
    pub fn reason(&self) -> RejectReason {
        match self {
            ValidationError::MalformedPayload(_) => RejectReason::MalformedPayload,
            ValidationError::EncodingError(_) => RejectReason::EncodingError,
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            ValidationError::MalformedPayload(d) | ValidationError::EncodingError(d) => d,
        }
    }
}

/// SHA-256 of `bytes`. Total over arbitrary input.
pub fn digest(bytes: &[u8]) -> ContentDigest {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    ContentDigest::from_bytes(hasher.finalize().into())
}

/// Parse `bytes` into a [`SessionRecord`].
///
/// - Non-UTF-8 input → [`ValidationError::EncodingError`].
/// - Invalid JSON, or JSON that is not a session object →
///   [`ValidationError::MalformedPayload`].
pub fn validate(bytes: &[u8]) -> Result<SessionRecord, ValidationError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| ValidationError::EncodingError(e.to_string()))?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    serde_json::from_str::<SessionRecord>(text)
        .map_err(|e| ValidationError::MalformedPayload(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_is_deterministic() {
        let a = digest(b"{\"tabs\":[]}");
        let b = digest(b"{\"tabs\":[]}");
        assert_eq!(a, b);
        assert_ne!(a, digest(b"{\"tabs\": []}"));
    }

    #[test]
    fn test_digest_known_value() {
        // sha256("abc")
        assert_eq!(
            digest(b"abc").to_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_digest_empty_input() {
        assert_eq!(
            digest(&[]).to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_validate_session() {
        let bytes = br#"{"tabs":[{"title":"Intro to Rust","url":"https://rust-lang.org"}]}"#;
        let record = validate(bytes).unwrap();
        assert_eq!(record.tabs.len(), 1);
        assert_eq!(record.tabs[0].title, "Intro to Rust");
    }

    #[test]
    fn test_validate_malformed_json() {
        let err = validate(b"{invalid json").unwrap_err();
        assert_eq!(err.reason(), RejectReason::MalformedPayload);
    }

    #[test]
    fn test_validate_missing_tabs() {
        let err = validate(br#"{"windows":[]}"#).unwrap_err();
        assert_eq!(err.reason(), RejectReason::MalformedPayload);
    }

    #[test]
    fn test_validate_tab_without_url() {
        let err = validate(br#"{"tabs":[{"title":"x"}]}"#).unwrap_err();
        assert_eq!(err.reason(), RejectReason::MalformedPayload);
    }

    #[test]
    fn test_validate_bad_utf8() {
        let err = validate(&[0x7b, 0xff, 0xfe, 0x7d]).unwrap_err();
        assert_eq!(err.reason(), RejectReason::EncodingError);
    }

    #[test]
    fn test_validate_accepts_bom() {
        let mut bytes = "\u{feff}".as_bytes().to_vec();
        bytes.extend_from_slice(br#"{"tabs":[]}"#);
        assert!(validate(&bytes).unwrap().tabs.is_empty());
    }
}
