//! Error-forwarding envelope between the TabPFN server and its client.
//!
//! A server-side error that should be shown to the user travels in an
//! HTTP response header as a small JSON object `{"type": ..., "message":
//! ...}`. The client maps a fixed set of known kinds back to
//! [`RelayedError`] variants; an unknown kind becomes
//! [`RelayedError::Remote`] carrying the original name and message. There
//! is no dynamic lookup by name.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

/// Header carrying the error envelope.
pub const ERROR_RELAY_HEADER: HeaderName = HeaderName::from_static("errorrelay");

/// Status code used for relayed errors.
pub const ERROR_RELAY_STATUS: StatusCode = StatusCode::BAD_REQUEST;

// Wire kind names match the exception class names the TabPFN server has
// always sent, so both sides of the relay stay compatible.
const KIND_INVALID_INPUT: &str = "ValueError";
const KIND_NOT_FOUND: &str = "FileNotFoundError";
const KIND_PERMISSION_DENIED: &str = "PermissionError";
const KIND_TIMEOUT: &str = "TimeoutError";

/// A server-side error reconstructed on the client.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RelayedError {
    /// The server rejected the request input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A referenced resource does not exist on the server.
    #[error("not found: {0}")]
    NotFound(String),

    /// The server refused access.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The server-side operation timed out.
    #[error("timed out: {0}")]
    Timeout(String),

    /// An error kind this client does not know. The original kind name
    /// and message are preserved.
    #[error("remote error {kind}: {message}")]
    Remote { kind: String, message: String },
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    message: String,
}

impl RelayedError {
    /// The kind name used on the wire.
    pub fn wire_kind(&self) -> &str {
        match self {
            RelayedError::InvalidInput(_) => KIND_INVALID_INPUT,
            RelayedError::NotFound(_) => KIND_NOT_FOUND,
            RelayedError::PermissionDenied(_) => KIND_PERMISSION_DENIED,
            RelayedError::Timeout(_) => KIND_TIMEOUT,
            RelayedError::Remote { kind, .. } => kind,
        }
    }

    /// The human-readable message.
    pub fn message(&self) -> &str {
        match self {
            RelayedError::InvalidInput(message)
            | RelayedError::NotFound(message)
            | RelayedError::PermissionDenied(message)
            | RelayedError::Timeout(message)
            | RelayedError::Remote { message, .. } => message,
        }
    }

    fn from_wire(kind: &str, message: String) -> RelayedError {
        match kind {
            KIND_INVALID_INPUT => RelayedError::InvalidInput(message),
            KIND_NOT_FOUND => RelayedError::NotFound(message),
            KIND_PERMISSION_DENIED => RelayedError::PermissionDenied(message),
            KIND_TIMEOUT => RelayedError::Timeout(message),
            _ => RelayedError::Remote {
                kind: kind.to_owned(),
                message,
            },
        }
    }
}

/// Encode an error for the server-side response.
///
/// Returns the status code and the `ErrorRelay` header value; `None` when
/// the envelope cannot be rendered as a header (control characters in the
/// message).
pub fn encode(error: &RelayedError) -> Option<(StatusCode, HeaderValue)> {
    let envelope = Envelope {
        kind: error.wire_kind().to_owned(),
        message: error.message().to_owned(),
    };
    let raw = serde_json::to_string(&envelope).ok()?;
    let value = HeaderValue::from_str(&raw).ok()?;
    Some((ERROR_RELAY_STATUS, value))
}

/// Try to decode a relayed error from response headers.
///
/// Returns `None` when the header is absent or unparsable, in which case
/// the original HTTP error should pass through unchanged.
pub fn decode(headers: &HeaderMap) -> Option<RelayedError> {
    let raw = headers.get(ERROR_RELAY_HEADER)?.to_str().ok()?;
    let envelope: Envelope = serde_json::from_str(raw).ok()?;
    Some(RelayedError::from_wire(&envelope.kind, envelope.message))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(error: RelayedError) -> RelayedError {
        let (status, value) = encode(&error).unwrap();
        assert_eq!(status, ERROR_RELAY_STATUS);
        let mut headers = HeaderMap::new();
        headers.insert(ERROR_RELAY_HEADER, value);
        decode(&headers).unwrap()
    }

    #[test]
    fn known_kinds_round_trip() {
        let errors = [
            RelayedError::InvalidInput("bad column count".to_owned()),
            RelayedError::NotFound("no such model".to_owned()),
            RelayedError::PermissionDenied("quota exceeded".to_owned()),
            RelayedError::Timeout("fit took too long".to_owned()),
        ];
        for error in errors {
            assert_eq!(round_trip(error.clone()), error);
        }
    }

    #[test]
    fn unknown_kind_falls_back_to_remote() {
        let mut headers = HeaderMap::new();
        headers.insert(
            ERROR_RELAY_HEADER,
            HeaderValue::from_static(r#"{"type":"ExoticError","message":"boom"}"#),
        );

        assert_eq!(
            decode(&headers),
            Some(RelayedError::Remote {
                kind: "ExoticError".to_owned(),
                message: "boom".to_owned(),
            })
        );
    }

    #[test]
    fn remote_variant_round_trips_its_original_kind() {
        let error = RelayedError::Remote {
            kind: "ExoticError".to_owned(),
            message: "boom".to_owned(),
        };
        assert_eq!(round_trip(error.clone()), error);
    }

    #[test]
    fn absent_header_decodes_to_none() {
        assert_eq!(decode(&HeaderMap::new()), None);
    }

    #[test]
    fn garbage_header_decodes_to_none() {
        let mut headers = HeaderMap::new();
        headers.insert(ERROR_RELAY_HEADER, HeaderValue::from_static("not json"));
        assert_eq!(decode(&headers), None);
    }

    #[test]
    fn display_includes_the_message() {
        let error = RelayedError::InvalidInput("bad column count".to_owned());
        assert_eq!(error.to_string(), "invalid input: bad column count");
    }
}
