//! Shared error types: wire-frame decoding failures and REST error envelopes.

use serde::{Deserialize, Serialize};

/// Why an inbound payload could not be turned into a [`crate::WireFrame`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// Well-formed frame whose `type` tag the protocol does not define.
    #[error("unknown frame type `{0}`")]
    UnknownType(String),
    /// Payload is not a frame at all, or its fields do not match its tag.
    #[error("malformed frame: {0}")]
    Malformed(String),
}

/// Error body returned by the REST API.
///
/// The server answers failures with `{"detail": "..."}`; some routes use
/// `message` instead.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ErrorBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Attempt to parse a REST error body into a user-facing message.
/// Prefers `message`, falls back to `detail`.
pub fn try_error_detail(body: &str) -> Option<String> {
    let parsed = serde_json::from_str::<ErrorBody>(body).ok()?;
    [parsed.message, parsed.detail]
        .into_iter()
        .flatten()
        .find(|text| !text.trim().is_empty())
}

/// API error type for client-side use
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    Network(String),
    Http { status: u16, body: String },
    Deserialize(String),
}

impl ApiError {
    /// HTTP status of the failed request, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Network(msg) => write!(f, "Network error: {}", msg),
            ApiError::Http { status, body } => match try_error_detail(body) {
                Some(detail) => write!(f, "HTTP {}: {}", status, detail),
                None => write!(f, "HTTP {}: {}", status, body),
            },
            ApiError::Deserialize(msg) => write!(f, "Deserialization error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}
