//! Errors surfaced by the transport core.

use parley_shared::FrameError;

/// Everything the client reports to its caller or to event subscribers.
///
/// Transport and protocol faults are handled inside the connection loop and
/// only summarized here; callers never see wire-level detail beyond a string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// Connect was attempted while no credential is available.
    #[error("no credential available")]
    CredentialMissing,
    /// The server answered the handshake with an `error` frame.
    #[error("handshake rejected: {0}")]
    HandshakeRejected(String),
    /// The server sent an `error` frame on an authenticated session.
    #[error("server error: {0}")]
    ServerError(String),
    /// An inbound payload could not be decoded.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
    /// Low-level connection fault; a close event always follows.
    #[error("transport error: {0}")]
    TransportError(String),
    /// `send` was called outside the authenticated state. Nothing was queued.
    #[error("not ready: connection is not authenticated")]
    NotReady,
    #[error("credential refresh failed: {0}")]
    RefreshFailed(String),
    #[error("credential refresh is not supported")]
    RefreshUnsupported,
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The client's event loop has stopped.
    #[error("client has shut down")]
    Shutdown,
}

impl From<FrameError> for ClientError {
    fn from(err: FrameError) -> Self {
        ClientError::MalformedFrame(err.to_string())
    }
}
