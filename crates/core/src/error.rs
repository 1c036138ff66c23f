//! Error types shared by the session, the frame parser and the transport boundary.

use crate::id::RequestId;

/// Failure reported by a [`Connector`](crate::transport::Connector) or by the
/// outbound half of a live connection.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("failed to connect: {0}")]
    Connect(String),
    #[error("failed to send message: {0}")]
    Send(String),
}

/// A malformed inbound frame. These are logged and dropped by the session and
/// never reach a caller of `convert`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("frame has no X-RequestId header")]
    MissingRequestId,
    #[error("binary frame has no `Path:audio` separator")]
    MissingAudioSeparator,
}

/// The outcome of a failed synthesis request, as seen by its caller.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SynthesisError {
    /// The connection could not be established for this request.
    #[error("connection error: {0}")]
    Connection(#[from] TransportError),
    /// The request deadline elapsed before the turn ended.
    #[error("synthesis timed out")]
    Timeout,
    /// The shared connection dropped while the request was pending.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),
    #[error("request id {0} is already pending")]
    DuplicateRequest(RequestId),
    /// The session task is no longer running.
    #[error("session is shut down")]
    SessionClosed,
}
