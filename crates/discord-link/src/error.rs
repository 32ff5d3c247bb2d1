//! Unified error type for discord-link.

use discord_link_protocol::ProtocolError;
use discord_link_transport::TransportError;
use discord_link_verify::VerifyError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `discord-link` crate you deal with this single error type
/// instead of importing errors from each sub-crate. The `#[from]` attribute
/// on each variant generates the `From` impls, so `?` converts sub-crate
/// errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// A transport-level error (connect, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A frame or listing could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Applying a verification to player state failed.
    #[error(transparent)]
    Verify(#[from] VerifyError),

    /// The connection manager refused or could not take a request.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// The HTTP listing could not be fetched.
    #[error(transparent)]
    Polling(#[from] PollingError),

    /// The configuration is unusable.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Errors reported by a [`ConnectionHandle`](crate::ConnectionHandle).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    /// The connection is not open.
    #[error("not connected to the verification service")]
    NotConnected,

    /// The connection is open but did not accept the frame.
    #[error("the verification service connection did not accept the frame")]
    Rejected,

    /// The manager task has exited.
    #[error("connection manager is no longer running")]
    Unavailable,
}

/// Errors fetching the verified-user listing over HTTP.
#[derive(Debug, thiserror::Error)]
pub enum PollingError {
    /// The request could not be made or its body could not be read.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("service answered HTTP {status}")]
    Status { status: u16 },

    /// The service answered with an empty body.
    #[error("service returned an empty body")]
    EmptyBody,
}

impl PollingError {
    /// The HTTP status the service answered with, when it answered at all.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Request(e) => e.status().map(|s| s.as_u16()),
            Self::Status { status } => Some(*status),
            // Only reachable on a 200.
            Self::EmptyBody => Some(200),
        }
    }
}
