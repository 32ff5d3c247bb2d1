//! Outbound transport layer for discord-link.
//!
//! Provides the [`Connector`] and [`Connection`] traits that abstract over
//! how the plugin reaches the verification service. The connection manager
//! only ever talks to these traits, so tests can swap in an in-memory
//! transport and drive open/close/error callbacks by hand.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket client via `tokio-tungstenite`
//! - `rustls`: enables `wss://` targets using webpki roots

use std::fmt;
use std::future::Future;

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketConnector};

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Opens outbound connections to a remote service.
///
/// The futures are `Send` because the connection manager runs every
/// connect attempt on its own Tokio task.
pub trait Connector: Send + Sync + 'static {
    /// The connection type produced by this connector.
    type Connection: Connection;

    /// Dials `url` and completes the protocol handshake.
    fn connect(
        &self,
        url: &str,
    ) -> impl Future<Output = Result<Self::Connection, TransportError>> + Send;
}

/// A single open connection that can send and receive frames.
pub trait Connection: Send + Sync + 'static {
    /// Sends a binary frame to the remote peer.
    fn send(
        &self,
        data: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Sends a text frame to the remote peer.
    ///
    /// Defaults to a binary send of the UTF-8 bytes. Transports with a
    /// distinct text frame type (WebSocket) should override this.
    fn send_text(
        &self,
        text: &str,
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        self.send(text.as_bytes())
    }

    /// Receives the next frame from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    fn recv(
        &self,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, TransportError>> + Send;

    /// Closes the connection.
    fn close(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_new_and_into_inner() {
        let id = ConnectionId::new(42);
        assert_eq!(id.into_inner(), 42);
    }

    #[test]
    fn test_connection_id_display() {
        let id = ConnectionId::new(7);
        assert_eq!(id.to_string(), "conn-7");
    }

    #[test]
    fn test_connect_failed_keeps_url_in_message() {
        let err = TransportError::connect_failed("ws://127.0.0.1:1", "refused");
        let text = err.to_string();
        assert!(text.contains("ws://127.0.0.1:1"));
        assert!(text.contains("refused"));
    }
}
