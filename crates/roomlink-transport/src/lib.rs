//! Client transport abstraction for Roomlink.
//!
//! Provides the [`Connector`] and [`Connection`] traits that abstract
//! over the message-based socket to the room server. The channel layer
//! only ever talks to these traits, so tests drive the full connection
//! state machine against an in-memory double.
//!
//! # Feature Flags
//!
//! - `websocket` (default) — WebSocket transport via `tokio-tungstenite`

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketConnector};

use std::fmt;
use std::future::Future;

/// Opaque identifier for one connection attempt.
///
/// A client dials many times over its life (every reconnect cycle gets
/// a fresh connection), so the id appears in logs to tie frames and
/// closes back to the cycle that produced them.
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

/// Dials the room server.
///
/// Methods return `Send` futures because the channel driver runs each
/// dial on its own task.
pub trait Connector: Send + Sync + 'static {
    /// The connection type produced by this connector.
    type Conn: Connection;
    /// The error type for dial failures.
    type Error: std::error::Error + Send + Sync;

    /// Opens a new connection to the given target.
    fn connect(
        &self,
        url: &str,
    ) -> impl Future<Output = Result<Self::Conn, Self::Error>> + Send;
}

/// A single open connection that can send and receive frames.
///
/// Methods take `&self` so a send can proceed while a recv is pending:
/// the driver reads and writes from different sub-tasks of the same
/// connection.
pub trait Connection: Send + Sync + 'static {
    /// The error type for connection operations.
    type Error: std::error::Error + Send + Sync;

    /// Sends one frame to the server.
    fn send(
        &self,
        data: &[u8],
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Receives the next frame from the server.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    fn recv(
        &self,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, Self::Error>> + Send;

    /// Closes the connection.
    fn close(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Returns the identifier of this connection attempt.
    fn id(&self) -> ConnectionId;
}
