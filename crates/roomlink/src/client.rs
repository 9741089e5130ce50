//! `RoomClientBuilder`: the entry point for standing up a channel.
//!
//! Wires the default stack (WebSocket transport, JSON codec) to the
//! channel driver. Callers that need a different transport or codec
//! use `ChannelDriver::spawn` from `roomlink-channel` directly.

use std::time::Duration;

use roomlink_channel::{ChannelConfig, ChannelDriver, ChannelHandle};
use roomlink_protocol::JsonCodec;
use roomlink_transport::WebSocketConnector;

/// Builder for configuring and spawning a room channel.
///
/// # Example
///
/// ```rust,no_run
/// use roomlink::prelude::*;
///
/// # fn run() -> Result<(), RoomlinkError> {
/// let handle = RoomClientBuilder::new("wss://example.org/room")
///     .heartbeat_interval(std::time::Duration::from_secs(25))
///     .spawn();
/// handle.authenticate(Credential::new("hunter2"))?;
/// handle.connect()?;
/// # Ok(())
/// # }
/// ```
pub struct RoomClientBuilder {
    config: ChannelConfig,
}

impl RoomClientBuilder {
    /// Creates a builder targeting the given server URL.
    ///
    /// A random session identity token is generated unless
    /// [`session`](Self::session) overrides it.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            config: ChannelConfig::new(url),
        }
    }

    /// Sets the session identity token carried in the connect URL.
    pub fn session(mut self, session: impl Into<String>) -> Self {
        self.config = self.config.with_session(session);
        self
    }

    /// Sets the base reconnect interval (default 2 s).
    pub fn base_reconnect_interval(mut self, interval: Duration) -> Self {
        self.config.base_reconnect_interval = interval;
        self
    }

    /// Sets the reconnect-attempt budget. Zero (the default) retries
    /// forever.
    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.config.max_reconnect_attempts = attempts;
        self
    }

    /// Sets the heartbeat interval (default 25 s).
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.config.heartbeat_interval = interval;
        self
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ChannelConfig) -> Self {
        self.config = config;
        self
    }

    /// Spawns the driver task over the WebSocket transport and returns
    /// its handle. The channel starts idle; call
    /// [`connect`](ChannelHandle::connect) to open it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(self) -> ChannelHandle {
        ChannelDriver::spawn(WebSocketConnector, JsonCodec, self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_applies_overrides() {
        let builder = RoomClientBuilder::new("wss://example.org/room")
            .session("tab-1")
            .base_reconnect_interval(Duration::from_secs(5))
            .max_reconnect_attempts(3)
            .heartbeat_interval(Duration::from_secs(10));

        let config = builder.config;
        assert_eq!(config.session, "tab-1");
        assert_eq!(config.base_reconnect_interval, Duration::from_secs(5));
        assert_eq!(config.max_reconnect_attempts, 3);
        assert_eq!(config.heartbeat_interval, Duration::from_secs(10));
    }

    #[test]
    fn test_builder_generates_session_by_default() {
        let builder = RoomClientBuilder::new("wss://example.org/room");
        assert_eq!(builder.config.session.len(), 32);
    }
}
