//! Channel configuration.

use std::time::Duration;

use rand::Rng;
use tracing::warn;

/// Ceiling on the exponential reconnect backoff.
const RECONNECT_CAP: Duration = Duration::from_secs(30);

/// Configuration for the channel to the room server.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// WebSocket URL of the room server, without the session parameter.
    pub url: String,

    /// Per-tab session identity token, appended to the connect URL as
    /// `session=<id>`. Generated (32 hex chars) when not supplied.
    pub session: String,

    /// First reconnect delay; later attempts grow by 1.5× each, capped
    /// at 30 s. Default: 2000 ms.
    pub base_reconnect_interval: Duration,

    /// Maximum consecutive reconnect attempts before giving up.
    /// 0 = unlimited (the default). Exceeding a non-zero budget is
    /// terminal until a manual `connect()`.
    pub max_reconnect_attempts: u32,

    /// Liveness interval. A heartbeat frame is sent each period while
    /// the channel is fully usable; two periods without *any* inbound
    /// frame marks the connection dead. Default: 25 s.
    pub heartbeat_interval: Duration,
}

impl ChannelConfig {
    /// Creates a config for the given server URL with default timings
    /// and a freshly generated session identity.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            session: generate_session_id(),
            base_reconnect_interval: Duration::from_millis(2000),
            max_reconnect_attempts: 0,
            heartbeat_interval: Duration::from_millis(25_000),
        }
    }

    /// Overrides the generated session identity.
    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session = session.into();
        self
    }

    /// Clamps degenerate values so the config is safe to use.
    ///
    /// Called by the driver on startup. A zero interval would turn the
    /// retry or heartbeat loop into a busy spin, so zeros fall back to
    /// the defaults.
    pub fn validated(mut self) -> Self {
        if self.base_reconnect_interval.is_zero() {
            warn!("base_reconnect_interval is zero — using 2000 ms");
            self.base_reconnect_interval = Duration::from_millis(2000);
        }
        if self.heartbeat_interval.is_zero() {
            warn!("heartbeat_interval is zero — using 25000 ms");
            self.heartbeat_interval = Duration::from_millis(25_000);
        }
        self
    }

    /// The full connect target with the session identity encoded.
    pub fn connect_url(&self) -> String {
        let sep = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{}session={}", self.url, sep, self.session)
    }

    /// Backoff delay for the given attempt (1-based):
    /// `min(base · 1.5^(attempt-1), 30 s)`.
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        // Exponent clamped: past ~30 doublings the product is far
        // beyond the cap, and an unbounded factor would overflow
        // `mul_f64` on very long retry runs.
        let exp = attempt.saturating_sub(1).min(32) as i32;
        self.base_reconnect_interval
            .mul_f64(1.5f64.powi(exp))
            .min(RECONNECT_CAP)
    }
}

/// Generates a random 32-character hex session identity (128 bits).
fn generate_session_id() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

// =========================================================================
// Tests
// =========================================================================
