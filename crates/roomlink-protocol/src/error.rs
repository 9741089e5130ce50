//! Error types for the protocol layer.

/// Errors that can occur while encoding or decoding frames.
///
/// Decode failures are routine here — anything on the wire that this
/// layer cannot parse is logged and discarded by the router, never
/// treated as fatal.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed, truncated, or wrong shape.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The frame parsed but violates a protocol rule, e.g. an auth
    /// reply whose fields contradict each other.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
}
