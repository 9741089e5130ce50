//! Unified error type for the Roomlink client stack.

use roomlink_channel::ChannelError;
use roomlink_protocol::ProtocolError;
use roomlink_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `roomlink` meta-crate, you deal with this single
/// error type instead of importing errors from each sub-crate.
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so the `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum RoomlinkError {
    /// A transport-level error (dial, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid frame).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A channel-level error (driver shut down).
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("gone".into());
        let roomlink_err: RoomlinkError = err.into();
        assert!(matches!(roomlink_err, RoomlinkError::Transport(_)));
        assert!(roomlink_err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::InvalidFrame("bad".into());
        let roomlink_err: RoomlinkError = err.into();
        assert!(matches!(roomlink_err, RoomlinkError::Protocol(_)));
    }

    #[test]
    fn test_from_channel_error() {
        let err = ChannelError::Closed;
        let roomlink_err: RoomlinkError = err.into();
        assert!(matches!(roomlink_err, RoomlinkError::Channel(_)));
    }
}
