//! Inbound frame classification.
//!
//! Every frame from the server lands here exactly once and is sorted
//! into one of four buckets by its `"t"` discriminator: auth result,
//! peer signal, control event, or — for everything else, tagged or
//! not — a room snapshot. The snapshot fallback is deliberate: the
//! server sends full room state as a plain object, and unknown future
//! tags degrade to "some state we hand off" rather than an error.

use serde_json::Value;

use roomlink_protocol::{
    AuthReply, ProtocolError, TAG_AUTH, TAG_EVENT, TAG_FIELD, TAG_SIGNAL,
};

/// A classified inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Verdict on an authenticate request.
    AuthResult(AuthReply),
    /// Peer-signaling payload for the voice/peer collaborator.
    Signal(Value),
    /// Explicitly tagged control/event message.
    Control(Value),
    /// Everything else: opaque room state.
    Snapshot(Value),
}

/// Classifies one raw frame.
///
/// # Errors
/// Returns [`ProtocolError::Decode`] when the bytes are not a JSON
/// value, or [`ProtocolError::InvalidFrame`] when an auth-tagged frame
/// lacks the reply shape. Callers log and discard either — a malformed
/// frame must never disturb connection or auth state.
pub fn classify(data: &[u8]) -> Result<Inbound, ProtocolError> {
    let value: Value =
        serde_json::from_slice(data).map_err(ProtocolError::Decode)?;

    match value.get(TAG_FIELD).and_then(Value::as_str) {
        Some(TAG_AUTH) => {
            let reply: AuthReply = serde_json::from_value(value.clone())
                .map_err(|e| {
                    ProtocolError::InvalidFrame(format!(
                        "auth reply missing verdict: {e}"
                    ))
                })?;
            Ok(Inbound::AuthResult(reply))
        }
        Some(TAG_SIGNAL) => Ok(Inbound::Signal(value)),
        Some(TAG_EVENT) => Ok(Inbound::Control(value)),
        // No tag, an unknown tag, or a non-string tag: room snapshot.
        _ => Ok(Inbound::Snapshot(value)),
    }
}

// =========================================================================
// Tests
// =========================================================================
