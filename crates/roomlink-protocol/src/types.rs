//! Wire types for the Roomlink room protocol.
//!
//! Every frame on the wire is a JSON object carrying a discriminator
//! field `"t"`. This crate only models the frames the connection layer
//! itself produces or interprets — authentication and liveness. All
//! other traffic (room snapshots, peer signals, control events, player
//! actions) is opaque to this layer and travels as raw JSON values.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Discriminator tags
// ---------------------------------------------------------------------------

/// Name of the discriminator field present on tagged frames.
pub const TAG_FIELD: &str = "t";

/// Tag of the authenticate request/response pair.
pub const TAG_AUTH: &str = "auth";

/// Tag of the liveness (heartbeat) frame.
pub const TAG_HEARTBEAT: &str = "hb";

/// Tag of a peer-signaling payload (voice-chat negotiation and the like).
pub const TAG_SIGNAL: &str = "signal";

/// Tag of an explicitly marked control/event message.
pub const TAG_EVENT: &str = "event";

// ---------------------------------------------------------------------------
// Credential
// ---------------------------------------------------------------------------

/// The opaque secret (plus optional room id) used to authenticate a session.
///
/// The secret is a bearer string compared server-side; this layer never
/// inspects it. A credential is created from user input or loaded from the
/// session store, cached for the lifetime of the authenticated session,
/// and discarded on authentication failure or explicit logout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    /// The opaque room secret.
    pub secret: String,
    /// Optional room identifier, supplied at authenticate time.
    pub room: Option<String>,
}

impl Credential {
    /// Creates a credential with no room id.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            room: None,
        }
    }

    /// Creates a credential bound to a specific room.
    pub fn for_room(
        secret: impl Into<String>,
        room: impl Into<String>,
    ) -> Self {
        Self {
            secret: secret.into(),
            room: Some(room.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// ClientFrame — outbound control frames
// ---------------------------------------------------------------------------

/// Control frames the connection layer sends on its own behalf.
///
/// `#[serde(tag = "t")]` produces internally tagged JSON, so
/// `ClientFrame::Hb` serializes to `{"t":"hb"}` and an auth request to
/// `{"t":"auth","secret":"..."}`. Application messages are not modeled
/// here — callers pass pre-built JSON values straight through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "t", rename_all = "lowercase")]
pub enum ClientFrame {
    /// Authenticate request. `room` is omitted from the JSON when absent.
    Auth {
        secret: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        room: Option<String>,
    },

    /// Liveness frame. Carries no payload; its arrival is the message.
    Hb,
}

impl ClientFrame {
    /// Builds the authenticate request for a credential.
    pub fn auth(credential: &Credential) -> Self {
        Self::Auth {
            secret: credential.secret.clone(),
            room: credential.room.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// AuthReply — inbound authenticate response
// ---------------------------------------------------------------------------

/// Server response to an authenticate request.
///
/// Shares the `"auth"` tag with the request; the directions never mix, so
/// the shapes are allowed to differ. `reason` is a human-readable denial
/// message surfaced verbatim to the consumer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthReply {
    /// Whether the secret was accepted.
    pub ok: bool,
    /// Denial reason, present when `ok` is false.
    #[serde(default)]
    pub reason: Option<String>,
}

// =========================================================================
// Tests
// =========================================================================
