//! Link state: the composite connection/authentication state machine.
//!
//! The connection layer has two coupled lifecycles: the channel itself
//! (dialing, open, retrying) and the authentication handshake that runs
//! on top of it. Authentication can only exist while the channel is
//! open, so the two are modeled as one composite state — the auth phase
//! lives *inside* [`LinkState::Connected`], and leaving `Connected`
//! structurally discards it. There is no way to represent "pending auth
//! on a closed channel", which is exactly the invariant a reconnect
//! must preserve.

use std::fmt;

// ---------------------------------------------------------------------------
// AuthPhase
// ---------------------------------------------------------------------------

/// The authentication handshake phase of an open channel.
///
/// ```text
///   Unauthenticated ──(authenticate)──→ Pending ──(auth ok)──→ Authenticated
///                                          │
///                                          └──(auth denied)──→ Failed
/// ```
///
/// Every transition here is driven by an event (a call or a server
/// frame), never by a timer. Any channel close resets the phase by
/// discarding it along with the `Connected` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPhase {
    /// Channel is open but no handshake has been attempted yet.
    Unauthenticated,
    /// The auth frame is in flight; waiting for the server's verdict.
    Pending,
    /// The server accepted the secret. Application traffic may flow.
    Authenticated,
    /// The server rejected the secret. Requires new user input.
    Failed,
}

// ---------------------------------------------------------------------------
// LinkState
// ---------------------------------------------------------------------------

/// The composite state of the channel to the room server.
///
/// Owned exclusively by the link core; transitions are the only legal
/// way to change it, and consumers observe them through the state
/// callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// No channel and none wanted. Only an explicit `connect()` leaves
    /// this state.
    Disconnected,
    /// A dial is in flight.
    Connecting,
    /// The channel is open; the auth phase rides inside.
    Connected(AuthPhase),
    /// The channel dropped; a retry is scheduled. `attempt` counts
    /// consecutive failures since the last clean open.
    Reconnecting { attempt: u32 },
    /// The reconnection budget is exhausted. Terminal until a manual
    /// `connect()`.
    Failed,
}

impl LinkState {
    /// Whether the channel is open (any auth phase).
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected(_))
    }

    /// The auth phase, or `None` when the channel is not open.
    pub fn auth_phase(&self) -> Option<AuthPhase> {
        match self {
            Self::Connected(phase) => Some(*phase),
            _ => None,
        }
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected(AuthPhase::Unauthenticated) => {
                write!(f, "connected")
            }
            Self::Connected(AuthPhase::Pending) => {
                write!(f, "connected (authenticating)")
            }
            Self::Connected(AuthPhase::Authenticated) => {
                write!(f, "connected (authenticated)")
            }
            Self::Connected(AuthPhase::Failed) => {
                write!(f, "connected (auth failed)")
            }
            Self::Reconnecting { attempt } => {
                write!(f, "reconnecting (attempt {attempt})")
            }
            Self::Failed => write!(f, "failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// AuthEvent
// ---------------------------------------------------------------------------

/// Auth lifecycle notifications delivered to the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// Auth state fell back to unauthenticated (channel closed, logout).
    Reset,
    /// An auth frame was sent; waiting for the verdict.
    Pending,
    /// The server accepted the credential.
    Granted,
    /// The server rejected the credential. `reason` is surfaced
    /// verbatim from the server.
    Denied { reason: String },
}
