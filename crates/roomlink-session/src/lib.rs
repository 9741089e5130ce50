//! Session management for Roomlink clients.
//!
//! Sits on top of `roomlink-channel` and answers the one question the
//! hosting UI keeps asking: prompt for a secret, or show the room? The
//! [`SessionGate`] tracks whether a session was ever granted and owns
//! credential persistence, so accepted secrets survive a restart and
//! rejected ones are wiped immediately.

mod gate;
mod store;

pub use gate::{LinkControl, Posture, SessionGate};
pub use store::{CredentialStore, FileStore, MemoryStore};
