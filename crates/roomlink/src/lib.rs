//! # Roomlink
//!
//! Self-healing realtime client channel for shared-room web apps
//! (virtual tabletops and the like).
//!
//! Roomlink keeps one WebSocket to a room server alive across network
//! drops: exponential-backoff reconnection, silent re-authentication,
//! heartbeat liveness, and an outbound queue that guarantees no
//! application message is ever sent before the server has accepted the
//! session.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use roomlink::prelude::*;
//!
//! # async fn run() -> Result<(), RoomlinkError> {
//! let handle = RoomClientBuilder::new("wss://example.org/room").spawn();
//!
//! handle.on_state(|state| println!("link: {state}"))?;
//! handle.on_snapshot(|snapshot| println!("room: {snapshot}"))?;
//!
//! handle.authenticate(Credential::new("hunter2"))?;
//! handle.connect()?;
//! # Ok(())
//! # }
//! ```

mod client;
mod error;

pub use client::RoomClientBuilder;
pub use error::RoomlinkError;

pub mod prelude {
    //! Everything a typical consumer needs, in one import.

    pub use crate::client::RoomClientBuilder;
    pub use crate::error::RoomlinkError;
    pub use roomlink_channel::{
        AuthEvent, AuthPhase, ChannelConfig, ChannelError, ChannelHandle,
        LinkState,
    };
    pub use roomlink_protocol::Credential;
    pub use roomlink_session::{
        CredentialStore, FileStore, MemoryStore, Posture, SessionGate,
    };
}
