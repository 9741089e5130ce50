//! Self-healing client channel: connection lifecycle, authentication,
//! outbound gating, and inbound routing for a roomlink session.
//!
//! The layer is split in two:
//!
//! - [`LinkCore`] — a synchronous state machine turning events into
//!   effects, where every ordering guarantee lives.
//! - [`ChannelDriver`] — the background task that owns the core, the
//!   transport, and the timers, exposed through the cloneable
//!   [`ChannelHandle`].
//!
//! Consumers normally construct a channel through the `roomlink` meta
//! crate rather than using this crate directly.

mod config;
mod driver;
mod error;
mod gate;
mod link;
mod router;
mod state;

pub use config::ChannelConfig;
pub use driver::{ChannelDriver, ChannelHandle};
pub use error::ChannelError;
pub use gate::{GateDecision, OutboundClass};
pub use link::{Effect, LinkCore};
pub use router::{classify, Inbound};
pub use state::{AuthEvent, AuthPhase, LinkState};
