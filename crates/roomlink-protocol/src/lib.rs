//! Wire protocol for Roomlink.
//!
//! Defines the frames the connection layer exchanges with the room
//! server and how they become bytes:
//!
//! - **Types** ([`ClientFrame`], [`AuthReply`], [`Credential`]) — the
//!   control frames this layer owns, plus the tag constants used to
//!   classify everything else.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) — value ↔ byte
//!   conversion.
//! - **Errors** ([`ProtocolError`]) — encode/decode failures.
//!
//! The protocol layer knows nothing about connections, retries, or
//! authentication state — it sits between the transport (raw bytes)
//! and the channel (the state machine that decides what to do with
//! each frame).

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    AuthReply, ClientFrame, Credential, TAG_AUTH, TAG_EVENT, TAG_FIELD,
    TAG_HEARTBEAT, TAG_SIGNAL,
};
