//! Outbound message gate.
//!
//! Decides, per outbound frame, whether the channel may carry it right
//! now, and holds back what it may not. Three classes of traffic get
//! three different treatments:
//!
//! - **Auth** frames establish eligibility, so they are exempt from the
//!   authentication check — an open channel is enough.
//! - **Application** frames require a fully usable channel (open *and*
//!   authenticated); otherwise they wait in the queue. They are never
//!   dropped here.
//! - **Liveness** frames are only meaningful in the moment: when the
//!   channel is not fully usable they are dropped, not queued. A stale
//!   heartbeat replayed after a reconnect is worthless and must not be
//!   the first thing to leak past an incomplete handshake.

use std::collections::VecDeque;

use serde_json::Value;
use tracing::{debug, warn};

use crate::state::{AuthPhase, LinkState};

/// Queue depth at which a warning is logged. The queue is unbounded —
/// dropping application messages is never acceptable — but a deep queue
/// means the channel has been ineligible for a long time.
const QUEUE_WARN_DEPTH: usize = 128;

/// What class of traffic an outbound frame belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboundClass {
    /// The authenticate frame itself.
    Auth,
    /// Heartbeat / liveness frames.
    Liveness,
    /// Everything the application asks to send.
    Application,
}

/// The gate's verdict for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Transmit immediately.
    Send,
    /// Hold until the channel becomes eligible.
    Queue,
    /// Discard; this frame has no value later.
    Drop,
}

/// FIFO queue of application frames waiting for an eligible channel.
#[derive(Debug, Default)]
pub struct OutboundGate {
    queue: VecDeque<Value>,
}

impl OutboundGate {
    /// Creates an empty gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// The eligibility rule table.
    ///
    /// Eligibility is a function of the composite link state only; the
    /// gate itself carries no state besides the queue.
    pub fn decide(state: &LinkState, class: OutboundClass) -> GateDecision {
        let fully_usable =
            matches!(state, LinkState::Connected(AuthPhase::Authenticated));
        match class {
            OutboundClass::Auth => {
                if state.is_connected() {
                    GateDecision::Send
                } else {
                    GateDecision::Queue
                }
            }
            OutboundClass::Liveness => {
                if fully_usable {
                    GateDecision::Send
                } else {
                    GateDecision::Drop
                }
            }
            OutboundClass::Application => {
                if fully_usable {
                    GateDecision::Send
                } else {
                    GateDecision::Queue
                }
            }
        }
    }

    /// Appends a frame to the back of the queue.
    pub fn enqueue(&mut self, frame: Value) {
        self.queue.push_back(frame);
        let depth = self.queue.len();
        if depth == QUEUE_WARN_DEPTH {
            warn!(depth, "outbound queue is getting deep");
        } else {
            debug!(depth, "outbound frame queued");
        }
    }

    /// Releases the entire queue in enqueue order.
    ///
    /// The queue is always drained completely — callers must transmit
    /// every returned frame, in order, before accepting new traffic.
    pub fn drain(&mut self) -> Vec<Value> {
        self.queue.drain(..).collect()
    }

    /// Number of frames currently held.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

// =========================================================================
// Tests
// =========================================================================
