//! The link core: connection lifecycle and authentication handshake.
//!
//! [`LinkCore`] is a synchronous state machine. Every external
//! happening — a caller method, a transport callback, a timer firing —
//! becomes one method call that mutates the composite [`LinkState`] and
//! returns the [`Effect`]s the driver must perform (dial, transmit,
//! schedule a retry, notify a consumer). Nothing in here does I/O or
//! awaits, which is what makes the ordering guarantees of this layer
//! testable without a runtime: feed a sequence of events, assert the
//! exact sequence of effects.
//!
//! The driver owns the single instance and calls it from one task, so
//! the core needs no interior locking.

use serde_json::Value;
use tracing::{debug, info, warn};

use roomlink_protocol::{AuthReply, ClientFrame, Credential};

use crate::config::ChannelConfig;
use crate::gate::{GateDecision, OutboundClass, OutboundGate};
use crate::router::{self, Inbound};
use crate::state::{AuthEvent, AuthPhase, LinkState};

/// Heartbeat periods without any inbound frame before the connection
/// is declared dead.
const STALE_TICKS: u32 = 2;

// ---------------------------------------------------------------------------
// Effects
// ---------------------------------------------------------------------------

/// Side effects requested by the core, performed by the driver.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Open a new transport connection.
    Dial,
    /// Close the current transport connection, if any.
    CloseTransport,
    /// Put one frame on the wire.
    Transmit {
        frame: Value,
        class: OutboundClass,
    },
    /// Arm the reconnect timer.
    ScheduleReconnect(std::time::Duration),
    /// Disarm the reconnect timer.
    CancelReconnect,
    /// Start the heartbeat interval for this connect cycle.
    StartHeartbeat,
    /// Stop the heartbeat interval.
    StopHeartbeat,
    /// Notify the state-change consumer.
    State(LinkState),
    /// Notify the auth-event consumer.
    Auth(AuthEvent),
    /// Deliver a room snapshot to its consumer.
    Snapshot(Value),
    /// Deliver a peer-signaling payload to its consumer.
    Signal(Value),
    /// Deliver a control event to its consumer.
    Control(Value),
}

// ---------------------------------------------------------------------------
// LinkCore
// ---------------------------------------------------------------------------

/// Connection manager and authentication controller in one machine.
///
/// ```text
/// Disconnected ──connect()──→ Connecting ──open──→ Connected(·)
///      ↑                          ↑  │                   │
///      │                          │  └─dial failed─┐     │ close
///  disconnect()             timer fired            ▼     ▼
///      └──────────────────────────┴────────── Reconnecting ──budget──→ Failed
/// ```
pub struct LinkCore {
    config: ChannelConfig,
    state: LinkState,
    gate: OutboundGate,
    /// Cached for silent re-authentication after every reconnect.
    /// Cleared on denial and logout, never retried blindly.
    credential: Option<Credential>,
    /// Consecutive failed connect cycles; reset only by a clean open.
    attempt: u32,
    /// Heartbeat ticks since the last inbound frame.
    ticks_since_inbound: u32,
    /// Latest room snapshot, kept for late-registering consumers.
    /// Untrustworthy once auth resets, so cleared with it.
    last_snapshot: Option<Value>,
}

impl LinkCore {
    /// Creates an idle core.
    pub fn new(config: ChannelConfig) -> Self {
        Self {
            config,
            state: LinkState::Disconnected,
            gate: OutboundGate::new(),
            credential: None,
            attempt: 0,
            ticks_since_inbound: 0,
            last_snapshot: None,
        }
    }

    /// Current composite state.
    pub fn state(&self) -> LinkState {
        self.state
    }

    /// The cached credential, if any.
    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    /// The latest room snapshot, if one arrived this auth session.
    pub fn last_snapshot(&self) -> Option<&Value> {
        self.last_snapshot.as_ref()
    }

    /// Number of application frames waiting in the gate.
    pub fn queued(&self) -> usize {
        self.gate.len()
    }

    // -- Caller operations ------------------------------------------------

    /// Opens the channel. No-op while already connected or dialing.
    pub fn connect(&mut self) -> Vec<Effect> {
        let mut fx = Vec::new();
        match self.state {
            LinkState::Connected(_) | LinkState::Connecting => {
                debug!(state = %self.state, "connect ignored");
            }
            LinkState::Reconnecting { .. } => {
                // Skip the pending backoff and dial right away.
                fx.push(Effect::CancelReconnect);
                self.begin_dial(&mut fx);
            }
            LinkState::Disconnected | LinkState::Failed => {
                self.begin_dial(&mut fx);
            }
        }
        fx
    }

    /// Tears the channel down. Idempotent; cancels every timer so a
    /// stale firing cannot resurrect the connection.
    pub fn disconnect(&mut self) -> Vec<Effect> {
        let mut fx = Vec::new();
        if self.state == LinkState::Disconnected {
            return fx;
        }

        fx.push(Effect::CancelReconnect);
        fx.push(Effect::StopHeartbeat);
        if matches!(
            self.state,
            LinkState::Connected(_) | LinkState::Connecting
        ) {
            fx.push(Effect::CloseTransport);
        }
        self.reset_auth(&mut fx);
        self.ticks_since_inbound = 0;
        self.set_state(LinkState::Disconnected, &mut fx);
        info!("channel disconnected");
        fx
    }

    /// Caches the credential and starts the handshake when possible.
    ///
    /// While not connected the credential is only cached; the
    /// auto-reauthentication path fires it on the next open.
    pub fn authenticate(&mut self, credential: Credential) -> Vec<Effect> {
        let mut fx = Vec::new();
        self.credential = Some(credential);
        match self.state {
            LinkState::Connected(AuthPhase::Pending) => {
                // A verdict is already in flight; the new secret is
                // cached and will be used on the next cycle.
                debug!("authenticate while pending — credential cached");
            }
            LinkState::Connected(_) => self.begin_auth(&mut fx),
            _ => {
                debug!(state = %self.state, "authenticate deferred until open");
            }
        }
        fx
    }

    /// Forgets the credential and drops back to unauthenticated.
    /// The channel itself stays up.
    pub fn logout(&mut self) -> Vec<Effect> {
        let mut fx = Vec::new();
        self.credential = None;
        if let LinkState::Connected(phase) = self.state {
            if phase != AuthPhase::Unauthenticated {
                self.last_snapshot = None;
                fx.push(Effect::Auth(AuthEvent::Reset));
                self.set_state(
                    LinkState::Connected(AuthPhase::Unauthenticated),
                    &mut fx,
                );
            }
        }
        fx
    }

    /// Submits an application message.
    ///
    /// Transmitted immediately when the channel is fully usable,
    /// queued otherwise — application traffic is never dropped at this
    /// layer.
    pub fn send(&mut self, message: Value) -> Vec<Effect> {
        match OutboundGate::decide(&self.state, OutboundClass::Application)
        {
            GateDecision::Send => vec![Effect::Transmit {
                frame: message,
                class: OutboundClass::Application,
            }],
            GateDecision::Queue | GateDecision::Drop => {
                self.gate.enqueue(message);
                Vec::new()
            }
        }
    }

    /// A transmit handed to the transport failed to go out.
    ///
    /// Application frames fall back to the queue for the next flush;
    /// auth and liveness frames are not retried — the connection is
    /// already going down and the reconnect path regenerates both.
    pub fn transmit_failed(
        &mut self,
        frame: Value,
        class: OutboundClass,
    ) -> Vec<Effect> {
        match class {
            OutboundClass::Application => {
                debug!("transmit failed — frame requeued");
                self.gate.enqueue(frame);
            }
            OutboundClass::Auth | OutboundClass::Liveness => {
                debug!(?class, "transmit failed — frame dropped");
            }
        }
        Vec::new()
    }

    // -- Transport callbacks ----------------------------------------------

    /// The transport reported a clean open.
    pub fn transport_opened(&mut self) -> Vec<Effect> {
        let mut fx = Vec::new();
        if self.state != LinkState::Connecting {
            // A connection we no longer want (torn down mid-dial).
            warn!(state = %self.state, "unexpected open — closing");
            fx.push(Effect::CloseTransport);
            return fx;
        }

        self.attempt = 0;
        self.ticks_since_inbound = 0;
        self.set_state(
            LinkState::Connected(AuthPhase::Unauthenticated),
            &mut fx,
        );
        fx.push(Effect::StartHeartbeat);
        info!("channel open");

        // Silent recovery: a cached credential re-authenticates without
        // any user interaction.
        if self.credential.is_some() {
            self.begin_auth(&mut fx);
        }
        fx
    }

    /// The transport closed unexpectedly, or a dial failed.
    pub fn transport_closed(&mut self, reason: &str) -> Vec<Effect> {
        let mut fx = Vec::new();
        match self.state {
            LinkState::Disconnected | LinkState::Failed => {
                // Already idle; nothing to recover.
                debug!(reason, "close ignored in {}", self.state);
            }
            LinkState::Reconnecting { .. } => {
                debug!(reason, "close ignored while already reconnecting");
            }
            LinkState::Connecting | LinkState::Connected(_) => {
                info!(reason, "channel lost");
                fx.push(Effect::StopHeartbeat);
                self.reset_auth(&mut fx);
                self.schedule_retry(&mut fx);
            }
        }
        fx
    }

    /// A raw frame arrived from the server.
    pub fn frame_received(&mut self, data: &[u8]) -> Vec<Effect> {
        // Any inbound frame is evidence of liveness, malformed or not.
        self.ticks_since_inbound = 0;

        match router::classify(data) {
            Err(e) => {
                warn!(error = %e, "discarding malformed frame");
                Vec::new()
            }
            Ok(Inbound::AuthResult(reply)) => self.on_auth_reply(reply),
            Ok(Inbound::Signal(value)) => vec![Effect::Signal(value)],
            Ok(Inbound::Control(value)) => vec![Effect::Control(value)],
            Ok(Inbound::Snapshot(value)) => {
                self.last_snapshot = Some(value.clone());
                vec![Effect::Snapshot(value)]
            }
        }
    }

    // -- Timers -----------------------------------------------------------

    /// The reconnect backoff elapsed.
    pub fn reconnect_timer_fired(&mut self) -> Vec<Effect> {
        let mut fx = Vec::new();
        if let LinkState::Reconnecting { attempt } = self.state {
            debug!(attempt, "retrying connection");
            self.begin_dial(&mut fx);
        }
        fx
    }

    /// One heartbeat period elapsed.
    ///
    /// Checks liveness first: two silent periods mean the connection is
    /// dead even if the transport has not noticed, and the close path
    /// runs immediately. Otherwise a liveness frame goes out — but only
    /// when the gate allows it; a heartbeat must never be the frame
    /// that leaks past an incomplete handshake.
    pub fn heartbeat_tick(&mut self) -> Vec<Effect> {
        if !self.state.is_connected() {
            // Stale timer from a torn-down cycle.
            return Vec::new();
        }

        self.ticks_since_inbound += 1;
        if self.ticks_since_inbound >= STALE_TICKS {
            warn!(
                silent_periods = self.ticks_since_inbound,
                "no inbound traffic — declaring connection dead"
            );
            let mut fx = vec![Effect::CloseTransport];
            fx.extend(self.transport_closed("liveness timeout"));
            return fx;
        }

        match OutboundGate::decide(&self.state, OutboundClass::Liveness) {
            GateDecision::Send => {
                let frame = serde_json::to_value(ClientFrame::Hb)
                    .unwrap_or(Value::Null);
                vec![Effect::Transmit {
                    frame,
                    class: OutboundClass::Liveness,
                }]
            }
            _ => {
                debug!(state = %self.state, "heartbeat dropped");
                Vec::new()
            }
        }
    }

    /// The hosting UI became foreground-visible.
    ///
    /// Opportunistic recovery: skip a pending backoff, or retry a
    /// failed channel. An explicit `Disconnected` is left alone.
    pub fn became_visible(&mut self) -> Vec<Effect> {
        let mut fx = Vec::new();
        match self.state {
            LinkState::Reconnecting { .. } => {
                debug!("visible again — skipping backoff");
                fx.push(Effect::CancelReconnect);
                self.begin_dial(&mut fx);
            }
            LinkState::Failed => {
                debug!("visible again — retrying failed channel");
                self.begin_dial(&mut fx);
            }
            _ => {}
        }
        fx
    }

    // -- Internal ---------------------------------------------------------

    fn set_state(&mut self, next: LinkState, fx: &mut Vec<Effect>) {
        if self.state != next {
            debug!(from = %self.state, to = %next, "state transition");
            self.state = next;
            fx.push(Effect::State(next));
        }
    }

    fn begin_dial(&mut self, fx: &mut Vec<Effect>) {
        self.set_state(LinkState::Connecting, fx);
        fx.push(Effect::Dial);
    }

    /// Sends the auth frame and enters `Pending`. Caller guarantees the
    /// channel is open and a credential is cached.
    fn begin_auth(&mut self, fx: &mut Vec<Effect>) {
        let Some(credential) = self.credential.as_ref() else {
            return;
        };
        let frame = match serde_json::to_value(ClientFrame::auth(credential))
        {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "could not encode auth frame");
                return;
            }
        };

        self.set_state(LinkState::Connected(AuthPhase::Pending), fx);
        fx.push(Effect::Auth(AuthEvent::Pending));
        fx.push(Effect::Transmit {
            frame,
            class: OutboundClass::Auth,
        });
    }

    fn on_auth_reply(&mut self, reply: AuthReply) -> Vec<Effect> {
        let mut fx = Vec::new();
        if self.state != LinkState::Connected(AuthPhase::Pending) {
            debug!(state = %self.state, "spurious auth reply ignored");
            return fx;
        }

        if reply.ok {
            info!("authenticated");
            self.set_state(
                LinkState::Connected(AuthPhase::Authenticated),
                &mut fx,
            );
            fx.push(Effect::Auth(AuthEvent::Granted));
            // Release everything held back, in original order, before
            // any new caller send is processed.
            for frame in self.gate.drain() {
                fx.push(Effect::Transmit {
                    frame,
                    class: OutboundClass::Application,
                });
            }
        } else {
            let reason = reply
                .reason
                .unwrap_or_else(|| "authentication rejected".to_string());
            warn!(%reason, "authentication denied");
            // A rejected secret is never retried automatically.
            self.credential = None;
            self.last_snapshot = None;
            self.set_state(LinkState::Connected(AuthPhase::Failed), &mut fx);
            fx.push(Effect::Auth(AuthEvent::Denied { reason }));
        }
        fx
    }

    /// Drops the auth phase back to unauthenticated, emitting `Reset`
    /// when there was anything to reset. The snapshot cache goes with
    /// it — state from a dead auth session is not trustworthy.
    fn reset_auth(&mut self, fx: &mut Vec<Effect>) {
        if let LinkState::Connected(phase) = self.state {
            if phase != AuthPhase::Unauthenticated {
                self.last_snapshot = None;
                fx.push(Effect::Auth(AuthEvent::Reset));
            }
        }
    }

    /// Books the next reconnect attempt, or gives up when the budget
    /// is spent.
    fn schedule_retry(&mut self, fx: &mut Vec<Effect>) {
        self.attempt += 1;
        let max = self.config.max_reconnect_attempts;
        if max > 0 && self.attempt > max {
            warn!(attempts = self.attempt - 1, "reconnection budget spent");
            self.set_state(LinkState::Failed, fx);
            return;
        }

        let delay = self.config.reconnect_delay(self.attempt);
        debug!(attempt = self.attempt, ?delay, "reconnect scheduled");
        self.set_state(
            LinkState::Reconnecting {
                attempt: self.attempt,
            },
            fx,
        );
        fx.push(Effect::ScheduleReconnect(delay));
    }
}

// =========================================================================
// Tests
// =========================================================================
