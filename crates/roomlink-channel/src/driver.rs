//! The channel driver: one background task that owns the [`LinkCore`],
//! the transport connection, and every timer.
//!
//! Callers hold a cheap, cloneable [`ChannelHandle`] and talk to the
//! task over an unbounded command channel, so every public operation is
//! non-blocking and safe from any task. Transport reads run in a
//! per-connection reader task; transport writes are funneled through a
//! per-connection writer task fed by an ordered queue, which is what
//! keeps wire order identical to submission order even though sends
//! are asynchronous.

use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::{Instant, Interval, MissedTickBehavior, Sleep};
use tracing::{debug, error, warn};

use roomlink_protocol::Codec;
use roomlink_transport::{Connection, Connector};

use crate::config::ChannelConfig;
use crate::error::ChannelError;
use crate::gate::OutboundClass;
use crate::link::{Effect, LinkCore};
use crate::state::{AuthEvent, LinkState};

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

type StateFn = Box<dyn FnMut(LinkState) + Send>;
type AuthFn = Box<dyn FnMut(AuthEvent) + Send>;
type ValueFn = Box<dyn FnMut(Value) + Send>;

enum Command {
    Connect,
    Disconnect,
    Authenticate(roomlink_protocol::Credential),
    Logout,
    Send(Value),
    Visible,
    Shutdown,
    OnState(StateFn),
    OnAuth(AuthFn),
    OnSnapshot(ValueFn),
    OnSignal(ValueFn),
    OnControl(ValueFn),
}

/// Cloneable front end to a running channel task.
///
/// Dropping every handle shuts the task down. Every operation fails
/// with [`ChannelError::Closed`] once the driver task is gone — a
/// message handed to a dead channel is lost, and the caller deserves
/// to know.
#[derive(Clone)]
pub struct ChannelHandle {
    tx: UnboundedSender<Command>,
}

impl ChannelHandle {
    /// Opens the channel (or skips a pending backoff).
    pub fn connect(&self) -> Result<(), ChannelError> {
        self.push(Command::Connect)
    }

    /// Tears the channel down and stops reconnecting.
    pub fn disconnect(&self) -> Result<(), ChannelError> {
        self.push(Command::Disconnect)
    }

    /// Starts (or re-runs) the authentication handshake.
    pub fn authenticate(
        &self,
        credential: roomlink_protocol::Credential,
    ) -> Result<(), ChannelError> {
        self.push(Command::Authenticate(credential))
    }

    /// Forgets the credential and drops to unauthenticated.
    pub fn logout(&self) -> Result<(), ChannelError> {
        self.push(Command::Logout)
    }

    /// Submits an application message. Queued while the channel is not
    /// fully usable, never dropped while the driver is alive.
    pub fn send(&self, message: Value) -> Result<(), ChannelError> {
        self.push(Command::Send(message))
    }

    /// Hints that the hosting UI became visible again.
    pub fn notify_visible(&self) -> Result<(), ChannelError> {
        self.push(Command::Visible)
    }

    /// Stops the driver task. Equivalent to dropping all handles.
    /// Idempotent: stopping an already-stopped driver is a no-op.
    pub fn shutdown(&self) {
        let _ = self.tx.send(Command::Shutdown);
    }

    /// Registers the state-change consumer. One consumer per kind;
    /// registering again replaces the previous one.
    pub fn on_state(
        &self,
        f: impl FnMut(LinkState) + Send + 'static,
    ) -> Result<(), ChannelError> {
        self.push(Command::OnState(Box::new(f)))
    }

    /// Registers the auth-event consumer.
    pub fn on_auth(
        &self,
        f: impl FnMut(AuthEvent) + Send + 'static,
    ) -> Result<(), ChannelError> {
        self.push(Command::OnAuth(Box::new(f)))
    }

    /// Registers the snapshot consumer. If a snapshot already arrived
    /// this auth session it is delivered immediately.
    pub fn on_snapshot(
        &self,
        f: impl FnMut(Value) + Send + 'static,
    ) -> Result<(), ChannelError> {
        self.push(Command::OnSnapshot(Box::new(f)))
    }

    /// Registers the peer-signaling consumer.
    pub fn on_signal(
        &self,
        f: impl FnMut(Value) + Send + 'static,
    ) -> Result<(), ChannelError> {
        self.push(Command::OnSignal(Box::new(f)))
    }

    /// Registers the control-event consumer.
    pub fn on_control(
        &self,
        f: impl FnMut(Value) + Send + 'static,
    ) -> Result<(), ChannelError> {
        self.push(Command::OnControl(Box::new(f)))
    }

    fn push(&self, cmd: Command) -> Result<(), ChannelError> {
        self.tx.send(cmd).map_err(|_| ChannelError::Closed)
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// Events reported back to the driver by its spawned transport tasks.
/// Each carries the connect-cycle generation that produced it so events
/// from a torn-down connection are recognizably stale.
enum Internal<C> {
    DialDone(u64, Result<C, String>),
    Frame(u64, Vec<u8>),
    Closed(u64, String),
    SendFailed(u64, Value, OutboundClass),
}

#[derive(Default)]
struct Handlers {
    state: Option<StateFn>,
    auth: Option<AuthFn>,
    snapshot: Option<ValueFn>,
    signal: Option<ValueFn>,
    control: Option<ValueFn>,
}

pub struct ChannelDriver<K: Connector, C: Codec> {
    core: LinkCore,
    config: ChannelConfig,
    connector: Arc<K>,
    codec: C,
    conn: Option<Arc<K::Conn>>,
    /// Ordered feed into the current connection's writer task.
    out_tx: Option<UnboundedSender<(Value, OutboundClass, Vec<u8>)>>,
    /// Bumped on every dial and every teardown; events carrying an
    /// older generation are ignored.
    generation: u64,
    cmd_rx: UnboundedReceiver<Command>,
    internal_tx: UnboundedSender<Internal<K::Conn>>,
    internal_rx: UnboundedReceiver<Internal<K::Conn>>,
    heartbeat: Option<Interval>,
    reconnect: Option<Pin<Box<Sleep>>>,
    handlers: Handlers,
}

/// What woke the run loop. Resolving the select arms to plain values
/// before acting keeps `&mut self` free for the handling code.
enum Wake<C> {
    Cmd(Option<Command>),
    Evt(Internal<C>),
    Heartbeat,
    Retry,
}

impl<K, C> ChannelDriver<K, C>
where
    K: Connector,
    C: Codec,
{
    /// Spawns the driver task and returns its handle.
    pub fn spawn(connector: K, codec: C, config: ChannelConfig) -> ChannelHandle {
        let config = config.validated();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();

        let driver = Self {
            core: LinkCore::new(config.clone()),
            config,
            connector: Arc::new(connector),
            codec,
            conn: None,
            out_tx: None,
            generation: 0,
            cmd_rx,
            internal_tx,
            internal_rx,
            heartbeat: None,
            reconnect: None,
            handlers: Handlers::default(),
        };
        tokio::spawn(driver.run());

        ChannelHandle { tx: cmd_tx }
    }

    async fn run(mut self) {
        debug!(url = %self.config.url, "channel driver started");
        loop {
            let wake = {
                let heartbeat = tick_or_pending(&mut self.heartbeat);
                let retry = sleep_or_pending(&mut self.reconnect);
                tokio::select! {
                    cmd = self.cmd_rx.recv() => Wake::Cmd(cmd),
                    Some(evt) = self.internal_rx.recv() => Wake::Evt(evt),
                    _ = heartbeat => Wake::Heartbeat,
                    _ = retry => Wake::Retry,
                }
            };

            match wake {
                Wake::Cmd(Some(Command::Shutdown)) | Wake::Cmd(None) => {
                    let fx = self.core.disconnect();
                    self.apply(fx);
                    debug!("channel driver stopped");
                    return;
                }
                Wake::Cmd(Some(cmd)) => self.handle_command(cmd),
                Wake::Evt(evt) => self.handle_internal(evt),
                Wake::Heartbeat => {
                    let fx = self.core.heartbeat_tick();
                    self.apply(fx);
                }
                Wake::Retry => {
                    self.reconnect = None;
                    let fx = self.core.reconnect_timer_fired();
                    self.apply(fx);
                }
            }
        }
    }

    fn handle_command(&mut self, cmd: Command) {
        let fx = match cmd {
            Command::Connect => self.core.connect(),
            Command::Disconnect => self.core.disconnect(),
            Command::Authenticate(c) => self.core.authenticate(c),
            Command::Logout => self.core.logout(),
            Command::Send(v) => self.core.send(v),
            Command::Visible => self.core.became_visible(),
            Command::Shutdown => unreachable!("handled in run loop"),
            Command::OnState(f) => {
                self.handlers.state = Some(f);
                return;
            }
            Command::OnAuth(f) => {
                self.handlers.auth = Some(f);
                return;
            }
            Command::OnSnapshot(mut f) => {
                if let Some(snapshot) = self.core.last_snapshot() {
                    f(snapshot.clone());
                }
                self.handlers.snapshot = Some(f);
                return;
            }
            Command::OnSignal(f) => {
                self.handlers.signal = Some(f);
                return;
            }
            Command::OnControl(f) => {
                self.handlers.control = Some(f);
                return;
            }
        };
        self.apply(fx);
    }

    fn handle_internal(&mut self, evt: Internal<K::Conn>) {
        match evt {
            Internal::DialDone(generation, result) => {
                if generation != self.generation {
                    // The dial was abandoned while in flight.
                    if let Ok(conn) = result {
                        let conn = Arc::new(conn);
                        tokio::spawn(async move {
                            let _ = conn.close().await;
                        });
                    }
                    return;
                }
                match result {
                    Ok(conn) => {
                        self.adopt_connection(conn);
                        let fx = self.core.transport_opened();
                        self.apply(fx);
                    }
                    Err(reason) => {
                        let fx = self.core.transport_closed(&reason);
                        self.apply(fx);
                    }
                }
            }
            Internal::Frame(generation, data) => {
                if generation != self.generation {
                    return;
                }
                let fx = self.core.frame_received(&data);
                self.apply(fx);
            }
            Internal::Closed(generation, reason) => {
                if generation != self.generation {
                    return;
                }
                self.drop_connection();
                let fx = self.core.transport_closed(&reason);
                self.apply(fx);
            }
            Internal::SendFailed(generation, frame, class) => {
                if generation != self.generation {
                    return;
                }
                let fx = self.core.transmit_failed(frame, class);
                self.apply(fx);
            }
        }
    }

    // -- Effect execution -------------------------------------------------

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Dial => self.dial(),
                Effect::CloseTransport => self.drop_connection(),
                Effect::Transmit { frame, class } => {
                    self.transmit(frame, class)
                }
                Effect::ScheduleReconnect(delay) => {
                    self.reconnect =
                        Some(Box::pin(tokio::time::sleep(delay)));
                }
                Effect::CancelReconnect => self.reconnect = None,
                Effect::StartHeartbeat => self.start_heartbeat(),
                Effect::StopHeartbeat => self.heartbeat = None,
                Effect::State(state) => {
                    if let Some(f) = self.handlers.state.as_mut() {
                        f(state);
                    }
                }
                Effect::Auth(event) => {
                    if let Some(f) = self.handlers.auth.as_mut() {
                        f(event);
                    }
                }
                Effect::Snapshot(value) => {
                    if let Some(f) = self.handlers.snapshot.as_mut() {
                        f(value);
                    }
                }
                Effect::Signal(value) => {
                    if let Some(f) = self.handlers.signal.as_mut() {
                        f(value);
                    }
                }
                Effect::Control(value) => {
                    if let Some(f) = self.handlers.control.as_mut() {
                        f(value);
                    }
                }
            }
        }
    }

    fn dial(&mut self) {
        // Invalidate any earlier in-flight dial before starting a new
        // one.
        self.drop_connection();
        let generation = self.generation;
        let connector = Arc::clone(&self.connector);
        let url = self.config.connect_url();
        let events = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = connector
                .connect(&url)
                .await
                .map_err(|e| e.to_string());
            let _ = events.send(Internal::DialDone(generation, result));
        });
    }

    /// Installs a freshly dialed connection: a reader task feeding
    /// inbound frames back, and a writer task draining the ordered
    /// outbound queue.
    fn adopt_connection(&mut self, conn: K::Conn) {
        let conn = Arc::new(conn);
        let generation = self.generation;

        let reader = Arc::clone(&conn);
        let events = self.internal_tx.clone();
        tokio::spawn(async move {
            loop {
                match reader.recv().await {
                    Ok(Some(data)) => {
                        if events
                            .send(Internal::Frame(generation, data))
                            .is_err()
                        {
                            return;
                        }
                    }
                    Ok(None) => {
                        let _ = events.send(Internal::Closed(
                            generation,
                            "closed by server".to_string(),
                        ));
                        return;
                    }
                    Err(e) => {
                        let _ = events.send(Internal::Closed(
                            generation,
                            e.to_string(),
                        ));
                        return;
                    }
                }
            }
        });

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<(
            Value,
            OutboundClass,
            Vec<u8>,
        )>();
        let writer = Arc::clone(&conn);
        let events = self.internal_tx.clone();
        tokio::spawn(async move {
            while let Some((frame, class, bytes)) = out_rx.recv().await {
                if let Err(e) = writer.send(&bytes).await {
                    warn!(error = %e, "transport send failed");
                    // Everything already queued behind the failure is
                    // equally lost; report it all and stop writing.
                    let _ = events.send(Internal::SendFailed(
                        generation, frame, class,
                    ));
                    while let Ok((frame, class, _)) = out_rx.try_recv() {
                        let _ = events.send(Internal::SendFailed(
                            generation, frame, class,
                        ));
                    }
                    return;
                }
            }
        });

        self.conn = Some(conn);
        self.out_tx = Some(out_tx);
    }

    /// Invalidates the current generation and releases the connection.
    /// Both transport tasks notice on their own: the writer when its
    /// queue closes, the reader when the close surfaces as an error.
    fn drop_connection(&mut self) {
        self.generation += 1;
        self.out_tx = None;
        if let Some(conn) = self.conn.take() {
            tokio::spawn(async move {
                let _ = conn.close().await;
            });
        }
    }

    fn transmit(&mut self, frame: Value, class: OutboundClass) {
        let bytes = match self.codec.encode(&frame) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(error = %e, "could not encode outbound frame");
                return;
            }
        };
        match self.out_tx.as_ref() {
            Some(tx) => {
                if tx.send((frame.clone(), class, bytes)).is_err() {
                    // Writer already gone; treat as a send failure.
                    let fx = self.core.transmit_failed(frame, class);
                    self.apply(fx);
                }
            }
            None => {
                debug!("transmit with no connection");
                let fx = self.core.transmit_failed(frame, class);
                self.apply(fx);
            }
        }
    }

    fn start_heartbeat(&mut self) {
        // interval_at so the first tick fires one full period from now,
        // not immediately.
        let period = self.config.heartbeat_interval;
        let mut interval =
            tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.heartbeat = Some(interval);
    }
}

/// Resolves when the interval ticks; pends forever while no interval is
/// armed, so the select arm simply never fires.
async fn tick_or_pending(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn sleep_or_pending(sleep: &mut Option<Pin<Box<Sleep>>>) {
    match sleep {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}
