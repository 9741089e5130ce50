//! End-to-end driver tests over an in-memory transport double.
//!
//! The fake connector hands out pre-scripted connections, so each test
//! plays the server side by pushing frames and closing sockets while
//! paused virtual time makes the backoff and heartbeat schedules exact.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::Instant;

use roomlink_channel::{
    AuthEvent, AuthPhase, ChannelConfig, ChannelDriver, ChannelError,
    ChannelHandle, LinkState,
};
use roomlink_protocol::{Credential, JsonCodec};
use roomlink_transport::{Connection, ConnectionId, Connector, TransportError};

// ===========================================================================
// In-memory transport double
// ===========================================================================

enum ServerMsg {
    Frame(Vec<u8>),
    Close,
}

/// The test's side of one scripted connection.
struct ServerEnd {
    to_client: UnboundedSender<ServerMsg>,
    from_client: UnboundedReceiver<Vec<u8>>,
}

impl ServerEnd {
    fn push(&self, frame: Value) {
        let bytes = serde_json::to_vec(&frame).unwrap();
        let _ = self.to_client.send(ServerMsg::Frame(bytes));
    }

    fn close(&self) {
        let _ = self.to_client.send(ServerMsg::Close);
    }

    /// Next frame the client put on the wire, or `None` if nothing
    /// arrives within a generous (virtual) window.
    async fn next_frame(&mut self) -> Option<Value> {
        tokio::time::timeout(Duration::from_secs(1), self.from_client.recv())
            .await
            .ok()
            .flatten()
            .map(|bytes| serde_json::from_slice(&bytes).unwrap())
    }
}

struct FakeConnection {
    id: ConnectionId,
    inbound: tokio::sync::Mutex<UnboundedReceiver<ServerMsg>>,
    outbound: UnboundedSender<Vec<u8>>,
}

impl Connection for FakeConnection {
    type Error = TransportError;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        self.outbound.send(data.to_vec()).map_err(|_| {
            TransportError::SendFailed(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "server side dropped",
            ))
        })
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        match self.inbound.lock().await.recv().await {
            Some(ServerMsg::Frame(data)) => Ok(Some(data)),
            Some(ServerMsg::Close) | None => Ok(None),
        }
    }

    async fn close(&self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}

/// Hands out scripted connections in order; records when each dial
/// happened so tests can assert the backoff schedule.
struct FakeConnector {
    script: Mutex<VecDeque<Result<FakeConnection, String>>>,
    dial_times: Arc<Mutex<Vec<Instant>>>,
}

impl FakeConnector {
    fn scripted(
        script: Vec<Result<FakeConnection, String>>,
    ) -> (Self, Arc<Mutex<Vec<Instant>>>) {
        let dial_times = Arc::new(Mutex::new(Vec::new()));
        let connector = Self {
            script: Mutex::new(script.into()),
            dial_times: Arc::clone(&dial_times),
        };
        (connector, dial_times)
    }
}

impl Connector for FakeConnector {
    type Conn = FakeConnection;
    type Error = TransportError;

    async fn connect(&self, _url: &str) -> Result<Self::Conn, Self::Error> {
        self.dial_times.lock().unwrap().push(Instant::now());
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(conn)) => Ok(conn),
            Some(Err(reason)) => Err(TransportError::ConnectFailed(
                io::Error::new(io::ErrorKind::ConnectionRefused, reason),
            )),
            None => Err(TransportError::ConnectFailed(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "script exhausted",
            ))),
        }
    }
}

fn pair(n: u64) -> (ServerEnd, FakeConnection) {
    let (to_client, inbound) = mpsc::unbounded_channel();
    let (outbound, from_client) = mpsc::unbounded_channel();
    let server = ServerEnd {
        to_client,
        from_client,
    };
    let conn = FakeConnection {
        id: ConnectionId::new(n),
        inbound: tokio::sync::Mutex::new(inbound),
        outbound,
    };
    (server, conn)
}

// ===========================================================================
// Harness
// ===========================================================================

fn config() -> ChannelConfig {
    ChannelConfig::new("ws://room.test").with_session("itest")
}

fn spawn_driver(
    script: Vec<Result<FakeConnection, String>>,
) -> (ChannelHandle, Arc<Mutex<Vec<Instant>>>) {
    let (connector, dial_times) = FakeConnector::scripted(script);
    let handle = ChannelDriver::spawn(connector, JsonCodec, config());
    (handle, dial_times)
}

/// Lets the driver and its transport tasks drain their queues without
/// advancing virtual time.
async fn settle() {
    for _ in 0..64 {
        tokio::task::yield_now().await;
    }
}

fn record_states(handle: &ChannelHandle) -> Arc<Mutex<Vec<LinkState>>> {
    let states = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&states);
    handle.on_state(move |s| sink.lock().unwrap().push(s)).unwrap();
    states
}

fn record_auth(handle: &ChannelHandle) -> Arc<Mutex<Vec<AuthEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    handle.on_auth(move |e| sink.lock().unwrap().push(e)).unwrap();
    events
}

// ===========================================================================
// Tests
// ===========================================================================

#[tokio::test(start_paused = true)]
async fn test_handshake_gates_and_flushes_application_sends() {
    let (server, conn) = pair(1);
    let mut server = server;
    let (handle, _) = spawn_driver(vec![Ok(conn)]);
    let states = record_states(&handle);

    handle.connect().unwrap();
    settle().await;

    // Submitted before the handshake completes: must not hit the wire.
    handle.send(json!({ "t": "move", "id": "a" })).unwrap();
    handle.authenticate(Credential::new("hunter2")).unwrap();
    handle.send(json!({ "t": "move", "id": "b" })).unwrap();
    settle().await;

    // Only the auth frame goes out pre-grant.
    let auth = server.next_frame().await.expect("auth frame");
    assert_eq!(auth["t"], "auth");
    assert_eq!(auth["secret"], "hunter2");

    server.push(json!({ "t": "auth", "ok": true }));
    settle().await;

    // Grant releases the held frames in submission order.
    assert_eq!(server.next_frame().await.unwrap()["id"], "a");
    assert_eq!(server.next_frame().await.unwrap()["id"], "b");

    // Post-grant sends flow straight through.
    handle.send(json!({ "t": "chat", "text": "hi" })).unwrap();
    settle().await;
    assert_eq!(server.next_frame().await.unwrap()["t"], "chat");

    let states = states.lock().unwrap();
    assert_eq!(
        *states,
        vec![
            LinkState::Connecting,
            LinkState::Connected(AuthPhase::Unauthenticated),
            LinkState::Connected(AuthPhase::Pending),
            LinkState::Connected(AuthPhase::Authenticated),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_server_close_triggers_backoff_and_silent_reauth() {
    let (mut server1, conn1) = pair(1);
    let (mut server2, conn2) = pair(2);
    let (handle, dial_times) = spawn_driver(vec![Ok(conn1), Ok(conn2)]);
    let auth_events = record_auth(&handle);

    handle.connect().unwrap();
    handle.authenticate(Credential::new("hunter2")).unwrap();
    settle().await;
    assert_eq!(server1.next_frame().await.unwrap()["t"], "auth");
    server1.push(json!({ "t": "auth", "ok": true }));
    settle().await;

    let lost_at = Instant::now();
    server1.close();
    settle().await;

    // First retry waits the full base interval, then the cached
    // credential re-authenticates with no caller involvement.
    tokio::time::sleep(Duration::from_millis(2100)).await;
    settle().await;
    {
        let dials = dial_times.lock().unwrap();
        assert_eq!(dials.len(), 2);
        assert!(dials[1] - lost_at >= Duration::from_millis(2000));
    }
    assert_eq!(server2.next_frame().await.unwrap()["t"], "auth");
    server2.push(json!({ "t": "auth", "ok": true }));
    settle().await;

    let events = auth_events.lock().unwrap();
    assert_eq!(
        *events,
        vec![
            AuthEvent::Pending,
            AuthEvent::Granted,
            AuthEvent::Reset,
            AuthEvent::Pending,
            AuthEvent::Granted,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_dial_failure_retries_until_a_connection_sticks() {
    let (server, conn) = pair(1);
    let mut server = server;
    let (handle, dial_times) = spawn_driver(vec![
        Err("connection refused".to_string()),
        Err("connection refused".to_string()),
        Ok(conn),
    ]);
    let states = record_states(&handle);

    handle.connect().unwrap();
    handle.authenticate(Credential::new("hunter2")).unwrap();
    // Base delay, then base·1.5: the third dial lands at ~5s.
    tokio::time::sleep(Duration::from_millis(5200)).await;
    settle().await;

    assert_eq!(dial_times.lock().unwrap().len(), 3);
    assert_eq!(server.next_frame().await.unwrap()["t"], "auth");
    assert!(
        states
            .lock()
            .unwrap()
            .contains(&LinkState::Reconnecting { attempt: 2 })
    );
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_cadence_and_liveness_timeout() {
    let (mut server1, conn1) = pair(1);
    let (mut server2, conn2) = pair(2);
    let (handle, _) = spawn_driver(vec![Ok(conn1), Ok(conn2)]);
    let states = record_states(&handle);

    handle.connect().unwrap();
    handle.authenticate(Credential::new("hunter2")).unwrap();
    settle().await;
    assert_eq!(server1.next_frame().await.unwrap()["t"], "auth");
    server1.push(json!({ "t": "auth", "ok": true }));
    settle().await;

    // First heartbeat one full period after open.
    tokio::time::sleep(Duration::from_millis(25_100)).await;
    assert_eq!(server1.next_frame().await.unwrap()["t"], "hb");

    // Server traffic resets the liveness counter.
    server1.push(json!({ "tokens": [] }));
    tokio::time::sleep(Duration::from_millis(25_000)).await;
    assert_eq!(server1.next_frame().await.unwrap()["t"], "hb");

    // Two silent periods with no reply: the client declares the
    // connection dead and reconnects on its own.
    tokio::time::sleep(Duration::from_millis(30_000)).await;
    settle().await;
    assert!(
        states
            .lock()
            .unwrap()
            .contains(&LinkState::Reconnecting { attempt: 1 })
    );

    // Backoff elapses, the replacement connection re-authenticates.
    tokio::time::sleep(Duration::from_millis(2100)).await;
    settle().await;
    assert_eq!(server2.next_frame().await.unwrap()["t"], "auth");
}

#[tokio::test(start_paused = true)]
async fn test_denied_credential_is_not_replayed_after_reconnect() {
    let (mut server1, conn1) = pair(1);
    let (mut server2, conn2) = pair(2);
    let (handle, _) = spawn_driver(vec![Ok(conn1), Ok(conn2)]);
    let auth_events = record_auth(&handle);

    handle.connect().unwrap();
    handle.authenticate(Credential::new("wrong")).unwrap();
    settle().await;
    server1.next_frame().await.expect("auth frame");
    server1.push(json!({ "t": "auth", "ok": false, "reason": "bad secret" }));
    settle().await;

    assert!(auth_events.lock().unwrap().contains(&AuthEvent::Denied {
        reason: "bad secret".to_string()
    }));

    server1.close();
    tokio::time::sleep(Duration::from_millis(2100)).await;
    settle().await;

    // Fresh connection, but the rejected secret stays forgotten.
    assert_eq!(server2.next_frame().await, None);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_stops_reconnecting() {
    let (server1, conn1) = pair(1);
    let (_server2, conn2) = pair(2);
    let (handle, dial_times) = spawn_driver(vec![Ok(conn1), Ok(conn2)]);
    let states = record_states(&handle);

    handle.connect().unwrap();
    settle().await;
    server1.close();
    settle().await;

    handle.disconnect().unwrap();
    tokio::time::sleep(Duration::from_secs(120)).await;
    settle().await;

    assert_eq!(dial_times.lock().unwrap().len(), 1);
    assert_eq!(
        states.lock().unwrap().last(),
        Some(&LinkState::Disconnected)
    );
}

#[tokio::test(start_paused = true)]
async fn test_visibility_hint_skips_the_backoff() {
    let (server1, conn1) = pair(1);
    let (mut server2, conn2) = pair(2);
    let (handle, dial_times) = spawn_driver(vec![Ok(conn1), Ok(conn2)]);

    handle.connect().unwrap();
    handle.authenticate(Credential::new("hunter2")).unwrap();
    settle().await;

    let lost_at = Instant::now();
    server1.close();
    settle().await;

    handle.notify_visible().unwrap();
    settle().await;

    // The retry happened now, not after the 2s backoff.
    {
        let dials = dial_times.lock().unwrap();
        assert_eq!(dials.len(), 2);
        assert!(dials[1] - lost_at < Duration::from_millis(2000));
    }
    assert_eq!(server2.next_frame().await.unwrap()["t"], "auth");
}

#[tokio::test(start_paused = true)]
async fn test_snapshot_routed_and_replayed_to_late_consumer() {
    let (mut server, conn) = pair(1);
    let (handle, _) = spawn_driver(vec![Ok(conn)]);

    handle.connect().unwrap();
    handle.authenticate(Credential::new("hunter2")).unwrap();
    settle().await;
    server.next_frame().await.expect("auth frame");
    server.push(json!({ "t": "auth", "ok": true }));

    let snapshots = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&snapshots);
    handle.on_snapshot(move |v| sink.lock().unwrap().push(v)).unwrap();
    settle().await;

    server.push(json!({ "tokens": [1, 2, 3] }));
    settle().await;
    assert_eq!(snapshots.lock().unwrap().len(), 1);

    // A consumer registered after the fact gets the cached snapshot
    // immediately.
    let late = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&late);
    handle.on_snapshot(move |v| sink.lock().unwrap().push(v)).unwrap();
    settle().await;
    assert_eq!(late.lock().unwrap().len(), 1);
    assert_eq!(late.lock().unwrap()[0]["tokens"], json!([1, 2, 3]));
}

#[tokio::test(start_paused = true)]
async fn test_signal_and_control_frames_reach_their_consumers() {
    let (mut server, conn) = pair(1);
    let (handle, _) = spawn_driver(vec![Ok(conn)]);

    let signals = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&signals);
    handle.on_signal(move |v| sink.lock().unwrap().push(v)).unwrap();
    let controls = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&controls);
    handle.on_control(move |v| sink.lock().unwrap().push(v)).unwrap();

    handle.connect().unwrap();
    handle.authenticate(Credential::new("hunter2")).unwrap();
    settle().await;
    server.next_frame().await.expect("auth frame");
    server.push(json!({ "t": "auth", "ok": true }));
    server.push(json!({ "t": "signal", "sdp": "offer" }));
    server.push(json!({ "t": "event", "name": "board-cleared" }));
    settle().await;

    assert_eq!(signals.lock().unwrap()[0]["sdp"], "offer");
    assert_eq!(controls.lock().unwrap()[0]["name"], "board-cleared");
}

#[tokio::test(start_paused = true)]
async fn test_handle_reports_closed_after_shutdown() {
    let (mut server, conn) = pair(1);
    let (handle, _) = spawn_driver(vec![Ok(conn)]);

    handle.connect().unwrap();
    settle().await;

    handle.shutdown();
    settle().await;

    let err = handle.send(json!({ "t": "move", "id": "a" })).unwrap_err();
    assert!(matches!(err, ChannelError::Closed));
    assert!(matches!(handle.connect(), Err(ChannelError::Closed)));
    assert!(matches!(
        handle.authenticate(Credential::new("hunter2")),
        Err(ChannelError::Closed)
    ));
    assert_eq!(server.next_frame().await, None);
}

#[tokio::test(start_paused = true)]
async fn test_frames_from_a_torn_down_connection_are_ignored() {
    let (mut server1, conn1) = pair(1);
    let (mut server2, conn2) = pair(2);
    let (handle, _) = spawn_driver(vec![Ok(conn1), Ok(conn2)]);
    let states = record_states(&handle);
    let auth_events = record_auth(&handle);

    handle.connect().unwrap();
    handle.authenticate(Credential::new("hunter2")).unwrap();
    settle().await;
    assert_eq!(server1.next_frame().await.unwrap()["t"], "auth");
    server1.push(json!({ "t": "auth", "ok": true }));
    settle().await;

    // Two silent heartbeat periods: the liveness check tears the first
    // connection down and the replacement re-authenticates after the
    // backoff. The first server end is never closed, so its reader is
    // still feeding frames from the abandoned socket.
    tokio::time::sleep(Duration::from_millis(55_000)).await;
    settle().await;
    tokio::time::sleep(Duration::from_millis(2100)).await;
    settle().await;
    assert_eq!(server2.next_frame().await.unwrap()["t"], "auth");
    server2.push(json!({ "t": "auth", "ok": true }));
    settle().await;

    let snapshots = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&snapshots);
    handle.on_snapshot(move |v| sink.lock().unwrap().push(v)).unwrap();
    settle().await;

    // Late arrivals from the abandoned connection must not reach the
    // routing layer or disturb the replacement's session.
    server1.push(json!({ "t": "auth", "ok": false, "reason": "too late" }));
    server1.push(json!({ "tokens": ["stale"] }));
    settle().await;

    assert_eq!(
        states.lock().unwrap().last(),
        Some(&LinkState::Connected(AuthPhase::Authenticated))
    );
    assert!(!auth_events.lock().unwrap().iter().any(|e| matches!(
        e,
        AuthEvent::Denied { .. }
    )));
    assert!(snapshots.lock().unwrap().is_empty());
}
