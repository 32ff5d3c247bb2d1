//! Tests for the connection manager's state machine.
//!
//! The manager is driven through a scripted in-process connector: each
//! connect attempt pops a plan (refuse, accept, accept after a delay) and
//! accepted connections hand the test a [`Peer`] that plays the service.
//! Time is paused, so reconnect delays are exact and instant.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use discord_link::net::{Connection, ConnectionId, Connector, TransportError};
use discord_link::protocol::SteamId;
use discord_link::reconnect::ReconnectConfig;
use discord_link::reconnect::ReconnectReason;
use discord_link::verify::{
    MemoryPermissionStore, MemoryPlayerDirectory, VerificationMessages,
    VerificationProcessor,
};
use discord_link::{
    Commands, ConnectionError, ConnectionHandle, ConnectionManager,
    ConnectionState, LinkConfig, LinkError, MessagesConfig, RequestOutcome,
    VerificationTransport, VerifyCommandOutcome,
};
use tokio::sync::mpsc;

// =========================================================================
// Scripted connector
// =========================================================================

enum Plan {
    Refuse,
    Accept,
    AcceptAfter(Duration),
    /// Accepts, but every write on the connection hangs forever.
    AcceptStalled,
}

enum Incoming {
    Frame(Vec<u8>),
    Close,
    Fail,
}

struct Shared {
    plans: Mutex<VecDeque<Plan>>,
    attempts: AtomicUsize,
    next_id: AtomicU64,
    peers: mpsc::UnboundedSender<Peer>,
}

#[derive(Clone)]
struct ScriptedConnector {
    shared: Arc<Shared>,
}

impl ScriptedConnector {
    fn new() -> (Self, mpsc::UnboundedReceiver<Peer>) {
        let (peers_tx, peers_rx) = mpsc::unbounded_channel();
        let connector = Self {
            shared: Arc::new(Shared {
                plans: Mutex::new(VecDeque::new()),
                attempts: AtomicUsize::new(0),
                next_id: AtomicU64::new(1),
                peers: peers_tx,
            }),
        };
        (connector, peers_rx)
    }

    fn plan(&self, plan: Plan) {
        self.shared.plans.lock().unwrap().push_back(plan);
    }

    fn attempts(&self) -> usize {
        self.shared.attempts.load(Ordering::SeqCst)
    }
}

impl Connector for ScriptedConnector {
    type Connection = ScriptedConnection;

    async fn connect(
        &self,
        url: &str,
    ) -> Result<ScriptedConnection, TransportError> {
        self.shared.attempts.fetch_add(1, Ordering::SeqCst);
        let plan = self
            .shared
            .plans
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Plan::Refuse);

        let stall_sends = matches!(plan, Plan::AcceptStalled);
        match plan {
            Plan::Refuse => {
                return Err(TransportError::connect_failed(url, "refused"));
            }
            Plan::AcceptAfter(delay) => tokio::time::sleep(delay).await,
            Plan::Accept | Plan::AcceptStalled => {}
        }

        let (to_client, incoming) = mpsc::unbounded_channel();
        let (outgoing, from_client) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        let _ = self.shared.peers.send(Peer {
            to_client,
            from_client,
            closed: closed.clone(),
        });

        Ok(ScriptedConnection {
            id: ConnectionId::new(self.shared.next_id.fetch_add(1, Ordering::SeqCst)),
            incoming: tokio::sync::Mutex::new(incoming),
            outgoing,
            closed,
            stall_sends,
        })
    }
}

struct ScriptedConnection {
    id: ConnectionId,
    incoming: tokio::sync::Mutex<mpsc::UnboundedReceiver<Incoming>>,
    outgoing: mpsc::UnboundedSender<String>,
    closed: Arc<AtomicBool>,
    stall_sends: bool,
}

impl Connection for ScriptedConnection {
    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        if self.stall_sends {
            std::future::pending::<()>().await;
        }
        self.outgoing
            .send(String::from_utf8_lossy(data).into_owned())
            .map_err(|_| TransportError::SendFailed(std::io::Error::other("peer gone")))
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, TransportError> {
        match self.incoming.lock().await.recv().await {
            Some(Incoming::Frame(data)) => Ok(Some(data)),
            Some(Incoming::Close) | None => Ok(None),
            Some(Incoming::Fail) => Err(TransportError::ReceiveFailed(
                std::io::Error::other("connection reset"),
            )),
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}

/// The service's end of an accepted connection.
struct Peer {
    to_client: mpsc::UnboundedSender<Incoming>,
    from_client: mpsc::UnboundedReceiver<String>,
    closed: Arc<AtomicBool>,
}

impl Peer {
    fn push(&self, text: &str) {
        let _ = self.to_client.send(Incoming::Frame(text.as_bytes().to_vec()));
    }

    fn close(&self) {
        let _ = self.to_client.send(Incoming::Close);
    }

    fn fail(&self) {
        let _ = self.to_client.send(Incoming::Fail);
    }

    fn closed_by_client(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn next_frame(&mut self) -> Option<String> {
        tokio::time::timeout(Duration::from_secs(1), self.from_client.recv())
            .await
            .ok()
            .flatten()
    }
}

// =========================================================================
// Helpers
// =========================================================================

type Frames = Arc<Mutex<Vec<String>>>;

fn spawn_manager(connector: ScriptedConnector) -> (ConnectionHandle, Frames) {
    spawn_manager_with(connector, ReconnectConfig::default())
}

fn spawn_manager_with(
    connector: ScriptedConnector,
    reconnect: ReconnectConfig,
) -> (ConnectionHandle, Frames) {
    let frames: Frames = Arc::new(Mutex::new(Vec::new()));
    let sink = frames.clone();
    let handle = ConnectionManager::spawn(
        "ws://service.test/ws",
        connector,
        move |data: &[u8]| {
            let text = String::from_utf8_lossy(data).into_owned();
            if text == "panic" {
                panic!("handler failure");
            }
            sink.lock().unwrap().push(text);
        },
        reconnect,
    );
    (handle, frames)
}

/// Lets every spawned task run to idle. Time is paused, so this advances
/// the clock by only a millisecond.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

async fn advance(duration: Duration) {
    tokio::time::sleep(duration).await;
    settle().await;
}

// =========================================================================
// Connecting
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_manager_starts_disconnected() {
    let (connector, _peers) = ScriptedConnector::new();
    let (handle, _frames) = spawn_manager(connector.clone());

    let status = handle.status().await.unwrap();
    assert_eq!(status.state, ConnectionState::Disconnected);
    assert_eq!(status.name, discord_link::CONNECTION_NAME);
    assert_eq!(status.url, "ws://service.test/ws");
    assert!(!status.reconnect_pending());
    assert_eq!(connector.attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_connect_opens_and_delivers_frames() {
    let (connector, mut peers) = ScriptedConnector::new();
    connector.plan(Plan::Accept);
    let (handle, frames) = spawn_manager(connector.clone());

    handle.connect().await.unwrap();
    settle().await;
    assert_eq!(handle.state().await, ConnectionState::Connected);

    let mut peer = peers.recv().await.unwrap();
    peer.push(r#"{"type":"hello"}"#);
    settle().await;
    assert_eq!(*frames.lock().unwrap(), vec![r#"{"type":"hello"}"#.to_string()]);

    assert_eq!(handle.send("outbound".into()).await, Ok(true));
    assert_eq!(peer.next_frame().await.as_deref(), Some("outbound"));
}

#[tokio::test(start_paused = true)]
async fn test_connect_while_connecting_is_noop() {
    let (connector, _peers) = ScriptedConnector::new();
    connector.plan(Plan::AcceptAfter(Duration::from_secs(1)));
    let (handle, _frames) = spawn_manager(connector.clone());

    handle.connect().await.unwrap();
    handle.connect().await.unwrap();
    handle.connect().await.unwrap();
    settle().await;

    assert_eq!(handle.state().await, ConnectionState::Connecting);
    assert_eq!(connector.attempts(), 1);

    advance(Duration::from_secs(1)).await;
    assert_eq!(handle.state().await, ConnectionState::Connected);
    assert_eq!(connector.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_connect_while_connected_is_noop() {
    let (connector, _peers) = ScriptedConnector::new();
    connector.plan(Plan::Accept);
    let (handle, _frames) = spawn_manager(connector.clone());

    handle.connect().await.unwrap();
    settle().await;
    handle.connect().await.unwrap();
    settle().await;

    assert_eq!(handle.state().await, ConnectionState::Connected);
    assert_eq!(connector.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_send_requires_open_connection() {
    let (connector, _peers) = ScriptedConnector::new();
    let (handle, _frames) = spawn_manager(connector);

    assert_eq!(
        handle.send("frame".into()).await,
        Err(ConnectionError::NotConnected)
    );
}

// =========================================================================
// Reconnecting
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_connect_failure_retries_after_ten_seconds() {
    let (connector, _peers) = ScriptedConnector::new();
    connector.plan(Plan::Refuse);
    connector.plan(Plan::Accept);
    let (handle, _frames) = spawn_manager(connector.clone());

    handle.connect().await.unwrap();
    settle().await;

    let status = handle.status().await.unwrap();
    assert_eq!(status.state, ConnectionState::Disconnected);
    assert!(status.last_error.as_deref().unwrap().contains("refused"));
    assert!(status.reconnect_in.unwrap() <= Duration::from_secs(10));

    advance(Duration::from_secs(9)).await;
    assert_eq!(connector.attempts(), 1, "no retry before the delay");

    advance(Duration::from_secs(1)).await;
    assert_eq!(connector.attempts(), 2);
    let status = handle.status().await.unwrap();
    assert_eq!(status.state, ConnectionState::Connected);
    assert_eq!(status.last_error, None);
    assert!(!status.reconnect_pending());
}

#[tokio::test(start_paused = true)]
async fn test_peer_close_reconnects_after_five_seconds() {
    let (connector, mut peers) = ScriptedConnector::new();
    connector.plan(Plan::Accept);
    connector.plan(Plan::Accept);
    let (handle, _frames) = spawn_manager(connector.clone());

    handle.connect().await.unwrap();
    settle().await;
    let first = peers.recv().await.unwrap();
    first.close();
    settle().await;

    let status = handle.status().await.unwrap();
    assert_eq!(status.state, ConnectionState::Disconnected);
    assert!(status.reconnect_in.unwrap() <= Duration::from_secs(5));
    assert_eq!(status.reconnect_reason, Some(ReconnectReason::Closed));
    assert_eq!(
        handle.send("frame".into()).await,
        Err(ConnectionError::NotConnected)
    );

    advance(Duration::from_secs(5)).await;
    assert_eq!(connector.attempts(), 2);
    assert_eq!(handle.state().await, ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_transport_error_reconnects_exactly_once() {
    let (connector, mut peers) = ScriptedConnector::new();
    connector.plan(Plan::Accept);
    connector.plan(Plan::Accept);
    let (handle, _frames) = spawn_manager(connector.clone());

    handle.connect().await.unwrap();
    settle().await;
    let first = peers.recv().await.unwrap();
    first.fail();
    settle().await;

    let status = handle.status().await.unwrap();
    assert_eq!(status.state, ConnectionState::Disconnected);
    assert!(status.last_error.as_deref().unwrap().contains("reset"));
    assert_eq!(status.reconnect.total_armed, 1);

    // A late close from the failed connection changes nothing.
    first.close();
    settle().await;
    assert_eq!(handle.status().await.unwrap().reconnect.total_armed, 1);

    advance(Duration::from_secs(10)).await;
    assert_eq!(connector.attempts(), 2);
    assert_eq!(handle.state().await, ConnectionState::Connected);

    advance(Duration::from_secs(60)).await;
    assert_eq!(connector.attempts(), 2, "no further attempts once open");
}

#[tokio::test(start_paused = true)]
async fn test_huge_configured_delay_keeps_manager_running() {
    let config = LinkConfig::from_value(serde_json::json!({
        "Reconnect": { "ConnectFailureDelaySecs": u64::MAX }
    }))
    .unwrap();
    let (connector, _peers) = ScriptedConnector::new();
    connector.plan(Plan::Refuse);
    let (handle, _frames) =
        spawn_manager_with(connector.clone(), config.reconnect.to_config());

    handle.connect().await.unwrap();
    settle().await;

    let status = handle.status().await.expect("manager should still be running");
    assert_eq!(status.state, ConnectionState::Disconnected);
    assert_eq!(status.reconnect_reason, Some(ReconnectReason::ConnectFailed));
    assert!(status.reconnect_in.unwrap() <= ReconnectConfig::MAX_DELAY * 2);
}

#[tokio::test(start_paused = true)]
async fn test_panicking_handler_keeps_connection_up() {
    let (connector, mut peers) = ScriptedConnector::new();
    connector.plan(Plan::Accept);
    let (handle, frames) = spawn_manager(connector.clone());

    handle.connect().await.unwrap();
    settle().await;
    let peer = peers.recv().await.unwrap();

    peer.push("panic");
    peer.push("after");
    settle().await;

    assert_eq!(*frames.lock().unwrap(), vec!["after".to_string()]);
    assert_eq!(handle.state().await, ConnectionState::Connected);
    assert_eq!(connector.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_frames_from_replaced_connection_are_dropped() {
    let (connector, mut peers) = ScriptedConnector::new();
    connector.plan(Plan::Accept);
    connector.plan(Plan::Accept);
    let (handle, frames) = spawn_manager(connector.clone());

    handle.connect().await.unwrap();
    settle().await;
    let first = peers.recv().await.unwrap();
    first.close();
    advance(Duration::from_secs(5)).await;
    let second = peers.recv().await.unwrap();

    first.push("stale");
    second.push("fresh");
    settle().await;

    assert_eq!(*frames.lock().unwrap(), vec!["fresh".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_explicit_connect_replaces_pending_retry() {
    let (connector, _peers) = ScriptedConnector::new();
    connector.plan(Plan::Refuse);
    connector.plan(Plan::Accept);
    let (handle, _frames) = spawn_manager(connector.clone());

    handle.connect().await.unwrap();
    settle().await;
    assert!(handle.status().await.unwrap().reconnect_pending());

    handle.connect().await.unwrap();
    settle().await;
    assert_eq!(handle.state().await, ConnectionState::Connected);
    assert!(!handle.status().await.unwrap().reconnect_pending());

    advance(Duration::from_secs(30)).await;
    assert_eq!(connector.attempts(), 2);
}

// =========================================================================
// Shutdown
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_pending_reconnect() {
    let (connector, _peers) = ScriptedConnector::new();
    connector.plan(Plan::Refuse);
    let (handle, _frames) = spawn_manager(connector.clone());

    handle.connect().await.unwrap();
    settle().await;
    assert!(handle.status().await.unwrap().reconnect_pending());

    handle.shutdown().await.unwrap();
    let status = handle.status().await.unwrap();
    assert_eq!(status.state, ConnectionState::ShuttingDown);
    assert!(!status.reconnect_pending());

    advance(Duration::from_secs(60)).await;
    handle.connect().await.unwrap();
    settle().await;
    assert_eq!(connector.attempts(), 1);
    assert_eq!(handle.state().await, ConnectionState::ShuttingDown);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_closes_live_connection() {
    let (connector, mut peers) = ScriptedConnector::new();
    connector.plan(Plan::Accept);
    let (handle, frames) = spawn_manager(connector.clone());

    handle.connect().await.unwrap();
    settle().await;
    let peer = peers.recv().await.unwrap();

    handle.shutdown().await.unwrap();
    handle.shutdown().await.unwrap();
    settle().await;

    assert!(peer.closed_by_client());
    peer.push("late");
    peer.close();
    settle().await;

    assert!(frames.lock().unwrap().is_empty());
    let status = handle.status().await.unwrap();
    assert_eq!(status.state, ConnectionState::ShuttingDown);
    assert!(!status.reconnect_pending());
    assert_eq!(
        handle.send("frame".into()).await,
        Err(ConnectionError::NotConnected)
    );
}

#[tokio::test(start_paused = true)]
async fn test_connection_opened_after_shutdown_is_closed() {
    let (connector, mut peers) = ScriptedConnector::new();
    connector.plan(Plan::AcceptAfter(Duration::from_secs(1)));
    let (handle, _frames) = spawn_manager(connector.clone());

    handle.connect().await.unwrap();
    settle().await;
    handle.shutdown().await.unwrap();

    advance(Duration::from_secs(1)).await;
    let peer = peers.recv().await.unwrap();
    settle().await;

    assert!(peer.closed_by_client());
    assert_eq!(handle.state().await, ConnectionState::ShuttingDown);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_every_handle_closes_connection() {
    let (connector, mut peers) = ScriptedConnector::new();
    connector.plan(Plan::Accept);
    let (handle, _frames) = spawn_manager(connector.clone());

    handle.connect().await.unwrap();
    settle().await;
    let peer = peers.recv().await.unwrap();

    drop(handle);
    settle().await;

    assert!(peer.closed_by_client());
}

// =========================================================================
// Verify requests over the connection
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_verify_request_sends_frame_when_connected() {
    let (connector, mut peers) = ScriptedConnector::new();
    connector.plan(Plan::Accept);
    let (handle, _frames) = spawn_manager(connector);

    handle.connect().await.unwrap();
    settle().await;
    let mut peer = peers.recv().await.unwrap();

    let outcome = handle.request(&SteamId::new("76561198000000001")).await;

    assert!(matches!(outcome, Ok(RequestOutcome::Pending)));
    assert_eq!(
        peer.next_frame().await.as_deref(),
        Some(r#"{"action":"verify","steamId":"76561198000000001"}"#)
    );
}

#[tokio::test(start_paused = true)]
async fn test_verify_request_when_disconnected_sends_nothing() {
    let (connector, _peers) = ScriptedConnector::new();
    connector.plan(Plan::Refuse);
    let (handle, _frames) = spawn_manager(connector);

    handle.connect().await.unwrap();
    settle().await;

    let outcome = handle.request(&SteamId::new("7656")).await;

    assert!(matches!(
        outcome,
        Err(LinkError::Connection(ConnectionError::NotConnected))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_full_outbound_queue_rejects_frames() {
    let (connector, _peers) = ScriptedConnector::new();
    connector.plan(Plan::AcceptStalled);
    let (handle, _frames) = spawn_manager(connector);

    handle.connect().await.unwrap();
    settle().await;

    // The connection task takes one frame and hangs writing it; the rest
    // queue up behind it until the queue is full.
    let mut accepted = 0;
    loop {
        match handle.send(format!("frame-{accepted}")).await {
            Ok(true) => accepted += 1,
            Ok(false) => break,
            Err(e) => panic!("unexpected send error: {e}"),
        }
        settle().await;
        assert!(accepted <= 1000, "queue never filled");
    }
    assert!(accepted > 0);
    assert_eq!(handle.state().await, ConnectionState::Connected);

    let outcome = handle.request(&SteamId::new("7656")).await;
    assert!(matches!(
        outcome,
        Err(LinkError::Connection(ConnectionError::Rejected))
    ));

    let store = Arc::new(MemoryPermissionStore::new());
    let directory = Arc::new(MemoryPlayerDirectory::new());
    let processor = VerificationProcessor::new(
        store.clone(),
        directory.clone(),
        "discord",
        VerificationMessages::default(),
    );
    processor.ensure_group().unwrap();
    let commands =
        Commands::new(handle.clone(), Arc::new(processor), MessagesConfig::default());
    let player = directory.connect("7656", "rusty");

    let outcome = commands.verify(&player).await;

    assert!(matches!(
        outcome,
        VerifyCommandOutcome::Unreachable(LinkError::Connection(
            ConnectionError::Rejected
        ))
    ));
    assert_eq!(
        player.replies(),
        vec![MessagesConfig::default().connection_error]
    );
    assert_eq!(store.add_count(), 0);
}
