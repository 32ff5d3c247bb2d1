//! Connection manager: owns the one outbound connection to the
//! verification service.
//!
//! The manager runs as an actor in its own Tokio task. Everything that can
//! change the connection's state reaches it as a message on one of two
//! channels, and the actor handles them one at a time:
//!
//! - **commands** from [`ConnectionHandle`]s (connect, send, status,
//!   shutdown)
//! - **events** from the connection task it spawned (opened, connect
//!   failed, frame received, closed, errored)
//!
//! plus the deadline of its [`ReconnectScheduler`]. Because a single task
//! owns the state, two `connect()` calls can never overlap and a send can
//! never race a close.
//!
//! ```text
//!                    connect()                 opened
//! Disconnected ────────────────→ Connecting ─────────────→ Connected
//!      ↑                             │                        │
//!      │      connect failed (10 s)  │    closed (5 s) /      │
//!      └─────────────────────────────┴──── errored (10 s) ────┘
//!
//! any state ──shutdown()──→ ShuttingDown (terminal)
//! ```
//!
//! Every connection attempt gets a generation number. Events carry the
//! generation of the connection that produced them; the actor drops any
//! event whose generation is not the current one, so a late callback from
//! a replaced connection is inert. Once shut down, every event is inert.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use discord_link_reconnect::{
    ReconnectConfig, ReconnectFire, ReconnectMetrics, ReconnectReason,
    ReconnectScheduler,
};
use discord_link_transport::{Connection, Connector};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, trace, warn};

use crate::ConnectionError;

/// The logical name of the plugin's single connection.
pub const CONNECTION_NAME: &str = "discord-link";

/// Command channel size for the manager actor.
const COMMAND_CHANNEL_SIZE: usize = 64;

/// Frames queued for the socket before `send` starts reporting `false`.
const OUTBOUND_CHANNEL_SIZE: usize = 64;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Lifecycle state of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection and no attempt in flight. Initial state.
    Disconnected,
    /// A connect attempt is in flight.
    Connecting,
    /// The connection is open and frames can be sent.
    Connected,
    /// The plugin is unloading. Terminal.
    ShuttingDown,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::ShuttingDown => write!(f, "ShuttingDown"),
        }
    }
}

/// A snapshot of the manager, for status commands and tests.
#[derive(Debug, Clone)]
pub struct ConnectionStatus {
    /// Always [`CONNECTION_NAME`].
    pub name: &'static str,
    /// The target URL.
    pub url: String,
    /// Current state.
    pub state: ConnectionState,
    /// The most recent connect or transport failure, cleared on open.
    pub last_error: Option<String>,
    /// Time until the pending reconnect fires, if one is armed.
    pub reconnect_in: Option<Duration>,
    /// Why the pending reconnect was armed.
    pub reconnect_reason: Option<ReconnectReason>,
    /// Connect attempts started since the manager was spawned.
    pub connect_attempts: u64,
    /// Reconnect scheduler counters.
    pub reconnect: ReconnectMetrics,
}

impl ConnectionStatus {
    /// Whether a reconnect is armed.
    pub fn reconnect_pending(&self) -> bool {
        self.reconnect_in.is_some()
    }
}

/// Receives every inbound frame from the live connection.
///
/// Called on the manager's task, in the order frames arrived. It must not
/// block for long, and it has nowhere to return an error to: failures are
/// the handler's to log. A panic is caught and logged by the manager; the
/// frame is dropped and the connection stays up.
pub trait InboundHandler: Send + Sync + 'static {
    /// Handles one raw inbound frame.
    fn handle_frame(&self, data: &[u8]);
}

impl<F> InboundHandler for F
where
    F: Fn(&[u8]) + Send + Sync + 'static,
{
    fn handle_frame(&self, data: &[u8]) {
        self(data)
    }
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Commands sent to the actor by handles.
enum ManagerCommand {
    Connect,
    Send {
        frame: String,
        reply: oneshot::Sender<Result<bool, ConnectionError>>,
    },
    Status {
        reply: oneshot::Sender<ConnectionStatus>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Events sent to the actor by the connection task.
#[derive(Debug)]
enum TransportEvent {
    Opened {
        generation: u64,
        outbound: mpsc::Sender<Outbound>,
    },
    ConnectFailed {
        generation: u64,
        error: String,
    },
    Message {
        generation: u64,
        data: Vec<u8>,
    },
    Closed {
        generation: u64,
    },
    Errored {
        generation: u64,
        error: String,
    },
}

/// What the actor asks the connection task to write.
#[derive(Debug)]
enum Outbound {
    Frame(String),
    Close,
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Handle to a running connection manager.
///
/// Cheap to clone. When the last handle is dropped the actor shuts the
/// connection down and exits.
#[derive(Clone)]
pub struct ConnectionHandle {
    sender: mpsc::Sender<ManagerCommand>,
}

impl ConnectionHandle {
    /// Asks the manager to connect. Returns once the request is queued;
    /// the attempt itself runs in the background.
    ///
    /// A no-op if an attempt is already in flight, the connection is
    /// already open, or the manager is shutting down.
    pub async fn connect(&self) -> Result<(), ConnectionError> {
        self.sender
            .send(ManagerCommand::Connect)
            .await
            .map_err(|_| ConnectionError::Unavailable)
    }

    /// Queues a text frame on the open connection.
    ///
    /// Returns `Ok(true)` if the frame was accepted for sending (not a
    /// delivery confirmation) and `Ok(false)` if the outbound queue
    /// refused it.
    ///
    /// # Errors
    /// [`ConnectionError::NotConnected`] unless the state is `Connected`.
    pub async fn send(&self, frame: String) -> Result<bool, ConnectionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(ManagerCommand::Send {
                frame,
                reply: reply_tx,
            })
            .await
            .map_err(|_| ConnectionError::Unavailable)?;
        reply_rx.await.map_err(|_| ConnectionError::Unavailable)?
    }

    /// Returns a snapshot of the manager.
    pub async fn status(&self) -> Result<ConnectionStatus, ConnectionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(ManagerCommand::Status { reply: reply_tx })
            .await
            .map_err(|_| ConnectionError::Unavailable)?;
        reply_rx.await.map_err(|_| ConnectionError::Unavailable)
    }

    /// Returns the current state. A manager that has exited reads as
    /// `ShuttingDown`.
    pub async fn state(&self) -> ConnectionState {
        self.status()
            .await
            .map(|s| s.state)
            .unwrap_or(ConnectionState::ShuttingDown)
    }

    /// Shuts the manager down: cancels any pending reconnect, asks the
    /// live connection (if any) to close, and makes every later callback
    /// inert. Does not wait for the close to complete.
    ///
    /// Idempotent.
    pub async fn shutdown(&self) -> Result<(), ConnectionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(ManagerCommand::Shutdown { reply: reply_tx })
            .await
            .map_err(|_| ConnectionError::Unavailable)?;
        reply_rx.await.map_err(|_| ConnectionError::Unavailable)
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

/// Entry point for starting a connection manager.
pub struct ConnectionManager;

impl ConnectionManager {
    /// Spawns the manager actor for `url` and returns a handle to it.
    ///
    /// The manager starts `Disconnected`; call
    /// [`ConnectionHandle::connect`] to open the connection.
    pub fn spawn<C, H>(
        url: impl Into<String>,
        connector: C,
        handler: H,
        reconnect: ReconnectConfig,
    ) -> ConnectionHandle
    where
        C: Connector,
        H: InboundHandler,
    {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let actor = ManagerActor {
            url: url.into(),
            connector: Arc::new(connector),
            handler,
            state: ConnectionState::Disconnected,
            last_error: None,
            generation: 0,
            live: None,
            scheduler: ReconnectScheduler::new(reconnect),
            commands: cmd_rx,
            events: event_rx,
            event_tx,
        };

        tokio::spawn(actor.run());

        ConnectionHandle { sender: cmd_tx }
    }
}

/// The open connection, as seen by the actor.
struct Live {
    generation: u64,
    outbound: mpsc::Sender<Outbound>,
}

/// One turn of the actor loop.
enum Step {
    Command(ManagerCommand),
    Event(TransportEvent),
    Reconnect(ReconnectFire),
    Stop,
}

/// The internal actor state. Runs inside a Tokio task.
struct ManagerActor<C: Connector, H: InboundHandler> {
    url: String,
    connector: Arc<C>,
    handler: H,
    state: ConnectionState,
    last_error: Option<String>,
    /// Generation of the newest connect attempt (0 before the first).
    generation: u64,
    live: Option<Live>,
    scheduler: ReconnectScheduler,
    commands: mpsc::Receiver<ManagerCommand>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    /// Cloned into each connection task. Holding it here keeps `events`
    /// open for the actor's lifetime.
    event_tx: mpsc::UnboundedSender<TransportEvent>,
}

impl<C: Connector, H: InboundHandler> ManagerActor<C, H> {
    /// Runs the actor loop until every handle is dropped.
    async fn run(mut self) {
        info!(name = CONNECTION_NAME, url = %self.url, "connection manager started");

        loop {
            let step = tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => Step::Command(cmd),
                    None => Step::Stop,
                },
                Some(event) = self.events.recv() => Step::Event(event),
                fire = self.scheduler.wait_for_fire() => Step::Reconnect(fire),
            };

            match step {
                Step::Command(cmd) => self.handle_command(cmd),
                Step::Event(event) => self.handle_event(event),
                Step::Reconnect(fire) => self.handle_reconnect(fire),
                Step::Stop => break,
            }
        }

        self.begin_shutdown();
        info!(name = CONNECTION_NAME, "connection manager stopped");
    }

    fn handle_command(&mut self, cmd: ManagerCommand) {
        match cmd {
            ManagerCommand::Connect => self.connect(),
            ManagerCommand::Send { frame, reply } => {
                let _ = reply.send(self.send(frame));
            }
            ManagerCommand::Status { reply } => {
                let _ = reply.send(self.status());
            }
            ManagerCommand::Shutdown { reply } => {
                self.begin_shutdown();
                let _ = reply.send(());
            }
        }
    }

    fn connect(&mut self) {
        match self.state {
            ConnectionState::ShuttingDown => {
                trace!("connect ignored, shutting down");
                return;
            }
            ConnectionState::Connecting => {
                trace!("connect ignored, attempt already in flight");
                return;
            }
            ConnectionState::Connected => {
                trace!("connect ignored, already connected");
                return;
            }
            ConnectionState::Disconnected => {}
        }

        // An explicit connect supersedes any armed retry.
        self.scheduler.cancel();

        self.generation += 1;
        self.state = ConnectionState::Connecting;
        debug!(url = %self.url, generation = self.generation, "connecting");

        tokio::spawn(run_connection(
            Arc::clone(&self.connector),
            self.url.clone(),
            self.generation,
            self.event_tx.clone(),
        ));
    }

    fn send(&mut self, frame: String) -> Result<bool, ConnectionError> {
        let live = match (&self.state, &self.live) {
            (ConnectionState::Connected, Some(live)) => live,
            _ => return Err(ConnectionError::NotConnected),
        };

        match live.outbound.try_send(Outbound::Frame(frame)) {
            Ok(()) => Ok(true),
            Err(e) => {
                warn!(error = %e, "outbound frame not accepted");
                Ok(false)
            }
        }
    }

    fn handle_event(&mut self, event: TransportEvent) {
        if self.state == ConnectionState::ShuttingDown {
            trace!(?event, "event ignored, shutting down");
            return;
        }

        match event {
            TransportEvent::Opened {
                generation,
                outbound,
            } => {
                if generation != self.generation
                    || self.state != ConnectionState::Connecting
                {
                    // Dropping `outbound` makes the stale task close.
                    debug!(generation, "stale connection opened, closing");
                    return;
                }
                self.state = ConnectionState::Connected;
                self.last_error = None;
                self.live = Some(Live {
                    generation,
                    outbound,
                });
                info!(
                    name = CONNECTION_NAME,
                    url = %self.url,
                    generation,
                    "connected to verification service"
                );
            }
            TransportEvent::ConnectFailed { generation, error } => {
                if generation != self.generation
                    || self.state != ConnectionState::Connecting
                {
                    return;
                }
                warn!(url = %self.url, %error, "connect to verification service failed");
                self.lose_connection(error, ReconnectReason::ConnectFailed);
            }
            TransportEvent::Message { generation, data } => {
                if !self.is_live(generation) {
                    trace!(generation, "frame from stale connection dropped");
                    return;
                }
                trace!(len = data.len(), "frame received");
                let handler = &self.handler;
                let handled =
                    panic::catch_unwind(AssertUnwindSafe(|| handler.handle_frame(&data)));
                if handled.is_err() {
                    error!(generation, len = data.len(), "inbound handler panicked, frame dropped");
                }
            }
            TransportEvent::Closed { generation } => {
                if !self.is_live(generation) {
                    return;
                }
                warn!(url = %self.url, "verification service closed the connection");
                self.lose_connection(
                    "connection closed by peer".to_string(),
                    ReconnectReason::Closed,
                );
            }
            TransportEvent::Errored { generation, error } => {
                if !self.is_live(generation) {
                    return;
                }
                warn!(url = %self.url, %error, "verification connection failed");
                self.lose_connection(error, ReconnectReason::Errored);
            }
        }
    }

    fn handle_reconnect(&mut self, fire: ReconnectFire) {
        if self.state == ConnectionState::ShuttingDown {
            return;
        }
        info!(
            reason = %fire.reason,
            waited_ms = fire.delay.as_millis() as u64,
            "reconnecting to verification service"
        );
        self.connect();
    }

    /// Moves to `Disconnected`, records `error`, and arms a reconnect.
    fn lose_connection(&mut self, error: String, reason: ReconnectReason) {
        self.state = ConnectionState::Disconnected;
        self.live = None;
        self.last_error = Some(error);
        if let Some(delay) = self.scheduler.arm(reason) {
            debug!(%reason, delay_ms = delay.as_millis() as u64, "reconnect armed");
        }
    }

    fn is_live(&self, generation: u64) -> bool {
        self.state == ConnectionState::Connected
            && self
                .live
                .as_ref()
                .is_some_and(|live| live.generation == generation)
    }

    /// Sets `ShuttingDown` first, then tears down. Idempotent.
    fn begin_shutdown(&mut self) {
        if self.state == ConnectionState::ShuttingDown {
            return;
        }
        let was = self.state;
        self.state = ConnectionState::ShuttingDown;
        self.scheduler.close();

        if let Some(live) = self.live.take() {
            // Best effort; the connection task finishes the close.
            if live.outbound.try_send(Outbound::Close).is_err() {
                debug!("close not queued; dropping the outbound channel instead");
            }
        }
        info!(name = CONNECTION_NAME, previous = %was, "connection manager shutting down");
    }

    fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            name: CONNECTION_NAME,
            url: self.url.clone(),
            state: self.state,
            last_error: self.last_error.clone(),
            reconnect_in: self.scheduler.remaining(),
            reconnect_reason: self.scheduler.pending_reason(),
            connect_attempts: self.generation,
            reconnect: self.scheduler.metrics().clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Connection task
// ---------------------------------------------------------------------------

/// Dials `url`, then pumps frames both ways until the connection ends.
///
/// Reports back to the actor only through `events`. Every event carries
/// `generation`, so whatever this task says after the actor has moved on
/// is ignored.
async fn run_connection<C: Connector>(
    connector: Arc<C>,
    url: String,
    generation: u64,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    let conn = match connector.connect(&url).await {
        Ok(conn) => conn,
        Err(e) => {
            let _ = events.send(TransportEvent::ConnectFailed {
                generation,
                error: e.to_string(),
            });
            return;
        }
    };

    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CHANNEL_SIZE);
    if events
        .send(TransportEvent::Opened {
            generation,
            outbound: outbound_tx,
        })
        .is_err()
    {
        // The actor is gone.
        let _ = conn.close().await;
        return;
    }

    pump(conn, generation, outbound_rx, events).await;
}

async fn pump<K: Connection>(
    conn: K,
    generation: u64,
    mut outbound: mpsc::Receiver<Outbound>,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    let conn_id = conn.id();
    loop {
        tokio::select! {
            msg = outbound.recv() => match msg {
                Some(Outbound::Frame(text)) => {
                    if let Err(e) = conn.send_text(&text).await {
                        let _ = events.send(TransportEvent::Errored {
                            generation,
                            error: e.to_string(),
                        });
                        return;
                    }
                }
                Some(Outbound::Close) | None => {
                    if let Err(e) = conn.close().await {
                        debug!(%conn_id, error = %e, "close failed");
                    }
                    debug!(%conn_id, "connection closed locally");
                    return;
                }
            },
            incoming = conn.recv() => match incoming {
                Ok(Some(data)) => {
                    let _ = events.send(TransportEvent::Message { generation, data });
                }
                Ok(None) => {
                    let _ = events.send(TransportEvent::Closed { generation });
                    return;
                }
                Err(e) => {
                    let _ = events.send(TransportEvent::Errored {
                        generation,
                        error: e.to_string(),
                    });
                    return;
                }
            },
        }
    }
}
