//! WebSocket connection manager.
//!
//! Owns at most one live WebSocket per [`Channel`]. Each [`Connection`] is
//! driven by a background supervisor task that opens the socket, forwards
//! inbound JSON frames, writes outbound frames, and retries after unexpected
//! closures with a fixed delay (see [`ReconnectPolicy`]). Status changes are
//! published on a [`tokio::sync::watch`] channel.
//!
//! Sending is fire-and-forget and only possible while connected; nothing is
//! queued across reconnects.

mod supervisor;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use url::Url;
use uuid::Uuid;

use taskboard_proto::event::{EventError, SyncEvent};
use taskboard_proto::frame::Frame;
use taskboard_proto::task::ProjectId;

use crate::session::Session;

/// A WebSocket context: one project's task board or chat room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Task mutation events of a project.
    Tasks(ProjectId),
    /// Chat messages of a project.
    Chat(ProjectId),
}

impl Channel {
    /// Path below the WebSocket base URL.
    #[must_use]
    pub fn path(self) -> String {
        match self {
            Self::Tasks(project) => format!("/ws/projects/{project}/tasks/"),
            Self::Chat(project) => format!("/ws/chat/{project}/"),
        }
    }

    /// The project this channel belongs to.
    #[must_use]
    pub const fn project(self) -> ProjectId {
        match self {
            Self::Tasks(project) | Self::Chat(project) => project,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tasks(project) => write!(f, "tasks:{project}"),
            Self::Chat(project) => write!(f, "chat:{project}"),
        }
    }
}

/// Unique identifier of one [`Connection`], distinguishing successive
/// connections to the same channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    fn generate() -> Self {
        Self(Uuid::now_v7())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Retry behaviour after an unexpected closure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Retries before giving up. Reset on every successful open.
    pub max_attempts: u32,
    /// Fixed pause before each retry.
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(5),
        }
    }
}

/// Settings for [`ConnectionManager`].
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// WebSocket base URL (`ws://` or `wss://`).
    pub ws_url: String,
    /// Retry policy.
    pub reconnect: ReconnectPolicy,
    /// Timeout for one connect attempt.
    pub connect_timeout: Duration,
    /// Capacity of the inbound frame channel.
    pub channel_capacity: usize,
}

impl ConnectionConfig {
    /// Defaults for everything but the base URL.
    #[must_use]
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            reconnect: ReconnectPolicy::default(),
            connect_timeout: Duration::from_secs(10),
            channel_capacity: 256,
        }
    }
}

/// Lifecycle state of a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// First connect attempt in progress.
    Connecting,
    /// Socket open; sends are accepted.
    Connected,
    /// Waiting for or performing retry `attempt` of `max_attempts`.
    Reconnecting {
        /// 1-based retry number.
        attempt: u32,
        /// Retry budget.
        max_attempts: u32,
    },
    /// Gave up, or the server closed normally. Terminal.
    Disconnected,
    /// Closed locally. Terminal.
    Closed,
}

impl ConnectionStatus {
    /// `true` exactly while connected.
    #[must_use]
    pub const fn is_ready(self) -> bool {
        matches!(self, Self::Connected)
    }

    /// `true` once the connection will never become ready again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Disconnected | Self::Closed)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Reconnecting {
                attempt,
                max_attempts,
            } => write!(f, "reconnecting ({attempt}/{max_attempts})"),
            Self::Disconnected => write!(f, "disconnected"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Errors that can occur during connection operations.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// The socket is not open right now.
    #[error("connection not ready")]
    NotReady,

    /// The connection was closed and cannot be used again.
    #[error("connection closed")]
    Closed,

    /// The configured base URL is not a WebSocket URL.
    #[error("invalid WebSocket URL: {0}")]
    InvalidUrl(String),

    /// The outgoing event could not be encoded.
    #[error("failed to encode frame: {0}")]
    Encode(#[from] EventError),
}

/// Outbound half of the socket currently open, if any.
type Outbound = Arc<Mutex<Option<mpsc::UnboundedSender<Message>>>>;

struct Registration {
    id: ConnectionId,
    shutdown: Arc<watch::Sender<bool>>,
}

type Registry = Arc<Mutex<HashMap<Channel, Registration>>>;

/// Opens and tracks one WebSocket connection per [`Channel`].
pub struct ConnectionManager {
    config: ConnectionConfig,
    base: String,
    session: Session,
    registry: Registry,
}

impl ConnectionManager {
    /// Creates a manager for `session`.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::InvalidUrl`] if the base URL does not parse
    /// or is not `ws://`/`wss://`.
    pub fn new(config: ConnectionConfig, session: Session) -> Result<Self, ConnectionError> {
        let parsed = Url::parse(&config.ws_url)
            .map_err(|e| ConnectionError::InvalidUrl(format!("{}: {e}", config.ws_url)))?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(ConnectionError::InvalidUrl(format!(
                "{}: expected ws or wss",
                config.ws_url
            )));
        }
        let base = config.ws_url.trim_end_matches('/').to_string();
        Ok(Self {
            config,
            base,
            session,
            registry: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Full URL of `channel`.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::InvalidUrl`] if the joined URL does not parse.
    pub fn url_for(&self, channel: Channel) -> Result<Url, ConnectionError> {
        let joined = format!("{}{}", self.base, channel.path());
        Url::parse(&joined).map_err(|e| ConnectionError::InvalidUrl(format!("{joined}: {e}")))
    }

    /// Opens `channel`, closing any connection this manager already holds
    /// for it.
    ///
    /// Returns immediately with status [`ConnectionStatus::Connecting`]; the
    /// socket is opened by a background task. Must be called from within a
    /// Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::InvalidUrl`] if the channel URL is invalid.
    pub fn connect(&self, channel: Channel) -> Result<Connection, ConnectionError> {
        let url = self.url_for(channel)?;
        let id = ConnectionId::generate();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let shutdown = Arc::new(shutdown_tx);
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Connecting);
        let (inbound_tx, inbound_rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let outbound: Outbound = Arc::new(Mutex::new(None));

        let previous = self.registry.lock().insert(
            channel,
            Registration {
                id,
                shutdown: Arc::clone(&shutdown),
            },
        );
        if let Some(previous) = previous {
            tracing::info!(%channel, old = %previous.id, new = %id, "replacing open connection");
            previous.shutdown.send_replace(true);
        }

        tokio::spawn(supervisor::run(supervisor::Supervisor {
            channel,
            url,
            bearer: self.session.bearer(),
            policy: self.config.reconnect,
            connect_timeout: self.config.connect_timeout,
            status: status_tx,
            inbound: inbound_tx,
            outbound: Arc::clone(&outbound),
            shutdown: shutdown_rx,
        }));

        Ok(Connection {
            id,
            channel,
            status: status_rx,
            inbound: inbound_rx,
            outbound,
            shutdown,
            registry: Arc::clone(&self.registry),
        })
    }

    /// Whether this manager currently holds a connection for `channel`.
    #[must_use]
    pub fn is_registered(&self, channel: Channel) -> bool {
        self.registry.lock().contains_key(&channel)
    }

    /// The signed-in session this manager authenticates with.
    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }
}

/// One supervised WebSocket connection.
///
/// Dropping the connection closes it.
pub struct Connection {
    id: ConnectionId,
    channel: Channel,
    status: watch::Receiver<ConnectionStatus>,
    inbound: mpsc::Receiver<Frame>,
    outbound: Outbound,
    shutdown: Arc<watch::Sender<bool>>,
    registry: Registry,
}

impl Connection {
    /// This connection's identifier.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// The channel this connection serves.
    #[must_use]
    pub const fn channel(&self) -> Channel {
        self.channel
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// A receiver that observes every status change.
    #[must_use]
    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    /// `true` exactly while the socket is open.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.status().is_ready()
    }

    /// Queues `frame` for the writer.
    ///
    /// # Errors
    ///
    /// - [`ConnectionError::Closed`] after [`Connection::close`].
    /// - [`ConnectionError::NotReady`] while not connected.
    /// - [`ConnectionError::Encode`] if the frame cannot be serialized.
    pub fn send(&self, frame: &Frame) -> Result<(), ConnectionError> {
        if *self.shutdown.borrow() {
            return Err(ConnectionError::Closed);
        }
        let text = frame.encode()?;
        let guard = self.outbound.lock();
        let Some(writer) = guard.as_ref() else {
            return Err(ConnectionError::NotReady);
        };
        writer
            .send(Message::Text(text.into()))
            .map_err(|_| ConnectionError::NotReady)
    }

    /// Encodes `event` and queues it for the writer.
    ///
    /// # Errors
    ///
    /// See [`Connection::send`].
    pub fn send_event(&self, event: &SyncEvent) -> Result<(), ConnectionError> {
        self.send(&Frame::from_event(event)?)
    }

    /// Next inbound frame; `None` once the connection has ended for good.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.inbound.recv().await
    }

    /// Closes the connection. Idempotent.
    pub fn close(&self) {
        let already = self.shutdown.send_replace(true);
        let mut registry = self.registry.lock();
        if registry.get(&self.channel).is_some_and(|r| r.id == self.id) {
            registry.remove(&self.channel);
        }
        drop(registry);
        if !already {
            tracing::debug!(channel = %self.channel, id = %self.id, "connection closed locally");
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("channel", &self.channel)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}
