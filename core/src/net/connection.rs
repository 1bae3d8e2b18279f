/// Connection manager: one socket per signed-in user
///
/// The manager owns at most one live connection. Changing the identity
/// closes the previous socket (and waits for its task to finish) before a
/// new one is opened, so traffic for two users never overlaps. Observers
/// follow the lifecycle through a `watch` channel of [`ConnectionState`].
use crate::config::Config;
use crate::error::{ChatError, Result};
use crate::models::UserId;
use crate::net::protocol::{self, Inbound, InboundKind, Request};
use crate::net::transport::{Connector, Transport, WsConnector};
use crate::utils::event_bus::{EventBus, Handler, Subscription};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionStatus {
    /// No valid identity, no socket
    Idle,
    /// Identity valid, socket opening
    Connecting,
    /// Ready to send and receive
    Open,
    /// Closed by error, by the server or explicitly
    Closed,
}

/// Snapshot of the manager published to observers
#[derive(Clone)]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    pub user_id: Option<UserId>,
    pub connection: Option<Arc<ConnectionHandle>>,
}

impl ConnectionState {
    fn idle() -> Self {
        Self {
            status: ConnectionStatus::Idle,
            user_id: None,
            connection: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Open
    }

    /// The connection, only while it is open
    pub fn open_connection(&self) -> Option<&Arc<ConnectionHandle>> {
        if self.is_connected() {
            self.connection.as_ref()
        } else {
            None
        }
    }
}

impl fmt::Debug for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionState")
            .field("status", &self.status)
            .field("user_id", &self.user_id)
            .field("connection", &self.connection.as_ref().map(|c| c.id()))
            .finish()
    }
}

enum Command {
    Send(String),
    Close,
}

/// One socket opened for one user. Shared read-only by every subscriber.
pub struct ConnectionHandle {
    id: Uuid,
    user_id: UserId,
    bus: EventBus,
    outbound: mpsc::UnboundedSender<Command>,
}

impl ConnectionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Encode `request` with this connection's user id and queue it.
    /// Returns false when it could not be queued; never fails loudly.
    pub fn send(&self, request: &Request) -> bool {
        let text = match protocol::encode(request, self.user_id) {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to encode {}: {}", request, e);
                return false;
            }
        };
        self.outbound.send(Command::Send(text)).is_ok()
    }

    fn deliver(&self, text: &str) {
        match protocol::decode(text) {
            Ok(Inbound::Unrecognized(kind)) => {
                debug!("Ignoring envelope of unrecognized type {}", kind);
            }
            Ok(inbound) => {
                let delivered = self.bus.dispatch(&inbound);
                debug!("{} delivered to {} listener(s)", inbound, delivered);
            }
            Err(e) => warn!("Dropping malformed envelope: {}", e),
        }
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .finish()
    }
}

struct ActiveConnection {
    handle: Arc<ConnectionHandle>,
    task: JoinHandle<()>,
}

impl ActiveConnection {
    /// Ask the socket task to close and wait until the socket is released
    async fn close(mut self) {
        let _ = self.handle.outbound.send(Command::Close);
        match timeout(CLOSE_TIMEOUT, &mut self.task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Connection task for user {} failed: {}", self.handle.user_id, e),
            Err(_) => {
                warn!(
                    "Connection for user {} did not close within {:?}, aborting",
                    self.handle.user_id, CLOSE_TIMEOUT
                );
                self.task.abort();
                let _ = (&mut self.task).await;
            }
        }
    }
}

struct ManagerInner {
    config: Config,
    connector: Arc<dyn Connector>,
    state: Arc<watch::Sender<ConnectionState>>,
    active: Mutex<Option<ActiveConnection>>,
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        if let Some(active) = self.active.get_mut().take() {
            active.task.abort();
        }
    }
}

/// Owner of the shared connection
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

impl ConnectionManager {
    /// Manager using the WebSocket transport
    pub fn new(config: Config) -> Self {
        Self::with_connector(config, Arc::new(WsConnector))
    }

    pub fn with_connector(config: Config, connector: Arc<dyn Connector>) -> Self {
        let (state, _) = watch::channel(ConnectionState::idle());
        Self {
            inner: Arc::new(ManagerInner {
                config,
                connector,
                state: Arc::new(state),
                active: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state.borrow().clone()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.inner.state.borrow().status
    }

    pub fn is_connected(&self) -> bool {
        self.inner.state.borrow().is_connected()
    }

    /// Identity the current connection was opened with
    pub fn user_id(&self) -> Option<UserId> {
        self.inner.state.borrow().user_id
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Send on the open connection. Silently ignored (returns false) while not connected.
    pub fn send(&self, request: &Request) -> bool {
        let state = self.inner.state.borrow();
        match state.open_connection() {
            Some(conn) => conn.send(request),
            None => {
                debug!("Not connected, dropping {}", request);
                false
            }
        }
    }

    /// Listen on the open connection; `None` while not connected
    pub fn subscribe(&self, kinds: &[InboundKind], handler: Handler) -> Option<Subscription> {
        let state = self.inner.state.borrow();
        state
            .open_connection()
            .map(|conn| conn.bus().subscribe(kinds, handler))
    }

    /// Switch the connection to `user_id`.
    ///
    /// Any previous connection is fully closed first. An absent or
    /// non-positive id leaves the manager idle. A missing server host is
    /// reported as `ChatError::Config`.
    pub async fn set_identity(&self, user_id: Option<UserId>) -> Result<()> {
        let user_id = user_id.and_then(UserId::valid);
        let mut active = self.inner.active.lock().await;

        if let (Some(current), Some(requested)) = (active.as_ref(), user_id) {
            if current.handle.user_id == requested && !current.task.is_finished() {
                debug!("Already connected for user {}", requested);
                return Ok(());
            }
        }

        if let Some(previous) = active.take() {
            info!("Closing connection for user {}", previous.handle.user_id);
            previous.close().await;
        }

        let Some(user_id) = user_id else {
            info!("No valid user id, not connecting");
            self.inner.state.send_replace(ConnectionState::idle());
            return Ok(());
        };

        let url = match self.inner.config.endpoint_url(user_id) {
            Ok(url) => url,
            Err(e) => {
                self.inner.state.send_replace(ConnectionState::idle());
                return Err(e);
            }
        };

        let (outbound, commands) = mpsc::unbounded_channel();
        let handle = Arc::new(ConnectionHandle {
            id: Uuid::new_v4(),
            user_id,
            bus: EventBus::new(),
            outbound,
        });

        self.inner.state.send_replace(ConnectionState {
            status: ConnectionStatus::Connecting,
            user_id: Some(user_id),
            connection: Some(handle.clone()),
        });

        let span = info_span!("connection", user_id = %user_id, id = %handle.id);
        let task = tokio::spawn(
            run_connection(
                handle.clone(),
                commands,
                self.inner.connector.clone(),
                url,
                self.inner.config.connect_timeout,
                self.inner.state.clone(),
            )
            .instrument(span),
        );

        *active = Some(ActiveConnection { handle, task });
        Ok(())
    }

    /// Close the connection and go idle (app exit / sign out)
    pub async fn shutdown(&self) {
        if let Err(e) = self.set_identity(None).await {
            error!("Error during shutdown: {}", e);
        }
    }

    /// Wait for the current connection attempt to open
    pub async fn wait_until_connected(&self, limit: Duration) -> Result<()> {
        let mut state = self.watch_state();
        let wait = async {
            loop {
                let status = state.borrow_and_update().status;
                match status {
                    ConnectionStatus::Open => return Ok(()),
                    ConnectionStatus::Idle => {
                        return Err(ChatError::Connection("no active identity".to_string()))
                    }
                    ConnectionStatus::Closed => {
                        return Err(ChatError::Connection("connection closed".to_string()))
                    }
                    ConnectionStatus::Connecting => {}
                }
                if state.changed().await.is_err() {
                    return Err(ChatError::Connection("connection manager dropped".to_string()));
                }
            }
        };

        timeout(limit, wait)
            .await
            .map_err(|_| ChatError::Timeout(format!("not connected after {:?}", limit)))?
    }

    /// Drive the connection from an identity source until it goes away
    pub fn follow(&self, mut identity: watch::Receiver<Option<UserId>>) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            loop {
                let user_id = *identity.borrow_and_update();
                if let Err(e) = manager.set_identity(user_id).await {
                    error!("Could not connect for user {:?}: {}", user_id, e);
                }
                if identity.changed().await.is_err() {
                    debug!("Identity source dropped, no longer following");
                    break;
                }
            }
        })
    }
}

/// Update the published status if `id` is still the current connection
fn mark(state: &watch::Sender<ConnectionState>, id: Uuid, status: ConnectionStatus) {
    state.send_if_modified(|s| {
        let ours = s.connection.as_ref().map(|c| c.id == id).unwrap_or(false);
        if ours && s.status != status {
            s.status = status;
            true
        } else {
            false
        }
    });
}

async fn wait_for_close(commands: &mut mpsc::UnboundedReceiver<Command>) {
    while let Some(command) = commands.recv().await {
        match command {
            Command::Close => return,
            Command::Send(_) => debug!("Socket not open yet, dropping outbound frame"),
        }
    }
}

/// Socket task: open, pump frames both ways, release on close or error
async fn run_connection(
    handle: Arc<ConnectionHandle>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    connector: Arc<dyn Connector>,
    url: String,
    connect_timeout: Duration,
    state: Arc<watch::Sender<ConnectionState>>,
) {
    info!("Connecting to {}", url);

    let mut transport: Box<dyn Transport> = tokio::select! {
        result = timeout(connect_timeout, connector.connect(&url)) => match result {
            Ok(Ok(transport)) => transport,
            Ok(Err(e)) => {
                warn!("Connection failed: {}", e);
                mark(&state, handle.id, ConnectionStatus::Closed);
                return;
            }
            Err(_) => {
                warn!("Connection timeout after {:?}", connect_timeout);
                mark(&state, handle.id, ConnectionStatus::Closed);
                return;
            }
        },
        _ = wait_for_close(&mut commands) => {
            debug!("Closed before the socket opened");
            mark(&state, handle.id, ConnectionStatus::Closed);
            return;
        }
    };

    info!("Connected");
    mark(&state, handle.id, ConnectionStatus::Open);

    loop {
        tokio::select! {
            frame = transport.next_text() => match frame {
                Some(Ok(text)) => handle.deliver(&text),
                Some(Err(e)) => {
                    warn!("Transport error: {}", e);
                    break;
                }
                None => {
                    info!("Server closed the connection");
                    break;
                }
            },
            command = commands.recv() => match command {
                Some(Command::Send(text)) => {
                    if let Err(e) = transport.send_text(text).await {
                        warn!("Send failed: {}", e);
                        break;
                    }
                }
                Some(Command::Close) | None => {
                    if let Err(e) = transport.close().await {
                        debug!("Close handshake failed: {}", e);
                    }
                    break;
                }
            },
        }
    }

    drop(transport);
    mark(&state, handle.id, ConnectionStatus::Closed);
    info!("Disconnected");
}
