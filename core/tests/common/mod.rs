//! In-memory chat server for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use chatsync_core::config::Config;
use chatsync_core::error::{ChatError, Result};
use chatsync_core::models::UserId;
use chatsync_core::net::{ConnectionManager, ConnectionStatus, Connector, Transport};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;

pub const WAIT: Duration = Duration::from_secs(2);

pub fn test_config() -> Config {
    Config {
        ws_host: Some("chat.test".to_string()),
        secure: false,
        ..Default::default()
    }
}

/// Ordered record of socket opens and closes, e.g. `open 1`, `close 1`
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    fn push(&self, entry: String) {
        self.0.lock().unwrap().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

pub struct MockConnector {
    accepted: mpsc::UnboundedSender<ServerSocket>,
    refuse: AtomicBool,
    log: EventLog,
}

impl MockConnector {
    pub fn refuse_connections(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(ChatError::Connection("refused".to_string()));
        }
        let user = url.rsplit("userId=").next().unwrap_or_default().to_string();

        let (to_client, incoming) = mpsc::unbounded_channel();
        let (outgoing, from_client) = mpsc::unbounded_channel();

        self.log.push(format!("open {}", user));
        let _ = self.accepted.send(ServerSocket {
            user: user.clone(),
            url: url.to_string(),
            to_client: Some(to_client),
            from_client,
        });

        Ok(Box::new(MockTransport {
            user,
            incoming,
            outgoing,
            log: self.log.clone(),
        }))
    }
}

struct MockTransport {
    user: String,
    incoming: mpsc::UnboundedReceiver<String>,
    outgoing: mpsc::UnboundedSender<String>,
    log: EventLog,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.outgoing
            .send(text)
            .map_err(|_| ChatError::Connection("server gone".to_string()))
    }

    async fn next_text(&mut self) -> Option<Result<String>> {
        self.incoming.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

impl Drop for MockTransport {
    fn drop(&mut self) {
        self.log.push(format!("close {}", self.user));
    }
}

/// Server side of one accepted socket
pub struct ServerSocket {
    pub user: String,
    pub url: String,
    to_client: Option<mpsc::UnboundedSender<String>>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl ServerSocket {
    pub fn push(&self, frame: Value) {
        self.push_raw(&frame.to_string());
    }

    pub fn push_raw(&self, text: &str) {
        if let Some(tx) = &self.to_client {
            let _ = tx.send(text.to_string());
        }
    }

    /// Next frame the client sent, parsed
    pub async fn next_frame(&mut self) -> Option<Value> {
        let text = timeout(WAIT, self.from_client.recv()).await.ok()??;
        Some(serde_json::from_str(&text).expect("client sent invalid JSON"))
    }

    /// Next frame of the given `type`, skipping others
    pub async fn expect_frame(&mut self, kind: &str) -> Value {
        loop {
            let frame = self
                .next_frame()
                .await
                .unwrap_or_else(|| panic!("no {} frame from the client", kind));
            if frame["type"] == kind {
                return frame;
            }
        }
    }

    /// Frames already sent, without waiting
    pub fn drain(&mut self) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(text) = self.from_client.try_recv() {
            frames.push(serde_json::from_str(&text).expect("client sent invalid JSON"));
        }
        frames
    }

    /// Close from the server side
    pub fn disconnect(&mut self) {
        self.to_client = None;
    }
}

pub struct MockServer {
    accepted: mpsc::UnboundedReceiver<ServerSocket>,
    pub log: EventLog,
}

impl MockServer {
    pub async fn accept(&mut self) -> ServerSocket {
        timeout(WAIT, self.accepted.recv())
            .await
            .expect("no connection attempt")
            .expect("connector dropped")
    }

    pub fn try_accept(&mut self) -> Option<ServerSocket> {
        self.accepted.try_recv().ok()
    }
}

pub fn mock_server() -> (Arc<MockConnector>, MockServer) {
    let (tx, rx) = mpsc::unbounded_channel();
    let log = EventLog::default();
    let connector = Arc::new(MockConnector {
        accepted: tx,
        refuse: AtomicBool::new(false),
        log: log.clone(),
    });
    (
        connector,
        MockServer {
            accepted: rx,
            log,
        },
    )
}

pub fn manager_with_server() -> (ConnectionManager, MockServer) {
    let (connector, server) = mock_server();
    (
        ConnectionManager::with_connector(test_config(), connector),
        server,
    )
}

/// Sign `manager` in as `user` and return the accepted socket once open
pub async fn connect_as(
    manager: &ConnectionManager,
    server: &mut MockServer,
    user: i64,
) -> ServerSocket {
    manager.set_identity(Some(UserId(user))).await.unwrap();
    let socket = server.accept().await;
    manager.wait_until_connected(WAIT).await.unwrap();
    socket
}

pub async fn wait_for_status(manager: &ConnectionManager, status: ConnectionStatus) {
    let mut state = manager.watch_state();
    timeout(WAIT, state.wait_for(|s| s.status == status))
        .await
        .unwrap_or_else(|_| panic!("status never became {:?}", status))
        .unwrap();
}

/// Wait until `rx` holds a value matching `pred`
pub async fn wait_until<T, F>(rx: &mut watch::Receiver<T>, pred: F)
where
    F: FnMut(&T) -> bool,
{
    timeout(WAIT, rx.wait_for(pred))
        .await
        .expect("condition not reached")
        .expect("sender dropped");
}

pub fn envelope(kind: &str, payload: Value) -> Value {
    json!({ "type": kind, "payload": payload })
}

pub fn user_json(id: i64, first: &str, last: &str) -> Value {
    json!({
        "id": id,
        "firstName": first,
        "lastName": last,
        "countryCode": "+1",
        "contactNo": format!("55500{:02}", id),
        "status": "ONLINE"
    })
}

pub fn message_json(id: i64, from: i64, to: i64, text: &str) -> Value {
    json!({
        "id": id,
        "message": text,
        "from": user_json(from, "From", "User"),
        "to": user_json(to, "To", "User"),
        "createdAt": "2026-03-01T10:00:00",
        "status": "SENT"
    })
}

pub fn conversation_json(friend: i64, name: &str, last: &str, ts: &str, unread: u32) -> Value {
    json!({
        "friendId": friend,
        "friendName": name,
        "lastMessage": last,
        "lastTimeStamp": ts,
        "unreadCount": unread
    })
}
