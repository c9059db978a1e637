//! Shared fixtures: an in-process mock coordinator and a recording store.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router as HttpRouter;
use axum::extract::State;
use axum::extract::ws::{Message as PeerMessage, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::router::Router;
use crate::store::{UserStore, UserStoreError};

pub const AGENT_PATH: &str = "/agent";

// =============================================================================
// MOCK COORDINATOR
// =============================================================================

/// Websocket server standing in for the coordinator. Every accepted agent
/// socket is handed to the test through [`MockCoordinator::accept`].
pub struct MockCoordinator {
    pub addr: SocketAddr,
    accepted: AsyncMutex<mpsc::UnboundedReceiver<WebSocket>>,
    server: JoinHandle<()>,
}

impl MockCoordinator {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock coordinator");
        Self::serve(listener)
    }

    /// Start on a specific address, e.g. one an agent is already retrying.
    pub async fn start_on(addr: SocketAddr) -> Self {
        let listener = TcpListener::bind(addr).await.expect("rebind mock coordinator");
        Self::serve(listener)
    }

    fn serve(listener: TcpListener) -> Self {
        let addr = listener.local_addr().expect("local addr");
        let (tx, rx) = mpsc::unbounded_channel::<WebSocket>();
        let app = HttpRouter::new().route(AGENT_PATH, get(upgrade)).with_state(tx);
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Self { addr, accepted: AsyncMutex::new(rx), server }
    }

    #[must_use]
    pub fn url(&self) -> String {
        format!("ws://{}{AGENT_PATH}", self.addr)
    }

    #[must_use]
    pub fn url_for(&self, path: &str) -> String {
        format!("ws://{}{path}", self.addr)
    }

    /// Next agent connection, failing the test after `wait`.
    pub async fn accept(&self, wait: Duration) -> WebSocket {
        timeout(wait, self.accepted.lock().await.recv())
            .await
            .expect("agent did not connect in time")
            .expect("mock coordinator stopped")
    }
}

impl Drop for MockCoordinator {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn upgrade(State(tx): State<mpsc::UnboundedSender<WebSocket>>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| async move {
        let _ = tx.send(socket);
    })
}

/// Send a text request and wait for the next text frame back.
pub async fn exchange(peer: &mut WebSocket, request: &str) -> String {
    peer.send(PeerMessage::Text(request.to_owned().into())).await.expect("send request");
    next_text(peer).await
}

/// Next text frame from the agent, skipping control frames.
pub async fn next_text(peer: &mut WebSocket) -> String {
    loop {
        let msg = timeout(Duration::from_secs(2), peer.recv())
            .await
            .expect("agent response timed out")
            .expect("agent socket closed")
            .expect("agent socket error");
        if let PeerMessage::Text(text) = msg {
            return text.as_str().to_owned();
        }
    }
}

/// Assert the agent sends nothing for `wait`.
pub async fn assert_silent(peer: &mut WebSocket, wait: Duration) {
    if let Ok(Some(Ok(PeerMessage::Text(text)))) = timeout(wait, peer.recv()).await {
        panic!("expected no response, got {}", text.as_str());
    }
}

// =============================================================================
// RECORDING STORE
// =============================================================================

/// Backend answering from fixed data and recording every call.
#[derive(Default)]
pub struct RecordingStore {
    calls: Mutex<Vec<String>>,
    fail: bool,
}

impl RecordingStore {
    /// A store whose every call fails with `Unavailable`, after recording it.
    pub fn failing() -> Self {
        Self { calls: Mutex::new(Vec::new()), fail: true }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("store mutex should lock").clone()
    }

    fn record(&self, call: String) -> Result<(), UserStoreError> {
        self.calls.lock().expect("store mutex should lock").push(call);
        if self.fail { Err(UserStoreError::Unavailable("ldap down".into())) } else { Ok(()) }
    }
}

#[async_trait::async_trait]
impl UserStore for RecordingStore {
    async fn authenticate(&self, username: &str, password: &str) -> Result<bool, UserStoreError> {
        self.record(format!("authenticate({username})"))?;
        Ok(username == "alice" && password == "secret")
    }

    async fn user_attributes(
        &self,
        username: &str,
        names: &[String],
    ) -> Result<BTreeMap<String, String>, UserStoreError> {
        self.record(format!("user_attributes({username}, {})", names.join("|")))?;
        Ok(names.iter().map(|n| (n.clone(), format!("{n}:{username}"))).collect())
    }

    async fn user_roles(&self, username: &str) -> Result<Vec<String>, UserStoreError> {
        self.record(format!("user_roles({username})"))?;
        if username == "bob" {
            return Ok(vec!["admin".into(), "staff".into()]);
        }
        Err(UserStoreError::UserNotFound(username.to_owned()))
    }

    async fn roles(&self, pattern: &str, limit: usize) -> Result<Vec<String>, UserStoreError> {
        self.record(format!("roles({pattern}, {limit})"))?;
        Ok(vec!["admin".into(), "staff".into()])
    }
}

pub fn recording_router(role_list_limit: usize) -> (Router, Arc<RecordingStore>) {
    let store = Arc::new(RecordingStore::default());
    (Router::new(store.clone(), role_list_limit), store)
}
