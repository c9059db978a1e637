//! One websocket link to the coordinator.
//!
//! LIFECYCLE
//! =========
//! 1. `open` creates a fresh [`Handshake`], sends the upgrade request and
//!    waits for the completion signal, bounded by the handshake timeout.
//! 2. `serve` reads frames one at a time, classifies them, routes text
//!    requests and writes each response before reading the next frame.
//! 3. The link ends on peer close, transport error, fatal codec error or
//!    shutdown. The socket is dropped with the `Connection`; a reconnect
//!    always builds a new one.
//!
//! Per-message concerns (classification, routing, inspection buffers) live
//! in [`Session`] so they can be exercised without a socket.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ErrorCode;
use crate::frame::{self, CodecError, Frame, Inbound, UpgradeResponse};
use crate::handshake::{Handshake, HandshakeError, HandshakeState};
use crate::router::Router;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// =============================================================================
// ERROR
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Read or write failure on an established link.
    #[error("transport error: {0}")]
    Transport(String),
}

impl ErrorCode for ConnectionError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Handshake(e) => e.error_code(),
            Self::Codec(e) => e.error_code(),
            Self::Transport(_) => "E_TRANSPORT",
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Handshake(e) => e.retryable(),
            Self::Codec(_) | Self::Transport(_) => true,
        }
    }
}

/// How a served connection ended.
#[derive(Debug)]
pub enum SessionEnd {
    /// The peer sent a close frame.
    PeerClosed { code: Option<u16>, reason: String },
    /// The local side was told to stop.
    Shutdown,
    /// Transport or protocol failure.
    Failed(ConnectionError),
}

// =============================================================================
// SESSION
// =============================================================================

/// What the connection should do after one inbound unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Write this text frame back.
    Reply(String),
    /// Nothing to send.
    Idle,
    /// The peer asked to close.
    Close { code: Option<u16>, reason: String },
}

/// Per-connection frame processing state.
///
/// Carries the handshake state the connection settled in. tungstenite reads
/// the upgrade response inside `connect_async`, so on a live link the state is
/// `Complete` and a second upgrade response can only come from a caller
/// feeding one in.
#[derive(Debug)]
pub struct Session {
    connection_id: Uuid,
    handshake: HandshakeState,
    last_text: Option<String>,
    last_binary: Option<Vec<u8>>,
    replies: u64,
}

impl Session {
    #[must_use]
    pub fn new(connection_id: Uuid, handshake: HandshakeState) -> Self {
        Self { connection_id, handshake, last_text: None, last_binary: None, replies: 0 }
    }

    /// Process one inbound unit.
    ///
    /// Malformed requests are logged and dropped; they never fail the session.
    ///
    /// # Errors
    ///
    /// [`ConnectionError::Codec`] for units that violate the handshake
    /// ordering. The connection must be closed.
    pub async fn on_unit(&mut self, router: &Router, unit: Inbound) -> Result<Step, ConnectionError> {
        let id = self.connection_id;

        match frame::classify(unit, &self.handshake)? {
            Frame::HandshakeResponse(response) => {
                warn!(connection_id = %id, status = %response.status, "connection: stray upgrade response");
                Err(HandshakeError::InvalidTransition { action: "complete", state: self.handshake.clone() }.into())
            }
            Frame::Text(text) => {
                debug!(connection_id = %id, len = text.len(), "connection: text frame");
                let routed = router.route(&text).await;
                self.last_text = Some(text);
                match routed {
                    Ok(Some(response)) => match response.to_json() {
                        Ok(json) => {
                            self.replies += 1;
                            Ok(Step::Reply(json))
                        }
                        Err(e) => {
                            warn!(
                                connection_id = %id,
                                correlation_id = %response.correlation_id,
                                error = %e,
                                "connection: response not serializable"
                            );
                            Ok(Step::Idle)
                        }
                    },
                    Ok(None) => Ok(Step::Idle),
                    Err(e) => {
                        warn!(connection_id = %id, error = %e, code = e.error_code(), "connection: request dropped");
                        Ok(Step::Idle)
                    }
                }
            }
            Frame::Binary(bytes) => {
                debug!(connection_id = %id, len = bytes.len(), "connection: binary frame");
                self.last_binary = Some(bytes);
                Ok(Step::Idle)
            }
            Frame::Pong(bytes) => {
                debug!(connection_id = %id, "connection: pong");
                self.last_binary = Some(bytes);
                Ok(Step::Idle)
            }
            Frame::Close { code, reason } => {
                info!(connection_id = %id, ?code, %reason, "connection: peer closing");
                Ok(Step::Close { code, reason })
            }
        }
    }

    #[must_use]
    pub fn connection_id(&self) -> Uuid {
        self.connection_id
    }

    #[must_use]
    pub fn handshake_state(&self) -> &HandshakeState {
        &self.handshake
    }

    /// Most recent text payload received.
    #[must_use]
    pub fn last_text(&self) -> Option<&str> {
        self.last_text.as_deref()
    }

    /// Most recent binary or pong buffer received.
    #[must_use]
    pub fn last_binary(&self) -> Option<&[u8]> {
        self.last_binary.as_deref()
    }

    /// Responses produced so far.
    #[must_use]
    pub fn replies(&self) -> u64 {
        self.replies
    }
}

// =============================================================================
// CONNECTION
// =============================================================================

/// An established, handshaken link. Never reused once `serve` returns.
pub struct Connection {
    socket: WsStream,
    session: Session,
}

impl Connection {
    /// Open a new link and complete the upgrade handshake.
    ///
    /// # Errors
    ///
    /// [`ConnectionError::Handshake`] when the transport fails, the upgrade
    /// is rejected, or no response arrives within `handshake_timeout`.
    pub async fn open(url: &str, handshake_timeout: Duration) -> Result<Self, ConnectionError> {
        let connection_id = Uuid::new_v4();
        let (mut handshake, completion) = Handshake::new();
        handshake.start()?;
        debug!(%connection_id, %url, "connection: upgrade requested");

        let socket = match tokio::time::timeout(handshake_timeout, connect_async(url)).await {
            Ok(Ok((socket, response))) => {
                let upgrade = upgrade_response(response.status(), response.body().as_deref());
                accept_upgrade(&mut handshake, upgrade)?;
                Some(socket)
            }
            Ok(Err(WsError::Http(response))) => {
                let upgrade = upgrade_response(response.status(), response.body().as_deref());
                accept_upgrade(&mut handshake, upgrade)?;
                None
            }
            Ok(Err(e)) => {
                handshake.fail(HandshakeError::Transport(e.to_string()));
                None
            }
            Err(_) => {
                handshake.fail(HandshakeError::Timeout(handshake_timeout));
                None
            }
        };

        let settled = handshake.state().clone();
        // Dropping an unsignaled coordinator reports `Abandoned` to the waiter.
        drop(handshake);
        completion.wait().await?;
        let socket = socket.ok_or(HandshakeError::Abandoned)?;

        info!(%connection_id, %url, "connection: established");
        Ok(Self { socket, session: Session::new(connection_id, settled) })
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.session.connection_id()
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Process frames until the link ends or `shutdown` flips to `true`.
    pub async fn serve(mut self, router: &Router, shutdown: &mut watch::Receiver<bool>) -> SessionEnd {
        let id = self.id();

        loop {
            let next = tokio::select! {
                () = shutdown_requested(shutdown) => {
                    self.close(CloseCode::Normal, "agent shutting down").await;
                    return SessionEnd::Shutdown;
                }
                next = self.socket.next() => next,
            };

            let message = match next {
                Some(Ok(message)) => message,
                Some(Err(e)) => return SessionEnd::Failed(ConnectionError::Transport(e.to_string())),
                None => return SessionEnd::Failed(ConnectionError::Transport("stream ended without close".into())),
            };

            match self.session.on_unit(router, Inbound::Message(message)).await {
                Ok(Step::Reply(json)) => {
                    if let Err(e) = self.socket.send(Message::text(json)).await {
                        return SessionEnd::Failed(ConnectionError::Transport(e.to_string()));
                    }
                }
                Ok(Step::Idle) => {}
                Ok(Step::Close { code, reason }) => {
                    // Flushes the close reply; errors mean the peer is already gone.
                    let _ = self.socket.close(None).await;
                    return SessionEnd::PeerClosed { code, reason };
                }
                Err(e) => {
                    warn!(connection_id = %id, error = %e, code = e.error_code(), "connection: protocol violation");
                    self.close(CloseCode::Protocol, "protocol violation").await;
                    return SessionEnd::Failed(e);
                }
            }
        }
    }

    async fn close(&mut self, code: CloseCode, reason: &'static str) {
        let frame = CloseFrame { code, reason: reason.into() };
        if let Err(e) = self.socket.close(Some(frame)).await {
            debug!(connection_id = %self.id(), error = %e, "connection: close failed");
        }
    }
}

/// Resolves once shutdown is requested or the sender is gone.
///
/// Drops the lock-holding `watch::Ref` before returning; callers stay `Send`.
pub(crate) async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

fn upgrade_response(status: StatusCode, body: Option<&[u8]>) -> UpgradeResponse {
    UpgradeResponse { status, body: body.map(<[u8]>::to_vec) }
}

/// Route the upgrade response through the codec to the handshake coordinator.
fn accept_upgrade(handshake: &mut Handshake, upgrade: UpgradeResponse) -> Result<(), ConnectionError> {
    if let Frame::HandshakeResponse(response) = frame::classify(Inbound::Upgrade(upgrade), handshake.state())? {
        if let Err(e) = handshake.on_response(&response) {
            debug!(error = %e, "connection: upgrade not accepted");
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "connection_test.rs"]
mod tests;
