//! Connection supervisor: owns the link to the coordinator and keeps it up.
//!
//! DESIGN
//! ======
//! The supervisor runs as its own tokio task. It is the only owner of the
//! live [`Connection`] and of the connection state, which it publishes on a
//! `watch` channel. Callers hold an [`AgentHandle`] and never touch the
//! socket.
//!
//! LIFECYCLE
//! =========
//! `Disconnected → Connecting → Connected → (Disconnected | Closing)`
//!
//! - The first attempt is immediate.
//! - After a link that was up goes down, the first reconnect is immediate.
//! - After a failed attempt the task pauses for the retry delay, then tries
//!   again. There is no attempt limit.
//! - Shutdown interrupts whatever the task is doing (pause, handshake or
//!   serve), closes a live link with a normal close frame and ends in
//!   `Closing`. Nothing reconnects after that.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::AgentConfig;
use crate::connection::{Connection, SessionEnd, shutdown_requested};
use crate::error::ErrorCode;
use crate::router::Router;
use crate::store::UserStore;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Terminal. Set once the supervisor has stopped.
    Closing,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Closing => "closing",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    /// The supervisor task panicked or was cancelled.
    #[error("supervisor task failed: {0}")]
    Task(String),
}

impl ErrorCode for SupervisorError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Task(_) => "E_SUPERVISOR_TASK",
        }
    }
}

// =============================================================================
// HANDLE
// =============================================================================

/// Caller-side view of a running agent.
///
/// Dropping the handle without calling [`AgentHandle::shutdown`] also stops
/// the agent, but nothing waits for the close frame to be sent.
pub struct AgentHandle {
    state: watch::Receiver<ConnectionState>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl AgentHandle {
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Receiver of state changes. Intermediate states may be coalesced.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Wait until the agent is in `target`. Returns `false` if the
    /// supervisor stopped without reaching it.
    pub async fn wait_for(&self, target: ConnectionState) -> bool {
        let mut rx = self.state.clone();
        rx.wait_for(|state| *state == target).await.is_ok()
    }

    /// Stop the agent and wait for the supervisor task to finish.
    ///
    /// # Errors
    ///
    /// [`SupervisorError::Task`] if the supervisor task panicked.
    pub async fn shutdown(self) -> Result<(), SupervisorError> {
        info!(state = %self.state(), "supervisor: shutdown requested");
        self.shutdown.send_replace(true);
        self.task.await.map_err(|e| SupervisorError::Task(e.to_string()))
    }
}

// =============================================================================
// SUPERVISOR
// =============================================================================

pub struct Supervisor {
    config: AgentConfig,
    router: Router,
    state: watch::Sender<ConnectionState>,
    shutdown: watch::Receiver<bool>,
}

impl Supervisor {
    /// Start the supervisory task and return its handle immediately.
    #[must_use]
    pub fn spawn(config: AgentConfig, store: Arc<dyn UserStore>) -> AgentHandle {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let router = Router::new(store, config.role_list_limit);

        let supervisor = Self { config, router, state: state_tx, shutdown: shutdown_rx };
        let task = tokio::spawn(supervisor.run());

        AgentHandle { state: state_rx, shutdown: shutdown_tx, task }
    }

    async fn run(mut self) {
        info!(url = %self.config.url, "supervisor: started");
        let mut attempt: u64 = 0;
        // `None` means the next attempt goes out without a pause.
        let mut delay: Option<Duration> = None;

        loop {
            if let Some(pause) = delay {
                debug!(delay = ?pause, "supervisor: waiting before reconnect");
                let interrupted = tokio::select! {
                    () = tokio::time::sleep(pause) => false,
                    () = shutdown_requested(&mut self.shutdown) => true,
                };
                if interrupted {
                    break;
                }
            }
            if *self.shutdown.borrow() {
                break;
            }

            attempt += 1;
            self.set_state(ConnectionState::Connecting);

            let opened = tokio::select! {
                opened = Connection::open(&self.config.url, self.config.handshake_timeout) => opened,
                () = shutdown_requested(&mut self.shutdown) => break,
            };

            match opened {
                Ok(connection) => {
                    let connection_id = connection.id();
                    info!(%connection_id, attempt, "supervisor: connected");
                    attempt = 0;
                    delay = None;
                    self.set_state(ConnectionState::Connected);

                    match connection.serve(&self.router, &mut self.shutdown).await {
                        SessionEnd::Shutdown => break,
                        SessionEnd::PeerClosed { code, reason } => {
                            info!(%connection_id, ?code, %reason, "supervisor: peer closed link");
                        }
                        SessionEnd::Failed(e) => {
                            warn!(%connection_id, error = %e, code = e.error_code(), "supervisor: link lost");
                        }
                    }
                    self.set_state(ConnectionState::Disconnected);
                }
                Err(e) => {
                    warn!(attempt, error = %e, code = e.error_code(), "supervisor: connect failed");
                    self.set_state(ConnectionState::Disconnected);
                    let retry = self.config.retry;
                    delay = Some(delay.map_or(retry.interval, |d| retry.next_delay(d)));
                }
            }
        }

        self.set_state(ConnectionState::Closing);
        info!("supervisor: stopped");
    }

    fn set_state(&self, next: ConnectionState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            debug!(from = %prev, to = %next, "supervisor: state change");
        }
    }
}

#[cfg(test)]
#[path = "supervisor_test.rs"]
mod tests;
