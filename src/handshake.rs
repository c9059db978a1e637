//! Handshake coordinator: upgrade state and its completion signal.
//!
//! DESIGN
//! ======
//! `NotStarted → InProgress → {Complete | Failed}`. One [`Handshake`] exists
//! per connection attempt. The completion signal is a oneshot sender held in
//! an `Option`; signaling takes it, so a second signal is impossible rather
//! than merely discouraged. Whoever awaits the connection holds the matching
//! [`HandshakeCompletion`].

use std::time::Duration;

use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::http::StatusCode;
use tracing::debug;

use crate::error::ErrorCode;
use crate::frame::UpgradeResponse;

// =============================================================================
// STATE
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeState {
    NotStarted,
    InProgress,
    Complete,
    Failed(String),
}

impl HandshakeState {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete)
    }

    /// Complete or failed; no further transitions.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed(_))
    }
}

// =============================================================================
// ERROR
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandshakeError {
    /// The transport failed before the upgrade completed.
    #[error("handshake transport error: {0}")]
    Transport(String),

    /// The peer answered the upgrade request with something other than 101.
    #[error("upgrade rejected with status {0}")]
    Rejected(u16),

    /// No upgrade response within the configured bound.
    #[error("handshake timed out after {0:?}")]
    Timeout(Duration),

    /// A transition was requested from a state that does not allow it.
    #[error("cannot {action} handshake in state {state:?}")]
    InvalidTransition { action: &'static str, state: HandshakeState },

    /// The completion signal has already fired for this connection.
    #[error("handshake completion already signaled")]
    AlreadySignaled,

    /// The coordinator was dropped without signaling.
    #[error("handshake abandoned before completion")]
    Abandoned,
}

impl ErrorCode for HandshakeError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Transport(_) => "E_HANDSHAKE_TRANSPORT",
            Self::Rejected(_) => "E_HANDSHAKE_REJECTED",
            Self::Timeout(_) => "E_HANDSHAKE_TIMEOUT",
            Self::InvalidTransition { .. } => "E_HANDSHAKE_STATE",
            Self::AlreadySignaled => "E_HANDSHAKE_SIGNALED",
            Self::Abandoned => "E_HANDSHAKE_ABANDONED",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Rejected(_) | Self::Timeout(_) | Self::Abandoned)
    }
}

// =============================================================================
// COORDINATOR
// =============================================================================

type Signal = oneshot::Sender<Result<(), HandshakeError>>;

/// Upgrade negotiation for one connection attempt.
#[derive(Debug)]
pub struct Handshake {
    state: HandshakeState,
    signal: Option<Signal>,
}

/// Receiving side of the completion signal.
#[derive(Debug)]
pub struct HandshakeCompletion(oneshot::Receiver<Result<(), HandshakeError>>);

impl Handshake {
    /// Create a coordinator in `NotStarted` and its completion signal.
    #[must_use]
    pub fn new() -> (Self, HandshakeCompletion) {
        let (tx, rx) = oneshot::channel();
        (Self { state: HandshakeState::NotStarted, signal: Some(tx) }, HandshakeCompletion(rx))
    }

    #[must_use]
    pub fn state(&self) -> &HandshakeState {
        &self.state
    }

    /// The upgrade request is on its way: `NotStarted → InProgress`.
    ///
    /// # Errors
    ///
    /// [`HandshakeError::InvalidTransition`] from any other state.
    pub fn start(&mut self) -> Result<(), HandshakeError> {
        if self.state != HandshakeState::NotStarted {
            return Err(HandshakeError::InvalidTransition { action: "start", state: self.state.clone() });
        }
        self.state = HandshakeState::InProgress;
        Ok(())
    }

    /// Validate the upgrade response: `InProgress → Complete` on 101, otherwise
    /// `InProgress → Failed`.
    ///
    /// # Errors
    ///
    /// [`HandshakeError::InvalidTransition`] when not `InProgress`, and
    /// [`HandshakeError::Rejected`] when the status is not 101.
    pub fn on_response(&mut self, response: &UpgradeResponse) -> Result<(), HandshakeError> {
        if self.state != HandshakeState::InProgress {
            return Err(HandshakeError::InvalidTransition { action: "complete", state: self.state.clone() });
        }

        if response.status != StatusCode::SWITCHING_PROTOCOLS {
            let err = HandshakeError::Rejected(response.status.as_u16());
            self.fail(err.clone());
            return Err(err);
        }

        self.state = HandshakeState::Complete;
        self.signal(Ok(()))
    }

    /// Transport-level failure before completion: `{NotStarted, InProgress} → Failed`.
    /// Ignored once the handshake has settled, so the signal never fires twice.
    pub fn fail(&mut self, err: HandshakeError) {
        if self.state.is_settled() {
            debug!(state = ?self.state, error = %err, "handshake: failure after settle ignored");
            return;
        }
        self.state = HandshakeState::Failed(err.to_string());
        // Settled state guards re-entry, so the signal is still present here.
        let _ = self.signal(Err(err));
    }

    fn signal(&mut self, result: Result<(), HandshakeError>) -> Result<(), HandshakeError> {
        let Some(tx) = self.signal.take() else {
            return Err(HandshakeError::AlreadySignaled);
        };
        // The waiter may have given up (timeout); that is not an error here.
        let _ = tx.send(result);
        Ok(())
    }
}

impl HandshakeCompletion {
    /// Wait for the single completion signal.
    ///
    /// # Errors
    ///
    /// The failure the coordinator signaled, or [`HandshakeError::Abandoned`]
    /// if it was dropped without signaling.
    pub async fn wait(self) -> Result<(), HandshakeError> {
        self.0.await.unwrap_or(Err(HandshakeError::Abandoned))
    }
}

#[cfg(test)]
#[path = "handshake_test.rs"]
mod tests;
