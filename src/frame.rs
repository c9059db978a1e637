//! Frame codec. Classifies inbound transport units.
//!
//! DESIGN
//! ======
//! Stateless. The caller passes the current handshake state in; before the
//! upgrade completes only the upgrade response itself is acceptable, and
//! after it completes only websocket messages are. Anything else is a peer
//! protocol violation and surfaces as [`CodecError::UnexpectedPayload`].

use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::http::StatusCode;

use crate::error::ErrorCode;
use crate::handshake::HandshakeState;

/// Longest payload excerpt carried in an error message.
const CONTENT_EXCERPT_CHARS: usize = 256;

// =============================================================================
// TYPES
// =============================================================================

/// Error returned by [`classify`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// A unit arrived that is not valid in the current handshake state.
    #[error("unexpected {kind} payload (content={content})")]
    UnexpectedPayload { kind: &'static str, content: String },
}

impl ErrorCode for CodecError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::UnexpectedPayload { .. } => "E_UNEXPECTED_PAYLOAD",
        }
    }
}

/// HTTP response to the upgrade request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeResponse {
    pub status: StatusCode,
    pub body: Option<Vec<u8>>,
}

/// A raw unit read from the transport, before classification.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Upgrade(UpgradeResponse),
    Message(Message),
}

/// A classified inbound unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    HandshakeResponse(UpgradeResponse),
    Text(String),
    Binary(Vec<u8>),
    /// Liveness payload. Pings are folded in here; the transport answers them itself.
    Pong(Vec<u8>),
    Close { code: Option<u16>, reason: String },
}

// =============================================================================
// CLASSIFY
// =============================================================================

/// Classify one inbound unit given the connection's handshake state.
///
/// # Errors
///
/// Returns [`CodecError::UnexpectedPayload`] for data before the handshake
/// completes, an upgrade response after it completes, or a raw frame.
pub fn classify(unit: Inbound, handshake: &HandshakeState) -> Result<Frame, CodecError> {
    let complete = handshake.is_complete();

    match unit {
        Inbound::Upgrade(response) if !complete => Ok(Frame::HandshakeResponse(response)),
        Inbound::Upgrade(response) => Err(CodecError::UnexpectedPayload {
            kind: "handshake response",
            content: format!(
                "status={}, content={}",
                response.status,
                excerpt(response.body.as_deref().unwrap_or_default())
            ),
        }),
        Inbound::Message(message) if !complete => Err(CodecError::UnexpectedPayload {
            kind: message_kind(&message),
            content: excerpt(&message.into_data()),
        }),
        Inbound::Message(message) => classify_message(message),
    }
}

fn classify_message(message: Message) -> Result<Frame, CodecError> {
    match message {
        Message::Text(text) => Ok(Frame::Text(text.as_str().to_owned())),
        Message::Binary(bytes) => Ok(Frame::Binary(bytes.to_vec())),
        Message::Ping(bytes) | Message::Pong(bytes) => Ok(Frame::Pong(bytes.to_vec())),
        Message::Close(close) => Ok(match close {
            Some(close) => Frame::Close { code: Some(u16::from(close.code)), reason: close.reason.as_str().to_owned() },
            None => Frame::Close { code: None, reason: String::new() },
        }),
        Message::Frame(raw) => Err(CodecError::UnexpectedPayload {
            kind: "raw frame",
            content: excerpt(raw.payload()),
        }),
    }
}

fn message_kind(message: &Message) -> &'static str {
    match message {
        Message::Text(_) => "text",
        Message::Binary(_) => "binary",
        Message::Ping(_) => "ping",
        Message::Pong(_) => "pong",
        Message::Close(_) => "close",
        Message::Frame(_) => "raw frame",
    }
}

fn excerpt(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).chars().take(CONTENT_EXCERPT_CHARS).collect()
}

#[cfg(test)]
#[path = "frame_test.rs"]
mod tests;
