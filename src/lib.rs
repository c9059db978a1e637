//! Client-side agent connecting a local user store to a remote identity
//! coordinator over a single websocket.
//!
//! ARCHITECTURE
//! ============
//! The coordinator sends user-store operation requests (authenticate, claim
//! lookup, role listing) as JSON text frames. The agent answers each one on
//! the same socket, correlated by `correlationId`.
//!
//! - `frame`      classifies inbound transport units
//! - `handshake`  tracks the websocket upgrade and signals completion once
//! - `router`     turns a text request into a backend call and a response
//! - `connection` owns one socket: open, serve, close
//! - `supervisor` owns connection state and reconnects until shut down
//!
//! Data flows one way per message: frame → codec → router → backend →
//! response frame on the same connection.

pub mod config;
pub mod connection;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod protocol;
pub mod router;
pub mod store;
pub mod supervisor;

#[cfg(test)]
mod test_helpers;

pub use config::AgentConfig;
pub use store::{StaticUserStore, UserStore, UserStoreError};
pub use supervisor::{AgentHandle, ConnectionState, Supervisor, SupervisorError};
