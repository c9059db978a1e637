//! Error codes shared by every error taxonomy in the agent.
//!
//! Each component owns its own `thiserror` enum. They all implement
//! [`ErrorCode`] so log events and failure-shaped responses carry a grepable
//! code instead of free text alone.

/// Grepable error code and retryable flag for structured error reporting.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}
