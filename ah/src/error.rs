//! Error types for the askhuman broker

use requeststore::{RequestId, StoreError};
use thiserror::Error;

/// Errors from asking, answering and coordinating requests
#[derive(Debug, Error)]
pub enum AskError {
    /// Caller-supplied input was rejected
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Conditional update matched nothing: unknown id or already answered
    #[error("Request {0} not found or already responded")]
    NotPending(RequestId),

    #[error("Request {0} not found")]
    NotFound(RequestId),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Primary answered with a non-success status
    #[error("Primary returned {status}: {message}")]
    RemoteStatus { status: u16, message: String },

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("Internal error: {0}")]
    Internal(String),

    /// The caller's cancellation token fired before an answer arrived
    #[error("Request cancelled")]
    Cancelled,

    /// The answering side went away without delivering
    #[error("Request abandoned before an answer was delivered")]
    Abandoned,
}

impl AskError {
    /// Cancellation is an outcome, not a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<tokio::task::JoinError> for AskError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Internal(format!("blocking task failed: {}", e))
    }
}

/// Role resolution failures; cached for the process lifetime, hence `Clone`
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    /// Port is bound by something that does not answer the health probe
    #[error("Port {port} is in use by an unrelated process: {reason}")]
    PortInUse { port: u16, reason: String },

    /// Primary startup failed after the port was bound
    #[error("Failed to start primary: {0}")]
    Startup(String),
}

/// Failures of the MCP stdio transport itself
#[derive(Debug, Error)]
pub enum McpError {
    #[error("MCP I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("MCP encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("MCP writer task failed: {0}")]
    Writer(String),
}
