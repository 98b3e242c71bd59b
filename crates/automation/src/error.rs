//! Error taxonomy for the automation engine
//!
//! One flat hierarchy. The kind tells callers what to do next: reconnect on
//! connection loss, retry or lengthen the timeout on a timeout, give up on
//! markup drift (element not found).

use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AutomationError>;

#[derive(Debug, Error)]
pub enum AutomationError {
    #[error("not connected; call connect() first")]
    NotConnected,

    #[error("connection lost: {0}")]
    ConnectionLost(String),

    #[error("no debuggable page matching '{0}'")]
    TargetNotFound(String),

    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("script error: {0}")]
    ScriptError(String),

    #[error("CDP protocol error: {code} - {message}")]
    Protocol { code: i64, message: String },

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("browser launch failed: {0}")]
    Launch(String),

    #[error("unexpected protocol payload: {0}")]
    InvalidResponse(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AutomationError {
    /// Unrecoverable for the current connection; the caller must reconnect.
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, AutomationError::ConnectionLost(_))
    }
}
