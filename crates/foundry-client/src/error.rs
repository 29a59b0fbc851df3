//! Error types for the Foundry client
//!
//! Authentication rejection is not an error here: negotiators report it as
//! `Ok(false)` so callers can move on to the next credential. Everything else
//! that can go wrong surfaces as a [`FoundryError`].

use std::path::PathBuf;
use std::time::Duration;

use foundry_wire::FrameError;

/// Result alias used throughout the client.
pub type FoundryResult<T> = Result<T, FoundryError>;

/// Errors produced by the Foundry client.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum FoundryError {
    /// An HTTP request could not be completed.
    #[error("{operation} failed for {host}: {reason}")]
    Request {
        /// Request line, e.g. `GET /join`
        operation: &'static str,
        /// Target host
        host: String,
        /// Underlying cause
        reason: String,
    },

    /// The HTTP client could not be constructed.
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    /// The websocket failed to open or errored while opening.
    #[error("WebSocket connection failed: {0}")]
    WebSocket(String),

    /// The websocket did not open within the connect timeout.
    #[error("WebSocket connection timeout")]
    ConnectTimeout(Duration),

    /// A chosen instance rejected its credential.
    #[error("Authentication failed for {host}")]
    AuthenticationFailed {
        /// Host that rejected the credential
        host: String,
    },

    /// A frame meant for an operation could not be decoded, or a decoded
    /// response did not have the expected shape.
    #[error("{0}")]
    Protocol(String),

    /// No matching response arrived in time.
    #[error(
        "Timeout waiting for {waiting_for} ({}s){}",
        .timeout.as_secs(),
        subject_suffix(.subject)
    )]
    Timeout {
        /// What the operation was waiting for
        waiting_for: &'static str,
        /// The elapsed limit
        timeout: Duration,
        /// Document type and id, when the operation targets one
        subject: Option<String>,
    },

    /// The server answered with an error payload.
    #[error("{operation} failed: {message}")]
    Server {
        /// Operation name, e.g. `Browse files`
        operation: &'static str,
        /// Server supplied error text
        message: String,
    },

    /// No open socket is available.
    #[error("Not connected to Foundry server")]
    NotConnected,

    /// An upload source URL could not be fetched.
    #[error("Failed to download file: {0}")]
    Download(String),

    /// Caller supplied arguments are invalid.
    #[error("{0}")]
    InvalidArgument(String),

    /// The credential file could not be read or parsed.
    #[error("Failed to load credentials from {}: {reason}", .path.display())]
    Credentials {
        /// File that was read
        path: PathBuf,
        /// Underlying cause
        reason: String,
    },

    /// The credential file holds no entries.
    #[error("No credentials found in config file")]
    NoCredentials,

    /// Every configured credential failed.
    #[error("Failed to connect to any Foundry server")]
    NoServerAvailable,

    /// I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn subject_suffix(subject: &Option<String>) -> String {
    subject
        .as_ref()
        .map(|s| format!(" for {s}"))
        .unwrap_or_default()
}

impl FoundryError {
    /// Builds a timeout error.
    pub fn timeout(waiting_for: &'static str, timeout: Duration, subject: Option<String>) -> Self {
        Self::Timeout {
            waiting_for,
            timeout,
            subject,
        }
    }

    /// Builds a server-reported error from an `error` payload value.
    pub fn server(operation: &'static str, error: &serde_json::Value) -> Self {
        let message = match error {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        Self::Server { operation, message }
    }

    /// True for the timeout variant.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl From<FrameError> for FoundryError {
    fn from(err: FrameError) -> Self {
        Self::Protocol(err.to_string())
    }
}
