//! Server error types
//!
//! Tool failures are not errors at this level: they become tool results with
//! `isError: true`. A [`ServerError`] is a failure of the protocol channel
//! itself or a request the server cannot route.

use crate::jsonrpc::JsonRpcError;

/// Result alias for the server.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors produced by the MCP server.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ServerError {
    /// `tools/call` named a tool that does not exist.
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// Request parameters had the wrong shape.
    #[error("{0}")]
    InvalidParams(String),

    /// Reading or writing stdio failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A line could not be framed.
    #[error("Framing error: {0}")]
    Codec(#[from] tokio_util::codec::LinesCodecError),

    /// JSON failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A background task panicked or was cancelled.
    #[error("Task failed: {0}")]
    Task(String),
}

impl From<&ServerError> for JsonRpcError {
    fn from(error: &ServerError) -> Self {
        match error {
            ServerError::UnknownTool(_) | ServerError::InvalidParams(_) => {
                JsonRpcError::invalid_params(error)
            }
            other => JsonRpcError::internal_error(other),
        }
    }
}
