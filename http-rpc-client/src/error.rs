//! Client error types

use http_rpc::{ProblemDetails, RpcError};
use thiserror::Error;

/// Everything a call can fail with.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The transport failed (connect, send, read).
    #[error("transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a Problem-Details document.
    #[error("[{}] {}", .problem.code, .problem.title)]
    Rpc {
        /// HTTP status of the response
        status: u16,
        /// The error document
        problem: ProblemDetails,
    },

    /// The response could not be understood.
    #[error("unexpected response ({status}): {message}")]
    Decode {
        /// HTTP status of the response
        status: u16,
        /// What went wrong
        message: String,
    },

    /// The last path segment is not `get`, `post` or `sse`.
    #[error("unknown method keyword '{0}'")]
    UnknownMethod(String),

    /// The call has no route segments before the method keyword.
    #[error("call path is empty")]
    EmptyPath,

    /// The data transformer rejected a payload.
    #[error("transformer failed: {0}")]
    Transform(RpcError),

    /// The call input could not be serialized.
    #[error("input does not serialize: {0}")]
    Encode(String),

    /// A configured header could not be used.
    #[error("invalid header: {0}")]
    Header(String),
}

impl ClientError {
    /// The server's error code, if the server produced one.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Rpc { problem, .. } => Some(problem.code.as_str()),
            _ => None,
        }
    }

    /// The HTTP status, if a response was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Rpc { status, .. } | Self::Decode { status, .. } => Some(*status),
            Self::Http(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// The Problem-Details document, if the server produced one.
    pub fn problem(&self) -> Option<&ProblemDetails> {
        match self {
            Self::Rpc { problem, .. } => Some(problem),
            _ => None,
        }
    }
}

/// Result type alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;
