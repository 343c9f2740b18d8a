//! Error types for RPC operations
//!
//! This module provides the typed error taxonomy shared by the dispatcher and
//! the client.
//!
//! # Error Codes
//!
//! Error codes are represented by the [`RpcErrorCode`] enum. The code set is
//! closed and every variant maps to exactly one HTTP status through
//! [`RpcErrorCode::status`]. When serialized, codes are converted to
//! SCREAMING_SNAKE_CASE strings, which is the stable cross-language contract.
//!
//! # Example
//! ```rust,ignore
//! use http_rpc::{RpcError, RpcErrorCode};
//!
//! let error = RpcError::new(RpcErrorCode::NotFound, "User not found");
//! let error = RpcError::not_found("User not found"); // Convenience method
//! ```

use crate::schema::Issue;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Type-safe error codes for RPC operations.
///
/// When serialized to JSON, codes are converted to SCREAMING_SNAKE_CASE
/// (e.g., `NotFound` becomes `"NOT_FOUND"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RpcErrorCode {
    /// The payload could not be parsed
    ParseError,
    /// The request was malformed or invalid
    BadRequest,
    /// Authentication is required
    Unauthorized,
    /// The authenticated caller lacks permission
    Forbidden,
    /// The requested resource was not found
    NotFound,
    /// The HTTP method is not supported by the route
    MethodNotSupported,
    /// The operation timed out
    Timeout,
    /// The request conflicts with current state
    Conflict,
    /// A precondition of the request did not hold
    PreconditionFailed,
    /// The request payload exceeds size limits
    PayloadTooLarge,
    /// The payload media type is not supported
    UnsupportedMediaType,
    /// The payload is well-formed but semantically invalid
    UnprocessableContent,
    /// Too many requests - rate limit exceeded
    TooManyRequests,
    /// The client closed the request before a response was produced
    ClientClosedRequest,
    /// An unexpected internal error occurred
    InternalServerError,
    /// The requested functionality is not implemented
    NotImplemented,
}

impl RpcErrorCode {
    /// Every code, in table order.
    pub const ALL: [RpcErrorCode; 16] = [
        Self::ParseError,
        Self::BadRequest,
        Self::Unauthorized,
        Self::Forbidden,
        Self::NotFound,
        Self::MethodNotSupported,
        Self::Timeout,
        Self::Conflict,
        Self::PreconditionFailed,
        Self::PayloadTooLarge,
        Self::UnsupportedMediaType,
        Self::UnprocessableContent,
        Self::TooManyRequests,
        Self::ClientClosedRequest,
        Self::InternalServerError,
        Self::NotImplemented,
    ];

    /// Returns the string representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ParseError => "PARSE_ERROR",
            Self::BadRequest => "BAD_REQUEST",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::MethodNotSupported => "METHOD_NOT_SUPPORTED",
            Self::Timeout => "TIMEOUT",
            Self::Conflict => "CONFLICT",
            Self::PreconditionFailed => "PRECONDITION_FAILED",
            Self::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            Self::UnsupportedMediaType => "UNSUPPORTED_MEDIA_TYPE",
            Self::UnprocessableContent => "UNPROCESSABLE_CONTENT",
            Self::TooManyRequests => "TOO_MANY_REQUESTS",
            Self::ClientClosedRequest => "CLIENT_CLOSED_REQUEST",
            Self::InternalServerError => "INTERNAL_SERVER_ERROR",
            Self::NotImplemented => "NOT_IMPLEMENTED",
        }
    }

    /// The transport status this code maps to.
    pub fn status(&self) -> u16 {
        match self {
            Self::ParseError | Self::BadRequest => 400,
            Self::Unauthorized => 401,
            Self::Forbidden => 403,
            Self::NotFound => 404,
            Self::MethodNotSupported => 405,
            Self::Timeout => 408,
            Self::Conflict => 409,
            Self::PreconditionFailed => 412,
            Self::PayloadTooLarge => 413,
            Self::UnsupportedMediaType => 415,
            Self::UnprocessableContent => 422,
            Self::TooManyRequests => 429,
            Self::ClientClosedRequest => 499,
            Self::InternalServerError => 500,
            Self::NotImplemented => 501,
        }
    }

    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status())
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        self.status() >= 500
    }
}

impl fmt::Display for RpcErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Returned when a string does not name a known [`RpcErrorCode`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown RPC error code '{0}'")]
pub struct UnknownCode(pub String);

impl FromStr for RpcErrorCode {
    type Err = UnknownCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|code| code.as_str() == s)
            .ok_or_else(|| UnknownCode(s.to_string()))
    }
}

/// Maps a wire code string to its status; unrecognized codes map to 500.
pub fn status_for_code(code: &str) -> u16 {
    code.parse::<RpcErrorCode>()
        .map(|code| code.status())
        .unwrap_or(500)
}

/// Application-level RPC failure with a stable code.
///
/// Constructed by handler or middleware code and caught once at the dispatch
/// boundary, where it becomes a Problem-Details body.
///
/// # Example
/// ```rust,ignore
/// use http_rpc::{RpcError, RpcErrorCode};
///
/// let error = RpcError::new(RpcErrorCode::Conflict, "Email already taken")
///     .with_detail("alice@example.com is registered")
///     .with_extension("field", "email");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("[{code}] {title}")]
pub struct RpcError {
    /// Type-safe error code
    pub code: RpcErrorCode,
    /// Short human-readable summary
    pub title: String,
    /// Longer explanation specific to this occurrence
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// URI reference identifying the problem type
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_uri: Option<String>,
    /// Extra members merged into the error body
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extensions: Map<String, Value>,
    /// Cause for server-side debugging (never sent in production mode)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl RpcError {
    /// Create a new error with code and title.
    pub fn new(code: RpcErrorCode, title: impl Into<String>) -> Self {
        Self {
            code,
            title: title.into(),
            detail: None,
            type_uri: None,
            extensions: Map::new(),
            cause: None,
        }
    }

    /// Create an error whose title is the code itself.
    pub fn from_code(code: RpcErrorCode) -> Self {
        Self::new(code, code.as_str())
    }

    /// Add a detail message.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Add a problem type URI.
    pub fn with_type(mut self, type_uri: impl Into<String>) -> Self {
        self.type_uri = Some(type_uri.into());
        self
    }

    /// Add one extension member. Values that fail to serialize are skipped.
    pub fn with_extension(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(value) = serde_json::to_value(value) {
            self.extensions.insert(key.into(), value);
        }
        self
    }

    /// Add a cause string for debugging.
    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// The transport status for this error.
    pub fn status(&self) -> u16 {
        self.code.status()
    }

    // Convenience constructors

    /// Create a PARSE_ERROR error.
    pub fn parse(title: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::ParseError, title)
    }

    /// Create a BAD_REQUEST error.
    pub fn bad_request(title: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::BadRequest, title)
    }

    /// Create an UNAUTHORIZED error.
    pub fn unauthorized(title: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::Unauthorized, title)
    }

    /// Create a FORBIDDEN error.
    pub fn forbidden(title: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::Forbidden, title)
    }

    /// Create a NOT_FOUND error.
    pub fn not_found(title: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::NotFound, title)
    }

    /// Create a CONFLICT error.
    pub fn conflict(title: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::Conflict, title)
    }

    /// Create a PAYLOAD_TOO_LARGE error.
    pub fn payload_too_large(title: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::PayloadTooLarge, title)
    }

    /// Create a TOO_MANY_REQUESTS error.
    pub fn too_many_requests(title: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::TooManyRequests, title)
    }

    /// Create an INTERNAL_SERVER_ERROR error.
    pub fn internal(title: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::InternalServerError, title)
    }

    /// Create a NOT_IMPLEMENTED error.
    pub fn not_implemented(title: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::NotImplemented, title)
    }
}

impl From<RpcErrorCode> for RpcError {
    fn from(code: RpcErrorCode) -> Self {
        Self::from_code(code)
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal("Serialization failed").with_cause(format!("JSON error: {}", err))
    }
}

impl From<std::io::Error> for RpcError {
    fn from(err: std::io::Error) -> Self {
        Self::internal("IO failure").with_cause(format!("IO error: {}", err))
    }
}

/// Result type alias for RPC operations.
pub type RpcResult<T> = Result<T, RpcError>;

/// Everything that can end a call at the dispatch boundary.
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    /// The caller's input did not satisfy the input contract.
    #[error("Request doesn't match the schema")]
    RequestValidation {
        /// Field-level issues reported by the schema
        issues: Vec<Issue>,
    },
    /// The handler produced output that violates the output contract.
    #[error("Response doesn't match the schema")]
    ResponseValidation {
        /// Field-level issues reported by the schema (server-side only)
        issues: Vec<Issue>,
    },
    /// A declared failure raised by middleware or the handler.
    #[error(transparent)]
    Rpc(#[from] RpcError),
}

impl DispatchError {
    /// The transport status this failure maps to.
    pub fn status(&self) -> u16 {
        match self {
            Self::RequestValidation { .. } => 400,
            Self::ResponseValidation { .. } => 500,
            Self::Rpc(err) => err.status(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_table() {
        assert_eq!(RpcErrorCode::BadRequest.status(), 400);
        assert_eq!(RpcErrorCode::Unauthorized.status(), 401);
        assert_eq!(RpcErrorCode::Forbidden.status(), 403);
        assert_eq!(RpcErrorCode::NotFound.status(), 404);
        assert_eq!(RpcErrorCode::Conflict.status(), 409);
        assert_eq!(RpcErrorCode::TooManyRequests.status(), 429);
        assert_eq!(RpcErrorCode::InternalServerError.status(), 500);
        assert_eq!(RpcErrorCode::NotImplemented.status(), 501);
    }

    #[test]
    fn test_unknown_code_defaults_to_500() {
        assert_eq!(status_for_code("TEAPOT"), 500);
        assert_eq!(status_for_code(""), 500);
        assert_eq!(status_for_code("CONFLICT"), 409);
    }

    #[test]
    fn test_code_serializes_screaming_snake() {
        let json = serde_json::to_value(RpcErrorCode::ClientClosedRequest).unwrap();
        assert_eq!(json, "CLIENT_CLOSED_REQUEST");
    }

    #[test]
    fn test_json_error_is_internal() {
        let err: RpcError = serde_json::from_str::<u8>("nope").unwrap_err().into();
        assert_eq!(err.code, RpcErrorCode::InternalServerError);
        assert!(err.cause.is_some());
    }
}
