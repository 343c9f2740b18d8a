//! Problem-Details error bodies and the dispatch error boundary
//!
//! Every failure of a call ends at one [`ErrorBoundary`], which turns the
//! [`DispatchError`] into a [`ProblemDetails`] document, redacts internals
//! outside development mode, and runs the optional user [`ErrorHook`].

use crate::error::{DispatchError, RpcErrorCode, status_for_code};
use crate::schema::Issue;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tracing::{error, warn};

/// Content type of error bodies.
pub const PROBLEM_CONTENT_TYPE: &str = "application/problem+json";

/// Boxed error returned by hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Machine-readable error document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemDetails {
    /// HTTP status, echoed as the response status
    pub status: u16,
    /// Short human-readable summary
    pub title: String,
    /// Stable error code (SCREAMING_SNAKE_CASE)
    pub code: String,
    /// Path of the call that failed
    pub instance: String,
    /// Occurrence-specific explanation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Problem type URI
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_uri: Option<String>,
    /// Field-level issues for request-validation failures
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<Issue>>,
    /// Extension members, flattened into the document
    #[serde(flatten)]
    pub extensions: Map<String, Value>,
}

impl ProblemDetails {
    /// Build the document for `error` raised by the call at `instance`.
    pub fn from_error(error: &DispatchError, instance: &str) -> Self {
        match error {
            DispatchError::RequestValidation { issues } => Self {
                status: 400,
                title: "Bad Request".to_string(),
                code: RpcErrorCode::BadRequest.as_str().to_string(),
                instance: instance.to_string(),
                detail: Some("Request validation failed".to_string()),
                type_uri: None,
                errors: Some(issues.clone()),
                extensions: Map::new(),
            },
            DispatchError::ResponseValidation { .. } => Self {
                status: 500,
                title: "Internal Server Error".to_string(),
                code: RpcErrorCode::InternalServerError.as_str().to_string(),
                instance: instance.to_string(),
                detail: None,
                type_uri: None,
                errors: None,
                extensions: Map::new(),
            },
            DispatchError::Rpc(err) => {
                let mut extensions = err.extensions.clone();
                if let Some(cause) = &err.cause {
                    extensions.insert("cause".to_string(), Value::String(cause.clone()));
                }
                Self {
                    status: err.status(),
                    title: err.title.clone(),
                    code: err.code.as_str().to_string(),
                    instance: instance.to_string(),
                    detail: err.detail.clone(),
                    type_uri: err.type_uri.clone(),
                    errors: None,
                    extensions,
                }
            }
        }
    }

    /// The typed code, if the string names a known one.
    pub fn error_code(&self) -> Option<RpcErrorCode> {
        self.code.parse().ok()
    }

    /// Status implied by the code; unknown codes map to 500.
    pub fn code_status(&self) -> u16 {
        status_for_code(&self.code)
    }

    /// Strip details that must not leave the server in production.
    pub fn redacted(mut self) -> Self {
        self.extensions.remove("cause");
        if self.status >= 500 {
            self.title = http::StatusCode::from_u16(self.status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or("Internal Server Error")
                .to_string();
            self.detail = None;
        }
        self
    }
}

/// User hook that may rewrite an error body before it is sent.
///
/// Returning `Ok(None)` keeps the body unchanged. A returned error or a panic
/// is logged and the untransformed body is sent.
pub trait ErrorHook: Send + Sync + 'static {
    /// Rewrite `body`, produced for `error`.
    fn transform(
        &self,
        body: ProblemDetails,
        error: &DispatchError,
    ) -> Result<Option<ProblemDetails>, BoxError>;
}

impl<F> ErrorHook for F
where
    F: Fn(ProblemDetails, &DispatchError) -> Result<Option<ProblemDetails>, BoxError>
        + Send
        + Sync
        + 'static,
{
    fn transform(
        &self,
        body: ProblemDetails,
        error: &DispatchError,
    ) -> Result<Option<ProblemDetails>, BoxError> {
        self(body, error)
    }
}

/// The single place where call failures become responses.
#[derive(Clone, Default)]
pub struct ErrorBoundary {
    development_mode: bool,
    hook: Option<Arc<dyn ErrorHook>>,
}

impl ErrorBoundary {
    /// Create a boundary without a hook.
    pub fn new(development_mode: bool) -> Self {
        Self {
            development_mode,
            hook: None,
        }
    }

    /// Toggle development mode.
    pub fn with_development_mode(mut self, enabled: bool) -> Self {
        self.development_mode = enabled;
        self
    }

    /// Install the error hook.
    pub fn with_hook(mut self, hook: impl ErrorHook) -> Self {
        self.hook = Some(Arc::new(hook));
        self
    }

    /// Whether internal details are exposed.
    pub fn development_mode(&self) -> bool {
        self.development_mode
    }

    /// Log `error` and render its body.
    pub fn render(&self, error: &DispatchError, instance: &str) -> ProblemDetails {
        log_error(error, instance);

        let mut body = ProblemDetails::from_error(error, instance);
        if !self.development_mode {
            body = body.redacted();
        }

        let Some(hook) = &self.hook else {
            return body;
        };
        match catch_unwind(AssertUnwindSafe(|| hook.transform(body.clone(), error))) {
            Ok(Ok(Some(transformed))) => transformed,
            Ok(Ok(None)) => body,
            Ok(Err(e)) => {
                error!(path = %instance, error = %e, "Error hook failed; sending original body");
                body
            }
            Err(_) => {
                error!(path = %instance, "Error hook panicked; sending original body");
                body
            }
        }
    }
}

fn log_error(error: &DispatchError, instance: &str) {
    match error {
        DispatchError::RequestValidation { issues } => {
            warn!(path = %instance, issue_count = issues.len(), "Request validation failed");
        }
        DispatchError::ResponseValidation { issues } => {
            error!(path = %instance, issues = ?issues, "Response validation failed");
        }
        DispatchError::Rpc(err) if err.code.is_server_error() => {
            error!(
                path = %instance,
                code = %err.code,
                title = %err.title,
                cause = ?err.cause,
                "Call failed"
            );
        }
        DispatchError::Rpc(err) => {
            warn!(path = %instance, code = %err.code, title = %err.title, "Call rejected");
        }
    }
}
