//! Request dispatcher
//!
//! Runs one call through its pipeline:
//!
//! ```text
//! RECEIVED → VALIDATING_INPUT → RUNNING_MIDDLEWARE → HANDLING → VALIDATING_OUTPUT → RESPONDED
//!     └──────────────┴──────────────────┴──────────────┴─────────────┴──→ ERRORED
//! ```
//!
//! The dispatcher is independent of any web server. A host adapter turns the
//! incoming request into a [`RawRequest`] and the returned [`Reply`] into its
//! own response type (see the `server` module for axum).

use crate::config::RpcConfig;
use crate::context::{Context, RequestParts};
use crate::error::{DispatchError, RpcError, RpcErrorCode};
use crate::middleware::run_middlewares;
use crate::problem::{ErrorBoundary, ErrorHook, ProblemDetails};
use crate::route::{Endpoint, HandlerKind};
use crate::router::Router;
use crate::stream::{CloseReason, StreamGuard};
use crate::transformer::{JsonTransformer, SharedTransformer};
use bytes::Bytes;
use futures::{FutureExt, StreamExt};
use futures::stream::BoxStream;
use http::HeaderMap;
use serde_json::{Map, Value, json};
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, trace};
use uuid::Uuid;

/// Host-independent view of an incoming request.
#[derive(Debug, Clone)]
pub struct RawRequest {
    /// HTTP method
    pub method: http::Method,
    /// Request path, as the route was addressed
    pub path: String,
    /// Request headers
    pub headers: HeaderMap,
    /// Raw query string, without the leading `?`
    pub query: Option<String>,
    /// Raw body
    pub body: Bytes,
}

impl RawRequest {
    /// A GET request carrying `input` in the query string.
    pub fn get(path: impl Into<String>, input: Option<&Value>) -> Self {
        let query = input.map(|input| {
            url::form_urlencoded::Serializer::new(String::new())
                .append_pair("input", &input.to_string())
                .finish()
        });
        Self {
            method: http::Method::GET,
            path: path.into(),
            headers: HeaderMap::new(),
            query,
            body: Bytes::new(),
        }
    }

    /// A POST request carrying `input` as its JSON body.
    pub fn post(path: impl Into<String>, input: Option<&Value>) -> Self {
        Self {
            method: http::Method::POST,
            path: path.into(),
            headers: HeaderMap::new(),
            query: None,
            body: input
                .map(|input| Bytes::from(input.to_string()))
                .unwrap_or_default(),
        }
    }

    /// Add a header. Invalid names or values are ignored.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            http::HeaderName::try_from(name),
            http::HeaderValue::try_from(value),
        ) {
            self.headers.insert(name, value);
        }
        self
    }

    fn query_input(&self) -> Option<String> {
        let query = self.query.as_deref()?;
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == "input")
            .map(|(_, value)| value.into_owned())
    }
}

/// The outcome of a call, ready for a host to write.
pub enum Reply {
    /// Single JSON envelope `{ "data": ... }`
    Unary {
        /// HTTP status (200)
        status: u16,
        /// Headers set by middleware or the handler
        headers: HeaderMap,
        /// The envelope
        body: Value,
    },
    /// Server-push stream of `{ "data": ... }` envelopes
    Stream {
        /// Headers set by middleware
        headers: HeaderMap,
        /// One envelope per event
        events: BoxStream<'static, Value>,
    },
    /// Problem-Details error
    Error {
        /// Headers set by middleware or the handler
        headers: HeaderMap,
        /// The error document
        problem: ProblemDetails,
    },
}

impl Reply {
    /// Status the host should write.
    pub fn status(&self) -> u16 {
        match self {
            Self::Unary { status, .. } => *status,
            Self::Stream { .. } => 200,
            Self::Error { problem, .. } => problem.status,
        }
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unary { status, body, .. } => f
                .debug_struct("Unary")
                .field("status", status)
                .field("body", body)
                .finish(),
            Self::Stream { .. } => f.debug_struct("Stream").finish_non_exhaustive(),
            Self::Error { problem, .. } => {
                f.debug_struct("Error").field("problem", problem).finish()
            }
        }
    }
}

/// Dispatch pipeline stage, for tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Raw input arrived
    Received,
    /// Decoding and validating input
    ValidatingInput,
    /// Running middlewares
    RunningMiddleware,
    /// Running the handler
    Handling,
    /// Validating and serializing output
    ValidatingOutput,
    /// Response produced
    Responded,
    /// Error body produced
    Errored,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Received => "RECEIVED",
            Self::ValidatingInput => "VALIDATING_INPUT",
            Self::RunningMiddleware => "RUNNING_MIDDLEWARE",
            Self::Handling => "HANDLING",
            Self::ValidatingOutput => "VALIDATING_OUTPUT",
            Self::Responded => "RESPONDED",
            Self::Errored => "ERRORED",
        };
        f.write_str(name)
    }
}

/// Executes calls against endpoints.
pub struct Dispatcher<S> {
    state: Arc<S>,
    config: RpcConfig,
    transformer: SharedTransformer,
    boundary: ErrorBoundary,
}

impl<S> Clone for Dispatcher<S> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            config: self.config.clone(),
            transformer: self.transformer.clone(),
            boundary: self.boundary.clone(),
        }
    }
}

impl<S: Send + Sync + 'static> Dispatcher<S> {
    /// Create a dispatcher with default configuration.
    pub fn new(state: Arc<S>) -> Self {
        let config = RpcConfig::default();
        Self {
            state,
            boundary: ErrorBoundary::new(config.development_mode),
            config,
            transformer: Arc::new(JsonTransformer),
        }
    }

    /// Replace the configuration. Keeps an installed error hook.
    pub fn with_config(mut self, config: RpcConfig) -> Self {
        self.boundary = self
            .boundary
            .clone()
            .with_development_mode(config.development_mode);
        self.config = config;
        self
    }

    /// Replace the data transformer.
    pub fn with_transformer(mut self, transformer: SharedTransformer) -> Self {
        self.transformer = transformer;
        self
    }

    /// Install the error hook.
    pub fn with_error_hook(mut self, hook: impl ErrorHook) -> Self {
        self.boundary = self.boundary.with_hook(hook);
        self
    }

    /// The active configuration.
    pub fn config(&self) -> &RpcConfig {
        &self.config
    }

    /// Resolve `request.path` in `router` and dispatch it.
    ///
    /// Unknown paths produce a `NOT_FOUND` error reply.
    pub async fn handle(&self, router: &Router<S>, request: RawRequest) -> Reply {
        let path = request
            .path
            .strip_prefix(self.config.prefix.as_str())
            .unwrap_or(&request.path)
            .to_string();
        match router.lookup(&path) {
            Some(endpoint) => self.dispatch(endpoint, request).await,
            None => {
                let err = RpcError::not_found("Route not found").with_detail(path);
                self.fail(HeaderMap::new(), &err.into(), &request.path)
            }
        }
    }

    /// Run one call against `endpoint`.
    pub async fn dispatch(&self, endpoint: &Endpoint<S>, request: RawRequest) -> Reply {
        let parts = RequestParts::new(
            request.method.clone(),
            request.path.clone(),
            request.headers.clone(),
        );
        let request_id = parts.request_id;
        let instance = request.path.clone();
        debug!(
            request_id = %request_id,
            method = %endpoint.method(),
            path = %instance,
            "Call received"
        );
        self.stage(request_id, Stage::Received);

        if !accepts(endpoint.method().http_method(), &request.method) {
            let err = RpcError::new(RpcErrorCode::MethodNotSupported, "Method not supported")
                .with_detail(format!("{} expects {}", instance, endpoint.method().http_method()));
            return self.fail(HeaderMap::new(), &err.into(), &instance);
        }

        self.stage(request_id, Stage::ValidatingInput);
        let input = match self.decode_input(endpoint, &request) {
            Ok(input) => input,
            Err(e) => return self.fail(HeaderMap::new(), &e, &instance),
        };

        let ctx = Context::new(self.state.clone(), parts, input);
        match endpoint.handler() {
            HandlerKind::Unary(_) => {
                let response = ctx.response().clone();
                let result = self.run_unary(endpoint, ctx).await;
                match result {
                    Ok(data) => {
                        self.stage(request_id, Stage::Responded);
                        Reply::Unary {
                            status: 200,
                            headers: response.headers(),
                            body: json!({ "data": data }),
                        }
                    }
                    Err(e) => self.fail(response.headers(), &e, &instance),
                }
            }
            HandlerKind::Stream(_) => {
                let response = ctx.response().clone();
                match self.open_stream(endpoint, ctx, &instance).await {
                    Ok(events) => {
                        self.stage(request_id, Stage::Responded);
                        Reply::Stream {
                            headers: response.headers(),
                            events,
                        }
                    }
                    Err(e) => self.fail(response.headers(), &e, &instance),
                }
            }
        }
    }

    fn decode_input(
        &self,
        endpoint: &Endpoint<S>,
        request: &RawRequest,
    ) -> Result<Value, DispatchError> {
        let raw: Bytes = if endpoint.method().reads_query() {
            request.query_input().map(Bytes::from).unwrap_or_default()
        } else {
            request.body.clone()
        };

        if raw.len() > self.config.max_input_size {
            return Err(RpcError::payload_too_large("Input exceeds maximum size")
                .with_detail(format!(
                    "{} bytes exceeds the limit of {} bytes",
                    raw.len(),
                    self.config.max_input_size
                ))
                .into());
        }

        let value = if raw.iter().all(u8::is_ascii_whitespace) {
            Value::Object(Map::new())
        } else {
            serde_json::from_slice(&raw).map_err(|e| {
                RpcError::parse("Malformed JSON input").with_detail(e.to_string())
            })?
        };

        let value = self.transformer.deserialize(value)?;
        endpoint
            .input()
            .validate(&value)
            .map_err(|issues| DispatchError::RequestValidation { issues })
    }

    async fn run_unary(&self, endpoint: &Endpoint<S>, ctx: Context<S>) -> Result<Value, DispatchError> {
        let HandlerKind::Unary(handler) = endpoint.handler() else {
            return Err(RpcError::internal("Endpoint is not unary").into());
        };
        let request_id = ctx.request_id();

        let output = guarded(async {
            self.stage(request_id, Stage::RunningMiddleware);
            let ctx = run_middlewares(ctx, endpoint.middlewares()).await?;

            self.stage(request_id, Stage::Handling);
            Ok::<_, DispatchError>(handler(ctx).await?)
        })
        .await?;

        self.stage(request_id, Stage::ValidatingOutput);
        let output = endpoint
            .output()
            .validate(&output)
            .map_err(|issues| DispatchError::ResponseValidation { issues })?;
        Ok(self.transformer.serialize(output)?)
    }

    async fn open_stream(
        &self,
        endpoint: &Endpoint<S>,
        ctx: Context<S>,
        instance: &str,
    ) -> Result<BoxStream<'static, Value>, DispatchError> {
        let HandlerKind::Stream(handler) = endpoint.handler() else {
            return Err(RpcError::internal("Endpoint is not a stream").into());
        };
        let request_id = ctx.request_id();

        let (signal, mut source) = guarded(async {
            self.stage(request_id, Stage::RunningMiddleware);
            let ctx = run_middlewares(ctx, endpoint.middlewares()).await?;

            self.stage(request_id, Stage::Handling);
            let signal = ctx.signal();
            Ok::<_, DispatchError>((signal, handler(ctx)))
        })
        .await?;
        let output = endpoint.output().clone();
        let transformer = self.transformer.clone();
        let path = instance.to_string();

        // Opened outside the generator so an unpolled, dropped stream still cancels.
        let mut guard = StreamGuard::open(&path, signal);
        let events = async_stream::stream! {
            loop {
                let item = match AssertUnwindSafe(source.next()).catch_unwind().await {
                    Ok(None) => {
                        guard.finish(CloseReason::Completed);
                        break;
                    }
                    Ok(Some(item)) => item,
                    Err(panic) => Err(panicked(panic)),
                };
                let envelope = item
                    .map_err(DispatchError::from)
                    .and_then(|value| {
                        output
                            .validate(&value)
                            .map_err(|issues| DispatchError::ResponseValidation { issues })
                    })
                    .and_then(|value| transformer.serialize(value).map_err(DispatchError::from));
                match envelope {
                    Ok(data) => {
                        guard.pushed();
                        yield json!({ "data": data });
                    }
                    Err(e) => {
                        error!(
                            path = %path,
                            items = guard.items(),
                            error = %e,
                            "Stream item failed; closing stream"
                        );
                        if let DispatchError::ResponseValidation { issues } = &e {
                            error!(path = %path, issues = ?issues, "Stream item violates output contract");
                        }
                        guard.finish(CloseReason::Failed);
                        break;
                    }
                }
            }
        };
        Ok(events.boxed())
    }

    /// Produce an error reply for a failure detected outside the pipeline.
    pub fn reject(&self, error: &DispatchError, instance: &str) -> Reply {
        self.fail(HeaderMap::new(), error, instance)
    }

    fn fail(&self, headers: HeaderMap, error: &DispatchError, instance: &str) -> Reply {
        trace!(path = %instance, stage = %Stage::Errored, "Dispatch stage");
        Reply::Error {
            headers,
            problem: self.boundary.render(error, instance),
        }
    }

    fn stage(&self, request_id: Uuid, stage: Stage) {
        if self.config.debug_logging {
            trace!(request_id = %request_id, stage = %stage, "Dispatch stage");
        }
    }
}

/// HEAD is answered like GET; the host drops the body.
fn accepts(expected: http::Method, actual: &http::Method) -> bool {
    *actual == expected || (expected == http::Method::GET && *actual == http::Method::HEAD)
}

/// Run `future`, turning a panic into an internal error.
async fn guarded<F, T>(future: F) -> Result<T, DispatchError>
where
    F: Future<Output = Result<T, DispatchError>>,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(panicked(panic).into()),
    }
}

fn panicked(panic: Box<dyn Any + Send>) -> RpcError {
    let message = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    RpcError::internal("Internal server error").with_cause(format!("panic: {}", message))
}
