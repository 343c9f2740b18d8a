//! Per-call context
//!
//! A [`Context`] is created fresh for every call and discarded after the
//! response. It carries shared application state, the request parts, a
//! handle for response headers, the validated input, and the key-map that
//! middlewares widen as the call progresses.

use crate::stream::CancellationSignal;
use crate::{RpcError, RpcResult};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Immutable view of the incoming request.
#[derive(Debug, Clone)]
pub struct RequestParts {
    /// HTTP method of the call
    pub method: Method,
    /// Route path the call was addressed to
    pub path: String,
    /// Request headers
    pub headers: HeaderMap,
    /// Unique id of this call (uuid v7)
    pub request_id: Uuid,
}

impl RequestParts {
    /// Create request parts with a fresh request id.
    pub fn new(method: Method, path: impl Into<String>, headers: HeaderMap) -> Self {
        Self {
            method,
            path: path.into(),
            headers,
            request_id: Uuid::now_v7(),
        }
    }
}

/// Response headers that middleware and handlers may set.
///
/// Applied by the dispatcher to the final response, success or error.
#[derive(Debug, Clone, Default)]
pub struct ResponseHandle {
    headers: Arc<Mutex<HeaderMap>>,
}

impl ResponseHandle {
    /// Set a response header, replacing any previous value.
    pub fn set_header(&self, name: &str, value: &str) -> RpcResult<()> {
        let name = HeaderName::try_from(name)
            .map_err(|e| RpcError::internal("Invalid header name").with_cause(e.to_string()))?;
        let value = HeaderValue::try_from(value)
            .map_err(|e| RpcError::internal("Invalid header value").with_cause(e.to_string()))?;
        self.lock().insert(name, value);
        Ok(())
    }

    /// Snapshot of the headers set so far.
    pub fn headers(&self) -> HeaderMap {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HeaderMap> {
        // A panic while holding the lock leaves a plain map behind; keep using it.
        self.headers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Context handed to middlewares and handlers.
///
/// The context is cloned for each stage, so use `Arc` inside shared state.
pub struct Context<S> {
    state: Arc<S>,
    request: Arc<RequestParts>,
    response: ResponseHandle,
    input: Value,
    extensions: Map<String, Value>,
    signal: Arc<CancellationSignal>,
}

impl<S> Clone for Context<S> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            request: self.request.clone(),
            response: self.response.clone(),
            input: self.input.clone(),
            extensions: self.extensions.clone(),
            signal: self.signal.clone(),
        }
    }
}

impl<S: Send + Sync + 'static> Context<S> {
    /// Create a context for one call.
    pub fn new(state: Arc<S>, request: RequestParts, input: Value) -> Self {
        Self {
            state,
            request: Arc::new(request),
            response: ResponseHandle::default(),
            input,
            extensions: Map::new(),
            signal: Arc::new(CancellationSignal::new()),
        }
    }

    /// Shared application state.
    pub fn state(&self) -> &S {
        &self.state
    }

    /// The incoming request.
    pub fn request(&self) -> &RequestParts {
        &self.request
    }

    /// Shortcut for a request header as a string.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.request.headers.get(name)?.to_str().ok()
    }

    /// Id of this call.
    pub fn request_id(&self) -> Uuid {
        self.request.request_id
    }

    /// Handle for setting response headers.
    pub fn response(&self) -> &ResponseHandle {
        &self.response
    }

    /// The validated input.
    pub fn input(&self) -> &Value {
        &self.input
    }

    /// Deserialize the validated input into `T`.
    pub fn input_as<T: DeserializeOwned>(&self) -> RpcResult<T> {
        serde_json::from_value(self.input.clone()).map_err(|e| {
            RpcError::bad_request("Input does not match the handler type")
                .with_detail(e.to_string())
        })
    }

    /// All middleware-provided keys.
    pub fn extensions(&self) -> &Map<String, Value> {
        &self.extensions
    }

    /// A middleware-provided key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.extensions.get(key)
    }

    /// A middleware-provided key, deserialized into `T`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> RpcResult<T> {
        let value = self.get(key).ok_or_else(|| {
            RpcError::internal("Missing context value").with_cause(format!("key '{}'", key))
        })?;
        serde_json::from_value(value.clone()).map_err(RpcError::from)
    }

    /// Merge a middleware's contribution; later keys overwrite earlier ones.
    pub(crate) fn extend(&mut self, patch: Map<String, Value>) {
        self.extensions.extend(patch);
    }

    /// Whether the call has been cancelled (e.g. the stream's peer went away).
    pub fn is_cancelled(&self) -> bool {
        self.signal.is_cancelled()
    }

    /// Resolves once the call is cancelled.
    pub async fn cancelled(&self) {
        self.signal.cancelled().await
    }

    pub(crate) fn signal(&self) -> Arc<CancellationSignal> {
        self.signal.clone()
    }
}

impl<S> std::ops::Deref for Context<S> {
    type Target = S;

    fn deref(&self) -> &Self::Target {
        &self.state
    }
}
