//! axum host binding
//!
//! Flattens a [`Router`] tree and registers one axum route per endpoint.
//!
//! # Example
//!
//! ```rust,ignore
//! use http_rpc::prelude::*;
//!
//! let app = RpcServer::new(app_router(), AppState::default())
//!     .config(RpcConfig::new().with_prefix("/rpc"))
//!     .on_error(|body: ProblemDetails, _err: &DispatchError| Ok(Some(body)))
//!     .into_router();
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, app).await?;
//! ```

use crate::config::{ConfigError, RpcConfig};
use crate::dispatch::{Dispatcher, RawRequest, Reply};
use crate::error::{DispatchError, RpcError};
use crate::problem::{ErrorHook, PROBLEM_CONTENT_TYPE, ProblemDetails};
use crate::route::{Endpoint, Method};
use crate::router::Router;
use crate::transformer::SharedTransformer;
use axum::extract::Request;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::StreamExt;
use http::header::{CONNECTION, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue, StatusCode};
use std::convert::Infallible;
use std::error::Error as StdError;
use std::sync::Arc;
use tracing::{debug, info};

/// A web server that endpoints can be registered with.
pub trait Host<S>: Sized {
    /// Register `endpoint` at `path`, served by `dispatcher`.
    fn register(self, path: &str, endpoint: Endpoint<S>, dispatcher: Dispatcher<S>) -> Self;
}

impl<S: Send + Sync + 'static> Host<S> for axum::Router {
    fn register(self, path: &str, endpoint: Endpoint<S>, dispatcher: Dispatcher<S>) -> Self {
        let method = endpoint.method();
        let handler = move |request: Request| async move {
            serve(dispatcher, endpoint, request).await
        };
        let method_router = match method {
            Method::Get | Method::Sse => axum::routing::get(handler.clone()),
            Method::Post => axum::routing::post(handler.clone()),
        }
        // Any other method reaches the dispatcher, which answers METHOD_NOT_SUPPORTED.
        .fallback(handler);
        self.route(path, method_router)
    }
}

/// Register every endpoint of `router` under `prefix`.
pub fn register_routes<S, H>(
    host: H,
    prefix: &str,
    router: &Router<S>,
    dispatcher: &Dispatcher<S>,
) -> H
where
    S: Send + Sync + 'static,
    H: Host<S>,
{
    router
        .flatten(prefix)
        .into_iter()
        .fold(host, |host, (path, endpoint)| {
            debug!(path = %path, method = %endpoint.method(), "Registering route");
            host.register(&path, endpoint, dispatcher.clone())
        })
}

/// Builder tying a router tree, its state and its configuration to axum.
pub struct RpcServer<S> {
    router: Router<S>,
    dispatcher: Dispatcher<S>,
}

impl<S: Send + Sync + 'static> RpcServer<S> {
    /// Create a server for `router` over shared `state`.
    pub fn new(router: Router<S>, state: S) -> Self {
        Self {
            router,
            dispatcher: Dispatcher::new(Arc::new(state)),
        }
    }

    /// Set the configuration.
    pub fn config(mut self, config: RpcConfig) -> Self {
        self.dispatcher = self.dispatcher.with_config(config);
        self
    }

    /// Set the data transformer.
    pub fn transformer(mut self, transformer: SharedTransformer) -> Self {
        self.dispatcher = self.dispatcher.with_transformer(transformer);
        self
    }

    /// Set the error hook.
    pub fn on_error(mut self, hook: impl ErrorHook) -> Self {
        self.dispatcher = self.dispatcher.with_error_hook(hook);
        self
    }

    /// Build the axum router.
    ///
    /// Unknown paths answer with a `NOT_FOUND` problem document.
    ///
    /// # Panics
    ///
    /// Panics if the configuration is invalid. Use
    /// [`try_into_router`](Self::try_into_router) to handle that case.
    pub fn into_router(self) -> axum::Router {
        match self.try_into_router() {
            Ok(app) => app,
            Err(e) => panic!("Invalid RPC configuration: {}", e),
        }
    }

    /// Build the axum router, rejecting an invalid configuration.
    pub fn try_into_router(self) -> Result<axum::Router, ConfigError> {
        self.dispatcher.config().validate()?;
        let prefix = self.dispatcher.config().prefix.clone();
        let app = register_routes(axum::Router::new(), &prefix, &self.router, &self.dispatcher);
        info!(
            routes = self.router.routes().len(),
            prefix = %prefix,
            "RPC routes registered"
        );
        let dispatcher = self.dispatcher;
        Ok(app.fallback(move |request: Request| async move {
            let path = request.uri().path().to_string();
            let err = RpcError::not_found("Route not found").with_detail(path.clone());
            into_response(dispatcher.reject(&err.into(), &path))
        }))
    }
}

async fn serve<S: Send + Sync + 'static>(
    dispatcher: Dispatcher<S>,
    endpoint: Endpoint<S>,
    request: Request,
) -> Response {
    let (parts, body) = request.into_parts();
    let path = parts.uri.path().to_string();

    let body = match axum::body::to_bytes(body, dispatcher.config().max_input_size).await {
        Ok(body) => body,
        Err(e) => {
            let err: DispatchError = if is_length_limit(&e) {
                RpcError::payload_too_large("Input exceeds maximum size").into()
            } else {
                RpcError::bad_request("Failed to read request body")
                    .with_cause(e.to_string())
                    .into()
            };
            return into_response(dispatcher.reject(&err, &path));
        }
    };

    let raw = RawRequest {
        method: parts.method,
        path,
        headers: parts.headers,
        query: parts.uri.query().map(str::to_string),
        body,
    };
    into_response(dispatcher.dispatch(&endpoint, raw).await)
}

fn is_length_limit(err: &axum::Error) -> bool {
    let mut source: Option<&(dyn StdError + 'static)> = err.source();
    while let Some(e) = source {
        if e.is::<http_body_util::LengthLimitError>() {
            return true;
        }
        source = e.source();
    }
    false
}

/// Write a [`Reply`] as an axum response.
pub fn into_response(reply: Reply) -> Response {
    match reply {
        Reply::Unary {
            status,
            headers,
            body,
        } => {
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::OK);
            with_headers((status, Json(body)).into_response(), headers)
        }
        Reply::Error { headers, problem } => {
            let mut response = with_headers(problem_response(problem), headers);
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static(PROBLEM_CONTENT_TYPE));
            response
        }
        Reply::Stream { headers, events } => {
            let events = events.map(|envelope| Ok::<_, Infallible>(Event::default().data(envelope.to_string())));
            let mut response = Sse::new(events)
                .keep_alive(KeepAlive::default())
                .into_response();
            response
                .headers_mut()
                .insert(CONNECTION, HeaderValue::from_static("keep-alive"));
            with_headers(response, headers)
        }
    }
}

fn problem_response(problem: ProblemDetails) -> Response {
    let status = StatusCode::from_u16(problem.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(problem)).into_response()
}

fn with_headers(mut response: Response, headers: HeaderMap) -> Response {
    response.headers_mut().extend(headers);
    response
}
