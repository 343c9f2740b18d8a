//! Route builder and sealed endpoints
//!
//! [`RouteBuilder`] is an immutable accumulator: every chain call borrows the
//! receiver and returns a new builder, so one base builder can branch into
//! any number of endpoints without the branches seeing each other's changes.
//!
//! # Example
//!
//! ```rust,ignore
//! use http_rpc::prelude::*;
//!
//! let authed = route::<AppState>().middleware(require_user);
//!
//! let get_user = authed
//!     .input(ObjectSchema::new().field("id", Field::integer()))
//!     .output(typed::<User>())
//!     .get(get_user_handler);
//!
//! let delete_user = authed
//!     .input(ObjectSchema::new().field("id", Field::integer()))
//!     .on(RouteHook::AfterMiddlewares, audit_log)
//!     .post(delete_user_handler);
//! ```

use crate::handler::{
    BoxedHandler, BoxedStreamHandler, Handler, StreamHandler, into_boxed, into_boxed_stream,
};
use crate::middleware::{Middleware, MiddlewareFn, from_fn};
use crate::schema::{InputContract, ObjectSchema, OutputContract, Schema};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

// =============================================================================
// Method
// =============================================================================

/// How an endpoint is called and how its result is framed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// Input from the `input` query parameter, single JSON response
    Get,
    /// Input from the request body, single JSON response
    Post,
    /// Input from the `input` query parameter, server-sent event stream
    Sse,
}

impl Method {
    /// The keyword used on the wire and by the client proxy.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Post => "post",
            Self::Sse => "sse",
        }
    }

    /// The HTTP method the endpoint is registered under.
    pub fn http_method(&self) -> http::Method {
        match self {
            Self::Get | Self::Sse => http::Method::GET,
            Self::Post => http::Method::POST,
        }
    }

    /// Whether input is carried in the query string.
    pub fn reads_query(&self) -> bool {
        !matches!(self, Self::Post)
    }

    /// Whether responses are streamed.
    pub fn is_stream(&self) -> bool {
        matches!(self, Self::Sse)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "get" => Ok(Self::Get),
            "post" => Ok(Self::Post),
            "sse" => Ok(Self::Sse),
            other => Err(format!("unknown method keyword '{}'", other)),
        }
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Lifecycle points a route can attach middleware to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteHook {
    /// After every context-producing middleware, right before the handler.
    AfterMiddlewares,
}

/// Immutable, chainable accumulator of contracts and middleware.
pub struct RouteBuilder<S> {
    input: InputContract,
    output: OutputContract,
    middlewares: Vec<MiddlewareFn<S>>,
    after_middlewares: Vec<MiddlewareFn<S>>,
}

impl<S> Clone for RouteBuilder<S> {
    fn clone(&self) -> Self {
        Self {
            input: self.input.clone(),
            output: self.output.clone(),
            middlewares: self.middlewares.clone(),
            after_middlewares: self.after_middlewares.clone(),
        }
    }
}

impl<S: Send + Sync + 'static> Default for RouteBuilder<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// Start a new route for state type `S`.
pub fn route<S: Send + Sync + 'static>() -> RouteBuilder<S> {
    RouteBuilder::new()
}

impl<S: Send + Sync + 'static> RouteBuilder<S> {
    /// Create an empty builder: unset input, any output, no middleware.
    pub fn new() -> Self {
        Self {
            input: InputContract::Unset,
            output: OutputContract::Any,
            middlewares: Vec::new(),
            after_middlewares: Vec::new(),
        }
    }

    /// Merge `schema` into the input contract.
    ///
    /// On an unset contract, `schema` becomes the contract outright.
    pub fn input(&self, schema: ObjectSchema) -> Self {
        let mut next = self.clone();
        next.input = self.input.merge(&schema);
        next
    }

    /// Replace the output contract.
    pub fn output(&self, schema: impl Schema) -> Self {
        let mut next = self.clone();
        next.output = OutputContract::Schema(Arc::new(schema));
        next
    }

    /// Append a context-producing middleware.
    pub fn middleware<M: Middleware<S>>(&self, middleware: M) -> Self {
        let mut next = self.clone();
        next.middlewares.push(from_fn(middleware));
        next
    }

    /// Attach middleware to a lifecycle point.
    pub fn on<M: Middleware<S>>(&self, hook: RouteHook, middleware: M) -> Self {
        let mut next = self.clone();
        match hook {
            RouteHook::AfterMiddlewares => next.after_middlewares.push(from_fn(middleware)),
        }
        next
    }

    /// The input contract accumulated so far.
    pub fn input_contract(&self) -> &InputContract {
        &self.input
    }

    /// The output contract accumulated so far.
    pub fn output_contract(&self) -> &OutputContract {
        &self.output
    }

    /// Seal into a GET endpoint.
    pub fn get<T, H: Handler<S, T>>(&self, handler: H) -> Endpoint<S> {
        self.seal(Method::Get, HandlerKind::Unary(into_boxed(handler)))
    }

    /// Seal into a POST endpoint.
    pub fn post<T, H: Handler<S, T>>(&self, handler: H) -> Endpoint<S> {
        self.seal(Method::Post, HandlerKind::Unary(into_boxed(handler)))
    }

    /// Seal into a streaming endpoint.
    pub fn sse<T, H: StreamHandler<S, T>>(&self, handler: H) -> Endpoint<S> {
        self.seal(Method::Sse, HandlerKind::Stream(into_boxed_stream(handler)))
    }

    fn seal(&self, method: Method, handler: HandlerKind<S>) -> Endpoint<S> {
        let middlewares: Vec<MiddlewareFn<S>> = self
            .middlewares
            .iter()
            .chain(self.after_middlewares.iter())
            .cloned()
            .collect();
        Endpoint {
            method,
            input: self.input.clone(),
            output: self.output.clone(),
            middlewares: middlewares.into(),
            handler,
        }
    }
}

// =============================================================================
// Endpoint
// =============================================================================

pub(crate) enum HandlerKind<S> {
    Unary(BoxedHandler<S>),
    Stream(BoxedStreamHandler<S>),
}

impl<S> Clone for HandlerKind<S> {
    fn clone(&self) -> Self {
        match self {
            Self::Unary(h) => Self::Unary(h.clone()),
            Self::Stream(h) => Self::Stream(h.clone()),
        }
    }
}

/// A sealed route definition. Cannot be reopened into a builder.
pub struct Endpoint<S> {
    method: Method,
    input: InputContract,
    output: OutputContract,
    middlewares: Arc<[MiddlewareFn<S>]>,
    handler: HandlerKind<S>,
}

impl<S> Clone for Endpoint<S> {
    fn clone(&self) -> Self {
        Self {
            method: self.method,
            input: self.input.clone(),
            output: self.output.clone(),
            middlewares: self.middlewares.clone(),
            handler: self.handler.clone(),
        }
    }
}

impl<S> Endpoint<S> {
    /// The endpoint's method.
    pub fn method(&self) -> Method {
        self.method
    }

    /// The input contract.
    pub fn input(&self) -> &InputContract {
        &self.input
    }

    /// The output contract.
    pub fn output(&self) -> &OutputContract {
        &self.output
    }

    /// Number of middlewares run before the handler.
    pub fn middleware_count(&self) -> usize {
        self.middlewares.len()
    }

    pub(crate) fn middlewares(&self) -> &[MiddlewareFn<S>] {
        &self.middlewares
    }

    pub(crate) fn handler(&self) -> &HandlerKind<S> {
        &self.handler
    }
}

impl<S> fmt::Debug for Endpoint<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("method", &self.method)
            .field("input", &self.input)
            .field("output", &self.output)
            .field("middlewares", &self.middlewares.len())
            .finish()
    }
}
