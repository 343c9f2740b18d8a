#![warn(missing_docs)]
//! # HTTP RPC
//!
//! A typed request/response and streaming RPC layer for HTTP servers.
//!
//! ## Overview
//!
//! This crate provides:
//! - **Immutable route builders** accumulating input/output contracts and middleware
//! - **Router trees** addressed by `/`-joined path segments
//! - **A dispatch pipeline** that validates, widens context, handles and strips output
//! - **Server-push streaming** over server-sent events
//! - **Structured errors** with a closed code set and Problem-Details bodies
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     Host web server (axum)                   │
//! │   GET /users/get?input=…   POST /users/create   GET /ticks   │
//! └───────────────────────────────┬──────────────────────────────┘
//!                                 │ RawRequest
//!                                 ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Dispatcher                          │
//! │  input → transformer → schema → middlewares → handler        │
//! │        → output schema (strips) → transformer → { data }     │
//! └───────────────────────────────┬──────────────────────────────┘
//!                                 │ Reply (unary | stream | error)
//!                                 ▼
//!                       JSON / text/event-stream /
//!                       application/problem+json
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use http_rpc::prelude::*;
//! use serde_json::json;
//!
//! #[derive(Default)]
//! struct AppState;
//!
//! let base = route::<AppState>();
//!
//! let router = Router::new()
//!     .route("health", base.get(|_ctx: Context<AppState>| async { Ok(json!({"ok": true})) }))
//!     .route(
//!         "users",
//!         Router::new().route(
//!             "create",
//!             base.input(ObjectSchema::new().field("name", Field::string().min_length(2)))
//!                 .output(ObjectSchema::new().field("id", Field::integer()).field("name", Field::string()))
//!                 .post(create_user),
//!         ),
//!     );
//!
//! let app = RpcServer::new(router, AppState).into_router();
//! ```

pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod export;
pub mod handler;
pub mod middleware;
pub mod problem;
pub mod route;
pub mod router;
pub mod schema;
#[cfg(feature = "axum")]
pub mod server;
pub mod stream;
pub mod transformer;

#[cfg(test)]
mod tests;

pub use config::{ConfigError, RpcConfig};
pub use context::{Context, RequestParts, ResponseHandle};
pub use dispatch::{Dispatcher, RawRequest, Reply, Stage};
pub use error::{DispatchError, RpcError, RpcErrorCode, RpcResult, status_for_code};
pub use export::{RouteSchema, RouterSchema};
pub use handler::{Handler, StreamHandler};
pub use middleware::{ContextPatch, IntoContextPatch, Middleware, MiddlewareFn};
pub use problem::{BoxError, ErrorBoundary, ErrorHook, PROBLEM_CONTENT_TYPE, ProblemDetails};
pub use route::{Endpoint, Method, RouteBuilder, RouteHook, route};
pub use router::{Node, RouteInfo, Router};
pub use schema::{Field, InputContract, Issue, ObjectSchema, OutputContract, Schema, Typed, typed};
#[cfg(feature = "axum")]
pub use server::{Host, RpcServer, register_routes};
pub use stream::CancellationSignal;
pub use transformer::{DataTransformer, JsonTransformer, SharedTransformer};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        // Context
        Context,
        // Errors
        DispatchError,
        // Schema
        Field,
        // Router
        Method,
        ObjectSchema,
        ProblemDetails,
        RouteHook,
        Router,
        RpcConfig,
        RpcError,
        RpcErrorCode,
        RpcResult,
        // Functions
        route,
        typed,
    };

    #[cfg(feature = "axum")]
    pub use crate::RpcServer;
}
