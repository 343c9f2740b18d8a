//! Shared fixtures: a small users API with a protected branch.

use crate::dispatch::{Dispatcher, RawRequest, Reply};
use crate::prelude::*;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// State shared by every call.
#[derive(Default)]
pub struct AppState {
    /// Number of times a protected handler ran
    pub handler_calls: AtomicUsize,
}

impl AppState {
    pub fn calls(&self) -> usize {
        self.handler_calls.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateUser {
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct Tick {
    pub n: u32,
}

pub async fn require_token(ctx: Context<AppState>) -> RpcResult<Value> {
    let token = ctx
        .header("authorization")
        .ok_or_else(|| RpcError::unauthorized("Missing token"))?;
    Ok(json!({ "userToken": token }))
}

async fn version(_ctx: Context<AppState>) -> RpcResult<Value> {
    Ok(json!({ "version": "1.0.0" }))
}

async fn list_users(ctx: Context<AppState>) -> RpcResult<Value> {
    ctx.handler_calls.fetch_add(1, Ordering::SeqCst);
    Ok(json!({
        "users": [{ "id": 1, "name": "Alice" }, { "id": 2, "name": "Bob" }],
        "userToken": ctx.get("userToken"),
    }))
}

async fn create_user(ctx: Context<AppState>, input: CreateUser) -> RpcResult<Value> {
    ctx.handler_calls.fetch_add(1, Ordering::SeqCst);
    Ok(json!({ "id": 1, "name": input.name, "password": "123456" }))
}

async fn update_user(_ctx: Context<AppState>) -> RpcResult<Value> {
    Err(RpcError::not_implemented("Not implemented"))
}

/// Yields `count` ticks, then ends.
pub fn ticks(
    _ctx: Context<AppState>,
    input: TicksInput,
) -> impl futures::Stream<Item = RpcResult<Tick>> + Send {
    futures::stream::iter((0..input.count).map(|n| Ok(Tick { n })))
}

#[derive(Debug, Deserialize)]
pub struct TicksInput {
    pub count: u32,
}

pub fn demo_router() -> Router<AppState> {
    let public = route::<AppState>();
    let protected = public.middleware(require_token);

    Router::new()
        .route("version", public.get(version))
        .route(
            "users",
            Router::new()
                .route("list", protected.get(list_users))
                .route(
                    "create",
                    protected
                        .input(ObjectSchema::new().field("name", Field::string()))
                        .output(
                            ObjectSchema::new()
                                .field("id", Field::integer())
                                .field("name", Field::string()),
                        )
                        .post(create_user),
                )
                .route("update", public.get(update_user)),
        )
        .route(
            "ticks",
            public
                .input(ObjectSchema::new().field("count", Field::integer().min(0.0)))
                .output(typed::<Tick>())
                .sse(ticks),
        )
}

pub fn dispatcher() -> (Arc<AppState>, Dispatcher<AppState>) {
    let state = Arc::new(AppState::default());
    let dispatcher = Dispatcher::new(state.clone())
        .with_config(RpcConfig::new().with_development_mode(true));
    (state, dispatcher)
}

pub fn authed(request: RawRequest) -> RawRequest {
    request.with_header("authorization", "Bearer t0k3n")
}

/// Unwraps a unary reply into `(status, data)`.
pub fn unary(reply: Reply) -> (u16, Value) {
    match reply {
        Reply::Unary { status, body, .. } => (status, body["data"].clone()),
        other => panic!("expected unary reply, got {:?}", other),
    }
}

/// Unwraps an error reply into its problem document.
pub fn problem(reply: Reply) -> ProblemDetails {
    match reply {
        Reply::Error { problem, .. } => problem,
        other => panic!("expected error reply, got {:?}", other),
    }
}

/// Drains a stream reply into its envelopes.
pub async fn drain(reply: Reply) -> Vec<Value> {
    match reply {
        Reply::Stream { events, .. } => events.collect().await,
        other => panic!("expected stream reply, got {:?}", other),
    }
}
