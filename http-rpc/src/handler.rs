//! Handler traits and utilities
//!
//! This module provides the handler abstraction for endpoints. A handler is
//! an async function taking the fully merged [`Context`] and, optionally, the
//! validated input deserialized into a concrete type.

use crate::{Context, RpcResult};
use futures::stream::{BoxStream, Stream, StreamExt};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{trace, warn};

/// Boxed unary handler for type erasure
pub(crate) type BoxedHandler<S> = Arc<
    dyn Fn(Context<S>) -> Pin<Box<dyn Future<Output = RpcResult<Value>> + Send>> + Send + Sync,
>;

/// Boxed stream handler for type erasure
pub(crate) type BoxedStreamHandler<S> =
    Arc<dyn Fn(Context<S>) -> BoxStream<'static, RpcResult<Value>> + Send + Sync>;

/// Trait for unary handler functions
///
/// Automatically implemented for async functions with either signature:
/// - `async fn(Context<S>) -> RpcResult<Output>`
/// - `async fn(Context<S>, Input) -> RpcResult<Output>`
///
/// `T` is a marker that keeps the two forms apart.
pub trait Handler<S, T>: Clone + Send + Sync + 'static {
    /// Call the handler, producing an untyped output value.
    fn call(&self, ctx: Context<S>) -> Pin<Box<dyn Future<Output = RpcResult<Value>> + Send>>;
}

impl<S, F, Fut, O> Handler<S, ()> for F
where
    S: Send + Sync + 'static,
    F: Fn(Context<S>) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = RpcResult<O>> + Send + 'static,
    O: Serialize + Send + 'static,
{
    fn call(&self, ctx: Context<S>) -> Pin<Box<dyn Future<Output = RpcResult<Value>> + Send>> {
        let fut = (self)(ctx);
        Box::pin(async move { to_output(fut.await?) })
    }
}

impl<S, F, Fut, I, O> Handler<S, (I,)> for F
where
    S: Send + Sync + 'static,
    F: Fn(Context<S>, I) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = RpcResult<O>> + Send + 'static,
    I: DeserializeOwned + Send + 'static,
    O: Serialize + Send + 'static,
{
    fn call(&self, ctx: Context<S>) -> Pin<Box<dyn Future<Output = RpcResult<Value>> + Send>> {
        let handler = self.clone();
        Box::pin(async move {
            trace!("Deserializing handler input");
            let input: I = ctx.input_as().inspect_err(|e| {
                warn!(error = %e, "Handler input deserialization failed");
            })?;
            to_output(handler(ctx, input).await?)
        })
    }
}

fn to_output<O: Serialize>(output: O) -> RpcResult<Value> {
    serde_json::to_value(output).map_err(|e| {
        warn!(error = %e, "Handler output serialization failed");
        e.into()
    })
}

/// Convert a handler into a boxed handler for storage
pub(crate) fn into_boxed<S, T, H>(handler: H) -> BoxedHandler<S>
where
    S: Send + Sync + 'static,
    H: Handler<S, T>,
{
    Arc::new(move |ctx| handler.call(ctx))
}

/// Trait for stream-producing handler functions
///
/// Automatically implemented for functions returning a [`Stream`] of
/// `RpcResult<Output>` items, with either signature:
/// - `fn(Context<S>) -> impl Stream`
/// - `fn(Context<S>, Input) -> impl Stream`
///
/// The handler owns pacing and termination. It may run forever; check
/// [`Context::is_cancelled`] to notice a peer that went away.
pub trait StreamHandler<S, T>: Clone + Send + Sync + 'static {
    /// Open the handler's sequence.
    fn open(&self, ctx: Context<S>) -> BoxStream<'static, RpcResult<Value>>;
}

impl<S, F, St, O> StreamHandler<S, ()> for F
where
    S: Send + Sync + 'static,
    F: Fn(Context<S>) -> St + Clone + Send + Sync + 'static,
    St: Stream<Item = RpcResult<O>> + Send + 'static,
    O: Serialize + Send + 'static,
{
    fn open(&self, ctx: Context<S>) -> BoxStream<'static, RpcResult<Value>> {
        (self)(ctx)
            .map(|item| item.and_then(to_output))
            .boxed()
    }
}

impl<S, F, St, I, O> StreamHandler<S, (I,)> for F
where
    S: Send + Sync + 'static,
    F: Fn(Context<S>, I) -> St + Clone + Send + Sync + 'static,
    St: Stream<Item = RpcResult<O>> + Send + 'static,
    I: DeserializeOwned + Send + 'static,
    O: Serialize + Send + 'static,
{
    fn open(&self, ctx: Context<S>) -> BoxStream<'static, RpcResult<Value>> {
        match ctx.input_as::<I>() {
            Ok(input) => (self)(ctx, input)
                .map(|item| item.and_then(to_output))
                .boxed(),
            Err(e) => {
                warn!(error = %e, "Stream handler input deserialization failed");
                futures::stream::once(async move { Err(e) }).boxed()
            }
        }
    }
}

/// Convert a stream handler into a boxed handler for storage
pub(crate) fn into_boxed_stream<S, T, H>(handler: H) -> BoxedStreamHandler<S>
where
    S: Send + Sync + 'static,
    H: StreamHandler<S, T>,
{
    Arc::new(move |ctx| handler.open(ctx))
}
