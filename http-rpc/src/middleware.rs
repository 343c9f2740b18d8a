//! Middleware support for context accumulation
//!
//! A middleware receives the context accumulated so far and either returns
//! nothing or a key-map that is merged into the context for every later
//! middleware and the handler. Raising an error short-circuits the call.

use crate::{Context, RpcError, RpcResult};
use serde_json::{Map, Value};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::trace;

/// Keys a middleware contributes to the context.
pub type ContextPatch = Map<String, Value>;

/// Middleware function type
pub type MiddlewareFn<S> = Arc<
    dyn Fn(Context<S>) -> Pin<Box<dyn Future<Output = RpcResult<Option<ContextPatch>>> + Send>>
        + Send
        + Sync,
>;

/// Values a middleware may return.
pub trait IntoContextPatch {
    /// Convert into an optional patch.
    fn into_patch(self) -> RpcResult<Option<ContextPatch>>;
}

impl IntoContextPatch for () {
    fn into_patch(self) -> RpcResult<Option<ContextPatch>> {
        Ok(None)
    }
}

impl IntoContextPatch for ContextPatch {
    fn into_patch(self) -> RpcResult<Option<ContextPatch>> {
        Ok(Some(self))
    }
}

impl IntoContextPatch for Option<ContextPatch> {
    fn into_patch(self) -> RpcResult<Option<ContextPatch>> {
        Ok(self)
    }
}

/// `null` contributes nothing; anything other than an object is rejected.
impl IntoContextPatch for Value {
    fn into_patch(self) -> RpcResult<Option<ContextPatch>> {
        match self {
            Value::Null => Ok(None),
            Value::Object(map) => Ok(Some(map)),
            other => Err(RpcError::internal("Middleware returned a non-object value")
                .with_cause(format!("got {}", other))),
        }
    }
}

/// Trait for implementing custom middleware
pub trait Middleware<S>: Send + Sync + 'static {
    /// Run against the accumulated context.
    fn handle(
        &self,
        ctx: Context<S>,
    ) -> Pin<Box<dyn Future<Output = RpcResult<Option<ContextPatch>>> + Send>>;
}

/// Implemented for async closures and functions.
///
/// # Example
/// ```rust,ignore
/// let route = route.middleware(|ctx: Context<AppState>| async move {
///     let user = authenticate(ctx.header("authorization"))?;
///     Ok(json!({ "user": user }))
/// });
/// ```
impl<S, F, Fut, R> Middleware<S> for F
where
    S: Send + Sync + 'static,
    F: Fn(Context<S>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = RpcResult<R>> + Send + 'static,
    R: IntoContextPatch,
{
    fn handle(
        &self,
        ctx: Context<S>,
    ) -> Pin<Box<dyn Future<Output = RpcResult<Option<ContextPatch>>> + Send>> {
        let fut = self(ctx);
        Box::pin(async move { fut.await?.into_patch() })
    }
}

/// Box a middleware for storage.
pub fn from_fn<S, M>(middleware: M) -> MiddlewareFn<S>
where
    S: Send + Sync + 'static,
    M: Middleware<S>,
{
    Arc::new(move |ctx| middleware.handle(ctx))
}

/// Run middlewares strictly in order, widening `ctx` after each one.
///
/// The first error stops the chain; no later middleware runs.
pub(crate) async fn run_middlewares<S>(
    mut ctx: Context<S>,
    middlewares: &[MiddlewareFn<S>],
) -> RpcResult<Context<S>>
where
    S: Send + Sync + 'static,
{
    for (index, middleware) in middlewares.iter().enumerate() {
        trace!(index, "Running middleware");
        if let Some(patch) = middleware(ctx.clone()).await? {
            trace!(index, keys = ?patch.keys().collect::<Vec<_>>(), "Middleware extended context");
            ctx.extend(patch);
        }
    }
    Ok(ctx)
}
