//! Payload transformers
//!
//! A [`DataTransformer`] is applied uniformly to every payload: `deserialize`
//! runs on decoded input before validation, `serialize` runs on validated
//! output right before it is wrapped in the `{ "data": ... }` envelope. The
//! client applies the mirror operations, so both sides must agree.

use crate::RpcResult;
use serde_json::Value;
use std::sync::Arc;

/// Pluggable serialize/deserialize pair for payloads.
pub trait DataTransformer: Send + Sync + 'static {
    /// Convert an outgoing value into its wire form.
    fn serialize(&self, value: Value) -> RpcResult<Value>;

    /// Convert an incoming wire value back into its plain form.
    fn deserialize(&self, value: Value) -> RpcResult<Value>;
}

/// Plain JSON; both directions are the identity.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonTransformer;

impl DataTransformer for JsonTransformer {
    fn serialize(&self, value: Value) -> RpcResult<Value> {
        Ok(value)
    }

    fn deserialize(&self, value: Value) -> RpcResult<Value> {
        Ok(value)
    }
}

/// Shared transformer handle.
pub type SharedTransformer = Arc<dyn DataTransformer>;

/// The default transformer as a shared handle.
pub fn json() -> SharedTransformer {
    Arc::new(JsonTransformer)
}
