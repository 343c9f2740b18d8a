//! # http-rpc-client
//!
//! Dynamic client for routers served by `http-rpc`.
//!
//! Calls are built by accumulating path segments; the final segment names the
//! method. Unary calls resolve to the `data` member of the response envelope,
//! failures to a [`ClientError`] carrying the server's Problem-Details body,
//! and `sse` calls to an [`EventStream`] of pushed items.
//!
//! ```rust,ignore
//! use http_rpc_client::prelude::*;
//!
//! let client = Client::new(ClientConfig::new("http://localhost:3000/rpc"));
//! let version: String = client.segment("version").get(()).await?;
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod proxy;
pub mod sse;

pub use config::{ClientConfig, ClientResponse, Headers};
pub use error::{ClientError, ClientResult};
pub use proxy::{CallOutput, Client, Node};
pub use sse::EventStream;

/// Common imports.
pub mod prelude {
    pub use crate::{CallOutput, Client, ClientConfig, ClientError, ClientResult, EventStream, Node};
}
