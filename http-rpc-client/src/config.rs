//! Client configuration
//!
//! # Example
//! ```rust,ignore
//! use http_rpc_client::ClientConfig;
//!
//! let config = ClientConfig::new("http://localhost:3000/rpc")
//!     .with_header_provider(|| async {
//!         let mut headers = HeaderMap::new();
//!         headers.insert("authorization", fetch_token().await?.parse()?);
//!         Ok(headers)
//!     })
//!     .on_request(|req| {
//!         tracing::info!(method = %req.method(), url = %req.url(), "Outgoing call");
//!         req
//!     });
//! ```

use crate::error::{ClientError, ClientResult};
use http::{HeaderMap, HeaderName, HeaderValue};
use http_rpc::SharedTransformer;
use http_rpc::transformer::JsonTransformer;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Boxed future returned by async hooks.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Async header provider, evaluated once per call.
pub type HeaderProvider = Arc<dyn Fn() -> BoxFuture<ClientResult<HeaderMap>> + Send + Sync>;

/// Rewrites the outgoing request.
pub type OnRequest = Arc<dyn Fn(reqwest::Request) -> reqwest::Request + Send + Sync>;

/// Rewrites the parsed response.
pub type OnResponse =
    Arc<dyn Fn(ClientResponse) -> BoxFuture<ClientResult<ClientResponse>> + Send + Sync>;

/// Recovers from or rethrows a failed call.
pub type OnError = Arc<dyn Fn(ClientError) -> BoxFuture<ClientResult<Value>> + Send + Sync>;

/// Headers sent with every call.
#[derive(Clone)]
pub enum Headers {
    /// The same headers for every call
    Static(HeaderMap),
    /// Headers computed per call
    Provider(HeaderProvider),
}

impl Default for Headers {
    fn default() -> Self {
        Self::Static(HeaderMap::new())
    }
}

impl Headers {
    /// Evaluate the headers for one call.
    pub async fn resolve(&self) -> ClientResult<HeaderMap> {
        match self {
            Self::Static(headers) => Ok(headers.clone()),
            Self::Provider(provider) => provider().await,
        }
    }
}

/// A parsed unary response, as seen by the `on_response` hook.
#[derive(Debug, Clone)]
pub struct ClientResponse {
    /// HTTP status
    pub status: u16,
    /// Response headers
    pub headers: HeaderMap,
    /// Parsed JSON body (`null` for an empty body)
    pub body: Value,
}

/// Client configuration.
#[derive(Clone)]
pub struct ClientConfig {
    /// Base URL every route path is appended to
    pub url: String,
    /// Payload transformer; must match the server's
    pub transformer: SharedTransformer,
    /// Headers sent with every call
    pub headers: Headers,
    pub(crate) on_request: Option<OnRequest>,
    pub(crate) on_response: Option<OnResponse>,
    pub(crate) on_error: Option<OnError>,
}

impl ClientConfig {
    /// Create a configuration for the server at `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            transformer: Arc::new(JsonTransformer),
            headers: Headers::default(),
            on_request: None,
            on_response: None,
            on_error: None,
        }
    }

    /// Set the payload transformer.
    pub fn with_transformer(mut self, transformer: SharedTransformer) -> Self {
        self.transformer = transformer;
        self
    }

    /// Send the same headers with every call.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = Headers::Static(headers);
        self
    }

    /// Add one header to every call, on top of any configured headers.
    ///
    /// Fails with [`ClientError::Header`] if `name` or `value` is not a valid
    /// header.
    pub fn with_header(mut self, name: &str, value: &str) -> ClientResult<Self> {
        let name = HeaderName::try_from(name)
            .map_err(|e| ClientError::Header(format!("name '{}': {}", name, e)))?;
        let value = HeaderValue::try_from(value)
            .map_err(|e| ClientError::Header(format!("value for '{}': {}", name, e)))?;

        self.headers = match self.headers {
            Headers::Static(mut headers) => {
                headers.insert(name, value);
                Headers::Static(headers)
            }
            Headers::Provider(provider) => Headers::Provider(Arc::new(move || {
                let provider = provider.clone();
                let (name, value) = (name.clone(), value.clone());
                Box::pin(async move {
                    let mut headers = provider().await?;
                    headers.insert(name, value);
                    Ok::<_, ClientError>(headers)
                })
            })),
        };
        Ok(self)
    }

    /// Compute headers before every call.
    pub fn with_header_provider<F, Fut>(mut self, provider: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ClientResult<HeaderMap>> + Send + 'static,
    {
        self.headers = Headers::Provider(Arc::new(move || Box::pin(provider())));
        self
    }

    /// Rewrite each outgoing request.
    pub fn on_request<F>(mut self, hook: F) -> Self
    where
        F: Fn(reqwest::Request) -> reqwest::Request + Send + Sync + 'static,
    {
        self.on_request = Some(Arc::new(hook));
        self
    }

    /// Rewrite each parsed unary response.
    pub fn on_response<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(ClientResponse) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ClientResult<ClientResponse>> + Send + 'static,
    {
        self.on_response = Some(Arc::new(move |res| Box::pin(hook(res))));
        self
    }

    /// Transform or rethrow failures. `Ok(value)` becomes the call's result.
    pub fn on_error<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(ClientError) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ClientResult<Value>> + Send + 'static,
    {
        self.on_error = Some(Arc::new(move |err| Box::pin(hook(err))));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_header_on_static_headers() {
        let config = ClientConfig::new("http://localhost/rpc")
            .with_header("x-api-key", "k1")
            .unwrap();
        let headers = config.headers.resolve().await.unwrap();
        assert_eq!(headers["x-api-key"], "k1");
    }

    #[tokio::test]
    async fn test_with_header_layers_over_provider() {
        let config = ClientConfig::new("http://localhost/rpc")
            .with_header_provider(|| async {
                let mut headers = HeaderMap::new();
                headers.insert("authorization", HeaderValue::from_static("Bearer t"));
                Ok::<_, ClientError>(headers)
            })
            .with_header("x-api-key", "k1")
            .unwrap();
        let headers = config.headers.resolve().await.unwrap();
        assert_eq!(headers["authorization"], "Bearer t");
        assert_eq!(headers["x-api-key"], "k1");
    }

    #[test]
    fn test_invalid_header_rejected() {
        let err = ClientConfig::new("http://localhost/rpc")
            .with_header("bad name", "v")
            .err()
            .unwrap();
        assert!(matches!(err, ClientError::Header(_)));

        let err = ClientConfig::new("http://localhost/rpc")
            .with_header("x-ok", "line\nbreak")
            .err()
            .unwrap();
        assert!(matches!(err, ClientError::Header(_)));
    }
}
