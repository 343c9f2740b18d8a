//! Path-accumulating client
//!
//! A [`Node`] records route segments. The last segment of a call names the
//! method (`get`, `post` or `sse`); everything before it is the route path.
//!
//! ```rust,ignore
//! let client = Client::new(ClientConfig::new("http://localhost:3000/rpc"));
//! let users = client.segment("users");
//!
//! // GET /rpc/users/list
//! let list: Vec<User> = users.segment("list").get(()).await?;
//!
//! // POST /rpc/users/create
//! let user: User = users.segment("create").post(&CreateUser { name }).await?;
//!
//! // GET /rpc/ticks (text/event-stream)
//! let mut ticks = client.segment("ticks").sse::<Tick>(()).await?;
//! while let Some(tick) = ticks.next().await { /* ... */ }
//! ```

use crate::config::{ClientConfig, ClientResponse};
use crate::error::{ClientError, ClientResult};
use crate::sse::EventStream;
use futures::Stream;
use http::HeaderMap;
use http_rpc::{Method, ProblemDetails};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

// =============================================================================
// Client
// =============================================================================

/// Entry point: holds the configuration and the HTTP connection pool.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http: reqwest::Client,
    config: ClientConfig,
}

impl Client {
    /// Create a client with a default `reqwest` client.
    pub fn new(config: ClientConfig) -> Self {
        Self::with_http_client(config, reqwest::Client::new())
    }

    /// Create a client over an existing `reqwest` client.
    pub fn with_http_client(config: ClientConfig, http: reqwest::Client) -> Self {
        Self {
            inner: Arc::new(ClientInner { http, config }),
        }
    }

    /// The client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Start a path at `name`.
    pub fn segment(&self, name: impl Into<String>) -> Node {
        Node {
            client: self.clone(),
            path: vec![name.into()],
        }
    }
}

// =============================================================================
// Node
// =============================================================================

/// A partially built call path.
///
/// Extending a node never mutates it, so a node can be shared as a prefix.
#[derive(Clone)]
pub struct Node {
    client: Client,
    path: Vec<String>,
}

/// What a call produced.
#[derive(Debug)]
pub enum CallOutput {
    /// The unwrapped `data` of a unary response
    Data(Value),
    /// The items of a streaming response
    Stream(EventStream),
}

impl CallOutput {
    /// The unary payload, or an error for a stream.
    pub fn into_data(self) -> ClientResult<Value> {
        match self {
            Self::Data(value) => Ok(value),
            Self::Stream(_) => Err(ClientError::Decode {
                status: 200,
                message: "expected a unary response, got a stream".to_string(),
            }),
        }
    }

    /// The stream, or an error for a unary payload.
    pub fn into_stream(self) -> ClientResult<EventStream> {
        match self {
            Self::Stream(stream) => Ok(stream),
            Self::Data(_) => Err(ClientError::Decode {
                status: 200,
                message: "expected a stream, got a unary response".to_string(),
            }),
        }
    }
}

impl Node {
    /// Append a segment, returning the extended node.
    pub fn segment(&self, name: impl Into<String>) -> Node {
        let mut path = self.path.clone();
        path.push(name.into());
        Node {
            client: self.client.clone(),
            path,
        }
    }

    /// Segments accumulated so far.
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Invoke the call. The last segment names the method.
    pub async fn invoke(&self, input: Option<Value>) -> ClientResult<CallOutput> {
        let config = &self.client.inner.config;
        match self.execute(input).await {
            Ok(output) => Ok(output),
            Err(err) => match &config.on_error {
                Some(hook) => hook(err).await.map(CallOutput::Data),
                None => Err(err),
            },
        }
    }

    /// Append `method` and invoke.
    pub async fn call(&self, method: &str, input: Option<Value>) -> ClientResult<CallOutput> {
        self.segment(method).invoke(input).await
    }

    /// Typed GET. Pass `()` for no input.
    pub async fn get<O>(&self, input: impl Serialize) -> ClientResult<O>
    where
        O: DeserializeOwned,
    {
        let output = self.call("get", Some(to_value(input)?)).await?;
        from_value(output.into_data()?)
    }

    /// Typed POST. Pass `()` for no input.
    pub async fn post<O>(&self, input: impl Serialize) -> ClientResult<O>
    where
        O: DeserializeOwned,
    {
        let output = self.call("post", Some(to_value(input)?)).await?;
        from_value(output.into_data()?)
    }

    /// Typed stream subscription. Pass `()` for no input.
    pub async fn sse<O>(
        &self,
        input: impl Serialize,
    ) -> ClientResult<impl Stream<Item = ClientResult<O>> + Send + Unpin>
    where
        O: DeserializeOwned + Send + 'static,
    {
        let output = self.call("sse", Some(to_value(input)?)).await?;
        Ok(output.into_stream()?.typed::<O>())
    }

    async fn execute(&self, input: Option<Value>) -> ClientResult<CallOutput> {
        let inner = &self.client.inner;
        let config = &inner.config;

        let (keyword, route) = self.path.split_last().ok_or(ClientError::EmptyPath)?;
        let method: Method = keyword
            .parse()
            .map_err(|_| ClientError::UnknownMethod(keyword.clone()))?;
        if route.is_empty() {
            return Err(ClientError::EmptyPath);
        }

        let url = format!("{}/{}", config.url.trim_end_matches('/'), route.join("/"));
        let input = match input {
            Some(value) if !value.is_null() => Some(
                config
                    .transformer
                    .serialize(value)
                    .map_err(ClientError::Transform)?,
            ),
            _ => None,
        };
        let headers = config.headers.resolve().await?;

        let mut builder = match method {
            Method::Get | Method::Sse => {
                let mut builder = inner.http.get(&url);
                if let Some(input) = &input {
                    builder = builder.query(&[("input", input.to_string())]);
                }
                builder
            }
            Method::Post => {
                let builder = inner.http.post(&url);
                match &input {
                    Some(input) => builder.json(input),
                    None => builder,
                }
            }
        };
        if method == Method::Sse {
            builder = builder.header(http::header::ACCEPT, "text/event-stream");
        }

        let mut request = builder.headers(headers).build()?;
        if let Some(hook) = &config.on_request {
            request = hook(request);
        }

        debug!(method = %method, url = %url, "Calling procedure");
        let response = inner.http.execute(request).await.map_err(|err| {
            warn!(method = %method, url = %url, error = %err, "Transport failed");
            ClientError::Http(err)
        })?;

        let status = response.status();
        if method == Method::Sse && status.is_success() {
            return Ok(CallOutput::Stream(EventStream::spawn(
                response,
                config.transformer.clone(),
            )));
        }

        let headers = response.headers().clone();
        let bytes = response.bytes().await?;
        let body = parse_body(status.as_u16(), &bytes)?;

        let mut parsed = ClientResponse {
            status: status.as_u16(),
            headers,
            body,
        };
        if let Some(hook) = &config.on_response {
            parsed = hook(parsed).await?;
        }

        if (200..300).contains(&parsed.status) {
            let data = parsed
                .body
                .get_mut("data")
                .map(Value::take)
                .unwrap_or(Value::Null);
            let data = config
                .transformer
                .deserialize(data)
                .map_err(ClientError::Transform)?;
            return Ok(CallOutput::Data(data));
        }

        Err(rpc_error(parsed.status, &parsed.headers, parsed.body))
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node").field("path", &self.path).finish()
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn parse_body(status: u16, bytes: &[u8]) -> ClientResult<Value> {
    if bytes.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_slice(bytes).map_err(|e| ClientError::Decode {
        status,
        message: format!("response body is not JSON: {}", e),
    })
}

fn rpc_error(status: u16, headers: &HeaderMap, body: Value) -> ClientError {
    match serde_json::from_value::<ProblemDetails>(body) {
        Ok(problem) => {
            debug!(
                status,
                code = %problem.code,
                content_type = ?headers.get(http::header::CONTENT_TYPE),
                "Procedure failed"
            );
            ClientError::Rpc { status, problem }
        }
        Err(e) => ClientError::Decode {
            status,
            message: format!("error body is not a problem document: {}", e),
        },
    }
}

fn to_value(input: impl Serialize) -> ClientResult<Value> {
    serde_json::to_value(input).map_err(|e| ClientError::Encode(e.to_string()))
}

fn from_value<O: DeserializeOwned>(value: Value) -> ClientResult<O> {
    serde_json::from_value(value).map_err(|e| ClientError::Decode {
        status: 200,
        message: format!("output does not match the expected type: {}", e),
    })
}
