//! Server-sent event consumption
//!
//! A background task reads the response body, splits it into event frames
//! and pushes decoded items into an unbounded queue. The [`EventStream`]
//! handed to the caller drains that queue. Dropping it aborts the task,
//! which drops the connection and lets the server cancel its producer.

use crate::error::{ClientError, ClientResult};
use futures::stream::{FusedStream, Stream, StreamExt};
use http_rpc::SharedTransformer;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

// =============================================================================
// Frame Decoder
// =============================================================================

/// Incremental `text/event-stream` decoder.
///
/// Only `data:` fields are kept; comments and other fields are skipped.
/// Multiple `data:` lines in one frame are joined with `\n`.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes, returning the payload of each completed frame.
    pub(crate) fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw[..raw.len() - 1]);
            let line = line.strip_suffix('\r').unwrap_or(&line);

            if line.is_empty() {
                if !self.data.is_empty() {
                    frames.push(self.data.join("\n"));
                    self.data.clear();
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            if field == "data" {
                self.data.push(value.to_string());
            }
        }

        frames
    }
}

// =============================================================================
// Event Stream
// =============================================================================

/// Items pushed by the server over one streaming call.
///
/// Single-consumer: the stream is not `Clone`. It ends when the server
/// closes the connection. Transport or decode failures are yielded as
/// `Err` items; a transport failure also ends the stream.
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<ClientResult<Value>>,
    task: JoinHandle<()>,
    done: bool,
}

impl EventStream {
    pub(crate) fn spawn(response: reqwest::Response, transformer: SharedTransformer) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let url = response.url().to_string();
        let task = tokio::spawn(pump(response, transformer, tx, url));
        Self {
            rx,
            task,
            done: false,
        }
    }

    /// Deserialize each item into `T`.
    pub fn typed<T>(self) -> impl Stream<Item = ClientResult<T>> + Send + Unpin
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.map(|item| {
            item.and_then(|value| {
                serde_json::from_value(value).map_err(|e| ClientError::Decode {
                    status: 200,
                    message: e.to_string(),
                })
            })
        })
    }

    /// Stop listening. Equivalent to dropping the stream.
    pub fn close(self) {}
}

impl Stream for EventStream {
    type Item = ClientResult<Value>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }
        match self.rx.poll_recv(cx) {
            Poll::Ready(None) => {
                self.done = true;
                Poll::Ready(None)
            }
            other => other,
        }
    }
}

impl FusedStream for EventStream {
    fn is_terminated(&self) -> bool {
        self.done
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

async fn pump(
    response: reqwest::Response,
    transformer: SharedTransformer,
    tx: mpsc::UnboundedSender<ClientResult<Value>>,
    url: String,
) {
    let mut body = response.bytes_stream();
    let mut decoder = SseDecoder::new();
    let mut received = 0usize;

    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(err) => {
                warn!(url = %url, error = %err, "Event stream transport failed");
                let _ = tx.send(Err(ClientError::Http(err)));
                return;
            }
        };

        for frame in decoder.feed(&chunk) {
            let item = decode_frame(&frame, &transformer);
            received += 1;
            trace!(url = %url, item = received, "Event received");
            if tx.send(item).is_err() {
                debug!(url = %url, "Event stream consumer went away");
                return;
            }
        }
    }

    debug!(url = %url, items = received, "Event stream ended");
}

fn decode_frame(frame: &str, transformer: &SharedTransformer) -> ClientResult<Value> {
    let mut envelope: Value = serde_json::from_str(frame).map_err(|e| ClientError::Decode {
        status: 200,
        message: format!("invalid event payload: {}", e),
    })?;
    let data = envelope
        .get_mut("data")
        .map(Value::take)
        .ok_or_else(|| ClientError::Decode {
            status: 200,
            message: "event payload has no 'data' member".to_string(),
        })?;
    transformer.deserialize(data).map_err(ClientError::Transform)
}
