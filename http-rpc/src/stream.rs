//! Streaming support: cancellation and connection lifetime tracking

use std::fmt;
use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;
use tracing::debug;
use uuid::Uuid;

/// Cancellation signal shared between a call and its handler.
#[derive(Debug)]
pub struct CancellationSignal {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancellationSignal {
    /// Create a new cancellation signal
    pub fn new() -> Self {
        Self {
            cancelled: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Cancel the signal
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Check if cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Wait until cancelled
    pub async fn cancelled(&self) {
        let mut notified = pin!(self.notify.notified());
        // Register before checking the flag so a concurrent cancel is not missed.
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

impl Default for CancellationSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Why a stream stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The handler's sequence ended
    Completed,
    /// The peer went away before the sequence ended
    Cancelled,
    /// An item failed validation or the handler raised an error
    Failed,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Owns the lifetime of one streaming response.
///
/// Dropping the guard fires the call's cancellation signal, whatever the
/// exit path. A guard dropped without [`StreamGuard::finish`] is reported as
/// cancelled, which is what a peer disconnect looks like from here.
pub(crate) struct StreamGuard {
    id: Uuid,
    path: String,
    signal: Arc<CancellationSignal>,
    items: usize,
    reason: CloseReason,
}

impl StreamGuard {
    pub(crate) fn open(path: &str, signal: Arc<CancellationSignal>) -> Self {
        let id = Uuid::now_v7();
        debug!(stream_id = %id, path = %path, "Stream opened");
        Self {
            id,
            path: path.to_string(),
            signal,
            items: 0,
            reason: CloseReason::Cancelled,
        }
    }

    pub(crate) fn pushed(&mut self) {
        self.items += 1;
    }

    pub(crate) fn finish(&mut self, reason: CloseReason) {
        self.reason = reason;
    }

    pub(crate) fn items(&self) -> usize {
        self.items
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.signal.cancel();
        debug!(
            stream_id = %self.id,
            path = %self.path,
            items = self.items,
            reason = %self.reason,
            "Stream closed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancelled_resolves_after_cancel() {
        let signal = Arc::new(CancellationSignal::new());
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.cancelled().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        signal.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should resolve")
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_returns_immediately_when_already_cancelled() {
        let signal = CancellationSignal::new();
        signal.cancel();
        signal.cancelled().await;
        assert!(signal.is_cancelled());
    }

    #[test]
    fn test_guard_drop_cancels_signal() {
        let signal = Arc::new(CancellationSignal::new());
        {
            let mut guard = StreamGuard::open("ticks", signal.clone());
            guard.pushed();
            assert_eq!(guard.items(), 1);
            assert!(!signal.is_cancelled());
        }
        assert!(signal.is_cancelled());
    }
}
