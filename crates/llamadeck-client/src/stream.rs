use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use llamadeck_core::{LlamaDeckError, Result};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio_util::sync::CancellationToken;

/// Consumer side of a streaming operation.
///
/// Backed by a bounded channel, so a slow consumer suspends the producer.
/// Cancelling, or dropping the stream, ends the producer task and releases its
/// HTTP connection.
#[derive(Debug)]
pub struct EventStream<T> {
    rx: mpsc::Receiver<T>,
    cancel: CancellationToken,
}

impl<T> EventStream<T> {
    pub(crate) fn channel(capacity: usize, cancel: CancellationToken) -> (mpsc::Sender<T>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self { rx, cancel })
    }

    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Blocking receive for synchronous callers. Panics inside an async context.
    pub fn blocking_recv(&mut self) -> Option<T> {
        self.rx.blocking_recv()
    }

    /// Non-blocking poll for frame-driven UIs.
    pub fn try_recv(&mut self) -> std::result::Result<T, TryRecvError> {
        self.rx.try_recv()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl<T> Stream for EventStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.rx.poll_recv(cx)
    }
}

impl<T> Drop for EventStream<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Send `item` unless the operation was cancelled first. Returns false when the
/// producer should stop.
pub(crate) async fn emit<T>(tx: &mpsc::Sender<T>, cancel: &CancellationToken, item: T) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        sent = tx.send(item) => sent.is_ok(),
    }
}

/// Deliver the final item of a stream. Waits for room even after a cancel, so a
/// consumer still draining always sees it; gives up only once the consumer is gone.
pub(crate) async fn emit_terminal<T>(tx: &mpsc::Sender<T>, item: T) -> bool {
    tokio::select! {
        sent = tx.send(item) => sent.is_ok(),
        _ = tx.closed() => false,
    }
}

/// Run `fut` unless `cancel` fires first.
pub(crate) async fn or_cancel<F: Future>(cancel: &CancellationToken, fut: F) -> Result<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(LlamaDeckError::Cancelled),
        out = fut => Ok(out),
    }
}
