//! Close rendezvous shared by the server and client loops.
//!
//! The owning loop is the only code that ever closes the listener or
//! connection. `close()` callers send a reply channel to the loop and wait;
//! the loop answers only after the resource is released.

use std::future::Future;
use std::io;

use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

pub(crate) type CloseResult = io::Result<()>;
pub(crate) type CloseAck = oneshot::Sender<CloseResult>;

/// Sending half of the close rendezvous, published in the lifecycle state.
#[derive(Debug, Clone)]
pub(crate) struct Closer {
    tx: mpsc::Sender<CloseAck>,
}

pub(crate) fn channel() -> (Closer, mpsc::Receiver<CloseAck>) {
    let (tx, rx) = mpsc::channel(4);
    (Closer { tx }, rx)
}

impl Closer {
    /// Ask the owning loop to close and wait for its acknowledgment.
    ///
    /// If the loop is already gone the resource went with it, so this is Ok.
    pub(crate) async fn request(&self) -> CloseResult {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(ack_tx).await.is_err() {
            return Ok(());
        }
        ack_rx.await.unwrap_or(Ok(()))
    }
}

/// What cut a loop wait short.
pub(crate) enum Interrupt {
    Requested(CloseAck),
    Cancelled,
}

impl Interrupt {
    pub(crate) fn acknowledge(self, result: &CloseResult) {
        if let Interrupt::Requested(ack) = self {
            let _ = ack.send(duplicate(result));
        }
    }
}

/// Await `fut` unless a close request or external cancellation comes first.
pub(crate) async fn interruptible<F: Future>(
    close_rx: &mut mpsc::Receiver<CloseAck>,
    shutdown: &CancellationToken,
    fut: F,
) -> Result<F::Output, Interrupt> {
    tokio::select! {
        biased;
        Some(ack) = close_rx.recv() => Err(Interrupt::Requested(ack)),
        _ = shutdown.cancelled() => Err(Interrupt::Cancelled),
        out = fut => Ok(out),
    }
}

/// Stop accepting close requests and answer the queued ones with `result`.
pub(crate) fn drain(close_rx: &mut mpsc::Receiver<CloseAck>, result: &CloseResult) {
    close_rx.close();
    while let Ok(ack) = close_rx.try_recv() {
        let _ = ack.send(duplicate(result));
    }
}

fn duplicate(result: &CloseResult) -> CloseResult {
    match result {
        Ok(()) => Ok(()),
        Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
    }
}

/// Lifecycle states that have a terminal closed value.
pub(crate) trait Terminal {
    fn closed() -> Self;
    fn is_closed(&self) -> bool;
}

/// Marks the state closed; also does so on drop, so a cancelled or
/// unwinding loop still leaves the owner closed.
pub(crate) struct ClosedGuard<'a, S: Terminal> {
    state: &'a watch::Sender<S>,
}

impl<'a, S: Terminal> ClosedGuard<'a, S> {
    pub(crate) fn new(state: &'a watch::Sender<S>) -> Self {
        Self { state }
    }

    /// Returns true if this call performed the transition.
    pub(crate) fn mark(&self) -> bool {
        self.state.send_if_modified(|s| {
            if s.is_closed() {
                false
            } else {
                *s = S::closed();
                true
            }
        })
    }
}

impl<S: Terminal> Drop for ClosedGuard<'_, S> {
    fn drop(&mut self) {
        self.mark();
    }
}
