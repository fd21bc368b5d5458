//! Per-connection task: run the handler, log its outcome, close the stream.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::OwnedSemaphorePermit;
use tracing::instrument::WithSubscriber;

use crate::handler::{run_handler, ConnHandler};

/// Spawns the handler for one accepted connection on its own task.
///
/// Handler errors and panics are logged, never propagated: one failed
/// connection must not take the listener down. The admission permit, if
/// any, is released when the connection is closed.
pub(super) fn spawn(
    handler: Arc<dyn ConnHandler>,
    stream: TcpStream,
    peer: SocketAddr,
    permit: Option<OwnedSemaphorePermit>,
) {
    tokio::spawn(
        async move {
            let _permit = permit;
            serve_conn(&*handler, stream, peer).await;
        }
        .with_current_subscriber(),
    );
}

async fn serve_conn(handler: &dyn ConnHandler, mut stream: TcpStream, peer: SocketAddr) {
    tracing::debug!(%peer, "connection accepted");
    match run_handler(handler, &mut stream, peer).await {
        Ok(()) => tracing::debug!(%peer, "handler finished"),
        Err(err) => tracing::warn!(%peer, "handler error: {:#}", err),
    }
    if let Err(err) = stream.shutdown().await {
        tracing::debug!(%peer, "connection shutdown: {}", err);
    }
}
