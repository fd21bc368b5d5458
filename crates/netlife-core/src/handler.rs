//! Connection handler capability supplied by the caller.

use std::any::Any;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::net::TcpStream;

/// Performs application I/O on a live connection.
///
/// The connection is borrowed for the duration of the call only; closing it
/// is the lifecycle manager's job, on every exit path.
#[async_trait]
pub trait ConnHandler: Send + Sync + 'static {
    async fn handle(&self, conn: &mut TcpStream, peer: SocketAddr) -> anyhow::Result<()>;
}

#[async_trait]
impl<H: ConnHandler + ?Sized> ConnHandler for Arc<H> {
    async fn handle(&self, conn: &mut TcpStream, peer: SocketAddr) -> anyhow::Result<()> {
        (**self).handle(conn, peer).await
    }
}

/// Adapter returned by [`handler_fn`].
pub struct HandlerFn<F>(F);

/// Wrap a function returning a boxed future as a [`ConnHandler`].
///
/// ```ignore
/// let h = handler_fn(|conn, _peer| async move {
///     conn.write_all(b"hello\n").await?;
///     Ok(())
/// }.boxed());
/// ```
pub fn handler_fn<F>(f: F) -> HandlerFn<F>
where
    F: for<'a> Fn(&'a mut TcpStream, SocketAddr) -> BoxFuture<'a, anyhow::Result<()>>
        + Send
        + Sync
        + 'static,
{
    HandlerFn(f)
}

#[async_trait]
impl<F> ConnHandler for HandlerFn<F>
where
    F: for<'a> Fn(&'a mut TcpStream, SocketAddr) -> BoxFuture<'a, anyhow::Result<()>>
        + Send
        + Sync
        + 'static,
{
    async fn handle(&self, conn: &mut TcpStream, peer: SocketAddr) -> anyhow::Result<()> {
        (self.0)(conn, peer).await
    }
}

/// Run the handler, turning a panic into an ordinary handler error.
pub(crate) async fn run_handler(
    handler: &dyn ConnHandler,
    conn: &mut TcpStream,
    peer: SocketAddr,
) -> anyhow::Result<()> {
    match AssertUnwindSafe(handler.handle(conn, peer)).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(anyhow::anyhow!("handler panicked: {}", panic_message(&*panic))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
