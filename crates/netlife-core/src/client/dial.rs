//! Dial seam between the client loop and the OS connect.

use std::io;
use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::net::TcpStream;

/// Makes one outbound connection attempt per call.
#[async_trait]
pub(crate) trait Dialer: Send {
    /// Tries `addrs` in order and returns the first connection made.
    async fn dial(&mut self, addrs: &[SocketAddr]) -> io::Result<TcpStream>;
}

pub(crate) struct TcpDialer;

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial(&mut self, addrs: &[SocketAddr]) -> io::Result<TcpStream> {
        TcpStream::connect(addrs).await
    }
}
