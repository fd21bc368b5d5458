//! Handlers shared by the integration tests.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use netlife_core::ConnHandler;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

/// Echoes lines until the peer closes.
pub struct Echo;

#[async_trait]
impl ConnHandler for Echo {
    async fn handle(&self, conn: &mut TcpStream, _peer: SocketAddr) -> anyhow::Result<()> {
        let (read, mut write) = conn.split();
        let mut lines = BufReader::new(read).lines();
        while let Some(line) = lines.next_line().await? {
            write.write_all(line.as_bytes()).await?;
            write.write_all(b"\n").await?;
        }
        Ok(())
    }
}

/// Fails every connection after counting it.
pub struct Failing {
    pub seen: Arc<AtomicUsize>,
}

#[async_trait]
impl ConnHandler for Failing {
    async fn handle(&self, _conn: &mut TcpStream, peer: SocketAddr) -> anyhow::Result<()> {
        self.seen.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("rejecting {}", peer)
    }
}

/// Holds each connection for a while and records peak concurrency.
pub struct Slow {
    pub active: Arc<AtomicUsize>,
    pub peak: Arc<AtomicUsize>,
}

#[async_trait]
impl ConnHandler for Slow {
    async fn handle(&self, conn: &mut TcpStream, _peer: SocketAddr) -> anyhow::Result<()> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        conn.write_all(b"done\n").await?;
        Ok(())
    }
}

/// Never returns on its own.
pub struct Stuck;

#[async_trait]
impl ConnHandler for Stuck {
    async fn handle(&self, _conn: &mut TcpStream, _peer: SocketAddr) -> anyhow::Result<()> {
        std::future::pending().await
    }
}
