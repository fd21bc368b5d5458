//! `netlife serve` – line-echo server with Ctrl-C shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use netlife_core::config::NetlifeConfig;
use netlife_core::{ConnHandler, NetError};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

struct LineEcho;

#[async_trait]
impl ConnHandler for LineEcho {
    async fn handle(&self, conn: &mut TcpStream, peer: SocketAddr) -> anyhow::Result<()> {
        let (read, mut write) = conn.split();
        let mut lines = BufReader::new(read).lines();
        let mut echoed = 0usize;
        while let Some(line) = lines.next_line().await? {
            write.write_all(line.as_bytes()).await?;
            write.write_all(b"\n").await?;
            echoed += 1;
        }
        tracing::info!(%peer, echoed, "peer done");
        Ok(())
    }
}

pub async fn run_serve(cfg: &NetlifeConfig) -> Result<()> {
    let server = Arc::new(cfg.server_builder().build(LineEcho));

    let closer = Arc::clone(&server);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, closing listener");
            if let Err(e) = closer.close().await {
                tracing::warn!("close: {}", e);
            }
        }
    });

    let announce = Arc::clone(&server);
    tokio::spawn(async move {
        if let Some(addr) = announce.wait_listening().await {
            println!("listening on {}", addr);
        }
    });

    match server.listen_and_serve().await {
        Ok(()) | Err(NetError::ServerClosed) => Ok(()),
        Err(e) => Err(e.into()),
    }
}
