//! `netlife connect` – send lines to a server and print the replies.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use async_trait::async_trait;
use netlife_core::config::NetlifeConfig;
use netlife_core::ConnHandler;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

struct SendLines {
    messages: Vec<String>,
}

#[async_trait]
impl ConnHandler for SendLines {
    async fn handle(&self, conn: &mut TcpStream, peer: SocketAddr) -> anyhow::Result<()> {
        let (read, mut write) = conn.split();
        let mut replies = BufReader::new(read).lines();
        for msg in &self.messages {
            write.write_all(msg.as_bytes()).await?;
            write.write_all(b"\n").await?;
            let reply = replies
                .next_line()
                .await?
                .with_context(|| format!("{} closed before replying", peer))?;
            println!("{}", reply);
        }
        Ok(())
    }
}

pub async fn run_connect(cfg: &NetlifeConfig, messages: Vec<String>) -> Result<()> {
    let client = cfg.client_builder().build(SendLines { messages });
    client.connect().await?;
    Ok(())
}
