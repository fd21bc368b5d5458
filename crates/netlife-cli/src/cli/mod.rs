//! CLI for the netlife server/client lifecycle manager.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use netlife_core::config;

use commands::{run_completions, run_connect, run_serve};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "netlife")]
#[command(about = "netlife: TCP server/client with retrying accept/dial and synchronous close", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Run a line-echo server until Ctrl-C.
    Serve {
        /// Listen address (overrides config `server.listen_addr`).
        #[arg(long, value_name = "HOST:PORT")]
        addr: Option<String>,
        /// Network: tcp, tcp4 or tcp6 (overrides config `server.network`).
        #[arg(long)]
        network: Option<String>,
        /// Bound on concurrent connections (overrides config `server.max_connections`).
        #[arg(long, value_name = "N")]
        max_connections: Option<usize>,
    },

    /// Dial a server, send lines and print the replies.
    Connect {
        /// Remote address (overrides config `client.remote_addr`).
        #[arg(long, value_name = "HOST:PORT")]
        addr: Option<String>,
        /// Network: tcp, tcp4 or tcp6 (overrides config `client.network`).
        #[arg(long)]
        network: Option<String>,
        /// Lines to send; one reply line is read per message.
        #[arg(required = true)]
        messages: Vec<String>,
    },

    /// Print shell completions to stdout.
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();

        match cli.command {
            CliCommand::Serve {
                addr,
                network,
                max_connections,
            } => {
                let mut cfg = config::load_or_init()?;
                tracing::debug!("loaded config: {:?}", cfg);
                if let Some(addr) = addr {
                    cfg.server.listen_addr = addr;
                }
                if let Some(network) = network {
                    cfg.server.network = network;
                }
                if max_connections.is_some() {
                    cfg.server.max_connections = max_connections;
                }
                run_serve(&cfg).await?
            }
            CliCommand::Connect {
                addr,
                network,
                messages,
            } => {
                let mut cfg = config::load_or_init()?;
                tracing::debug!("loaded config: {:?}", cfg);
                if let Some(addr) = addr {
                    cfg.client.remote_addr = addr;
                }
                if let Some(network) = network {
                    cfg.client.network = network;
                }
                run_connect(&cfg, messages).await?
            }
            CliCommand::Completions { shell } => run_completions(shell),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
