use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::client::ClientBuilder;
use crate::endpoint::Endpoint;
use crate::retry::RetryPolicy;
use crate::server::ServerBuilder;

/// Backoff parameters (optional `[retry]` section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Delay after the first consecutive transient failure, in milliseconds.
    pub min_delay_ms: u64,
    /// Maximum backoff delay in milliseconds.
    pub max_delay_ms: u64,
    /// Treat connection reset / aborted handshake as transient.
    #[serde(default = "default_true")]
    pub reset_is_transient: bool,
}

fn default_true() -> bool {
    true
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: 5,
            max_delay_ms: 1000,
            reset_is_transient: true,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            min_delay: Duration::from_millis(self.min_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            reset_is_transient: self.reset_is_transient,
        }
    }
}

/// Whether `closed` is marked before or after the listener/connection is
/// released during shutdown. Either way both happen before `close()` returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CloseOrder {
    #[default]
    MarkFirst,
    CloseFirst,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// "tcp", "tcp4" or "tcp6".
    pub network: String,
    pub listen_addr: String,
    /// Bound on in-flight connection handlers (None = unbounded).
    #[serde(default)]
    pub max_connections: Option<usize>,
    #[serde(default)]
    pub close_order: CloseOrder,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            network: "tcp".to_string(),
            listen_addr: "127.0.0.1:7070".to_string(),
            max_connections: None,
            close_order: CloseOrder::MarkFirst,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub network: String,
    pub remote_addr: String,
    #[serde(default)]
    pub close_order: CloseOrder,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            network: "tcp".to_string(),
            remote_addr: "127.0.0.1:7070".to_string(),
            close_order: CloseOrder::MarkFirst,
        }
    }
}

/// Global configuration loaded from `~/.config/netlife/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetlifeConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub client: ClientConfig,
    /// Optional retry policy; if missing, built-in defaults are used.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

impl NetlifeConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry.as_ref().map(RetryConfig::policy).unwrap_or_default()
    }

    /// Server builder with endpoint, retry policy and limits from this config.
    pub fn server_builder(&self) -> ServerBuilder {
        let mut builder = ServerBuilder::new(Endpoint::new(
            self.server.network.clone(),
            self.server.listen_addr.clone(),
        ))
        .retry_policy(self.retry_policy())
        .close_order(self.server.close_order);
        if let Some(n) = self.server.max_connections {
            builder = builder.max_connections(n);
        }
        builder
    }

    pub fn client_builder(&self) -> ClientBuilder {
        ClientBuilder::new(Endpoint::new(
            self.client.network.clone(),
            self.client.remote_addr.clone(),
        ))
        .retry_policy(self.retry_policy())
        .close_order(self.client.close_order)
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("netlife")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<NetlifeConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = NetlifeConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }
    load_from_path(&path)
}

pub fn load_from_path(path: &Path) -> Result<NetlifeConfig> {
    let data = fs::read_to_string(path)?;
    let cfg: NetlifeConfig = toml::from_str(&data)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = NetlifeConfig::default();
        assert_eq!(cfg.server.network, "tcp");
        assert_eq!(cfg.server.listen_addr, "127.0.0.1:7070");
        assert!(cfg.server.max_connections.is_none());
        assert_eq!(cfg.server.close_order, CloseOrder::MarkFirst);
        let p = cfg.retry_policy();
        assert_eq!(p.min_delay, Duration::from_millis(5));
        assert_eq!(p.max_delay, Duration::from_secs(1));
        assert!(p.reset_is_transient);
    }

    #[test]
    fn empty_file_uses_defaults() {
        let cfg: NetlifeConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.client.remote_addr, "127.0.0.1:7070");
        assert!(cfg.retry.is_none());
    }

    #[test]
    fn config_toml_custom_values() {
        let toml = r#"
            [server]
            network = "tcp6"
            listen_addr = "[::1]:9000"
            max_connections = 128
            close_order = "close-first"

            [client]
            network = "tcp4"
            remote_addr = "10.0.0.2:9000"

            [retry]
            min_delay_ms = 10
            max_delay_ms = 500
            reset_is_transient = false
        "#;
        let cfg: NetlifeConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.server.network, "tcp6");
        assert_eq!(cfg.server.max_connections, Some(128));
        assert_eq!(cfg.server.close_order, CloseOrder::CloseFirst);
        assert_eq!(cfg.client.close_order, CloseOrder::MarkFirst);
        let p = cfg.retry_policy();
        assert_eq!(p.min_delay, Duration::from_millis(10));
        assert_eq!(p.max_delay, Duration::from_millis(500));
        assert!(!p.reset_is_transient);
    }

    #[test]
    fn load_from_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[retry]\nmin_delay_ms = 1\nmax_delay_ms = 8\n").unwrap();
        let cfg = load_from_path(&path).unwrap();
        let retry = cfg.retry.as_ref().unwrap();
        assert_eq!(retry.min_delay_ms, 1);
        assert!(retry.reset_is_transient);
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = NetlifeConfig::default();
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: NetlifeConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.server.listen_addr, cfg.server.listen_addr);
        assert_eq!(parsed.client.network, cfg.client.network);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn huge_max_connections_builds() {
        struct Noop;

        #[async_trait::async_trait]
        impl crate::ConnHandler for Noop {
            async fn handle(
                &self,
                _conn: &mut tokio::net::TcpStream,
                _peer: std::net::SocketAddr,
            ) -> anyhow::Result<()> {
                Ok(())
            }
        }

        let toml = r#"
            [server]
            network = "tcp"
            listen_addr = "127.0.0.1:0"
            max_connections = 9223372036854775807
        "#;
        let cfg: NetlifeConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.server.max_connections, Some(i64::MAX as usize));
        let server = cfg.server_builder().build(Noop);
        assert!(!server.is_closed());
    }
}
