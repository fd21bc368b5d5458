//! Listen/dial target: a network name plus an address string.

use std::fmt;
use std::io;
use std::net::SocketAddr;

use crate::error::NetError;

/// Identifies a dial target or listen address. Immutable after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    network: String,
    address: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Any,
    V4,
    V6,
}

impl Endpoint {
    /// `network` is one of "tcp", "tcp4" or "tcp6"; it is validated on use.
    pub fn new(network: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            address: address.into(),
        }
    }

    pub fn tcp(address: impl Into<String>) -> Self {
        Self::new("tcp", address)
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    fn family(&self) -> Result<Family, NetError> {
        match self.network.as_str() {
            "tcp" => Ok(Family::Any),
            "tcp4" => Ok(Family::V4),
            "tcp6" => Ok(Family::V6),
            other => Err(NetError::UnsupportedNetwork(other.to_string())),
        }
    }

    /// Resolve the address, keeping only the family the network asks for.
    pub async fn resolve(&self) -> Result<Vec<SocketAddr>, NetError> {
        let family = self.family()?;
        let resolve_err = |source| NetError::Resolve {
            addr: self.address.clone(),
            source,
        };
        let addrs: Vec<SocketAddr> = tokio::net::lookup_host(self.address.as_str())
            .await
            .map_err(resolve_err)?
            .filter(|a| match family {
                Family::Any => true,
                Family::V4 => a.is_ipv4(),
                Family::V6 => a.is_ipv6(),
            })
            .collect();
        if addrs.is_empty() {
            return Err(resolve_err(io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("no {} address", self.network),
            )));
        }
        Ok(addrs)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_literal_v4() {
        let ep = Endpoint::tcp("127.0.0.1:8080");
        let addrs = ep.resolve().await.unwrap();
        assert_eq!(addrs, vec!["127.0.0.1:8080".parse::<SocketAddr>().unwrap()]);
    }

    #[tokio::test]
    async fn family_filter_rejects_mismatch() {
        let ep = Endpoint::new("tcp6", "127.0.0.1:8080");
        assert!(matches!(ep.resolve().await, Err(NetError::Resolve { .. })));
    }

    #[tokio::test]
    async fn unknown_network_is_rejected() {
        let ep = Endpoint::new("udp", "127.0.0.1:8080");
        match ep.resolve().await {
            Err(NetError::UnsupportedNetwork(n)) => assert_eq!(n, "udp"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn display() {
        assert_eq!(Endpoint::new("tcp4", "0.0.0.0:1").to_string(), "tcp4/0.0.0.0:1");
    }
}
