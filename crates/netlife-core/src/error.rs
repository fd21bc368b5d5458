//! Error taxonomy shared by the server and client lifecycles.
//!
//! Transient accept/dial errors never show up here: they are retried and
//! logged by the owning loop. What reaches callers is either fatal, a
//! lifecycle misuse sentinel, or a handler failure.

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetError {
    /// The listen address could not be bound. Never retried.
    #[error("bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// A non-transient accept error; the server is closed.
    #[error("accept: {0}")]
    Accept(#[source] io::Error),

    /// A non-transient dial error; the handler was not invoked.
    #[error("dial {addr}: {source}")]
    Dial {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("unsupported network {0:?}")]
    UnsupportedNetwork(String),

    #[error("resolve {addr}: {source}")]
    Resolve {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// Returned by `listen_and_serve` once a close was requested, or when
    /// serving a server that is already closed.
    #[error("server closed")]
    ServerClosed,

    #[error("server already listening")]
    AlreadyListening,

    #[error("client already connected")]
    AlreadyConnected,

    #[error("client closed")]
    ClientClosed,

    /// The underlying socket failed to shut down cleanly.
    #[error("close: {0}")]
    Close(#[source] io::Error),

    /// Application-level failure reported by a connection handler.
    #[error(transparent)]
    Handler(anyhow::Error),
}

impl NetError {
    /// True for the lifecycle misuse sentinels.
    pub fn is_misuse(&self) -> bool {
        matches!(
            self,
            NetError::AlreadyListening | NetError::AlreadyConnected | NetError::ClientClosed
        )
    }
}
