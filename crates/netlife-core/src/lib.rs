//! TCP connection lifecycle manager.
//!
//! A [`Server`] listens and dispatches each accepted connection to a
//! [`ConnHandler`] on its own task; a [`Client`] dials with retry and runs the
//! handler on the established connection. Both retry transient network
//! errors with capped exponential backoff ([`RetryPolicy`]) and offer a
//! `close()` that returns only after the listener/connection is released.

pub mod client;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod handler;
pub mod logging;
pub mod retry;
pub mod server;

mod rendezvous;

pub use client::{Client, ClientBuilder};
pub use config::CloseOrder;
pub use endpoint::Endpoint;
pub use error::NetError;
pub use handler::{handler_fn, ConnHandler, HandlerFn};
pub use retry::{Backoff, ErrorKind, RetryDecision, RetryPolicy};
pub use server::{Server, ServerBuilder};
