//! Retry and backoff policy.
//!
//! This module encapsulates error classification (resource exhaustion,
//! momentary accept/dial failures) and capped exponential backoff so that the
//! server accept loop and the client dial loop share one consistent policy.

mod backoff;
mod classify;
mod policy;

pub use backoff::Backoff;
pub use classify::classify_io_error;
pub use policy::{ErrorKind, RetryDecision, RetryPolicy};
