//! Classify accept/dial I/O errors into retry policy error kinds.

use std::io;

use super::policy::{ErrorKind, RetryPolicy};

/// Classify an accept or dial error for retry decisions.
///
/// Resource exhaustion, interrupted calls and timeouts are transient.
/// Connection reset / aborted handshake is transient only when the policy
/// says so. Everything else, connection refused included, is fatal.
pub fn classify_io_error(err: &io::Error, policy: &RetryPolicy) -> ErrorKind {
    if is_resource_exhaustion(err) {
        return ErrorKind::Transient;
    }
    match err.kind() {
        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => {
            ErrorKind::Transient
        }
        io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted
            if policy.reset_is_transient =>
        {
            ErrorKind::Transient
        }
        _ => ErrorKind::Fatal,
    }
}

#[cfg(unix)]
fn is_resource_exhaustion(err: &io::Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(libc::EMFILE) | Some(libc::ENFILE) | Some(libc::ENOBUFS) | Some(libc::ENOMEM)
    )
}

#[cfg(not(unix))]
fn is_resource_exhaustion(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::OutOfMemory
}
