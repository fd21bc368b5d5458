//! Subcommand implementations.

mod completions;
mod connect;
mod serve;

pub use completions::run_completions;
pub use connect::run_connect;
pub use serve::run_serve;
