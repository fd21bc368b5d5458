//! CLI parse tests.

use super::{Cli, CliCommand};
use clap::Parser;
use clap_complete::Shell;

fn parse(args: &[&str]) -> CliCommand {
    let cli = Cli::try_parse_from(args).unwrap();
    cli.command
}

#[test]
fn serve_defaults() {
    match parse(&["netlife", "serve"]) {
        CliCommand::Serve {
            addr,
            network,
            max_connections,
        } => {
            assert!(addr.is_none());
            assert!(network.is_none());
            assert!(max_connections.is_none());
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn serve_overrides() {
    match parse(&[
        "netlife",
        "serve",
        "--addr",
        "0.0.0.0:9000",
        "--network",
        "tcp4",
        "--max-connections",
        "32",
    ]) {
        CliCommand::Serve {
            addr,
            network,
            max_connections,
        } => {
            assert_eq!(addr.as_deref(), Some("0.0.0.0:9000"));
            assert_eq!(network.as_deref(), Some("tcp4"));
            assert_eq!(max_connections, Some(32));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn connect_messages() {
    match parse(&["netlife", "connect", "--addr", "127.0.0.1:7070", "a", "b"]) {
        CliCommand::Connect { addr, messages, .. } => {
            assert_eq!(addr.as_deref(), Some("127.0.0.1:7070"));
            assert_eq!(messages, vec!["a".to_string(), "b".to_string()]);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn connect_requires_a_message() {
    assert!(Cli::try_parse_from(["netlife", "connect"]).is_err());
}

#[test]
fn completions_shell() {
    match parse(&["netlife", "completions", "bash"]) {
        CliCommand::Completions { shell } => assert_eq!(shell, Shell::Bash),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn max_connections_must_be_numeric() {
    assert!(Cli::try_parse_from(["netlife", "serve", "--max-connections", "many"]).is_err());
}
