//! Unit tests for CLI commands

use crate::cli::commands::serve_config;
use crate::cli::{Cli, Commands, DEFAULT_NAMESPACE};
use clap::Parser;
use std::io::Write;

#[test]
fn test_serve_defaults() {
    let cli = Cli::try_parse_from(["frontline", "serve"]).unwrap();
    match cli.command {
        Commands::Serve {
            port, namespace, ..
        } => {
            assert_eq!(port, None);
            assert_eq!(namespace, None);
        }
        _ => panic!("Expected Serve command"),
    }
}

#[test]
fn test_stop_flags() {
    let cli = Cli::try_parse_from([
        "frontline", "stop", "--port", "9000", "--grace", "2000", "--offset", "100",
    ])
    .unwrap();
    match cli.command {
        Commands::Stop {
            port,
            grace,
            offset,
        } => {
            assert_eq!(port, 9000);
            assert_eq!(grace, 2000);
            assert_eq!(offset, 100);
        }
        _ => panic!("Expected Stop command"),
    }
}

#[test]
fn test_stop_defaults() {
    let cli = Cli::try_parse_from(["frontline", "stop"]).unwrap();
    match cli.command {
        Commands::Stop {
            port,
            grace,
            offset,
        } => {
            assert_eq!(port, 8765);
            assert_eq!(grace, 2000);
            assert_eq!(offset, 100);
        }
        _ => panic!("Expected Stop command"),
    }
}

#[test]
fn test_serve_config_overrides() {
    let cfg = serve_config(None, Some(9100), None).unwrap();
    assert_eq!(cfg.port, 9100);
    assert_eq!(cfg.commands_namespace.as_deref(), Some(DEFAULT_NAMESPACE));

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "port: 9200\ncommands_namespace: shop.commands").unwrap();
    let cfg = serve_config(Some(file.path().to_path_buf()), None, None).unwrap();
    assert_eq!(cfg.port, 9200);
    assert_eq!(cfg.commands_namespace.as_deref(), Some("shop.commands"));

    let cfg = serve_config(Some(file.path().to_path_buf()), None, Some("other".into())).unwrap();
    assert_eq!(cfg.commands_namespace.as_deref(), Some("other"));
}

#[test]
fn test_missing_config_file_is_an_error() {
    assert!(serve_config(Some("/nonexistent/frontline.yaml".into()), None, None).is_err());
}
