use crate::config::{AppConfig, DEFAULT_GRACE_PERIOD_MS, DEFAULT_HANDOFF_OFFSET, DEFAULT_PORT};
use crate::echo::register_builtin;
use crate::handoff::{send_stop_command, HandoffOutcome};
use crate::resolve::CommandCatalog;
use crate::server::{RunningServer, Server};
use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Namespace used when neither the configuration nor the command line names one.
pub const DEFAULT_NAMESPACE: &str = "frontline";

/// Command-line interface for frontline
#[derive(Parser)]
#[command(name = "frontline")]
#[command(about = "frontline command broker server", long_about = None)]
pub struct Cli {
    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Start the server, taking over from any instance on the same port
    Serve {
        /// YAML configuration file
        #[arg(short, long, env = "FRONTLINE_CONFIG")]
        config: Option<PathBuf>,

        /// HTTP port, overriding the configuration
        #[arg(short, long)]
        port: Option<u16>,

        /// Commands namespace, overriding the configuration
        #[arg(long)]
        namespace: Option<String>,
    },
    /// Ask the instance serving a port to stop
    Stop {
        /// HTTP port of the running instance
        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Grace period in milliseconds
        #[arg(short, long, default_value_t = DEFAULT_GRACE_PERIOD_MS)]
        grace: u64,

        /// Offset of the stop monitor port
        #[arg(long, default_value_t = DEFAULT_HANDOFF_OFFSET)]
        offset: u16,
    },
}

/// Run the parsed command line.
pub fn run_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Serve {
            config,
            port,
            namespace,
        } => {
            let config = serve_config(config, port, namespace)?;
            serve(config)
        }
        Commands::Stop {
            port,
            grace,
            offset,
        } => {
            let outcome = send_stop_command(port, offset, Duration::from_millis(grace))
                .context("stop command failed")?;
            match outcome {
                HandoffOutcome::Stopped => info!(port, "Instance stopped"),
                HandoffOutcome::NotRunning => info!(port, "No instance running"),
            }
            Ok(())
        }
    }
}

pub(crate) fn serve_config(
    path: Option<PathBuf>,
    port: Option<u16>,
    namespace: Option<String>,
) -> anyhow::Result<AppConfig> {
    let mut config = match path {
        Some(path) => AppConfig::load(&path)?,
        None => AppConfig::default(),
    };
    config = config.apply_env()?;
    if let Some(port) = port {
        config.port = port;
    }
    if namespace.is_some() {
        config.commands_namespace = namespace;
    }
    if config.commands_namespace.is_none() {
        config.commands_namespace = Some(DEFAULT_NAMESPACE.to_string());
    }
    Ok(config)
}

fn serve(config: AppConfig) -> anyhow::Result<()> {
    let mut catalog = CommandCatalog::new();
    let namespace = config.commands_namespace.clone().unwrap_or_default();
    register_builtin(&mut catalog, &namespace);

    let grace = config.grace_period();
    let running = Arc::new(
        Server::from_config(config)
            .catalog(catalog)
            .start()
            .context("failed to start server")?,
    );
    info!(addr = %running.addr(), "Serving");

    watch_signals(Arc::clone(&running), grace)?;
    running.wait();
    Ok(())
}

#[cfg(unix)]
fn watch_signals(running: Arc<RunningServer>, grace: Duration) -> anyhow::Result<()> {
    use signal_hook::consts::signal::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals =
        Signals::new([SIGTERM, SIGINT]).context("failed to install signal handlers")?;
    std::thread::Builder::new()
        .name("signals".to_string())
        .spawn(move || {
            if let Some(signal) = signals.forever().next() {
                info!(signal, "Received shutdown signal");
                running.stop(grace);
            }
        })
        .context("failed to start signal thread")?;
    Ok(())
}

#[cfg(not(unix))]
fn watch_signals(_running: Arc<RunningServer>, _grace: Duration) -> anyhow::Result<()> {
    Ok(())
}
