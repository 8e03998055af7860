use clap::Parser;
use frontline::cli::{run_cli, Cli};
use frontline::logging::{init_logging, LogConfig};

fn main() -> anyhow::Result<()> {
    init_logging(&LogConfig::from_env())?;
    run_cli(Cli::parse())
}
