//! # CLI Module
//!
//! Command-line interface of the `frontline` binary.
//!
//! ## Commands
//!
//! ### `serve`
//!
//! Start a server, stopping any previous instance on the same port first:
//!
//! ```bash
//! frontline serve --config config.yaml
//! frontline serve --port 9000 --namespace shop.commands
//! ```
//!
//! The built-in `echo` and `health` commands are registered under the
//! configured commands namespace. SIGTERM and SIGINT stop the server
//! gracefully.
//!
//! ### `stop`
//!
//! Ask the instance serving a port to stop, without starting a new one:
//!
//! ```bash
//! frontline stop --port 9000 --grace 2000
//! ```

mod commands;

#[cfg(test)]
mod tests;

pub use commands::{run_cli, Cli, Commands, DEFAULT_NAMESPACE};
