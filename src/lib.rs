//! # frontline
//!
//! **frontline** is an embedded front-controller HTTP server built on the
//! `may` coroutine runtime and `may_minihttp`. Every request under the broker
//! mount (`{context}/cmd/*`) is addressed by a *verb*, the first path segment
//! after the mount, which is resolved to a [`Command`]. Commands read the
//! request, open a transactional database [`session::Session`], forward to
//! views or other commands, and redirect.
//!
//! ## Architecture
//!
//! - **[`resolve`]** - verb to command resolution (explicit mapping, verb
//!   markers, naming convention) and view name to resource resolution
//! - **[`pipeline`]** - the stage chain each broker request runs through:
//!   access log, authentication gate, transaction, invocation
//! - **[`broker`]** - builds the chain and turns its outcome into a response
//! - **[`context`]** - [`CommandContext`], the capability surface of a command
//! - **[`session`]** - pooled SQLite connections and request-scoped transactions
//! - **[`handoff`]** - graceful takeover of a port from a previous instance
//! - **[`server`]** - the HTTP service, static content and bootstrap
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use frontline::{CommandContext, DispatchError, Server};
//!
//! let mut server = Server::new("shop.commands").port(8080);
//! server
//!     .catalog_mut()
//!     .register("shop.commands.HelloCommand", || {
//!         |ctx: &mut CommandContext<'_>| -> Result<(), DispatchError> {
//!             let name = ctx.param("name").unwrap_or("world").to_string();
//!             ctx.set_variable("name", name);
//!             ctx.forward_to_view("hello")
//!         }
//!     });
//! server.start().unwrap().wait();
//! ```
//!
//! `GET /cmd/hello?name=ada` resolves `hello` by convention to
//! `shop.commands.HelloCommand`, runs it and renders
//! `web/WEB-INF/views/hello.html`.

pub mod broker;
pub mod cli;
pub mod command;
pub mod config;
pub mod context;
pub mod echo;
pub mod error;
pub mod handoff;
pub mod http_session;
pub mod logging;
pub mod pipeline;
pub mod resolve;
pub mod runtime_config;
pub mod security;
pub mod server;
pub mod session;
pub mod static_files;

pub use broker::{Application, BrokerBuilder, BuildError, CommandBroker};
pub use command::{Command, CommandFactory};
pub use config::{AppConfig, ConfigError, DbConfig};
pub use context::{CommandContext, Scope};
pub use error::DispatchError;
pub use handoff::{send_stop_command, HandoffError, HandoffOutcome, StopMonitor, Stoppable};
pub use pipeline::{Exchange, Flow, HandlerResponse, Next, Stage};
pub use resolve::{CommandCatalog, CommandResolver, ResolveError, ViewResolver};
pub use security::{hash_credentials, Identifier};
pub use server::{RunningServer, Server, StartError};
pub use session::{Session, SessionError, SessionManager};
