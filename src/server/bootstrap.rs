//! Embedded server bootstrap.
//!
//! [`Server`] is the fluent entry point: configure, register commands, then
//! [`Server::start`]. Starting performs the restart handoff (stopping any
//! previous instance on the same port), binds the stop monitor, builds the
//! broker and starts the HTTP listener.
//!
//! ```rust,no_run
//! use frontline::{CommandContext, DispatchError, Server};
//!
//! let mut server = Server::new("shop.commands").port(8080).context("shop");
//! server.catalog_mut().register("shop.commands.PingCommand", || {
//!     |ctx: &mut CommandContext<'_>| -> Result<(), DispatchError> {
//!         ctx.write("pong");
//!         Ok(())
//!     }
//! });
//! let running = server.start().unwrap();
//! running.wait();
//! ```

use super::http_server::{HttpServer, ServerHandle};
use super::service::{AppService, InFlight};
use crate::broker::{BrokerBuilder, BuildError, CommandBroker};
use crate::config::{AppConfig, ConfigError, DbConfig};
use crate::handoff::{
    halt_process, send_stop_command, HaltHook, HandoffError, HandoffOutcome, StopMonitor,
    Stoppable,
};
use crate::pipeline::Stage;
use crate::resolve::CommandCatalog;
use crate::runtime_config::RuntimeConfig;
use crate::security::Identifier;
use crate::session::SessionManager;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum StartError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Handoff(#[from] HandoffError),
    #[error(transparent)]
    Broker(#[from] BuildError),
    #[error("cannot start HTTP server on {addr}: {source}")]
    Listen {
        addr: String,
        #[source]
        source: io::Error,
    },
}

/// Fluent server configuration.
pub struct Server {
    config: AppConfig,
    catalog: CommandCatalog,
    identifier: Option<Arc<dyn Identifier>>,
    stages: Vec<Arc<dyn Stage>>,
    sessions: Option<SessionManager>,
    halt: Option<HaltHook>,
    handoff: bool,
}

impl Server {
    /// Server resolving commands under `namespace`, every other setting at its default.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self::from_config(AppConfig::with_namespace(namespace))
    }

    #[must_use]
    pub fn from_config(config: AppConfig) -> Self {
        Self {
            config,
            catalog: CommandCatalog::new(),
            identifier: None,
            stages: Vec::new(),
            sessions: None,
            halt: None,
            handoff: true,
        }
    }

    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    #[must_use]
    pub fn bind_host(mut self, host: impl Into<String>) -> Self {
        self.config.bind_host = host.into();
        self
    }

    #[must_use]
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.config.context = context.into();
        self
    }

    #[must_use]
    pub fn mount(mut self, mount: impl Into<String>) -> Self {
        self.config.mount = mount.into();
        self
    }

    #[must_use]
    pub fn web_content(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.web_content = dir.into();
        self
    }

    #[must_use]
    pub fn views_root(mut self, root: impl Into<String>) -> Self {
        self.config.views_root = Some(root.into());
        self
    }

    #[must_use]
    pub fn map_command(mut self, verb: impl Into<String>, identifier: impl Into<String>) -> Self {
        self.config
            .command_mappings
            .insert(verb.into(), identifier.into());
        self
    }

    #[must_use]
    pub fn map_view(mut self, name: impl Into<String>, path: impl Into<String>) -> Self {
        self.config.view_mappings.insert(name.into(), path.into());
        self
    }

    #[must_use]
    pub fn grace_period(mut self, grace: Duration) -> Self {
        self.config.grace_period_ms = grace.as_millis() as u64;
        self
    }

    #[must_use]
    pub fn handoff_offset(mut self, offset: u16) -> Self {
        self.config.handoff_offset = offset;
        self
    }

    #[must_use]
    pub fn database(mut self, db: DbConfig) -> Self {
        self.config.database = Some(db);
        self
    }

    #[must_use]
    pub fn catalog(mut self, catalog: CommandCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn catalog_mut(&mut self) -> &mut CommandCatalog {
        &mut self.catalog
    }

    #[must_use]
    pub fn identifier(mut self, identifier: Arc<dyn Identifier>) -> Self {
        self.identifier = Some(identifier);
        self
    }

    #[must_use]
    pub fn stage(mut self, stage: Arc<dyn Stage>) -> Self {
        self.stages.push(stage);
        self
    }

    #[must_use]
    pub fn sessions(mut self, sessions: SessionManager) -> Self {
        self.sessions = Some(sessions);
        self
    }

    /// Replace the process halt run after a handoff stop.
    #[must_use]
    pub fn halt_hook(mut self, halt: HaltHook) -> Self {
        self.halt = Some(halt);
        self
    }

    /// Skip the restart handoff and the stop monitor.
    #[must_use]
    pub fn without_handoff(mut self) -> Self {
        self.handoff = false;
        self
    }

    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn start(self) -> Result<RunningServer, StartError> {
        let config = self.config;
        config.validate()?;
        info!(port = config.port, context = %config.context_path(), "Preparing server start");

        RuntimeConfig::from_env().apply();

        let monitor = if self.handoff {
            let outcome =
                send_stop_command(config.port, config.handoff_offset, config.grace_period())?;
            if outcome == HandoffOutcome::Stopped {
                info!(port = config.port, "Took over from previous instance");
            }
            Some(StopMonitor::bind(config.port, config.handoff_offset)?)
        } else {
            None
        };

        let mut builder = BrokerBuilder::new(config.clone()).catalog(self.catalog);
        if let Some(identifier) = self.identifier {
            builder = builder.identifier(identifier);
        }
        if let Some(sessions) = self.sessions {
            builder = builder.sessions(sessions);
        }
        for stage in self.stages {
            builder = builder.stage(stage);
        }
        let broker = Arc::new(builder.build()?);

        let in_flight = InFlight::new();
        let service = AppService::new(Arc::clone(&broker), in_flight.clone());
        let addr = format!("{}:{}", config.bind_host, config.port);
        let handle = HttpServer(service)
            .start(addr.as_str())
            .map_err(|source| StartError::Listen {
                addr: addr.clone(),
                source,
            })?;
        if let Err(e) = handle.wait_ready() {
            warn!(addr = %addr, error = %e, "Server slow to accept connections");
        }
        let local = handle.addr();

        let control = Arc::new(Control {
            handle: Mutex::new(Some(handle)),
            in_flight,
            stopped: Mutex::new(false),
            stopped_cv: Condvar::new(),
        });

        let handoff_port = match monitor {
            Some(monitor) => {
                let port = monitor.port();
                monitor.spawn(
                    ControlStopper(Arc::clone(&control)),
                    self.halt.unwrap_or_else(halt_process),
                )?;
                Some(port)
            }
            None => None,
        };

        info!(%local, ?handoff_port, "Server started");
        Ok(RunningServer {
            control,
            broker,
            addr: local,
            handoff_port,
        })
    }
}

struct Control {
    handle: Mutex<Option<ServerHandle>>,
    in_flight: InFlight,
    stopped: Mutex<bool>,
    stopped_cv: Condvar,
}

impl Control {
    fn stop(&self, grace: Duration) -> usize {
        let handle = match self.handle.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let abandoned = match handle {
            Some(handle) => handle.stop_gracefully(grace, &self.in_flight),
            None => 0,
        };
        let mut stopped = match self.stopped.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *stopped = true;
        self.stopped_cv.notify_all();
        abandoned
    }
}

struct ControlStopper(Arc<Control>);

impl Stoppable for ControlStopper {
    fn stop(&mut self, grace: Duration) {
        self.0.stop(grace);
    }
}

/// A started server.
pub struct RunningServer {
    control: Arc<Control>,
    broker: Arc<CommandBroker>,
    addr: SocketAddr,
    handoff_port: Option<u16>,
}

impl RunningServer {
    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Port of the stop monitor, when the handoff is enabled.
    #[must_use]
    pub fn handoff_port(&self) -> Option<u16> {
        self.handoff_port
    }

    #[must_use]
    pub fn broker(&self) -> &Arc<CommandBroker> {
        &self.broker
    }

    /// Stop accepting and drain in-flight requests for up to `grace`.
    ///
    /// Returns the number of requests abandoned. Stopping twice is a no-op.
    pub fn stop(&self, grace: Duration) -> usize {
        self.control.stop(grace)
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        match self.control.stopped.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Block until the server has been stopped.
    pub fn wait(&self) {
        let mut stopped = match self.control.stopped.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        while !*stopped {
            stopped = match self.control.stopped_cv.wait(stopped) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }
}
