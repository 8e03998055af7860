//! # Command broker
//!
//! The front controller behind the `{context}/{mount}/*` URL space. A
//! [`CommandBroker`] is built once at startup from an [`AppConfig`] and a
//! [`CommandCatalog`]; afterwards it is shared read-only between all
//! connection coroutines and turns each [`ParsedRequest`] into a
//! [`HandlerResponse`] by running the dispatch pipeline.
//!
//! ```rust,no_run
//! use frontline::{AppConfig, BrokerBuilder, CommandCatalog, CommandContext, DispatchError};
//!
//! let mut catalog = CommandCatalog::new();
//! catalog.register("shop.commands.PingCommand", || {
//!     |ctx: &mut CommandContext<'_>| -> Result<(), DispatchError> {
//!         ctx.write("pong");
//!         Ok(())
//!     }
//! });
//! let broker = BrokerBuilder::new(AppConfig::with_namespace("shop.commands"))
//!     .catalog(catalog)
//!     .build()
//!     .unwrap();
//! # let _ = broker;
//! ```

use crate::config::{AppConfig, ConfigError};
use crate::error::DispatchError;
use crate::http_session::{session_cookie, SessionStore, SESSION_COOKIE};
use crate::pipeline::{
    AccessLog, AuthGate, Exchange, Flow, HandlerResponse, InvokeStage, Next, Stage,
    TransactionStage,
};
use crate::resolve::{CommandCatalog, CommandResolver, ResourceLocator, ViewResolver};
use crate::security::Identifier;
use crate::server::request::ParsedRequest;
use crate::session::{SessionError, SessionManager};
use crate::static_files::StaticFiles;
use dashmap::DashMap;
use serde_json::{Map, Value as JsonValue};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info};

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// State shared by all requests: configuration, resolvers, scopes.
pub struct Application {
    config: Arc<AppConfig>,
    commands: CommandResolver,
    views: ViewResolver,
    web: StaticFiles,
    scope: DashMap<String, JsonValue>,
    sessions: SessionStore,
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("commands", &self.commands)
            .field("views", &self.views)
            .field("web", &self.web)
            .finish_non_exhaustive()
    }
}

impl Application {
    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    #[must_use]
    pub fn commands(&self) -> &CommandResolver {
        &self.commands
    }

    #[must_use]
    pub fn views(&self) -> &ViewResolver {
        &self.views
    }

    #[must_use]
    pub fn web(&self) -> &StaticFiles {
        &self.web
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    #[must_use]
    pub fn application_variable(&self, name: &str) -> Option<JsonValue> {
        self.scope.get(name).map(|v| v.value().clone())
    }

    pub fn set_application_variable(&self, name: String, value: JsonValue) {
        self.scope.insert(name, value);
    }

    pub fn remove_application_variable(&self, name: &str) -> Option<JsonValue> {
        self.scope.remove(name).map(|(_, v)| v)
    }

    #[must_use]
    pub fn application_snapshot(&self) -> Map<String, JsonValue> {
        self.scope
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }
}

/// Assembles a [`CommandBroker`].
pub struct BrokerBuilder {
    config: AppConfig,
    catalog: CommandCatalog,
    identifier: Option<Arc<dyn Identifier>>,
    stages: Vec<Arc<dyn Stage>>,
    sessions: Option<SessionManager>,
    locator: Option<Arc<dyn ResourceLocator>>,
    store: Option<SessionStore>,
}

impl BrokerBuilder {
    #[must_use]
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            catalog: CommandCatalog::new(),
            identifier: None,
            stages: Vec::new(),
            sessions: None,
            locator: None,
            store: None,
        }
    }

    #[must_use]
    pub fn catalog(mut self, catalog: CommandCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Require authentication for every broker request.
    #[must_use]
    pub fn identifier(mut self, identifier: Arc<dyn Identifier>) -> Self {
        self.identifier = Some(identifier);
        self
    }

    /// Extra stage, run after the built-in ones and before the command.
    #[must_use]
    pub fn stage(mut self, stage: Arc<dyn Stage>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Use this session manager instead of building a pool from the configuration.
    #[must_use]
    pub fn sessions(mut self, sessions: SessionManager) -> Self {
        self.sessions = Some(sessions);
        self
    }

    /// Existence check for convention-resolved views; defaults to the web content directory.
    #[must_use]
    pub fn locator(mut self, locator: Arc<dyn ResourceLocator>) -> Self {
        self.locator = Some(locator);
        self
    }

    /// Use this HTTP session store instead of one with the configured idle timeout.
    #[must_use]
    pub fn session_store(mut self, store: SessionStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> Result<CommandBroker, BuildError> {
        self.config.validate()?;
        let config = Arc::new(self.config);

        let sessions = match (self.sessions, &config.database) {
            (Some(manager), _) => Some(manager),
            (None, Some(db)) => Some(SessionManager::from_config(db)?),
            (None, None) => None,
        };

        let web = StaticFiles::new(&config.web_content);
        let locator = self
            .locator
            .unwrap_or_else(|| Arc::new(web.clone()) as Arc<dyn ResourceLocator>);
        let catalog = Arc::new(self.catalog);
        let store = self
            .store
            .unwrap_or_else(|| SessionStore::with_idle_timeout(config.session_idle_timeout()));
        let app = Arc::new(Application {
            commands: CommandResolver::new(&config, Arc::clone(&catalog)),
            views: ViewResolver::new(&config, locator),
            web,
            scope: DashMap::new(),
            sessions: store.clone(),
            config: Arc::clone(&config),
        });

        let mut chain: Vec<Arc<dyn Stage>> = vec![Arc::new(AccessLog)];
        if let Some(identifier) = self.identifier {
            chain.push(Arc::new(AuthGate::new(
                identifier,
                store,
                config.entry_point.clone(),
            )));
        }
        if let Some(manager) = sessions {
            chain.push(Arc::new(TransactionStage::new(manager)));
        }
        chain.extend(self.stages);
        chain.push(Arc::new(InvokeStage::new(Arc::clone(&app))));

        info!(
            mount = %config.mount_prefix(),
            commands = catalog.len(),
            stages = ?chain.iter().map(|s| s.name()).collect::<Vec<_>>(),
            "Command broker ready"
        );
        Ok(CommandBroker { app, chain })
    }
}

/// Front controller for the broker mount.
pub struct CommandBroker {
    app: Arc<Application>,
    chain: Vec<Arc<dyn Stage>>,
}

impl std::fmt::Debug for CommandBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandBroker")
            .field("app", &self.app)
            .field("stages", &self.chain.iter().map(|s| s.name()).collect::<Vec<_>>())
            .finish()
    }
}

impl CommandBroker {
    #[must_use]
    pub fn application(&self) -> &Arc<Application> {
        &self.app
    }

    #[must_use]
    pub fn config(&self) -> &AppConfig {
        self.app.config()
    }

    /// Path under the mount if `path` belongs to the broker.
    #[must_use]
    pub fn path_info<'p>(&self, path: &'p str) -> Option<&'p str> {
        let prefix = self.app.config().mount_prefix();
        let rest = path.strip_prefix(prefix.as_str())?;
        (rest.is_empty() || rest.starts_with('/')).then_some(rest)
    }

    /// Run the pipeline for one request.
    pub fn dispatch(&self, request: ParsedRequest) -> HandlerResponse {
        let path_info = self.path_info(&request.path).unwrap_or("").to_string();
        let mut exchange = Exchange::new(request, path_info);
        if let Some(session) = exchange
            .request
            .cookies
            .get(SESSION_COOKIE)
            .and_then(|id| self.app.sessions().get(id))
        {
            exchange.attach_http_session(session);
        }

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            Next::new(&self.chain).run(&mut exchange)
        }));
        // a panic may leave a session behind; dropping it rolls back
        drop(exchange.db.take());

        let mut response = match outcome {
            Ok(Ok(Flow::Completed)) => std::mem::take(&mut exchange.response),
            Ok(Ok(Flow::Redirect(location))) => HandlerResponse::redirect(&location),
            Ok(Err(err)) => {
                let status = err.http_status();
                if err.is_not_found() {
                    debug!(path = %exchange.request.path, error = %err, "Not found");
                } else {
                    error!(path = %exchange.request.path, status, error = %err, "Request failed");
                }
                let message = match &err {
                    DispatchError::Status { message, .. } => Some(message.as_str()),
                    _ => None,
                };
                HandlerResponse::error(status, message)
            }
            Err(panic) => {
                let panic_message = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(
                    path = %exchange.request.path,
                    panic_message = %panic_message,
                    "Command panicked"
                );
                HandlerResponse::error(500, None)
            }
        };

        if exchange.session_created() {
            if let Some(session) = exchange.http_session() {
                response.add_header(
                    "set-cookie",
                    session_cookie(session, &self.app.config().context_path()),
                );
            }
        }
        response
    }
}
