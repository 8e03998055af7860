//! # Configuration Module
//!
//! Process-wide configuration for a frontline server. An [`AppConfig`] is
//! built once at startup (from YAML, environment variables, or the fluent
//! [`crate::server::Server`] builder), validated, and then shared read-only
//! behind an `Arc` for the life of the process.
//!
//! ## YAML example
//!
//! ```yaml
//! port: 8765
//! context: shop
//! commands_namespace: shop.commands
//! command_mappings:
//!   login: shop.auth.LoginCommand
//! views_root: /WEB-INF/views
//! view_mappings:
//!   home: /WEB-INF/views/index.html
//! web_content: web
//! grace_period_ms: 2000
//! database:
//!   path: data/shop.db
//!   pool_size: 8
//! ```
//!
//! ## Environment overrides
//!
//! - `FRONTLINE_PORT` - server port
//! - `FRONTLINE_GRACE_MS` - grace period sent to a prior instance on handoff

use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 8765;
/// Default mount segment for the command broker (`/cmd/*`).
pub const DEFAULT_MOUNT: &str = "cmd";
/// Default root of convention-resolved views.
pub const DEFAULT_VIEWS_ROOT: &str = "/WEB-INF/views";
/// Extension appended to convention-resolved view names.
pub const DEFAULT_VIEW_EXTENSION: &str = ".html";
/// Grace period, in milliseconds, granted to a prior instance when taking over its port.
pub const DEFAULT_GRACE_PERIOD_MS: u64 = 2000;
/// Offset between the HTTP port and the handoff companion port.
pub const DEFAULT_HANDOFF_OFFSET: u16 = 100;
/// Idle seconds before an HTTP session is discarded.
pub const DEFAULT_SESSION_IDLE_TIMEOUT_SECS: u64 = 30 * 60;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid value for {var}: {value}")]
    Env { var: &'static str, value: String },
    #[error("at least one of commands_namespace or command_mappings must be provided")]
    NoCommandSource,
    #[error("invalid mount segment {0:?}: must be non-empty and contain no '/'")]
    InvalidMount(String),
    #[error("handoff port {port} + {offset} does not fit in a TCP port")]
    HandoffPortOverflow { port: u16, offset: u16 },
}

/// Database access configuration.
///
/// The pool is an `r2d2` pool of SQLite connections. When `path` is absent an
/// in-memory database is used; every connection of that pool shares the same
/// named memory database, which persists while any pooled connection is open.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct DbConfig {
    pub path: Option<PathBuf>,
    pub pool_size: u32,
    pub connection_timeout_ms: u64,
    pub busy_timeout_ms: u32,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: None,
            pool_size: 8,
            connection_timeout_ms: 5_000,
            busy_timeout_ms: 30_000,
        }
    }
}

impl DbConfig {
    /// File-backed database at `path` with default pool settings.
    pub fn file<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    /// In-memory database with a single pooled connection.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            pool_size: 1,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }
}

/// Complete server configuration.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP port.
    pub port: u16,
    /// Interface the HTTP server binds to.
    pub bind_host: String,
    /// Application context path, without slashes (`""` means root).
    pub context: String,
    /// Segment under the context where the command broker is mounted.
    pub mount: String,
    /// Namespace scanned for verb-marked commands and used by the naming convention.
    pub commands_namespace: Option<String>,
    /// Explicit verb to command identifier table.
    pub command_mappings: HashMap<String, String>,
    /// Root of convention-resolved views, relative to `web_content`.
    pub views_root: Option<String>,
    /// Extension appended by the view naming convention.
    pub view_extension: String,
    /// Explicit view name to resource path table.
    pub view_mappings: HashMap<String, String>,
    /// Directory holding static files and view templates.
    pub web_content: PathBuf,
    /// Grace period sent to a prior instance during handoff.
    pub grace_period_ms: u64,
    /// Offset of the handoff companion port.
    pub handoff_offset: u16,
    /// Where unauthenticated requests are redirected.
    pub entry_point: String,
    /// Idle time after which an HTTP session is discarded.
    pub session_idle_timeout_secs: u64,
    /// Optional database access.
    pub database: Option<DbConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind_host: "0.0.0.0".to_string(),
            context: String::new(),
            mount: DEFAULT_MOUNT.to_string(),
            commands_namespace: None,
            command_mappings: HashMap::new(),
            views_root: Some(DEFAULT_VIEWS_ROOT.to_string()),
            view_extension: DEFAULT_VIEW_EXTENSION.to_string(),
            view_mappings: HashMap::new(),
            web_content: PathBuf::from("web"),
            grace_period_ms: DEFAULT_GRACE_PERIOD_MS,
            handoff_offset: DEFAULT_HANDOFF_OFFSET,
            entry_point: "/".to_string(),
            session_idle_timeout_secs: DEFAULT_SESSION_IDLE_TIMEOUT_SECS,
            database: None,
        }
    }
}

impl AppConfig {
    /// Configuration with every default and the given commands namespace.
    pub fn with_namespace(namespace: impl Into<String>) -> Self {
        Self {
            commands_namespace: Some(namespace.into()),
            ..Self::default()
        }
    }

    /// Parse a YAML document. Missing fields take their defaults.
    pub fn from_yaml_str(source: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(source)
    }

    /// Load a YAML configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `FRONTLINE_*` environment overrides.
    pub fn apply_env(mut self) -> Result<Self, ConfigError> {
        if let Ok(val) = env::var("FRONTLINE_PORT") {
            self.port = val.parse().map_err(|_| ConfigError::Env {
                var: "FRONTLINE_PORT",
                value: val.clone(),
            })?;
        }
        if let Ok(val) = env::var("FRONTLINE_GRACE_MS") {
            self.grace_period_ms = val.parse().map_err(|_| ConfigError::Env {
                var: "FRONTLINE_GRACE_MS",
                value: val.clone(),
            })?;
        }
        Ok(self)
    }

    /// Check the invariants the rest of the server relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.commands_namespace.is_none() && self.command_mappings.is_empty() {
            return Err(ConfigError::NoCommandSource);
        }
        if self.mount.is_empty() || self.mount.contains('/') {
            return Err(ConfigError::InvalidMount(self.mount.clone()));
        }
        self.handoff_port()?;
        Ok(())
    }

    /// Companion port the stop monitor listens on.
    pub fn handoff_port(&self) -> Result<u16, ConfigError> {
        self.port
            .checked_add(self.handoff_offset)
            .ok_or(ConfigError::HandoffPortOverflow {
                port: self.port,
                offset: self.handoff_offset,
            })
    }

    #[must_use]
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    #[must_use]
    pub fn session_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.session_idle_timeout_secs)
    }

    /// URL prefix of the context path: `""` or `"/ctx"`.
    #[must_use]
    pub fn context_path(&self) -> String {
        let ctx = self.context.trim_matches('/');
        if ctx.is_empty() {
            String::new()
        } else {
            format!("/{ctx}")
        }
    }

    /// URL prefix under which the broker is reachable, e.g. `"/shop/cmd"`.
    #[must_use]
    pub fn mount_prefix(&self) -> String {
        format!("{}/{}", self.context_path(), self.mount)
    }
}
