//! Structured logging initialization.
//!
//! All frontline modules log through `tracing`. This module installs the
//! subscriber: an `EnvFilter` (honouring `RUST_LOG` first, then
//! `FRONTLINE_LOG_LEVEL`) and a JSON or human-readable fmt layer.
//!
//! | Variable | Default | Meaning |
//! |---|---|---|
//! | `FRONTLINE_LOG_LEVEL` | `info` | trace/debug/info/warn/error |
//! | `FRONTLINE_LOG_FORMAT` | `pretty` | `json` or `pretty` |
//! | `FRONTLINE_LOG_TARGET_FILTER` | unset | extra comma-separated directives |
//! | `FRONTLINE_LOG_INCLUDE_LOCATION` | `false` | include file:line |
//!
//! Per-request entry parameters are logged at `trace` by the access log stage,
//! so `FRONTLINE_LOG_LEVEL=trace` is the switch for request dumps.

use anyhow::{anyhow, Result};
use std::env;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Log format: JSON for production, pretty-print for development
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level: trace/debug/info/warn/error
    pub log_level: String,
    /// Log format: json/pretty
    pub format: LogFormat,
    /// Module filter (comma-separated directives)
    pub target_filter: Option<String>,
    /// Include file:line location
    pub include_location: bool,
}

impl LogConfig {
    /// Parse configuration from environment variables with defaults
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            log_level: env::var("FRONTLINE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: LogFormat::parse(
                &env::var("FRONTLINE_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string()),
            ),
            target_filter: env::var("FRONTLINE_LOG_TARGET_FILTER").ok(),
            include_location: env::var("FRONTLINE_LOG_INCLUDE_LOCATION")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(false),
        }
    }

    /// Verbose configuration for local development and tests
    #[must_use]
    pub fn default_dev() -> Self {
        Self {
            log_level: "debug".to_string(),
            format: LogFormat::Pretty,
            target_filter: None,
            include_location: true,
        }
    }

    fn level(&self) -> Level {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }
}

/// Build the filter: `RUST_LOG` wins, otherwise the configured level plus target directives.
pub fn build_filter(config: &LogConfig) -> Result<EnvFilter> {
    let mut filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level().as_str()));

    // connection resets from clients are reported at info/debug by the server internals
    filter = filter.add_directive("may_minihttp=warn".parse()?);

    if let Some(targets) = &config.target_filter {
        for directive in targets.split(',').map(str::trim).filter(|d| !d.is_empty()) {
            filter = filter.add_directive(
                directive
                    .parse()
                    .map_err(|e| anyhow!("invalid log filter directive {directive}: {e}"))?,
            );
        }
    }
    Ok(filter)
}

/// Install the global subscriber.
///
/// Fails if a global subscriber is already installed, which callers that may
/// initialize twice (tests) can ignore.
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let filter = build_filter(config)?;
    let registry = tracing_subscriber::registry().with(filter);

    match config.format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(config.include_location)
                    .with_line_number(config.include_location),
            )
            .try_init()?,
        LogFormat::Pretty => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_file(config.include_location)
                    .with_line_number(config.include_location),
            )
            .try_init()?,
    }
    Ok(())
}
