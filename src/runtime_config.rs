//! # Runtime Configuration Module
//!
//! Environment-driven tuning of the coroutine runtime that serves requests.
//!
//! ## Environment Variables
//!
//! ### `FRONTLINE_STACK_SIZE`
//!
//! Stack size for the coroutines `may_minihttp` spawns per connection. Every
//! stage of the dispatch pipeline, the command and any view rendering run on
//! that stack. Accepts values in:
//! - Decimal: `65536` (64 KB)
//! - Hexadecimal: `0x10000` (64 KB)
//!
//! Default: `0x10000` (64 KB). SQLite statements and template rendering are
//! stack-hungry; do not go much below 32 KB.
//!
//! ```bash
//! export FRONTLINE_STACK_SIZE=0x20000
//! frontline serve --config config.yaml
//! ```

use std::env;

const DEFAULT_STACK_SIZE: usize = 0x10000;

/// Runtime configuration loaded from environment variables.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeConfig {
    /// Stack size for coroutines in bytes
    pub stack_size: usize,
}

impl RuntimeConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let stack_size = env::var("FRONTLINE_STACK_SIZE")
            .ok()
            .and_then(|val| parse_size(&val))
            .unwrap_or(DEFAULT_STACK_SIZE);
        RuntimeConfig { stack_size }
    }

    /// Apply this configuration to the global `may` runtime.
    pub fn apply(&self) {
        may::config().set_stack_size(self.stack_size);
    }
}

fn parse_size(val: &str) -> Option<usize> {
    match val.strip_prefix("0x") {
        Some(hex) => usize::from_str_radix(hex, 16).ok(),
        None => val.parse().ok(),
    }
}
