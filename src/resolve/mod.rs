//! # Resolution Engine
//!
//! Maps a request verb to a command and a view name to a renderable resource.
//!
//! Command resolution tries, in order:
//!
//! 1. the explicit `command_mappings` table (a mapped identifier that is not
//!    registered in the [`CommandCatalog`] is fatal, not skipped),
//! 2. verb markers registered under the commands namespace,
//! 3. the naming convention `namespace.prefix.WordCommand`.
//!
//! View resolution tries the explicit `view_mappings` table, then
//! `views_root/name + view_extension` if that resource exists.
//!
//! Both resolvers hold only tables derived from the immutable configuration
//! and resolve fresh on every call.

mod catalog;
mod commands;
mod verb;
mod views;

pub use catalog::CommandCatalog;
pub use commands::{CommandResolver, ResolutionTier, ResolvedCommand};
pub use verb::{conventional_identifier, extract_verb, is_valid_verb, COMMAND_SUFFIX};
pub use views::{ResolvedView, ViewResolver};

use thiserror::Error;

/// Existence check against the serving environment.
pub trait ResourceLocator: Send + Sync {
    fn exists(&self, path: &str) -> bool;
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("no command found for verb {verb:?}")]
    CommandNotFound { verb: String },

    #[error("verb {verb:?} is mapped to unknown command {identifier}")]
    MappedCommandMissing { verb: String, identifier: String },

    #[error("view not found: {name}")]
    ViewNotFound { name: String },
}

impl ResolveError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ResolveError::CommandNotFound { .. } | ResolveError::ViewNotFound { .. }
        )
    }
}
