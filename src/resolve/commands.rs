use super::catalog::CommandCatalog;
use super::verb::{conventional_identifier, is_valid_verb};
use super::ResolveError;
use crate::command::{Command, CommandFactory};
use crate::config::AppConfig;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Which lookup produced a [`ResolvedCommand`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionTier {
    Explicit,
    Marker,
    Convention,
}

impl fmt::Display for ResolutionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResolutionTier::Explicit => "explicit",
            ResolutionTier::Marker => "marker",
            ResolutionTier::Convention => "convention",
        })
    }
}

/// A verb bound to the command that handles it.
#[derive(Clone)]
pub struct ResolvedCommand {
    pub verb: String,
    pub identifier: String,
    pub tier: ResolutionTier,
    factory: CommandFactory,
}

impl fmt::Debug for ResolvedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedCommand")
            .field("verb", &self.verb)
            .field("identifier", &self.identifier)
            .field("tier", &self.tier)
            .finish_non_exhaustive()
    }
}

impl ResolvedCommand {
    /// New command instance for one request.
    #[must_use]
    pub fn instantiate(&self) -> Box<dyn Command> {
        (self.factory)()
    }
}

/// Verb to command resolution over the explicit, marker and convention tiers.
#[derive(Debug)]
pub struct CommandResolver {
    mappings: HashMap<String, String>,
    markers: HashMap<String, String>,
    namespace: Option<String>,
    catalog: Arc<CommandCatalog>,
}

impl CommandResolver {
    /// Build the resolver, scanning the catalog for verb markers under the namespace.
    pub fn new(config: &AppConfig, catalog: Arc<CommandCatalog>) -> Self {
        let namespace = config
            .commands_namespace
            .as_deref()
            .map(|ns| ns.trim_end_matches('.').to_string())
            .filter(|ns| !ns.is_empty());
        let markers = match &namespace {
            Some(ns) => catalog.marked_in(ns),
            None => HashMap::new(),
        };
        for (verb, identifier) in &markers {
            info!(verb = %verb, identifier = %identifier, "Verb marker registered");
        }
        Self {
            mappings: config.command_mappings.clone(),
            markers,
            namespace,
            catalog,
        }
    }

    /// Resolve `verb` to a command.
    ///
    /// A verb that does not match `(prefix.)*word` fails before any table is consulted.
    pub fn resolve(&self, verb: &str) -> Result<ResolvedCommand, ResolveError> {
        if !is_valid_verb(verb) {
            debug!(verb = %verb, "Verb rejected by pattern");
            return Err(ResolveError::CommandNotFound {
                verb: verb.to_string(),
            });
        }

        if let Some(identifier) = self.mappings.get(verb) {
            let factory = self.catalog.factory(identifier).ok_or_else(|| {
                ResolveError::MappedCommandMissing {
                    verb: verb.to_string(),
                    identifier: identifier.clone(),
                }
            })?;
            return Ok(self.bound(verb, identifier, ResolutionTier::Explicit, factory));
        }

        if let Some(identifier) = self.markers.get(verb) {
            if let Some(factory) = self.catalog.factory(identifier) {
                return Ok(self.bound(verb, identifier, ResolutionTier::Marker, factory));
            }
        }

        if let Some(namespace) = &self.namespace {
            if let Some(identifier) = conventional_identifier(namespace, verb) {
                if let Some(factory) = self.catalog.factory(&identifier) {
                    return Ok(self.bound(verb, &identifier, ResolutionTier::Convention, factory));
                }
                debug!(verb = %verb, candidate = %identifier, "No command under conventional name");
            }
        }

        Err(ResolveError::CommandNotFound {
            verb: verb.to_string(),
        })
    }

    fn bound(
        &self,
        verb: &str,
        identifier: &str,
        tier: ResolutionTier,
        factory: &CommandFactory,
    ) -> ResolvedCommand {
        debug!(verb = %verb, identifier = %identifier, tier = %tier, "Command resolved");
        ResolvedCommand {
            verb: verb.to_string(),
            identifier: identifier.to_string(),
            tier,
            factory: Arc::clone(factory),
        }
    }

    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }
}
