//! Startup-time registry of known commands.
//!
//! Commands are registered under a fully-qualified identifier
//! (`app.commands.LoginCommand`). The identifier is what the explicit mapping
//! table and the naming convention look up. A command can additionally carry
//! a verb marker, which makes it discoverable by verb when its identifier
//! lives under the configured commands namespace.

use crate::command::{Command, CommandFactory};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct CommandCatalog {
    factories: HashMap<String, CommandFactory>,
    markers: Vec<(String, String)>,
}

impl std::fmt::Debug for CommandCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<&String> = self.factories.keys().collect();
        ids.sort();
        f.debug_struct("CommandCatalog")
            .field("identifiers", &ids)
            .field("markers", &self.markers)
            .finish()
    }
}

impl CommandCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command factory under `identifier`, replacing any previous one.
    pub fn register<F, C>(&mut self, identifier: &str, factory: F) -> &mut Self
    where
        F: Fn() -> C + Send + Sync + 'static,
        C: Command + 'static,
    {
        let factory: CommandFactory = Arc::new(move || Box::new(factory()) as Box<dyn Command>);
        self.factories.insert(identifier.to_string(), factory);
        self
    }

    /// Register a `Default`-constructible command under `identifier`.
    pub fn register_default<C>(&mut self, identifier: &str) -> &mut Self
    where
        C: Command + Default + 'static,
    {
        self.register(identifier, C::default)
    }

    /// Register a command and mark it as handling `verb`.
    pub fn register_verb<F, C>(&mut self, verb: &str, identifier: &str, factory: F) -> &mut Self
    where
        F: Fn() -> C + Send + Sync + 'static,
        C: Command + 'static,
    {
        self.register(identifier, factory);
        self.markers.retain(|(v, _)| v != verb);
        self.markers.push((verb.to_string(), identifier.to_string()));
        self
    }

    /// Factory registered under `identifier`.
    #[must_use]
    pub fn factory(&self, identifier: &str) -> Option<&CommandFactory> {
        self.factories.get(identifier)
    }

    #[must_use]
    pub fn contains(&self, identifier: &str) -> bool {
        self.factories.contains_key(identifier)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Verb-marked commands whose identifier lives under `namespace`.
    ///
    /// This is the startup scan: the returned table maps verb to identifier.
    #[must_use]
    pub fn marked_in(&self, namespace: &str) -> HashMap<String, String> {
        let namespace = namespace.trim_end_matches('.');
        let prefix = format!("{namespace}.");
        self.markers
            .iter()
            .filter(|(_, id)| namespace.is_empty() || id.starts_with(&prefix))
            .map(|(verb, id)| (verb.clone(), id.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CommandContext;
    use crate::error::DispatchError;

    #[derive(Default)]
    struct Noop;

    impl Command for Noop {
        fn execute(&mut self, _ctx: &mut CommandContext<'_>) -> Result<(), DispatchError> {
            Ok(())
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let mut catalog = CommandCatalog::new();
        catalog
            .register_default::<Noop>("app.commands.PingCommand")
            .register("app.commands.PongCommand", || Noop);
        assert_eq!(catalog.len(), 2);
        assert!(catalog.contains("app.commands.PingCommand"));
        assert!(catalog.factory("app.commands.Missing").is_none());
    }

    #[test]
    fn test_markers_are_scoped_to_namespace() {
        let mut catalog = CommandCatalog::new();
        catalog.register_verb("hello", "app.commands.greet.Hi", || Noop);
        catalog.register_verb("outside", "other.Outside", || Noop);
        catalog.register_verb("prefixed", "app.commandsX.Tricky", || Noop);

        let marked = catalog.marked_in("app.commands");
        assert_eq!(marked.len(), 1);
        assert_eq!(
            marked.get("hello").map(String::as_str),
            Some("app.commands.greet.Hi")
        );
    }

    #[test]
    fn test_remarking_a_verb_replaces_it() {
        let mut catalog = CommandCatalog::new();
        catalog.register_verb("hello", "app.A", || Noop);
        catalog.register_verb("hello", "app.B", || Noop);
        let marked = catalog.marked_in("app");
        assert_eq!(marked.get("hello").map(String::as_str), Some("app.B"));
    }
}
