//! Built-in demo commands registered by the `frontline` binary.

use crate::command::Command;
use crate::context::CommandContext;
use crate::error::DispatchError;
use crate::resolve::{conventional_identifier, CommandCatalog};
use serde_json::json;
use tracing::debug;

/// Echoes the request back as JSON.
#[derive(Debug, Default)]
pub struct EchoCommand;

impl Command for EchoCommand {
    fn execute(&mut self, ctx: &mut CommandContext<'_>) -> Result<(), DispatchError> {
        let body = json!({
            "verb": ctx.verb(),
            "method": ctx.method(),
            "path_info": ctx.path_info(),
            "params": ctx.params(),
        });
        ctx.write_json(&body)
    }
}

/// Answers `{"status":"ok"}` from inside the broker.
#[derive(Debug, Default)]
pub struct HealthCommand;

impl Command for HealthCommand {
    fn execute(&mut self, ctx: &mut CommandContext<'_>) -> Result<(), DispatchError> {
        ctx.write_json(&json!({ "status": "ok" }))
    }
}

/// Register `echo` and `health` under `namespace`.
pub fn register_builtin(catalog: &mut CommandCatalog, namespace: &str) {
    if let Some(id) = conventional_identifier(namespace, "echo") {
        debug!(identifier = %id, "Registering built-in command");
        catalog.register_default::<EchoCommand>(&id);
    }
    if let Some(id) = conventional_identifier(namespace, "health") {
        debug!(identifier = %id, "Registering built-in command");
        catalog.register_default::<HealthCommand>(&id);
    }
}
