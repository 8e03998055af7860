//! The unit of request-handling logic.

use crate::context::CommandContext;
use crate::error::DispatchError;
use std::sync::Arc;

/// A command handles one request, addressed by its verb.
///
/// A fresh instance is produced by the command's factory for every request,
/// so implementations may keep per-request state in `self`.
///
/// ```rust
/// use frontline::{Command, CommandContext, DispatchError};
///
/// struct LoginCommand;
///
/// impl Command for LoginCommand {
///     fn execute(&mut self, ctx: &mut CommandContext<'_>) -> Result<(), DispatchError> {
///         let login = ctx.param("login").unwrap_or("anonymous").to_string();
///         ctx.set_variable("login", login);
///         ctx.forward_to_view("welcome")
///     }
/// }
/// ```
pub trait Command: Send {
    fn execute(&mut self, ctx: &mut CommandContext<'_>) -> Result<(), DispatchError>;
}

/// Produces a new command instance per request.
pub type CommandFactory = Arc<dyn Fn() -> Box<dyn Command> + Send + Sync>;

/// Commands can be plain functions or closures.
impl<F> Command for F
where
    F: FnMut(&mut CommandContext<'_>) -> Result<(), DispatchError> + Send,
{
    fn execute(&mut self, ctx: &mut CommandContext<'_>) -> Result<(), DispatchError> {
        self(ctx)
    }
}
