use super::core::{Exchange, Flow, Next, Stage};
use crate::broker::Application;
use crate::context::CommandContext;
use crate::error::DispatchError;
use std::sync::Arc;

/// Terminal stage: resolves the verb and runs its command.
pub struct InvokeStage {
    app: Arc<Application>,
}

impl InvokeStage {
    #[must_use]
    pub fn new(app: Arc<Application>) -> Self {
        Self { app }
    }
}

impl Stage for InvokeStage {
    fn name(&self) -> &'static str {
        "invoke"
    }

    fn handle(&self, exchange: &mut Exchange, _next: Next<'_>) -> Result<Flow, DispatchError> {
        CommandContext::new(&self.app, exchange).dispatch()?;
        Ok(match exchange.redirect.take() {
            Some(location) => Flow::Redirect(location),
            None => Flow::Completed,
        })
    }
}
