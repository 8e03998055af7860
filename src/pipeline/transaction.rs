use super::core::{Exchange, Flow, Next, Stage};
use crate::error::DispatchError;
use crate::session::SessionManager;
use tracing::{trace, warn};

/// Wraps the rest of the chain in one database transaction.
///
/// The session is opened and materialized before downstream runs. A
/// successful outcome commits; a failed one rolls back and returns the
/// original error. The session is closed exactly once either way.
pub struct TransactionStage {
    sessions: SessionManager,
}

impl TransactionStage {
    #[must_use]
    pub fn new(sessions: SessionManager) -> Self {
        Self { sessions }
    }
}

impl Stage for TransactionStage {
    fn name(&self) -> &'static str {
        "transaction"
    }

    fn handle(&self, exchange: &mut Exchange, next: Next<'_>) -> Result<Flow, DispatchError> {
        let mut session = self.sessions.open();
        session.acquire()?;
        exchange.db = Some(session);

        let result = next.run(exchange);

        let Some(mut session) = exchange.db.take() else {
            return result;
        };
        let outcome = match result {
            Ok(flow) => match session.commit() {
                Ok(()) => Ok(flow),
                Err(e) => Err(DispatchError::from(e)),
            },
            Err(err) => {
                warn!(error = %err, "Request failed, rolling back");
                // a rollback failure is logged by the session and never replaces err
                let _ = session.rollback();
                Err(err)
            }
        };
        session.close();
        trace!("Transaction stage done");
        outcome
    }
}
