use super::core::{Exchange, Flow, Next, Stage};
use crate::error::DispatchError;
use crate::http_session::SessionStore;
use crate::security::{hash_credentials, Identifier};
use std::sync::Arc;
use tracing::{debug, warn};

/// Session attribute holding the authenticated identity.
pub const USER_ATTRIBUTE: &str = "user";

/// Request parameter carrying the clear-text password on login.
pub const PASSWORD_PARAM: &str = "password";

/// Lets a request through only when its HTTP session carries a user.
///
/// Requests without one may authenticate by sending `login` and `password`
/// parameters; on success the identity is stored and the client is
/// redirected to the same path, otherwise to the entry point.
pub struct AuthGate {
    identifier: Arc<dyn Identifier>,
    sessions: SessionStore,
    entry_point: String,
}

impl AuthGate {
    pub fn new(
        identifier: Arc<dyn Identifier>,
        sessions: SessionStore,
        entry_point: impl Into<String>,
    ) -> Self {
        Self {
            identifier,
            sessions,
            entry_point: entry_point.into(),
        }
    }
}

impl Stage for AuthGate {
    fn name(&self) -> &'static str {
        "auth_gate"
    }

    fn handle(&self, exchange: &mut Exchange, next: Next<'_>) -> Result<Flow, DispatchError> {
        if exchange
            .http_session()
            .is_some_and(|s| s.contains(USER_ATTRIBUTE))
        {
            return next.run(exchange);
        }

        let credentials = exchange
            .request
            .param("login")
            .zip(exchange.request.param(PASSWORD_PARAM))
            .map(|(l, p)| (l.to_string(), hash_credentials(l, p)));

        if let Some((login, hashed)) = credentials {
            debug!(login = %login, "Authenticating user");
            if let Some(identity) = self.identifier.identify(&login, &hashed) {
                let session = exchange.ensure_http_session(&self.sessions);
                session.set(USER_ATTRIBUTE, identity);
                debug!(login = %login, "User authenticated");
                return Ok(Flow::Redirect(exchange.request.path.clone()));
            }
        }

        warn!(uri = %exchange.request.path, "Unauthenticated access");
        Ok(Flow::Redirect(self.entry_point.clone()))
    }
}
