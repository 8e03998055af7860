//! Error taxonomy for request dispatch.
//!
//! Every stage of the pipeline returns [`DispatchError`] on failure. Subsystem
//! errors ([`ResolveError`], [`SessionError`]) are wrapped without being
//! reinterpreted, so the transaction stage can re-raise exactly what the
//! command produced.

use crate::resolve::ResolveError;
use crate::session::SessionError;
use thiserror::Error;

/// Failure of a single request dispatch.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Command or view resolution failed.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// The connection pool could not supply a connection.
    #[error("resource error: {0}")]
    Resource(#[source] SessionError),

    /// Commit, rollback or query failure on the request session.
    #[error("session error: {0}")]
    Session(#[source] SessionError),

    /// A command explicitly signalled an HTTP error status.
    #[error("status {status}: {message}")]
    Status { status: u16, message: String },

    /// A server-side forward could not be carried out.
    #[error("cannot forward to {target}: {reason}")]
    Forward { target: String, reason: String },

    /// A view resource exists but could not be rendered.
    #[error("cannot render {path}: {source}")]
    Render {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Any other failure raised by command code.
    #[error(transparent)]
    Handler(#[from] anyhow::Error),
}

impl From<SessionError> for DispatchError {
    fn from(err: SessionError) -> Self {
        if err.is_resource() {
            DispatchError::Resource(err)
        } else {
            DispatchError::Session(err)
        }
    }
}

impl DispatchError {
    /// Shortcut for commands that want to abort with a status code.
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        DispatchError::Status {
            status,
            message: message.into(),
        }
    }

    /// HTTP status this error is reported with.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            DispatchError::Resolve(e) if e.is_not_found() => 404,
            DispatchError::Status { status, .. } => *status,
            DispatchError::Resource(_) => 503,
            _ => 500,
        }
    }

    /// Not-found conditions are client-facing and logged quietly.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, DispatchError::Resolve(e) if e.is_not_found())
    }
}
