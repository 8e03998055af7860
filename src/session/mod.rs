//! # Request-scoped database sessions
//!
//! A [`Session`] wraps at most one pooled SQLite connection with an open
//! transaction. It is created per request by [`SessionManager::open`] without
//! touching the pool; the connection is checked out and `BEGIN` is issued on
//! first use. The transaction stage of the pipeline commits or rolls back and
//! then closes the session, which returns the connection to the pool.
//!
//! ```text
//! Absent --acquire--> Active --commit/rollback--> Terminated
//!    ^                                                 |
//!    +-------------------- close ----------------------+
//! ```

mod lifecycle;
mod pool;

pub use lifecycle::Session;
pub use pool::{build_pool, DbPool, PooledConnection};

use crate::config::DbConfig;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    /// The pool could not hand out a connection.
    #[error("cannot obtain a database connection: {0}")]
    Resource(#[source] r2d2::Error),

    #[error("cannot begin transaction: {0}")]
    Begin(#[source] rusqlite::Error),

    #[error("commit failed: {0}")]
    Commit(#[source] rusqlite::Error),

    #[error("rollback failed: {0}")]
    Rollback(#[source] rusqlite::Error),

    #[error("query failed ({sql}): {source}")]
    Query {
        sql: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("cannot initialize connection pool: {0}")]
    PoolInit(#[source] r2d2::Error),

    /// A command asked for the database but none is configured.
    #[error("no database is configured")]
    NotConfigured,
}

impl SessionError {
    /// Whether the failure is about obtaining the resource rather than using it.
    #[must_use]
    pub fn is_resource(&self) -> bool {
        matches!(
            self,
            SessionError::Resource(_) | SessionError::Begin(_) | SessionError::PoolInit(_)
        )
    }
}

/// Hands out one [`Session`] per request over a shared pool.
#[derive(Clone, Debug)]
pub struct SessionManager {
    pool: DbPool,
}

impl SessionManager {
    #[must_use]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Build the pool described by `config`.
    pub fn from_config(config: &DbConfig) -> Result<Self, SessionError> {
        Ok(Self::new(build_pool(config, None)?))
    }

    /// New, unmaterialized session. Does not touch the pool.
    #[must_use]
    pub fn open(&self) -> Session {
        Session::new(self.pool.clone())
    }

    #[must_use]
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}
