//! SQLite connection pool.
//!
//! Uses `r2d2` with the `r2d2_sqlite` manager. Every new connection gets the
//! configured busy timeout and foreign key enforcement.

use super::SessionError;
use crate::config::DbConfig;
use r2d2::event::HandleEvent;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use tracing::info;

pub type DbPool = Pool<SqliteConnectionManager>;

pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

#[derive(Debug)]
struct PragmaCustomizer {
    busy_timeout_ms: u32,
}

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for PragmaCustomizer {
    fn on_acquire(&self, conn: &mut Connection) -> Result<(), rusqlite::Error> {
        conn.execute_batch(&format!(
            "PRAGMA busy_timeout = {};\
             PRAGMA foreign_keys = ON;",
            self.busy_timeout_ms
        ))
    }
}

/// Build a pool for `config`, optionally observing pool events.
pub fn build_pool(
    config: &DbConfig,
    events: Option<Box<dyn HandleEvent>>,
) -> Result<DbPool, SessionError> {
    let manager = match &config.path {
        Some(path) => SqliteConnectionManager::file(path),
        None => SqliteConnectionManager::memory(),
    };
    let mut builder = Pool::builder()
        .max_size(config.pool_size.max(1))
        .connection_timeout(config.connection_timeout())
        .connection_customizer(Box::new(PragmaCustomizer {
            busy_timeout_ms: config.busy_timeout_ms,
        }));
    if let Some(handler) = events {
        builder = builder.event_handler(handler);
    }
    let pool = builder.build(manager).map_err(SessionError::PoolInit)?;
    info!(
        path = ?config.path,
        pool_size = config.pool_size,
        "Database pool ready"
    );
    Ok(pool)
}
