use super::{DbPool, PooledConnection, SessionError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Connection, OptionalExtension, Params};
use serde_json::{Map, Value as JsonValue};
use std::fmt;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Absent,
    Active,
    Terminated,
}

/// One request's transactional database session.
///
/// Nothing is taken from the pool until [`Session::acquire`] (or a query
/// helper) is called. Dropping a session closes it.
pub struct Session {
    pool: DbPool,
    conn: Option<PooledConnection>,
    state: State,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("materialized", &self.conn.is_some())
            .finish()
    }
}

impl Session {
    pub(crate) fn new(pool: DbPool) -> Self {
        Self {
            pool,
            conn: None,
            state: State::Absent,
        }
    }

    /// Whether a connection is currently held.
    #[must_use]
    pub fn is_materialized(&self) -> bool {
        self.conn.is_some()
    }

    /// Whether a transaction is open.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == State::Active
    }

    /// The session's connection, inside an open transaction.
    ///
    /// The first call checks a connection out of the pool and issues `BEGIN`.
    /// After a commit or rollback the same connection is reused and a new
    /// transaction begins.
    pub fn acquire(&mut self) -> Result<&Connection, SessionError> {
        let conn = match self.conn.take() {
            Some(conn) => conn,
            None => {
                let conn = self.pool.get().map_err(SessionError::Resource)?;
                debug!("Connection checked out");
                conn
            }
        };
        if self.state != State::Active {
            if let Err(e) = conn.execute_batch("BEGIN") {
                self.conn = Some(conn);
                return Err(SessionError::Begin(e));
            }
            self.state = State::Active;
        }
        Ok(&**self.conn.insert(conn))
    }

    /// Commit the open transaction. No-op when none is open.
    pub fn commit(&mut self) -> Result<(), SessionError> {
        self.finish("COMMIT").map_err(|e| {
            error!(error = %e, "Transaction commit failed");
            SessionError::Commit(e)
        })
    }

    /// Roll back the open transaction. No-op when none is open.
    pub fn rollback(&mut self) -> Result<(), SessionError> {
        self.finish("ROLLBACK").map_err(|e| {
            error!(error = %e, "Transaction rollback failed");
            SessionError::Rollback(e)
        })
    }

    fn finish(&mut self, statement: &str) -> Result<(), rusqlite::Error> {
        if self.state != State::Active {
            return Ok(());
        }
        self.state = State::Terminated;
        match &self.conn {
            Some(conn) => {
                conn.execute_batch(statement)?;
                debug!(statement, "Transaction finished");
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Release the connection to the pool.
    ///
    /// A transaction still open on the connection is rolled back first. Safe
    /// to call on an untouched session and more than once.
    pub fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            if !conn.is_autocommit() {
                if let Err(e) = conn.execute_batch("ROLLBACK") {
                    warn!(error = %e, "Rollback on close failed");
                }
            }
            drop(conn);
            debug!("Connection released");
        }
        self.state = State::Absent;
    }

    /// Execute a statement, returning the number of affected rows.
    pub fn execute<P: Params>(&mut self, sql: &str, params: P) -> Result<usize, SessionError> {
        let conn = self.acquire()?;
        conn.execute(sql, params).map_err(|e| query_error(sql, e))
    }

    /// First column of the first row as an integer, if there is a row.
    pub fn query_i64<P: Params>(
        &mut self,
        sql: &str,
        params: P,
    ) -> Result<Option<i64>, SessionError> {
        let conn = self.acquire()?;
        conn.query_row(sql, params, |row| row.get::<_, Option<i64>>(0))
            .optional()
            .map(Option::flatten)
            .map_err(|e| query_error(sql, e))
    }

    /// First column of the first row as a string, if there is a row.
    pub fn query_string<P: Params>(
        &mut self,
        sql: &str,
        params: P,
    ) -> Result<Option<String>, SessionError> {
        let conn = self.acquire()?;
        conn.query_row(sql, params, |row| row.get::<_, Option<String>>(0))
            .optional()
            .map(Option::flatten)
            .map_err(|e| query_error(sql, e))
    }

    /// First column of every row as integers.
    pub fn query_column_i64<P: Params>(
        &mut self,
        sql: &str,
        params: P,
    ) -> Result<Vec<i64>, SessionError> {
        let conn = self.acquire()?;
        let run = || -> rusqlite::Result<Vec<i64>> {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt.query_map(params, |row| row.get(0))?;
            rows.collect()
        };
        run().map_err(|e| query_error(sql, e))
    }

    /// First column of every row as strings.
    pub fn query_column_strings<P: Params>(
        &mut self,
        sql: &str,
        params: P,
    ) -> Result<Vec<String>, SessionError> {
        let conn = self.acquire()?;
        let run = || -> rusqlite::Result<Vec<String>> {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt.query_map(params, |row| row.get(0))?;
            rows.collect()
        };
        run().map_err(|e| query_error(sql, e))
    }

    /// Every row as a column-name to value map.
    ///
    /// Blobs are encoded as standard base64 strings.
    pub fn query_rows<P: Params>(
        &mut self,
        sql: &str,
        params: P,
    ) -> Result<Vec<Map<String, JsonValue>>, SessionError> {
        let conn = self.acquire()?;
        let run = || -> rusqlite::Result<Vec<Map<String, JsonValue>>> {
            let mut stmt = conn.prepare(sql)?;
            let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
            let mut rows = stmt.query(params)?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let mut map = Map::with_capacity(names.len());
                for (idx, name) in names.iter().enumerate() {
                    map.insert(name.clone(), json_value(row.get_ref(idx)?));
                }
                out.push(map);
            }
            Ok(out)
        };
        run().map_err(|e| query_error(sql, e))
    }

    /// Run one statement once per parameter set, returning affected row counts in order.
    pub fn execute_batch_params(
        &mut self,
        sql: &str,
        param_sets: &[Vec<SqlValue>],
    ) -> Result<Vec<usize>, SessionError> {
        let conn = self.acquire()?;
        let run = || -> rusqlite::Result<Vec<usize>> {
            let mut stmt = conn.prepare_cached(sql)?;
            param_sets
                .iter()
                .map(|set| stmt.execute(rusqlite::params_from_iter(set.iter())))
                .collect()
        };
        run().map_err(|e| query_error(sql, e))
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

fn query_error(sql: &str, source: rusqlite::Error) -> SessionError {
    SessionError::Query {
        sql: sql.to_string(),
        source,
    }
}

fn json_value(value: ValueRef<'_>) -> JsonValue {
    match value {
        ValueRef::Null => JsonValue::Null,
        ValueRef::Integer(i) => JsonValue::from(i),
        ValueRef::Real(f) => JsonValue::from(f),
        ValueRef::Text(t) => JsonValue::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => JsonValue::String(STANDARD.encode(b)),
    }
}
