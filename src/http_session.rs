//! Cookie-keyed HTTP sessions.
//!
//! Sessions are created on demand (login, or a session-scoped variable write)
//! and identified by a ULID carried in the [`SESSION_COOKIE`] cookie. A
//! session not used for longer than the store's idle timeout is dropped.

use dashmap::DashMap;
use serde_json::{Map, Value as JsonValue};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

pub const SESSION_COOKIE: &str = "FRONTLINE_SESSION";

/// Idle time after which a session is discarded.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Attributes of one client session.
#[derive(Debug)]
pub struct HttpSession {
    id: String,
    attributes: DashMap<String, JsonValue>,
    created: Instant,
    /// Milliseconds after `created` of the last lookup.
    last_access_ms: AtomicU64,
}

impl HttpSession {
    fn new(id: String) -> Self {
        Self {
            id,
            attributes: DashMap::new(),
            created: Instant::now(),
            last_access_ms: AtomicU64::new(0),
        }
    }

    fn touch(&self) {
        let now = self.created.elapsed().as_millis() as u64;
        self.last_access_ms.fetch_max(now, Ordering::Relaxed);
    }

    fn idle(&self) -> Duration {
        let last = Duration::from_millis(self.last_access_ms.load(Ordering::Relaxed));
        self.created.elapsed().saturating_sub(last)
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<JsonValue> {
        self.attributes.get(name).map(|v| v.value().clone())
    }

    pub fn set(&self, name: impl Into<String>, value: JsonValue) {
        self.attributes.insert(name.into(), value);
    }

    pub fn remove(&self, name: &str) -> Option<JsonValue> {
        self.attributes.remove(name).map(|(_, v)| v)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// Copy of all attributes, for template contexts.
    #[must_use]
    pub fn snapshot(&self) -> Map<String, JsonValue> {
        self.attributes
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }
}

/// Process-wide table of live sessions.
#[derive(Debug, Clone)]
pub struct SessionStore {
    sessions: Arc<DashMap<String, Arc<HttpSession>>>,
    idle_timeout: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_idle_timeout(DEFAULT_IDLE_TIMEOUT)
    }
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_idle_timeout(idle_timeout: Duration) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            idle_timeout,
        }
    }

    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Start a new session with a fresh id. Expired sessions are swept first.
    #[must_use]
    pub fn create(&self) -> Arc<HttpSession> {
        self.sweep();
        let id = ulid::Ulid::new().to_string();
        let session = Arc::new(HttpSession::new(id.clone()));
        self.sessions.insert(id, Arc::clone(&session));
        debug!(session_id = %session.id(), "HTTP session created");
        session
    }

    /// Live session with this id; an expired one is removed and reads as absent.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<HttpSession>> {
        let session = Arc::clone(self.sessions.get(id)?.value());
        if session.idle() > self.idle_timeout {
            self.sessions.remove(id);
            debug!(session_id = %id, "HTTP session expired");
            return None;
        }
        session.touch();
        Some(session)
    }

    /// Drop every session idle for longer than the timeout, returning how many went.
    pub fn sweep(&self) -> usize {
        let before = self.sessions.len();
        let timeout = self.idle_timeout;
        self.sessions.retain(|_, s| s.idle() <= timeout);
        let removed = before.saturating_sub(self.sessions.len());
        if removed > 0 {
            debug!(removed, "Expired HTTP sessions swept");
        }
        removed
    }

    pub fn invalidate(&self, id: &str) -> bool {
        self.sessions.remove(id).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// `Set-Cookie` value for a session under `path`.
#[must_use]
pub fn session_cookie(session: &HttpSession, path: &str) -> String {
    let path = if path.is_empty() { "/" } else { path };
    format!("{SESSION_COOKIE}={}; Path={path}; HttpOnly", session.id())
}
