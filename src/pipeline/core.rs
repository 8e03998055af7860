use crate::error::DispatchError;
use crate::http_session::{HttpSession, SessionStore};
use crate::server::request::ParsedRequest;
use crate::session::Session;
use serde_json::{Map, Value as JsonValue};
use smallvec::SmallVec;
use std::sync::Arc;

/// Maximum inline response headers before heap allocation
pub const MAX_INLINE_HEADERS: usize = 8;

/// Response header storage: (name, value), names repeat for `Set-Cookie`.
pub type HeaderVec = SmallVec<[(Arc<str>, String); MAX_INLINE_HEADERS]>;

/// Response produced by the broker for one request.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerResponse {
    pub status: u16,
    pub headers: HeaderVec,
    pub body: Vec<u8>,
}

impl Default for HandlerResponse {
    fn default() -> Self {
        Self {
            status: 200,
            headers: HeaderVec::new(),
            body: Vec::new(),
        }
    }
}

impl HandlerResponse {
    #[must_use]
    pub fn new(status: u16, headers: HeaderVec, body: Vec<u8>) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Plain-text response.
    #[must_use]
    pub fn text(status: u16, body: impl Into<String>) -> Self {
        let mut res = Self::new(status, HeaderVec::new(), body.into().into_bytes());
        res.set_header("content-type", "text/plain; charset=utf-8".to_string());
        res
    }

    /// Error response whose body is the reason phrase (or `message` when given).
    #[must_use]
    pub fn error(status: u16, message: Option<&str>) -> Self {
        let reason = http::StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("Error");
        Self::text(status, message.unwrap_or(reason))
    }

    /// `302 Found` to `location`.
    #[must_use]
    pub fn redirect(location: &str) -> Self {
        let mut res = Self::new(302, HeaderVec::new(), Vec::new());
        res.set_header("location", location.to_string());
        res
    }

    #[must_use]
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Replace every header called `name`.
    pub fn set_header(&mut self, name: &str, value: String) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((Arc::from(name), value));
    }

    /// Add a header, keeping existing ones of the same name.
    pub fn add_header(&mut self, name: &str, value: String) {
        self.headers.push((Arc::from(name), value));
    }
}

/// How a stage finished when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    /// The response in the exchange is final.
    Completed,
    /// Answer with a redirect to this location instead.
    Redirect(String),
}

/// Everything that belongs to one request while it travels through the pipeline.
#[derive(Debug)]
pub struct Exchange {
    pub request: ParsedRequest,
    /// Path under the broker mount, e.g. `/order.create/42`.
    pub path_info: String,
    pub response: HandlerResponse,
    /// Access log sequence number, 0 until the access log stage ran.
    pub sequence: u64,
    /// Database session, present while the transaction stage is active.
    pub(crate) db: Option<Session>,
    pub(crate) http_session: Option<Arc<HttpSession>>,
    pub(crate) session_created: bool,
    pub(crate) attributes: Map<String, JsonValue>,
    pub(crate) redirect: Option<String>,
}

impl Exchange {
    pub fn new(request: ParsedRequest, path_info: impl Into<String>) -> Self {
        Self {
            request,
            path_info: path_info.into(),
            response: HandlerResponse::default(),
            sequence: 0,
            db: None,
            http_session: None,
            session_created: false,
            attributes: Map::new(),
            redirect: None,
        }
    }

    #[must_use]
    pub fn http_session(&self) -> Option<&Arc<HttpSession>> {
        self.http_session.as_ref()
    }

    pub(crate) fn attach_http_session(&mut self, session: Arc<HttpSession>) {
        self.http_session = Some(session);
    }

    /// The client's HTTP session, created in `store` when absent.
    pub fn ensure_http_session(&mut self, store: &SessionStore) -> Arc<HttpSession> {
        match &self.http_session {
            Some(s) => Arc::clone(s),
            None => {
                let s = store.create();
                self.http_session = Some(Arc::clone(&s));
                self.session_created = true;
                s
            }
        }
    }

    /// Whether this request created the HTTP session (a cookie must be sent).
    #[must_use]
    pub fn session_created(&self) -> bool {
        self.session_created
    }

    /// Request-scope variable.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&JsonValue> {
        self.attributes.get(name)
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: JsonValue) {
        self.attributes.insert(name.into(), value);
    }

    #[must_use]
    pub fn db_session(&self) -> Option<&Session> {
        self.db.as_ref()
    }
}

/// One link of the dispatch chain.
///
/// A stage either handles the exchange itself or delegates to the rest of
/// the chain through `next`, doing work before and after.
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    fn handle(&self, exchange: &mut Exchange, next: Next<'_>) -> Result<Flow, DispatchError>;
}

/// The remainder of the chain after the current stage.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    stages: &'a [Arc<dyn Stage>],
}

impl<'a> Next<'a> {
    #[must_use]
    pub fn new(stages: &'a [Arc<dyn Stage>]) -> Self {
        Self { stages }
    }

    /// Run the next stage. An exhausted chain completes without touching the response.
    pub fn run(self, exchange: &mut Exchange) -> Result<Flow, DispatchError> {
        match self.stages.split_first() {
            Some((stage, rest)) => stage.handle(exchange, Next { stages: rest }),
            None => Ok(Flow::Completed),
        }
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.stages.len()
    }
}
