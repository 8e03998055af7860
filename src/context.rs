//! What a command sees of its request.
//!
//! A [`CommandContext`] borrows the request's exchange and the shared
//! application state for the duration of one `execute` call. Through it a
//! command reads parameters, writes the response, keeps scoped variables,
//! reaches the request's database session, and ends the request by
//! forwarding, redirecting or sending an error.

use crate::broker::Application;
use crate::error::DispatchError;
use crate::http_session::HttpSession;
use crate::pipeline::{Exchange, HandlerResponse};
use crate::resolve::extract_verb;
use crate::session::{Session, SessionError};
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Nested forwards allowed within one request.
pub const MAX_FORWARD_DEPTH: usize = 16;

/// Where a scoped variable lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// This request only; also the template context of rendered views.
    Request,
    /// The client's HTTP session.
    Session,
    /// Shared by every request of the process.
    Application,
}

pub struct CommandContext<'a> {
    app: &'a Application,
    exchange: &'a mut Exchange,
    verb: String,
    depth: usize,
}

impl std::fmt::Debug for CommandContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandContext")
            .field("verb", &self.verb)
            .field("path_info", &self.exchange.path_info)
            .field("depth", &self.depth)
            .finish_non_exhaustive()
    }
}

impl<'a> CommandContext<'a> {
    pub(crate) fn new(app: &'a Application, exchange: &'a mut Exchange) -> Self {
        let verb = extract_verb(&exchange.path_info).to_string();
        Self {
            app,
            exchange,
            verb,
            depth: 0,
        }
    }

    /// Resolve the current verb and run its command.
    pub(crate) fn dispatch(&mut self) -> Result<(), DispatchError> {
        let resolved = self.app.commands().resolve(&self.verb)?;
        debug!(
            verb = %resolved.verb,
            identifier = %resolved.identifier,
            tier = %resolved.tier,
            depth = self.depth,
            "Executing command"
        );
        let mut command = resolved.instantiate();
        command.execute(self)
    }

    // ---- request -------------------------------------------------------

    #[must_use]
    pub fn verb(&self) -> &str {
        &self.verb
    }

    /// Path under the broker mount, e.g. `/order.create/42`.
    #[must_use]
    pub fn path_info(&self) -> &str {
        &self.exchange.path_info
    }

    #[must_use]
    pub fn method(&self) -> &str {
        &self.exchange.request.method
    }

    /// Request path and query as received.
    #[must_use]
    pub fn uri(&self) -> &str {
        &self.exchange.request.uri
    }

    /// Query or form parameter.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.exchange.request.param(name)
    }

    #[must_use]
    pub fn params(&self) -> &HashMap<String, String> {
        &self.exchange.request.params
    }

    /// Header by name, case-insensitive.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.exchange.request.header(name)
    }

    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.exchange.request.cookies.get(name).map(String::as_str)
    }

    /// Context path of the application, `""` at the root.
    #[must_use]
    pub fn context_path(&self) -> String {
        self.app.config().context_path()
    }

    // ---- response ------------------------------------------------------

    pub fn set_status(&mut self, status: u16) {
        self.exchange.response.status = status;
    }

    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.exchange.response.set_header(name, value.into());
    }

    pub fn set_content_type(&mut self, content_type: impl Into<String>) {
        self.set_header("content-type", content_type);
    }

    /// Append to the response body.
    pub fn write(&mut self, bytes: impl AsRef<[u8]>) {
        self.exchange.response.body.extend_from_slice(bytes.as_ref());
    }

    /// Replace the response body with `value` as JSON.
    pub fn write_json<T: Serialize>(&mut self, value: &T) -> Result<(), DispatchError> {
        let body = serde_json::to_vec(value).map_err(anyhow::Error::from)?;
        self.exchange.response.body = body;
        self.set_content_type("application/json");
        Ok(())
    }

    /// Replace the response with an error page for `status`.
    pub fn send_error(&mut self, status: u16) {
        debug!(status, verb = %self.verb, "Command sent error");
        self.exchange.response = HandlerResponse::error(status, None);
    }

    // ---- scoped variables ---------------------------------------------

    /// Set a request-scope variable.
    pub fn set_variable(&mut self, name: impl Into<String>, value: impl Into<JsonValue>) {
        self.exchange.set_attribute(name, value.into());
    }

    /// Request-scope variable.
    #[must_use]
    pub fn variable(&self, name: &str) -> Option<&JsonValue> {
        self.exchange.attribute(name)
    }

    /// Set a variable in `scope`. A session-scope write starts a session if needed.
    pub fn set_scoped_variable(
        &mut self,
        scope: Scope,
        name: impl Into<String>,
        value: impl Into<JsonValue>,
    ) {
        let value = value.into();
        match scope {
            Scope::Request => self.exchange.set_attribute(name, value),
            Scope::Session => self.http_session_or_create().set(name, value),
            Scope::Application => self.app.set_application_variable(name.into(), value),
        }
    }

    #[must_use]
    pub fn scoped_variable(&self, scope: Scope, name: &str) -> Option<JsonValue> {
        match scope {
            Scope::Request => self.exchange.attribute(name).cloned(),
            Scope::Session => self.exchange.http_session().and_then(|s| s.get(name)),
            Scope::Application => self.app.application_variable(name),
        }
    }

    pub fn remove_scoped_variable(&mut self, scope: Scope, name: &str) -> Option<JsonValue> {
        match scope {
            Scope::Request => self.exchange.attributes.remove(name),
            Scope::Session => self.exchange.http_session().and_then(|s| s.remove(name)),
            Scope::Application => self.app.remove_application_variable(name),
        }
    }

    /// First variable called `name`, searching request, then session, then application scope.
    #[must_use]
    pub fn find_scoped_variable(&self, name: &str) -> Option<JsonValue> {
        [Scope::Request, Scope::Session, Scope::Application]
            .into_iter()
            .find_map(|scope| self.scoped_variable(scope, name))
    }

    // ---- sessions ------------------------------------------------------

    /// The request's database session.
    pub fn session(&mut self) -> Result<&mut Session, DispatchError> {
        self.exchange
            .db
            .as_mut()
            .ok_or_else(|| DispatchError::from(SessionError::NotConfigured))
    }

    #[must_use]
    pub fn http_session(&self) -> Option<Arc<HttpSession>> {
        self.exchange.http_session().cloned()
    }

    pub fn http_session_or_create(&mut self) -> Arc<HttpSession> {
        self.exchange.ensure_http_session(self.app.sessions())
    }

    /// Drop the client's HTTP session.
    pub fn invalidate_http_session(&mut self) {
        if let Some(session) = self.exchange.http_session.take() {
            self.app.sessions().invalidate(session.id());
            debug!(session_id = %session.id(), "HTTP session invalidated");
        }
    }

    // ---- control transfer ---------------------------------------------

    /// Server-side forward.
    ///
    /// A path under the broker mount (`/cmd/verb`) runs that command within
    /// this request; any other path is rendered as a view resource. A query
    /// string on the path adds request parameters.
    pub fn forward(&mut self, path: &str) -> Result<(), DispatchError> {
        let (path, query) = match path.split_once('?') {
            Some((p, q)) => (p, Some(q)),
            None => (path, None),
        };
        if let Some(query) = query {
            for (k, v) in url::form_urlencoded::parse(query.as_bytes()) {
                self.exchange.request.params.insert(k.into_owned(), v.into_owned());
            }
        }

        let mount = format!("/{}", self.app.config().mount);
        match path.strip_prefix(&mount) {
            Some(rest) if rest.is_empty() || rest.starts_with('/') => {
                self.forward_within_broker(path, rest)
            }
            _ => self.render(path),
        }
    }

    /// Forward to the command handling `verb`.
    pub fn forward_to_command(&mut self, verb: &str) -> Result<(), DispatchError> {
        let path = format!("/{}/{verb}", self.app.config().mount);
        self.forward(&path)
    }

    /// Forward to the resource of view `name`.
    pub fn forward_to_view(&mut self, name: &str) -> Result<(), DispatchError> {
        let view = self.app.views().resolve(name)?;
        self.render(&view.path)
    }

    fn forward_within_broker(&mut self, target: &str, path_info: &str) -> Result<(), DispatchError> {
        if self.depth >= MAX_FORWARD_DEPTH {
            return Err(DispatchError::Forward {
                target: target.to_string(),
                reason: format!("more than {MAX_FORWARD_DEPTH} nested forwards"),
            });
        }
        let saved_path = std::mem::replace(&mut self.exchange.path_info, path_info.to_string());
        let saved_verb = std::mem::replace(&mut self.verb, extract_verb(path_info).to_string());
        self.depth += 1;
        debug!(target = %target, verb = %self.verb, "Forwarding to command");

        let result = self.dispatch();

        self.depth -= 1;
        self.verb = saved_verb;
        self.exchange.path_info = saved_path;
        result
    }

    fn render(&mut self, path: &str) -> Result<(), DispatchError> {
        let model = self.view_model();
        let (body, content_type) = self.app.web().render(path, &model).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DispatchError::Forward {
                    target: path.to_string(),
                    reason: "no such resource".to_string(),
                }
            } else {
                DispatchError::Render {
                    path: path.to_string(),
                    source: e,
                }
            }
        })?;
        debug!(path = %path, bytes = body.len(), "View rendered");
        self.exchange.response.body = body;
        self.exchange
            .response
            .set_header("content-type", content_type.to_string());
        Ok(())
    }

    /// Template context: request variables plus `params`, `session`, `application`.
    fn view_model(&self) -> JsonValue {
        let mut model = self.exchange.attributes.clone();
        let params: Map<String, JsonValue> = self
            .exchange
            .request
            .params
            .iter()
            .map(|(k, v)| (k.clone(), JsonValue::String(v.clone())))
            .collect();
        let session = self
            .exchange
            .http_session()
            .map(|s| s.snapshot())
            .unwrap_or_default();
        model
            .entry("params")
            .or_insert(JsonValue::Object(params));
        model
            .entry("session")
            .or_insert(JsonValue::Object(session));
        model
            .entry("application")
            .or_insert_with(|| JsonValue::Object(self.app.application_snapshot()));
        model
            .entry("context_path")
            .or_insert_with(|| JsonValue::String(self.context_path()));
        JsonValue::Object(model)
    }

    /// Redirect the client to `location`, appending `params` as a query string.
    pub fn redirect(&mut self, location: &str, params: &[(&str, &str)]) {
        let target = format!("{location}{}", query_string(params));
        debug!(location = %target, "Redirecting");
        self.exchange.redirect = Some(target);
    }

    /// Redirect to the URL of the command handling `verb`.
    pub fn redirect_to_command(&mut self, verb: &str, params: &[(&str, &str)]) {
        let location = format!("{}/{verb}", self.app.config().mount_prefix());
        self.redirect(&location, params);
    }

    /// Redirect to the URL of view `name`.
    pub fn redirect_to_view(&mut self, name: &str, params: &[(&str, &str)]) -> Result<(), DispatchError> {
        let view = self.app.views().resolve(name)?;
        let location = format!("{}{}", self.context_path(), view.path);
        self.redirect(&location, params);
        Ok(())
    }
}

/// `?k=v&k2=v2` with form-encoded values; empty when there are no parameters.
fn query_string(params: &[(&str, &str)]) -> String {
    let mut query = String::new();
    for (idx, (key, value)) in params.iter().enumerate() {
        query.push(if idx == 0 { '?' } else { '&' });
        query.push_str(key);
        query.push('=');
        query.extend(url::form_urlencoded::byte_serialize(value.as_bytes()));
    }
    query
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_string() {
        assert_eq!(query_string(&[]), "");
        assert_eq!(query_string(&[("a", "1")]), "?a=1");
        assert_eq!(
            query_string(&[("q", "x y&z"), ("q", "é")]),
            "?q=x+y%26z&q=%C3%A9"
        );
    }
}
