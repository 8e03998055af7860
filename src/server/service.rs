use super::request::parse_request;
use super::response::{header_line, write_handler_response, write_text};
use crate::broker::CommandBroker;
use crate::static_files::StaticFiles;
use may_minihttp::{HttpService, Request, Response};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Counts requests currently being served.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    count: Arc<AtomicUsize>,
    draining: Arc<AtomicBool>,
}

impl InFlight {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn current(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Refuse new requests from now on.
    pub fn start_draining(&self) {
        self.draining.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::SeqCst)
    }

    fn enter(&self) -> InFlightGuard<'_> {
        self.count.fetch_add(1, Ordering::SeqCst);
        InFlightGuard(self)
    }
}

struct InFlightGuard<'a>(&'a InFlight);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.count.fetch_sub(1, Ordering::SeqCst);
    }
}

/// HTTP entry point: health check, broker mount, static content.
#[derive(Clone)]
pub struct AppService {
    pub broker: Arc<CommandBroker>,
    pub static_files: StaticFiles,
    pub in_flight: InFlight,
    context_path: String,
}

impl AppService {
    pub fn new(broker: Arc<CommandBroker>, in_flight: InFlight) -> Self {
        let static_files = StaticFiles::new(&broker.config().web_content);
        let context_path = broker.config().context_path();
        Self {
            broker,
            static_files,
            in_flight,
            context_path,
        }
    }

    fn serve_static(&self, method: &str, path: &str, res: &mut Response) {
        if method != "GET" && method != "HEAD" {
            write_text(res, 405, "Method Not Allowed");
            return;
        }
        if StaticFiles::is_protected(path) {
            debug!(path = %path, "Refusing protected resource");
            write_text(res, 404, "Not Found");
            return;
        }
        let file = if path.ends_with('/') {
            format!("{path}index.html")
        } else {
            path.to_string()
        };
        match self.static_files.load(&file) {
            Ok((bytes, content_type)) => {
                res.status_code(200, "OK");
                res.header(header_line("content-type", content_type));
                if method == "GET" {
                    res.body_vec(bytes);
                }
            }
            Err(_) => write_text(res, 404, "Not Found"),
        }
    }
}

/// Basic health check endpoint returning `{ "status": "ok" }`.
pub fn health_endpoint(res: &mut Response) -> io::Result<()> {
    res.status_code(200, "OK");
    res.header("Content-Type: application/json");
    res.body_vec(br#"{"status":"ok"}"#.to_vec());
    Ok(())
}

impl HttpService for AppService {
    fn call(&mut self, req: Request, res: &mut Response) -> io::Result<()> {
        let _guard = self.in_flight.enter();
        if self.in_flight.is_draining() {
            write_text(res, 503, "Service Unavailable");
            return Ok(());
        }

        let request = parse_request(req);
        if request.method == "GET" && request.path == "/health" {
            return health_endpoint(res);
        }

        if self.broker.path_info(&request.path).is_some() {
            let response = self.broker.dispatch(request);
            write_handler_response(res, response);
            return Ok(());
        }

        // static content lives under the context path too
        match request.path.strip_prefix(self.context_path.as_str()) {
            Some("") => self.serve_static(&request.method, "/", res),
            Some(rest) if rest.starts_with('/') => self.serve_static(&request.method, rest, res),
            _ => write_text(res, 404, "Not Found"),
        }
        Ok(())
    }
}
