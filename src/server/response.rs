use crate::pipeline::HandlerResponse;
use dashmap::DashMap;
use may_minihttp::Response;
use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::warn;

/// Upper bound on distinct interned header lines.
pub const MAX_INTERNED_HEADER_LINES: usize = 1024;

/// Interning table for `'static` header lines, as `may_minihttp` requires.
///
/// Lines that repeat (content types, fixed redirect targets) are leaked once
/// and reused, up to `cap` distinct lines. `Set-Cookie` lines carry a fresh
/// session id each time and are never interned, nor is anything once the
/// table is full; those still leak one line each, which `uninterned` counts.
struct HeaderLines {
    table: DashMap<String, &'static str>,
    cap: usize,
    uninterned: AtomicUsize,
    full_logged: AtomicBool,
}

impl HeaderLines {
    fn with_cap(cap: usize) -> Self {
        Self {
            table: DashMap::new(),
            cap,
            uninterned: AtomicUsize::new(0),
            full_logged: AtomicBool::new(false),
        }
    }

    fn line(&self, name: &str, value: &str) -> &'static str {
        // CR/LF in a value would split the header
        let value: String = value.chars().filter(|c| *c != '\r' && *c != '\n').collect();
        let line = format!("{}: {value}", canonical_name(name));
        if let Some(interned) = self.table.get(&line) {
            return *interned;
        }
        let full = self.table.len() >= self.cap;
        if full || name.eq_ignore_ascii_case("set-cookie") {
            if full && !self.full_logged.swap(true, Ordering::Relaxed) {
                warn!(cap = self.cap, "Header intern table full");
            }
            self.uninterned.fetch_add(1, Ordering::Relaxed);
            return Box::leak(line.into_boxed_str());
        }
        let leaked: &'static str = Box::leak(line.clone().into_boxed_str());
        *self.table.entry(line).or_insert(leaked)
    }
}

static HEADER_LINES: Lazy<HeaderLines> =
    Lazy::new(|| HeaderLines::with_cap(MAX_INTERNED_HEADER_LINES));

pub(crate) fn header_line(name: &str, value: &str) -> &'static str {
    HEADER_LINES.line(name, value)
}

/// Number of header lines written without interning since start.
#[must_use]
pub fn uninterned_header_lines() -> usize {
    HEADER_LINES.uninterned.load(Ordering::Relaxed)
}

fn canonical_name(name: &str) -> String {
    name.split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first
                    .to_ascii_uppercase()
                    .to_string()
                    + &chars.as_str().to_ascii_lowercase(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

pub fn status_reason(status: u16) -> &'static str {
    http::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown")
}

/// Copy a broker response onto the wire response.
pub fn write_handler_response(res: &mut Response, response: HandlerResponse) {
    res.status_code(response.status as usize, status_reason(response.status));
    for (name, value) in &response.headers {
        res.header(header_line(name, value));
    }
    res.body_vec(response.body);
}

/// Plain-text response with a fixed body.
pub fn write_text(res: &mut Response, status: u16, body: &str) {
    res.status_code(status as usize, status_reason(status));
    res.header("Content-Type: text/plain; charset=utf-8");
    res.body_vec(body.as_bytes().to_vec());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_reason() {
        assert_eq!(status_reason(200), "OK");
        assert_eq!(status_reason(302), "Found");
        assert_eq!(status_reason(404), "Not Found");
        assert_eq!(status_reason(503), "Service Unavailable");
    }

    #[test]
    fn test_header_lines_are_interned() {
        let a = header_line("content-type", "text/html");
        let b = header_line("Content-Type", "text/html");
        assert_eq!(a, "Content-Type: text/html");
        assert!(std::ptr::eq(a, b));
        let before = uninterned_header_lines();
        assert_eq!(header_line("set-cookie", "a=1\r\nx: y"), "Set-Cookie: a=1x: y");
        assert!(uninterned_header_lines() > before);
    }

    #[test]
    fn test_set_cookie_lines_are_not_interned() {
        let lines = HeaderLines::with_cap(16);
        let a = lines.line("Set-Cookie", "FRONTLINE_SESSION=one; Path=/");
        let b = lines.line("set-cookie", "FRONTLINE_SESSION=one; Path=/");
        assert_eq!(a, b);
        assert!(!std::ptr::eq(a, b));
        assert!(lines.table.is_empty());
        assert_eq!(lines.uninterned.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_intern_table_is_bounded() {
        let lines = HeaderLines::with_cap(4);
        for i in 0..10 {
            let _ = lines.line("location", &format!("/next?page={i}"));
        }
        assert_eq!(lines.table.len(), 4);
        assert_eq!(lines.uninterned.load(Ordering::Relaxed), 6);

        // lines interned before the cap keep being shared
        let first = lines.line("Location", "/next?page=0");
        assert!(std::ptr::eq(first, lines.line("location", "/next?page=0")));
        assert_eq!(lines.line("location", "/past"), "Location: /past");
    }
}
