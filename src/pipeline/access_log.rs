use super::auth::PASSWORD_PARAM;
use super::core::{Exchange, Flow, Next, Stage};
use crate::error::DispatchError;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{info, trace};

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

const REDACTED: &str = "***";

/// Parameters as they appear in the log, with the password masked.
fn loggable_params(params: &HashMap<String, String>) -> BTreeMap<&str, &str> {
    params
        .iter()
        .map(|(name, value)| {
            let value = if name.eq_ignore_ascii_case(PASSWORD_PARAM) {
                REDACTED
            } else {
                value.as_str()
            };
            (name.as_str(), value)
        })
        .collect()
}

/// Outermost stage: numbers every request and logs its duration on the way out.
#[derive(Debug, Default, Clone, Copy)]
pub struct AccessLog;

/// Logs on drop so that failing and panicking requests are recorded too.
struct ExitRecord {
    sequence: u64,
    uri: String,
    start: Instant,
    outcome: &'static str,
}

impl Drop for ExitRecord {
    fn drop(&mut self) {
        let total_ms = self.start.elapsed().as_millis() as u64;
        info!(
            sequence = self.sequence,
            uri = %self.uri,
            total_ms,
            outcome = self.outcome,
            "{} - [{}]; total : {}ms",
            self.sequence,
            self.uri,
            total_ms
        );
    }
}

impl Stage for AccessLog {
    fn name(&self) -> &'static str {
        "access_log"
    }

    fn handle(&self, exchange: &mut Exchange, next: Next<'_>) -> Result<Flow, DispatchError> {
        let sequence = SEQUENCE.fetch_add(1, Ordering::Relaxed) + 1;
        exchange.sequence = sequence;
        trace!(
            sequence,
            path = %exchange.request.path,
            params = ?loggable_params(&exchange.request.params),
            "Request entry"
        );

        let mut record = ExitRecord {
            sequence,
            uri: exchange.request.path.clone(),
            start: Instant::now(),
            outcome: "panicked",
        };
        let result = next.run(exchange);
        record.outcome = match &result {
            Ok(Flow::Completed) => "completed",
            Ok(Flow::Redirect(_)) => "redirect",
            Err(e) if e.is_not_found() => "not_found",
            Err(_) => "error",
        };
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::request::ParsedRequest;
    use std::sync::Arc;

    struct Fail;

    impl Stage for Fail {
        fn name(&self) -> &'static str {
            "fail"
        }

        fn handle(&self, _ex: &mut Exchange, _next: Next<'_>) -> Result<Flow, DispatchError> {
            Err(DispatchError::status(418, "teapot"))
        }
    }

    #[test]
    fn test_password_is_masked_in_logged_params() {
        let request = ParsedRequest::get("/cmd/login?login=ann&password=secret&Password=again");
        let logged = format!("{:?}", loggable_params(&request.params));
        assert!(!logged.contains("secret"));
        assert!(!logged.contains("again"));
        assert!(logged.contains(r#""login": "ann""#));
        assert!(logged.contains(r#""password": "***""#));
    }

    #[test]
    fn test_sequence_increases_and_errors_pass_through() {
        let stages: Vec<Arc<dyn Stage>> = vec![Arc::new(AccessLog), Arc::new(Fail)];

        let mut first = Exchange::new(ParsedRequest::get("/cmd/a"), "/a");
        let err = Next::new(&stages).run(&mut first).unwrap_err();
        assert_eq!(err.http_status(), 418);

        let mut second = Exchange::new(ParsedRequest::get("/cmd/b"), "/b");
        let _ = Next::new(&stages).run(&mut second);
        assert!(first.sequence > 0);
        assert!(second.sequence > first.sequence);
    }
}
