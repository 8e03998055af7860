use may_minihttp::Request;
use std::collections::HashMap;
use std::io::Read;
use tracing::debug;

/// Request bodies larger than this are not read for form parameters.
pub const MAX_FORM_BODY: usize = 1024 * 1024;

/// Parsed HTTP request data handed to the broker.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedRequest {
    /// HTTP method (GET, POST, etc.)
    pub method: String,
    /// Path and query exactly as received
    pub uri: String,
    /// Path without the query string
    pub path: String,
    /// HTTP headers (lowercase keys)
    pub headers: HashMap<String, String>,
    /// Parsed cookies from Cookie header
    pub cookies: HashMap<String, String>,
    /// Query string and url-encoded form parameters; the query wins on conflicts
    pub params: HashMap<String, String>,
}

impl ParsedRequest {
    /// A bodiless GET for `uri`. Mostly useful in tests and internal requests.
    #[must_use]
    pub fn get(uri: &str) -> Self {
        let path = uri.split('?').next().unwrap_or("/").to_string();
        Self {
            method: "GET".to_string(),
            uri: uri.to_string(),
            path,
            params: parse_query_params(uri),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

pub fn parse_cookies(headers: &HashMap<String, String>) -> HashMap<String, String> {
    headers
        .get("cookie")
        .map(|c| {
            c.split(';')
                .filter_map(|pair| {
                    let mut parts = pair.trim().splitn(2, '=');
                    let name = parts.next()?.trim();
                    if name.is_empty() {
                        return None;
                    }
                    let value = parts.next().unwrap_or("").trim().to_string();
                    Some((name.to_string(), value))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Parse and URL-decode the query string of `path`. The first occurrence of a name wins.
pub fn parse_query_params(path: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    if let Some((_, query)) = path.split_once('?') {
        merge_form(&mut params, query.as_bytes());
    }
    params
}

fn merge_form(params: &mut HashMap<String, String>, encoded: &[u8]) {
    for (k, v) in url::form_urlencoded::parse(encoded) {
        params.entry(k.into_owned()).or_insert_with(|| v.into_owned());
    }
}

fn is_form(headers: &HashMap<String, String>) -> bool {
    headers
        .get("content-type")
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"))
}

/// Extract method, path, headers, cookies and parameters from a `may_minihttp::Request`.
pub fn parse_request(req: Request) -> ParsedRequest {
    let method = req.method().to_string();
    let uri = req.path().to_string();
    let path = uri.split('?').next().unwrap_or("/").to_string();

    let headers: HashMap<String, String> = req
        .headers()
        .iter()
        .map(|h| {
            (
                h.name.to_ascii_lowercase(),
                String::from_utf8_lossy(h.value).to_string(),
            )
        })
        .collect();
    let cookies = parse_cookies(&headers);
    let mut params = parse_query_params(&uri);

    if is_form(&headers) {
        let mut body = Vec::new();
        match req.body().take(MAX_FORM_BODY as u64).read_to_end(&mut body) {
            Ok(size) if size > 0 => merge_form(&mut params, &body),
            Ok(_) => {}
            Err(e) => debug!(error = %e, "Cannot read form body"),
        }
    }

    debug!(
        method = %method,
        path = %path,
        header_count = headers.len(),
        cookie_count = cookies.len(),
        param_count = params.len(),
        "HTTP request parsed"
    );

    ParsedRequest {
        method,
        uri,
        path,
        headers,
        cookies,
        params,
    }
}
