//! Web content directory: static files and view templates.
//!
//! Paths are URL-style (`/WEB-INF/views/home.html`) and always resolved under
//! the base directory; any `..` or absolute component is rejected.

use crate::resolve::ResourceLocator;
use minijinja::Environment;
use serde_json::Value as JsonValue;
use std::fs;
use std::ffi::OsStr;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Prefix of the protected area: renderable as a view, never served directly.
pub const PROTECTED_PREFIX: &str = "/WEB-INF";

#[derive(Debug, Clone)]
pub struct StaticFiles {
    base_dir: PathBuf,
}

impl StaticFiles {
    pub fn new<P: Into<PathBuf>>(base: P) -> Self {
        Self {
            base_dir: base.into(),
        }
    }

    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn map_path(&self, url_path: &str) -> Option<PathBuf> {
        let mut pb = self.base_dir.clone();
        pb.extend(normalized(url_path)?);
        Some(pb)
    }

    fn content_type(path: &Path) -> &'static str {
        match path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_lowercase()
            .as_str()
        {
            "html" | "htm" => "text/html; charset=utf-8",
            "css" => "text/css",
            "js" => "application/javascript",
            "json" => "application/json",
            "txt" => "text/plain; charset=utf-8",
            "svg" => "image/svg+xml",
            "png" => "image/png",
            "jpg" | "jpeg" => "image/jpeg",
            "ico" => "image/x-icon",
            _ => "application/octet-stream",
        }
    }

    /// Whether `url_path` points into the protected area.
    ///
    /// Decided on the same normalised components the file lookup uses, so
    /// `/./WEB-INF/..` or `//web-inf/..` are protected as well. Paths that
    /// cannot be mapped at all count as protected.
    #[must_use]
    pub fn is_protected(url_path: &str) -> bool {
        let prefix = PROTECTED_PREFIX.trim_start_matches('/');
        match normalized(url_path) {
            Some(parts) => parts
                .first()
                .and_then(|first| first.to_str())
                .is_some_and(|first| first.eq_ignore_ascii_case(prefix)),
            None => true,
        }
    }

    fn existing_file(&self, url_path: &str) -> io::Result<PathBuf> {
        let path = self
            .map_path(url_path)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "invalid path"))?;
        if !path.is_file() {
            return Err(io::Error::new(io::ErrorKind::NotFound, "file not found"));
        }
        Ok(path)
    }

    /// Read a file verbatim.
    pub fn load(&self, url_path: &str) -> io::Result<(Vec<u8>, &'static str)> {
        let path = self.existing_file(url_path)?;
        let bytes = fs::read(&path)?;
        Ok((bytes, Self::content_type(&path)))
    }

    /// Render a template file with the given context.
    pub fn render(&self, url_path: &str, ctx: &JsonValue) -> io::Result<(Vec<u8>, &'static str)> {
        let path = self.existing_file(url_path)?;
        let source = fs::read_to_string(&path)?;
        let mut env = Environment::new();
        env.add_template("view", &source).map_err(io::Error::other)?;
        let rendered = env
            .get_template("view")
            .and_then(|tmpl| tmpl.render(ctx))
            .map_err(io::Error::other)?;
        Ok((rendered.into_bytes(), Self::content_type(&path)))
    }
}

/// Components of a URL path below the base directory; `None` when it escapes it.
fn normalized(url_path: &str) -> Option<Vec<&OsStr>> {
    let mut parts = Vec::new();
    for comp in Path::new(url_path.trim_start_matches('/')).components() {
        match comp {
            Component::Normal(s) => parts.push(s),
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(parts)
}

impl ResourceLocator for StaticFiles {
    fn exists(&self, path: &str) -> bool {
        self.map_path(path).is_some_and(|p| p.is_file())
    }
}
