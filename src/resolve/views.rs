use super::{ResolveError, ResourceLocator};
use crate::config::AppConfig;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// A view name bound to the resource that renders it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedView {
    pub name: String,
    pub path: String,
}

pub struct ViewResolver {
    mappings: HashMap<String, String>,
    views_root: Option<String>,
    extension: String,
    locator: Arc<dyn ResourceLocator>,
}

impl fmt::Debug for ViewResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewResolver")
            .field("mappings", &self.mappings)
            .field("views_root", &self.views_root)
            .field("extension", &self.extension)
            .finish_non_exhaustive()
    }
}

impl ViewResolver {
    pub fn new(config: &AppConfig, locator: Arc<dyn ResourceLocator>) -> Self {
        Self {
            mappings: config.view_mappings.clone(),
            views_root: config
                .views_root
                .as_deref()
                .map(|root| root.trim_end_matches('/').to_string()),
            extension: config.view_extension.clone(),
            locator,
        }
    }

    /// Explicit mapping first; otherwise `views_root/name + extension`, if it exists.
    pub fn resolve(&self, name: &str) -> Result<ResolvedView, ResolveError> {
        if let Some(path) = self.mappings.get(name) {
            debug!(view = %name, path = %path, "View resolved by mapping");
            return Ok(ResolvedView {
                name: name.to_string(),
                path: path.clone(),
            });
        }

        if let Some(root) = &self.views_root {
            let path = format!("{root}/{name}{}", self.extension);
            if self.locator.exists(&path) {
                debug!(view = %name, path = %path, "View resolved by convention");
                return Ok(ResolvedView {
                    name: name.to_string(),
                    path,
                });
            }
        }

        Err(ResolveError::ViewNotFound {
            name: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    struct Known(HashSet<&'static str>);

    impl ResourceLocator for Known {
        fn exists(&self, path: &str) -> bool {
            self.0.contains(path)
        }
    }

    fn resolver(cfg: &AppConfig) -> ViewResolver {
        let known = Known(["/WEB-INF/views/home.html"].into_iter().collect());
        ViewResolver::new(cfg, Arc::new(known))
    }

    #[test]
    fn test_convention_requires_existing_resource() {
        let r = resolver(&AppConfig::default());
        assert_eq!(
            r.resolve("home").unwrap().path,
            "/WEB-INF/views/home.html"
        );
        assert_eq!(
            r.resolve("missing").unwrap_err(),
            ResolveError::ViewNotFound {
                name: "missing".into()
            }
        );
    }

    #[test]
    fn test_mapping_is_not_checked_for_existence() {
        let mut cfg = AppConfig::default();
        cfg.view_mappings
            .insert("special".into(), "/pages/special.html".into());
        let r = resolver(&cfg);
        assert_eq!(r.resolve("special").unwrap().path, "/pages/special.html");
    }

    #[test]
    fn test_no_views_root_means_mappings_only() {
        let mut cfg = AppConfig::default();
        cfg.views_root = None;
        assert!(resolver(&cfg).resolve("home").is_err());
    }
}
