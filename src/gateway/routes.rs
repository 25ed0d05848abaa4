//! Route table
//!
//! Routes are matched by the longest `upstream_path` prefix that ends on a
//! path-segment boundary, then filtered by method.

use std::sync::Arc;

use axum::http::Method;
use url::Url;

use crate::config::RouteConfig;
use crate::exchange::RouteAuthConfig;
use crate::{Error, Result};

/// A resolved proxy route
#[derive(Debug, Clone)]
pub struct Route {
    /// Route name
    pub name: String,
    /// Inbound path prefix (no trailing slash except for `/`)
    pub upstream_path: String,
    /// Base URL requests are forwarded to
    pub downstream_url: Url,
    /// Allowed methods (empty = all)
    pub methods: Vec<Method>,
    /// Exchange settings, shared by all requests on this route
    pub auth: Arc<RouteAuthConfig>,
}

impl Route {
    /// Resolve one route from its file form
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a bad path, URL, method, or exchange block.
    pub fn from_config(config: &RouteConfig) -> Result<Self> {
        let upstream_path = normalize_prefix(&config.upstream_path);
        let name = if config.name.trim().is_empty() {
            upstream_path.clone()
        } else {
            config.name.trim().to_string()
        };

        if !upstream_path.starts_with('/') {
            return Err(Error::Config(format!(
                "route '{name}': upstream_path must start with '/'"
            )));
        }

        let downstream_url = Url::parse(config.downstream_url.trim()).map_err(|e| {
            Error::Config(format!(
                "route '{name}': invalid downstream_url '{}': {e}",
                config.downstream_url
            ))
        })?;

        let methods = config
            .methods
            .iter()
            .map(|m| {
                Method::from_bytes(m.trim().to_ascii_uppercase().as_bytes())
                    .map_err(|_| Error::Config(format!("route '{name}': invalid method '{m}'")))
            })
            .collect::<Result<Vec<_>>>()?;

        let auth = RouteAuthConfig::from_options(&name, &config.exchange)?;

        Ok(Self {
            name,
            upstream_path,
            downstream_url,
            methods,
            auth: Arc::new(auth),
        })
    }

    /// Whether this route accepts `method`
    #[must_use]
    pub fn allows(&self, method: &Method) -> bool {
        self.methods.is_empty() || self.methods.contains(method)
    }

    /// Path remainder after the prefix, if `path` is under this route
    #[must_use]
    pub fn strip<'a>(&self, path: &'a str) -> Option<&'a str> {
        if self.upstream_path == "/" {
            return Some(path);
        }
        let rest = path.strip_prefix(self.upstream_path.as_str())?;
        (rest.is_empty() || rest.starts_with('/')).then_some(rest)
    }

    /// Downstream URL for a path remainder and query string
    #[must_use]
    pub fn downstream_for(&self, remainder: &str, query: Option<&str>) -> Url {
        let mut url = self.downstream_url.clone();
        if !remainder.is_empty() {
            let base = self.downstream_url.path().trim_end_matches('/');
            url.set_path(&format!("{base}{remainder}"));
        }
        url.set_query(query);
        url
    }
}

/// All configured routes
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    /// Build and validate every route
    ///
    /// # Errors
    ///
    /// Returns the first configuration error, or an error for two routes
    /// sharing an upstream path.
    pub fn from_config(configs: &[RouteConfig]) -> Result<Self> {
        let mut routes: Vec<Route> = Vec::with_capacity(configs.len());
        for config in configs {
            let route = Route::from_config(config)?;
            if let Some(existing) = routes.iter().find(|r| r.upstream_path == route.upstream_path) {
                return Err(Error::Config(format!(
                    "routes '{}' and '{}' share upstream_path '{}'",
                    existing.name, route.name, route.upstream_path
                )));
            }
            routes.push(route);
        }
        // Longest prefix first so resolve() can take the first match
        routes.sort_by(|a, b| b.upstream_path.len().cmp(&a.upstream_path.len()));
        Ok(Self { routes })
    }

    /// Find the route for a request and the path remainder under it
    #[must_use]
    pub fn resolve<'a>(&self, method: &Method, path: &'a str) -> Option<(&Route, &'a str)> {
        self.routes
            .iter()
            .filter(|r| r.allows(method))
            .find_map(|r| r.strip(path).map(|rest| (r, rest)))
    }

    /// All routes, longest prefix first
    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter()
    }

    /// Number of routes
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether no routes are configured
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

fn normalize_prefix(path: &str) -> String {
    let trimmed = path.trim();
    if trimmed.is_empty() || trimmed == "/" {
        return "/".to_string();
    }
    trimmed.trim_end_matches('/').to_string()
}
