//! Resolved per-route exchange settings
//!
//! [`RouteAuthConfig`] is built once from [`ExchangeOptions`] when the
//! configuration is loaded and is shared read-only by every request on the
//! route afterwards.

use url::Url;

use crate::config::ExchangeOptions;
use crate::{Error, Result};

/// Providers a route may name
pub const SUPPORTED_PROVIDERS: &[&str] = &["IdentityServer", "IdSvrTokenExchange"];

/// Token endpoint path relative to the provider root
pub const TOKEN_ENDPOINT_PATH: &str = "/connect/token";

/// Immutable exchange settings for one route
#[derive(Debug, Clone, Default)]
pub struct RouteAuthConfig {
    /// Gate: when false the exchange stage is a pass-through
    pub exchange_enabled: bool,
    /// Provider identifier, if configured
    pub provider: Option<String>,
    /// Base URL of the identity provider (no trailing slash)
    pub provider_root_url: String,
    /// Client id presented by the gateway
    pub client_id: String,
    /// Client secret presented by the gateway
    pub client_secret: String,
    /// Refuse plain-HTTP providers
    pub require_https: bool,
    /// Scopes carried through for downstream validation
    pub allowed_scopes: Vec<String>,
    /// Grant type override for non-reference credentials
    pub grant_type: Option<String>,
    /// Legacy token header name (lowercase)
    pub token_header: String,
    /// Token query parameter name
    pub token_query_param: String,
    /// Scope sent with reference-token exchanges
    pub reference_token_scope: String,
}

impl RouteAuthConfig {
    /// Resolve and validate file options for a route.
    ///
    /// Routes with exchange disabled are accepted regardless of the provider
    /// fields, so configs stay tolerant of routes that never exchange.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when exchange is enabled and a required
    /// provider field is missing, the provider or grant type is not
    /// supported, or the provider URL violates the HTTPS policy.
    pub fn from_options(route: &str, opts: &ExchangeOptions) -> Result<Self> {
        let config = Self {
            exchange_enabled: opts.enabled,
            provider: opts
                .provider
                .as_deref()
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from),
            provider_root_url: opts.provider_root_url.trim().trim_end_matches('/').to_string(),
            client_id: opts.client_id.clone(),
            client_secret: opts.client_secret.clone(),
            require_https: opts.require_https,
            allowed_scopes: opts.allowed_scopes.clone(),
            grant_type: opts
                .grant_type
                .as_deref()
                .map(str::trim)
                .filter(|g| !g.is_empty())
                .map(String::from),
            token_header: opts.token_header.trim().to_ascii_lowercase(),
            token_query_param: opts.token_query_param.trim().to_string(),
            reference_token_scope: opts.reference_token_scope.clone(),
        };

        if config.exchange_enabled {
            config.validate(route)?;
        }
        Ok(config)
    }

    fn validate(&self, route: &str) -> Result<()> {
        let missing: Vec<&str> = [
            ("provider_root_url", self.provider_root_url.as_str()),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ]
        .into_iter()
        .filter(|(_, v)| v.trim().is_empty())
        .map(|(k, _)| k)
        .collect();

        if !missing.is_empty() {
            return Err(Error::Config(format!(
                "route '{route}': token exchange is enabled but {} is not set",
                missing.join(", ")
            )));
        }

        if let Some(ref provider) = self.provider {
            if !SUPPORTED_PROVIDERS.contains(&provider.as_str()) {
                return Err(Error::Config(format!(
                    "route '{route}': authentication provider {provider} is not supported"
                )));
            }
        }

        if let Some(ref grant) = self.grant_type {
            let valid = grant
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ':' | '-'));
            if !valid {
                return Err(Error::Config(format!(
                    "route '{route}': unsupported grant type '{grant}'"
                )));
            }
        }

        match self.token_endpoint() {
            Err(Error::Config(msg)) => Err(Error::Config(format!("route '{route}': {msg}"))),
            Err(e) => Err(e),
            Ok(_) => Ok(()),
        }
    }

    /// Full URL of the provider's token endpoint
    ///
    /// # Errors
    ///
    /// Returns an error if the root URL does not parse or if HTTPS is required
    /// and the URL uses another scheme.
    pub fn token_endpoint(&self) -> Result<Url> {
        let endpoint = format!("{}{TOKEN_ENDPOINT_PATH}", self.provider_root_url);
        let url = Url::parse(&endpoint).map_err(|e| {
            Error::Config(format!(
                "invalid provider_root_url '{}': {e}",
                self.provider_root_url
            ))
        })?;

        if self.require_https && url.scheme() != "https" {
            return Err(Error::Config(format!(
                "provider_root_url '{}' must use https (require_https is set)",
                self.provider_root_url
            )));
        }
        Ok(url)
    }
}
