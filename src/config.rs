//! Configuration management

use std::{env, path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Environment files to load before processing config.
    /// Paths support ~ expansion. Loaded in order, later files override earlier.
    pub env_files: Vec<String>,
    /// Server configuration
    pub server: ServerConfig,
    /// Settings shared by every token exchange call
    pub exchange: ExchangeConfig,
    /// Proxied routes
    pub routes: Vec<RouteConfig>,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Timeout for the forwarded downstream request
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Graceful shutdown timeout
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
    /// Maximum request body size (bytes)
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 39500,
            request_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(30),
            max_body_size: 10 * 1024 * 1024, // 10MB
        }
    }
}

/// Token exchange transport settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    /// Upper bound on a single call to a provider's token endpoint
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
        }
    }
}

/// A proxied route as written in the config file
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RouteConfig {
    /// Route name (used in logs)
    pub name: String,
    /// Inbound path prefix, e.g. `/orders`
    pub upstream_path: String,
    /// Base URL the matched request is forwarded to
    pub downstream_url: String,
    /// Allowed methods (empty = all)
    pub methods: Vec<String>,
    /// Credential exchange options
    pub exchange: ExchangeOptions,
}

/// Per-route credential exchange options as written in the config file.
///
/// Every field may be omitted; unset values default to empty/false.
/// Presence of required fields is only checked when `enabled` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeOptions {
    /// Exchange caller credentials for this route
    pub enabled: bool,
    /// Provider identifier (`IdentityServer` or `IdSvrTokenExchange`)
    pub provider: Option<String>,
    /// Base URL of the identity provider
    pub provider_root_url: String,
    /// Client id presented by the gateway (supports `${VAR}`)
    pub client_id: String,
    /// Client secret presented by the gateway (supports `${VAR}`)
    pub client_secret: String,
    /// Refuse to talk to a provider over plain HTTP
    pub require_https: bool,
    /// Scopes carried through for downstream validation
    pub allowed_scopes: Vec<String>,
    /// Grant type override for non-reference credentials
    pub grant_type: Option<String>,
    /// Legacy single-sign-on header holding a raw token
    pub token_header: String,
    /// Query-string parameter holding a raw token
    pub token_query_param: String,
    /// Scope requested when exchanging a bearer reference token
    pub reference_token_scope: String,
}

/// Default legacy token header
pub const DEFAULT_TOKEN_HEADER: &str = "x-tw-token";
/// Default token query parameter
pub const DEFAULT_TOKEN_QUERY_PARAM: &str = "tw-token";
/// Default scope for reference-token exchange
pub const DEFAULT_REFERENCE_TOKEN_SCOPE: &str = "twapi3 allow-full-access";

impl Default for ExchangeOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: None,
            provider_root_url: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            require_https: false,
            allowed_scopes: Vec::new(),
            grant_type: None,
            token_header: DEFAULT_TOKEN_HEADER.to_string(),
            token_query_param: DEFAULT_TOKEN_QUERY_PARAM.to_string(),
            reference_token_scope: DEFAULT_REFERENCE_TOKEN_SCOPE.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        figment = figment.merge(Env::prefixed("EXCHANGE_GATEWAY_").split("__"));

        let mut config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        // Env files must be loaded before ${VAR} expansion
        config.load_env_files();
        config.expand_env_vars()?;

        Ok(config)
    }

    /// Load environment files into the process environment.
    /// Files that don't exist are skipped.
    fn load_env_files(&self) {
        for path_str in &self.env_files {
            let expanded = match (path_str.strip_prefix('~'), dirs::home_dir()) {
                (Some(rest), Some(home)) => format!("{}{rest}", home.display()),
                _ => path_str.clone(),
            };

            let path = Path::new(&expanded);
            if !path.exists() {
                tracing::debug!("Env file not found (skipped): {expanded}");
                continue;
            }
            match dotenvy::from_path(path) {
                Ok(()) => tracing::info!("Loaded env file: {expanded}"),
                Err(e) => tracing::warn!("Failed to load env file {expanded}: {e}"),
            }
        }
    }

    /// Expand `${VAR}` and `${VAR:-default}` in route provider settings
    fn expand_env_vars(&mut self) -> Result<()> {
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}")
            .map_err(|e| Error::Internal(e.to_string()))?;

        for route in &mut self.routes {
            route.downstream_url = Self::expand_string(&re, &route.downstream_url);
            let opts = &mut route.exchange;
            opts.provider_root_url = Self::expand_string(&re, &opts.provider_root_url);
            opts.client_id = Self::expand_string(&re, &opts.client_id);
            opts.client_secret = Self::expand_string(&re, &opts.client_secret);
        }
        Ok(())
    }

    fn expand_string(re: &Regex, value: &str) -> String {
        re.replace_all(value, |caps: &regex::Captures| {
            let default = caps.get(2).map_or("", |m| m.as_str());
            env::var(&caps[1]).unwrap_or_else(|_| default.to_string())
        })
        .into_owned()
    }
}

/// Serde helpers for human-readable durations ("30s", "5m", "250ms")
pub mod humantime_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    /// Serialize a Duration as milliseconds when sub-second, seconds otherwise
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the serializer fails.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    /// Deserialize a duration string; a bare number means seconds
    ///
    /// # Errors
    ///
    /// Returns a deserialization error if the string cannot be parsed as a duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse(&s).map_err(serde::de::Error::custom)
    }

    pub(crate) fn parse(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        let number = |n: &str| {
            n.trim()
                .parse::<u64>()
                .map_err(|e| format!("invalid duration '{s}': {e}"))
        };
        // "ms" must be checked before "s" and "m"
        if let Some(ms) = s.strip_suffix("ms") {
            number(ms).map(Duration::from_millis)
        } else if let Some(secs) = s.strip_suffix('s') {
            number(secs).map(Duration::from_secs)
        } else if let Some(mins) = s.strip_suffix('m') {
            number(mins)?
                .checked_mul(60)
                .map(Duration::from_secs)
                .ok_or_else(|| format!("duration '{s}' is too large"))
        } else {
            number(s).map(Duration::from_secs)
        }
    }
}
