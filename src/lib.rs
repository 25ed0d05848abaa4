//! Exchange Gateway Library
//!
//! Reverse-proxy gateway that swaps caller credentials for access tokens
//! issued by an identity provider before requests reach downstream services.
//!
//! # Features
//!
//! - **Per-route exchange**: enable, provider, client credentials and grant per route
//! - **Credential sources**: bearer reference tokens, a legacy header, Basic auth,
//!   and a query-string token, in that order of precedence
//! - **Fail-open**: a failed exchange forwards the request unchanged
//! - **Production Ready**: request ids, structured logs, graceful shutdown

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod error;
pub mod exchange;
pub mod gateway;
pub mod transport;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
///
/// # Errors
///
/// Returns [`Error::Internal`] if a global subscriber is already installed.
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    let installed = match format {
        Some("json") => subscriber.with(fmt::layer().json()).try_init(),
        _ => subscriber.with(fmt::layer()).try_init(),
    };
    installed.map_err(|e| Error::Internal(format!("Failed to install tracing subscriber: {e}")))
}
