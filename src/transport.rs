//! Shared outbound HTTP client
//!
//! One pooled `reqwest` client serves both token-endpoint calls and forwarded
//! downstream requests. Timeouts are applied per call, not on the client.

use std::time::Duration;

use reqwest::Client;

use crate::{Error, Result};

/// Build the outbound client.
///
/// Redirects are not followed so the caller sees the backend's own 3xx.
///
/// # Errors
///
/// Returns [`Error::Http`] if the TLS backend cannot be initialised.
pub fn build_http_client() -> Result<Client> {
    Client::builder()
        .pool_max_idle_per_host(10)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(30))
        .tcp_nodelay(true)
        .redirect(reqwest::redirect::Policy::none())
        .user_agent(concat!("exchange-gateway/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(Error::from)
}
