//! Per-request values passed through the exchange stage

use std::sync::Arc;

use axum::http::{HeaderMap, HeaderValue, Method, header::AUTHORIZATION};
use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::route_auth::RouteAuthConfig;

/// Read-only view of the inbound request
#[derive(Debug, Clone, Copy)]
pub struct InboundRequest<'a> {
    /// Inbound headers
    pub headers: &'a HeaderMap,
    /// Raw query string, without the leading `?`
    pub query: Option<&'a str>,
}

/// The request the gateway will send to the backend service
#[derive(Debug, Clone)]
pub struct DownstreamRequest {
    /// HTTP method
    pub method: Method,
    /// Target URL
    pub url: Url,
    /// Outbound headers
    pub headers: HeaderMap,
    /// Buffered body
    pub body: Bytes,
}

impl DownstreamRequest {
    /// Current `Authorization` header value, if any
    #[must_use]
    pub fn authorization(&self) -> Option<&str> {
        self.headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok())
    }

    /// Replace every `Authorization` value with `Bearer {token}`.
    ///
    /// Returns `false` (leaving the headers untouched) when the token cannot
    /// be carried in a header value.
    pub fn set_bearer(&mut self, token: &str) -> bool {
        match HeaderValue::from_str(&format!("Bearer {token}")) {
            Ok(mut value) => {
                value.set_sensitive(true);
                self.headers.insert(AUTHORIZATION, value);
                true
            }
            Err(_) => false,
        }
    }
}

/// Everything the exchange stage needs for one request
pub struct RequestContext<'a> {
    /// Name of the resolved route (for logs)
    pub route_name: &'a str,
    /// Exchange settings of the resolved route
    pub auth: Arc<RouteAuthConfig>,
    /// Inbound request view
    pub inbound: InboundRequest<'a>,
    /// Downstream request being built
    pub downstream: &'a mut DownstreamRequest,
    /// Fires when the caller goes away
    pub cancel: CancellationToken,
}
