//! Downstream request building and forwarding

use std::time::Duration;

use axum::{
    body::Body,
    http::{HeaderMap, HeaderName, StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use reqwest::Client;
use tracing::debug;

use super::routes::Route;
use crate::exchange::DownstreamRequest;
use crate::{Error, Result};

/// Headers that describe a single connection and are never forwarded
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

fn is_forwardable(name: &HeaderName) -> bool {
    let name = name.as_str();
    !HOP_BY_HOP.contains(&name) && name != "host" && name != "content-length"
}

fn copy_headers(from: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(from.len());
    for (name, value) in from {
        if is_forwardable(name) {
            out.append(name.clone(), value.clone());
        }
    }
    out
}

/// Build the downstream request for an inbound request on `route`
#[must_use]
pub fn build_downstream(
    route: &Route,
    remainder: &str,
    parts: &Parts,
    body: Bytes,
) -> DownstreamRequest {
    DownstreamRequest {
        method: parts.method.clone(),
        url: route.downstream_for(remainder, parts.uri.query()),
        headers: copy_headers(&parts.headers),
        body,
    }
}

/// Send the downstream request and relay the backend's response
///
/// # Errors
///
/// Returns [`Error::Upstream`] if the backend cannot be reached or its body
/// cannot be read within `timeout`.
pub async fn forward(
    client: &Client,
    request: DownstreamRequest,
    timeout: Duration,
) -> Result<Response> {
    debug!(method = %request.method, url = %request.url, "Forwarding downstream");

    let response = client
        .request(request.method, request.url)
        .headers(request.headers)
        .body(request.body)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| Error::Upstream(e.to_string()))?;

    let status = response.status();
    let headers = copy_headers(response.headers());
    let body = response
        .bytes()
        .await
        .map_err(|e| Error::Upstream(e.to_string()))?;

    let mut relayed = Response::new(Body::from(body));
    *relayed.status_mut() = status;
    *relayed.headers_mut() = headers;
    Ok(relayed)
}

/// Gateway-generated error response (route lookup and forwarding only)
pub fn error_response(status: StatusCode, message: &str) -> Response {
    (status, axum::Json(serde_json::json!({ "error": message }))).into_response()
}
