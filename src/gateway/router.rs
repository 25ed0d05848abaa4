//! HTTP router and handlers

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tower_http::{
    catch_panic::CatchPanicLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{debug, warn};

use super::proxy::{build_downstream, error_response, forward};
use super::routes::RouteTable;
use crate::{Error, Result};
use crate::config::Config;
use crate::exchange::{ExchangeStage, InboundRequest, RequestContext, TokenExchangeClient};
use crate::transport::build_http_client;

/// Shared application state
pub struct AppState {
    /// Resolved routes
    pub routes: RouteTable,
    /// Credential exchange stage
    pub stage: ExchangeStage,
    /// Client used for downstream calls
    pub http_client: reqwest::Client,
    /// Bound on a single downstream call
    pub request_timeout: Duration,
    /// Largest inbound body that is buffered and forwarded
    pub max_body_size: usize,
}

impl AppState {
    /// Resolve routes and build clients from configuration
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for any invalid route and [`Error::Http`]
    /// if the HTTP client cannot be built.
    pub fn from_config(config: &Config) -> Result<Self> {
        let routes = RouteTable::from_config(&config.routes)?;
        let http_client = build_http_client()?;
        let stage = ExchangeStage::new(TokenExchangeClient::new(
            http_client.clone(),
            config.exchange.timeout,
        ));

        Ok(Self {
            routes,
            stage,
            http_client,
            request_timeout: config.server.request_timeout,
            max_body_size: config.server.max_body_size,
        })
    }
}

/// Create the router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .fallback(proxy_handler)
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}

/// GET /health
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "routes": state.routes.len(),
    }))
}

/// Every other request: resolve route, exchange credential, forward once
async fn proxy_handler(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let (parts, body) = request.into_parts();

    let Some((route, remainder)) = state.routes.resolve(&parts.method, parts.uri.path()) else {
        let err = Error::RouteNotFound {
            method: parts.method.to_string(),
            path: parts.uri.path().to_string(),
        };
        debug!(error = %err, "Rejecting request");
        return error_response(StatusCode::NOT_FOUND, &err.to_string());
    };

    let body = match axum::body::to_bytes(body, state.max_body_size).await {
        Ok(body) => body,
        Err(e) => {
            warn!(route = %route.name, error = %e, "Failed to read request body");
            return error_response(StatusCode::PAYLOAD_TOO_LARGE, "request body too large");
        }
    };

    let mut downstream = build_downstream(route, remainder, &parts, body);

    // Server shutdown must not abort an exchange that is draining; a caller
    // that disconnects drops this future, and the exchange with it.
    let cancel = CancellationToken::new();

    let outcome = {
        let mut ctx = RequestContext {
            route_name: &route.name,
            auth: Arc::clone(&route.auth),
            inbound: InboundRequest {
                headers: &parts.headers,
                query: parts.uri.query(),
            },
            downstream: &mut downstream,
            cancel,
        };
        state.stage.process(&mut ctx).await
    };
    debug!(route = %route.name, outcome = ?outcome, "Exchange stage finished");

    match forward(&state.http_client, downstream, state.request_timeout).await {
        Ok(response) => response,
        Err(e) => {
            warn!(route = %route.name, error = %e, "Downstream request failed");
            error_response(StatusCode::BAD_GATEWAY, &e.to_string())
        }
    }
}
