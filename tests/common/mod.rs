//! In-process mock servers shared by the integration tests

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Request, State},
    http::{
        StatusCode,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
    routing::post,
};
use serde_json::json;
use tokio::net::TcpListener;

/// How the mock token endpoint answers
#[derive(Debug, Clone, Copy)]
pub enum ProviderMode {
    /// 200 with this access token
    Issue(&'static str),
    /// 200 with this access token, after the given number of milliseconds
    IssueAfter(&'static str, u64),
    /// 500 with an error body
    ServerError,
    /// 200 without `access_token`
    MissingToken,
    /// 200 with a body that is not JSON
    Garbage,
    /// Never answers within any test timeout
    Hang,
}

/// Form bodies received by the mock token endpoint, in order
pub type Calls = Arc<Mutex<Vec<Vec<(String, String)>>>>;

/// Running mock identity provider
pub struct MockProvider {
    /// Root URL (no trailing slash)
    pub url: String,
    /// Recorded token requests
    pub calls: Calls,
}

impl MockProvider {
    /// Form parameters of the `n`th token request
    pub fn call(&self, n: usize) -> Vec<(String, String)> {
        self.calls.lock().unwrap()[n].clone()
    }

    /// Number of token requests received
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

/// Value of `key` in a recorded form body
pub fn param<'a>(form: &'a [(String, String)], key: &str) -> Option<&'a str> {
    form.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
}

async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Start a mock provider serving `POST /connect/token`
pub async fn spawn_provider(mode: ProviderMode) -> MockProvider {
    let calls: Calls = Arc::default();

    let app = Router::new()
        .route("/connect/token", post(token_handler))
        .with_state((mode, Arc::clone(&calls)));

    MockProvider {
        url: serve(app).await,
        calls,
    }
}

async fn token_handler(
    State((mode, calls)): State<(ProviderMode, Calls)>,
    body: String,
) -> Response {
    let form: Vec<(String, String)> = serde_urlencoded::from_str(&body).unwrap();
    calls.lock().unwrap().push(form);

    match mode {
        ProviderMode::Issue(token) => Json(json!({
            "access_token": token,
            "token_type": "Bearer",
            "expires_in": 3600,
        }))
        .into_response(),
        ProviderMode::ServerError => {
            (StatusCode::INTERNAL_SERVER_ERROR, "invalid_grant").into_response()
        }
        ProviderMode::IssueAfter(token, millis) => {
            tokio::time::sleep(Duration::from_millis(millis)).await;
            Json(json!({ "access_token": token })).into_response()
        }
        ProviderMode::MissingToken => Json(json!({ "token_type": "Bearer" })).into_response(),
        ProviderMode::Garbage => (
            StatusCode::OK,
            [(CONTENT_TYPE, "text/plain")],
            "<html>maintenance</html>",
        )
            .into_response(),
        ProviderMode::Hang => {
            tokio::time::sleep(Duration::from_secs(60)).await;
            StatusCode::GATEWAY_TIMEOUT.into_response()
        }
    }
}

/// Start a backend that echoes the request line and `Authorization`
pub async fn spawn_backend() -> String {
    let app = Router::new().fallback(echo_handler);
    serve(app).await
}

async fn echo_handler(request: Request) -> Json<serde_json::Value> {
    let authorization = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    let tw_header = request
        .headers()
        .get("x-tw-token")
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    Json(json!({
        "method": request.method().as_str(),
        "uri": request.uri().to_string(),
        "authorization": authorization,
        "x_tw_token": tw_header,
    }))
}
