//! Exchange stage against an in-process identity provider
//!
//! Covers every credential source, the fail-open paths (provider errors,
//! malformed credentials, timeouts, cancellation) and idempotence.

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, HeaderValue, Method, header::AUTHORIZATION};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use url::Url;

use common::{MockProvider, ProviderMode, param, spawn_provider};
use exchange_gateway::config::ExchangeOptions;
use exchange_gateway::exchange::{
    CredentialSource, DownstreamRequest, ExchangeOutcome, ExchangeStage, InboundRequest,
    RequestContext, RouteAuthConfig, TokenExchangeClient,
};

fn stage(timeout: Duration) -> ExchangeStage {
    ExchangeStage::new(TokenExchangeClient::new(reqwest::Client::new(), timeout))
}

fn auth_for(provider: &MockProvider) -> Arc<RouteAuthConfig> {
    let opts = ExchangeOptions {
        enabled: true,
        provider: Some("IdentityServer".to_string()),
        provider_root_url: format!("{}/", provider.url),
        client_id: "gateway".to_string(),
        client_secret: "s3cret".to_string(),
        ..Default::default()
    };
    Arc::new(RouteAuthConfig::from_options("orders", &opts).unwrap())
}

fn downstream(headers: &HeaderMap, query: Option<&str>) -> DownstreamRequest {
    let mut url = Url::parse("http://backend.local/orders/7").unwrap();
    url.set_query(query);
    DownstreamRequest {
        method: Method::GET,
        url,
        headers: headers.clone(),
        body: Bytes::new(),
    }
}

struct Run {
    outcome: ExchangeOutcome,
    request: DownstreamRequest,
}

async fn run_with(
    stage: &ExchangeStage,
    auth: Arc<RouteAuthConfig>,
    headers: &HeaderMap,
    query: Option<&str>,
    cancel: CancellationToken,
) -> Run {
    let mut request = downstream(headers, query);
    let outcome = {
        let mut ctx = RequestContext {
            route_name: "orders",
            auth,
            inbound: InboundRequest { headers, query },
            downstream: &mut request,
            cancel,
        };
        stage.process(&mut ctx).await
    };
    Run { outcome, request }
}

async fn run(auth: Arc<RouteAuthConfig>, headers: &HeaderMap, query: Option<&str>) -> Run {
    run_with(
        &stage(Duration::from_secs(5)),
        auth,
        headers,
        query,
        CancellationToken::new(),
    )
    .await
}

fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in pairs {
        map.append(*name, HeaderValue::from_static(*value));
    }
    map
}

#[tokio::test]
async fn test_gate_off_makes_no_provider_call() {
    let provider = spawn_provider(ProviderMode::Issue("xyz")).await;
    let opts = ExchangeOptions {
        enabled: false,
        provider_root_url: provider.url.clone(),
        ..Default::default()
    };
    let auth = Arc::new(RouteAuthConfig::from_options("orders", &opts).unwrap());

    let r = run(auth, &headers(&[("authorization", "Bearer ref-1")]), None).await;
    assert_eq!(r.outcome, ExchangeOutcome::PassThrough);
    assert_eq!(r.request.authorization(), Some("Bearer ref-1"));
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn test_bearer_reference_token_exchanged() {
    let provider = spawn_provider(ProviderMode::Issue("xyz")).await;

    let r = run(
        auth_for(&provider),
        &headers(&[("authorization", "Bearer ref-123")]),
        None,
    )
    .await;

    assert_eq!(
        r.outcome,
        ExchangeOutcome::Rewritten(CredentialSource::BearerReference)
    );
    assert_eq!(r.request.authorization(), Some("Bearer xyz"));

    let form = provider.call(0);
    assert_eq!(param(&form, "grant_type"), Some("exchange_reference_token"));
    assert_eq!(param(&form, "scope"), Some("twapi3 allow-full-access"));
    assert_eq!(param(&form, "client_id"), Some("gateway"));
    assert_eq!(param(&form, "client_secret"), Some("s3cret"));
    assert_eq!(param(&form, "token"), Some("ref-123"));
}

#[tokio::test]
async fn test_bearer_wins_over_every_other_source() {
    let provider = spawn_provider(ProviderMode::Issue("xyz")).await;

    let r = run(
        auth_for(&provider),
        &headers(&[("authorization", "Bearer ref-123"), ("x-tw-token", "legacy-456")]),
        Some("tw-token=abc123"),
    )
    .await;

    assert_eq!(
        r.outcome,
        ExchangeOutcome::Rewritten(CredentialSource::BearerReference)
    );
    assert_eq!(provider.call_count(), 1);
    assert_eq!(param(&provider.call(0), "token"), Some("ref-123"));
}

#[tokio::test]
async fn test_legacy_header_token() {
    let provider = spawn_provider(ProviderMode::Issue("xyz")).await;

    let r = run(
        auth_for(&provider),
        &headers(&[("x-tw-token", "legacy-456")]),
        Some("tw-token=abc123"),
    )
    .await;

    assert_eq!(
        r.outcome,
        ExchangeOutcome::Rewritten(CredentialSource::LegacyHeaderToken)
    );
    assert_eq!(r.request.authorization(), Some("Bearer xyz"));

    let form = provider.call(0);
    assert_eq!(param(&form, "grant_type"), Some("tw_token"));
    assert_eq!(param(&form, "scope"), None);
    assert_eq!(param(&form, "token"), Some("legacy-456"));
}

#[tokio::test]
async fn test_query_string_token() {
    let provider = spawn_provider(ProviderMode::Issue("xyz")).await;

    let r = run(auth_for(&provider), &HeaderMap::new(), Some("tw-token=abc123")).await;

    assert_eq!(
        r.outcome,
        ExchangeOutcome::Rewritten(CredentialSource::QueryStringToken)
    );
    assert_eq!(r.request.authorization(), Some("Bearer xyz"));

    let form = provider.call(0);
    assert_eq!(param(&form, "grant_type"), Some("tw_token"));
    assert_eq!(param(&form, "token"), Some("abc123"));
    // The query string itself is forwarded untouched
    assert_eq!(r.request.url.query(), Some("tw-token=abc123"));
}

#[tokio::test]
async fn test_basic_credential_exchanged_as_raw_payload() {
    let provider = spawn_provider(ProviderMode::Issue("xyz")).await;
    let payload = STANDARD.encode("alice:secret");
    let mut inbound = HeaderMap::new();
    inbound.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Basic {payload}")).unwrap(),
    );

    let r = run(auth_for(&provider), &inbound, None).await;

    assert_eq!(
        r.outcome,
        ExchangeOutcome::Rewritten(CredentialSource::BasicAuthToken)
    );
    assert_eq!(r.request.authorization(), Some("Bearer xyz"));

    let form = provider.call(0);
    assert_eq!(param(&form, "grant_type"), Some("tw_token"));
    assert_eq!(param(&form, "token"), Some(payload.as_str()));
}

#[tokio::test]
async fn test_grant_type_override_applies_to_raw_tokens() {
    let provider = spawn_provider(ProviderMode::Issue("xyz")).await;
    let opts = ExchangeOptions {
        enabled: true,
        provider_root_url: provider.url.clone(),
        client_id: "gateway".to_string(),
        client_secret: "s3cret".to_string(),
        grant_type: Some("urn:example:sso".to_string()),
        ..Default::default()
    };
    let auth = Arc::new(RouteAuthConfig::from_options("orders", &opts).unwrap());

    run(Arc::clone(&auth), &HeaderMap::new(), Some("tw-token=abc123")).await;
    run(auth, &headers(&[("authorization", "Bearer ref-1")]), None).await;

    assert_eq!(param(&provider.call(0), "grant_type"), Some("urn:example:sso"));
    // Reference tokens always use their own grant
    assert_eq!(
        param(&provider.call(1), "grant_type"),
        Some("exchange_reference_token")
    );
}

#[tokio::test]
async fn test_malformed_basic_is_left_untouched() {
    let provider = spawn_provider(ProviderMode::Issue("xyz")).await;

    let r = run(
        auth_for(&provider),
        &headers(&[("authorization", "Basic %%%not-base64")]),
        None,
    )
    .await;

    assert_eq!(r.outcome, ExchangeOutcome::MalformedCredential);
    assert_eq!(r.request.authorization(), Some("Basic %%%not-base64"));
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn test_provider_error_is_fail_open() {
    let provider = spawn_provider(ProviderMode::ServerError).await;

    let r = run(
        auth_for(&provider),
        &headers(&[("authorization", "Bearer ref-123")]),
        None,
    )
    .await;

    assert_eq!(r.outcome, ExchangeOutcome::ExchangeFailed);
    assert_eq!(r.request.authorization(), Some("Bearer ref-123"));
    assert_eq!(provider.call_count(), 1);
}

#[tokio::test]
async fn test_missing_access_token_is_fail_open() {
    let provider = spawn_provider(ProviderMode::MissingToken).await;

    let r = run(
        auth_for(&provider),
        &headers(&[("x-tw-token", "legacy-456")]),
        None,
    )
    .await;

    assert_eq!(r.outcome, ExchangeOutcome::ExchangeFailed);
    assert_eq!(r.request.authorization(), None);
}

#[tokio::test]
async fn test_non_json_token_response_is_fail_open() {
    let provider = spawn_provider(ProviderMode::Garbage).await;

    let r = run(
        auth_for(&provider),
        &headers(&[("authorization", "Bearer ref-123")]),
        None,
    )
    .await;

    assert_eq!(r.outcome, ExchangeOutcome::ExchangeFailed);
    assert_eq!(r.request.authorization(), Some("Bearer ref-123"));
    assert_eq!(provider.call_count(), 1);
}

#[tokio::test]
async fn test_basic_without_separator_is_left_untouched() {
    let provider = spawn_provider(ProviderMode::Issue("xyz")).await;
    let header = format!("Basic {}", STANDARD.encode("alice"));
    let mut inbound = HeaderMap::new();
    inbound.insert(AUTHORIZATION, HeaderValue::from_str(&header).unwrap());

    let r = run(auth_for(&provider), &inbound, Some("tw-token=abc123")).await;

    assert_eq!(r.outcome, ExchangeOutcome::MalformedCredential);
    assert_eq!(r.request.authorization(), Some(header.as_str()));
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn test_no_credential_makes_no_provider_call() {
    let provider = spawn_provider(ProviderMode::Issue("xyz")).await;

    let r = run(
        auth_for(&provider),
        &headers(&[("authorization", "Bearer   ")]),
        Some("other=1"),
    )
    .await;

    assert_eq!(r.outcome, ExchangeOutcome::NoCredential);
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn test_slow_provider_times_out() {
    let provider = spawn_provider(ProviderMode::Hang).await;

    let r = run_with(
        &stage(Duration::from_millis(200)),
        auth_for(&provider),
        &headers(&[("authorization", "Bearer ref-123")]),
        None,
        CancellationToken::new(),
    )
    .await;

    assert_eq!(r.outcome, ExchangeOutcome::ExchangeFailed);
    assert_eq!(r.request.authorization(), Some("Bearer ref-123"));
}

#[tokio::test]
async fn test_cancellation_aborts_exchange() {
    let provider = spawn_provider(ProviderMode::Hang).await;
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let started = std::time::Instant::now();
    let r = run_with(
        &stage(Duration::from_secs(30)),
        auth_for(&provider),
        &headers(&[("x-tw-token", "legacy-456")]),
        None,
        cancel,
    )
    .await;

    assert_eq!(r.outcome, ExchangeOutcome::ExchangeFailed);
    assert_eq!(r.request.authorization(), None);
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn test_repeated_runs_are_idempotent() {
    let provider = spawn_provider(ProviderMode::Issue("xyz")).await;
    let auth = auth_for(&provider);
    let inbound = headers(&[("authorization", "Bearer ref-123")]);

    let first = run(Arc::clone(&auth), &inbound, None).await;
    let second = run(auth, &inbound, None).await;

    assert_eq!(first.request.authorization(), Some("Bearer xyz"));
    assert_eq!(second.request.authorization(), Some("Bearer xyz"));
    assert_eq!(first.request.headers.get_all(AUTHORIZATION).iter().count(), 1);
    assert_eq!(provider.call(0), provider.call(1));
}
