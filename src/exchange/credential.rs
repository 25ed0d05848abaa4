//! Credential extraction from inbound requests
//!
//! Sources are tried in a fixed order and the first non-blank match wins:
//!
//! 1. `Authorization: Bearer <token>` (reference token)
//! 2. the route's legacy token header (`x-tw-token` by default)
//! 3. `Authorization: Basic <payload>`
//! 4. the route's token query parameter (`tw-token` by default)
//!
//! Header names, auth schemes and the query key are matched case-insensitively.

use axum::http::header::AUTHORIZATION;
use url::form_urlencoded;

use super::context::InboundRequest;
use super::route_auth::RouteAuthConfig;

const BEARER_PREFIX: &str = "bearer ";
const BASIC_PREFIX: &str = "basic ";

/// Where a credential was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// `Authorization: Bearer` reference token
    BearerReference,
    /// Legacy single-sign-on header
    LegacyHeaderToken,
    /// `Authorization: Basic` payload, still encoded
    BasicAuthToken,
    /// Token query parameter
    QueryStringToken,
}

impl std::fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BearerReference => write!(f, "bearer_reference"),
            Self::LegacyHeaderToken => write!(f, "legacy_header"),
            Self::BasicAuthToken => write!(f, "basic_auth"),
            Self::QueryStringToken => write!(f, "query_string"),
        }
    }
}

/// A caller credential and its source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedCredential {
    /// Raw token (scheme prefix removed)
    pub value: String,
    /// Where it came from
    pub source: CredentialSource,
}

impl ExtractedCredential {
    fn new(value: &str, source: CredentialSource) -> Self {
        Self {
            value: value.to_string(),
            source,
        }
    }
}

/// Find the highest-precedence credential in the request, if any.
///
/// `None` means the caller is anonymous as far as this stage is concerned.
pub fn extract_credential(
    inbound: &InboundRequest<'_>,
    route: &RouteAuthConfig,
) -> Option<ExtractedCredential> {
    let authorization = inbound
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if let Some(token) = strip_scheme(authorization, BEARER_PREFIX) {
        return Some(ExtractedCredential::new(token, CredentialSource::BearerReference));
    }

    if let Some(token) = legacy_header(inbound, &route.token_header) {
        return Some(ExtractedCredential::new(token, CredentialSource::LegacyHeaderToken));
    }

    if let Some(token) = strip_scheme(authorization, BASIC_PREFIX) {
        return Some(ExtractedCredential::new(token, CredentialSource::BasicAuthToken));
    }

    query_param(inbound.query, &route.token_query_param)
        .map(|token| ExtractedCredential::new(&token, CredentialSource::QueryStringToken))
}

/// Strip a case-insensitive scheme prefix, rejecting blank remainders
fn strip_scheme<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    let head = value.get(..prefix.len())?;
    if !head.eq_ignore_ascii_case(prefix) {
        return None;
    }
    non_blank(&value[prefix.len()..])
}

fn legacy_header<'a>(inbound: &'a InboundRequest<'_>, name: &str) -> Option<&'a str> {
    if name.is_empty() {
        return None;
    }
    inbound
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(non_blank)
}

fn query_param(query: Option<&str>, key: &str) -> Option<String> {
    if key.is_empty() {
        return None;
    }
    // Repeated keys (in any case) form one group; the first non-blank value wins
    form_urlencoded::parse(query?.as_bytes())
        .filter(|(k, _)| k.eq_ignore_ascii_case(key))
        .find_map(|(_, v)| non_blank(&v).map(String::from))
}

fn non_blank(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}
