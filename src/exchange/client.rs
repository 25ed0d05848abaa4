//! Token endpoint client
//!
//! One form-encoded POST per call to `{provider_root_url}/connect/token`.
//! No retries and no caching: every gated request pays a provider round trip.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::credential::{CredentialSource, ExtractedCredential};
use super::route_auth::RouteAuthConfig;
use crate::{Error, Result};

/// Grant used for bearer reference tokens
pub const REFERENCE_TOKEN_GRANT: &str = "exchange_reference_token";
/// Grant used for every other credential source unless overridden
pub const TW_TOKEN_GRANT: &str = "tw_token";

/// Token endpoint response (only the field we need)
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Exchanges caller credentials at a route's identity provider
#[derive(Debug, Clone)]
pub struct TokenExchangeClient {
    /// Shared outbound HTTP client
    http_client: Client,
    /// Bound on a single exchange (connect, send and body read)
    timeout: Duration,
}

impl TokenExchangeClient {
    /// Create a client over a shared `reqwest` client
    #[must_use]
    pub fn new(http_client: Client, timeout: Duration) -> Self {
        Self {
            http_client,
            timeout,
        }
    }

    /// Form parameters for exchanging `credential` on a route
    #[must_use]
    pub fn token_request<'a>(
        credential: &'a ExtractedCredential,
        auth: &'a RouteAuthConfig,
    ) -> Vec<(&'static str, &'a str)> {
        let mut params = Vec::with_capacity(5);
        match credential.source {
            CredentialSource::BearerReference => {
                params.push(("grant_type", REFERENCE_TOKEN_GRANT));
                params.push(("client_id", auth.client_id.as_str()));
                params.push(("client_secret", auth.client_secret.as_str()));
                params.push(("scope", auth.reference_token_scope.as_str()));
            }
            CredentialSource::LegacyHeaderToken
            | CredentialSource::BasicAuthToken
            | CredentialSource::QueryStringToken => {
                params.push(("grant_type", auth.grant_type.as_deref().unwrap_or(TW_TOKEN_GRANT)));
                params.push(("client_id", auth.client_id.as_str()));
                params.push(("client_secret", auth.client_secret.as_str()));
            }
        }
        params.push(("token", credential.value.as_str()));
        params
    }

    /// Exchange a credential for an access token
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExchangeFailed`] on transport errors, timeouts,
    /// non-2xx responses, and bodies without a usable `access_token`.
    pub async fn exchange(
        &self,
        credential: &ExtractedCredential,
        auth: &RouteAuthConfig,
    ) -> Result<String> {
        let endpoint = auth
            .token_endpoint()
            .map_err(|e| Error::ExchangeFailed(e.to_string()))?;
        let params = Self::token_request(credential, auth);

        debug!(endpoint = %endpoint, source = %credential.source, grant = params[0].1, "Requesting token exchange");

        tokio::time::timeout(self.timeout, self.send(endpoint, &params))
            .await
            .map_err(|_| {
                Error::ExchangeFailed(format!("token endpoint did not answer within {:?}", self.timeout))
            })?
    }

    async fn send(&self, endpoint: url::Url, params: &[(&'static str, &str)]) -> Result<String> {
        let response = self
            .http_client
            .post(endpoint)
            .form(params)
            .send()
            .await
            .map_err(|e| Error::ExchangeFailed(format!("token request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::ExchangeFailed(format!("HTTP {status} - {body}")));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::ExchangeFailed(format!("failed to parse token response: {e}")))?;

        if token.access_token.trim().is_empty() {
            return Err(Error::ExchangeFailed("empty access_token in response".to_string()));
        }
        Ok(token.access_token)
    }
}
