//! Exchange stage: gate, extract, exchange, rewrite
//!
//! The stage never rejects a request. Every per-request failure leaves the
//! downstream request as it was and the caller forwards it anyway; rejecting
//! unauthenticated calls is left to the backend's own authentication.

use tracing::{debug, warn};

use super::basic::BasicAuthCredential;
use super::client::TokenExchangeClient;
use super::context::RequestContext;
use super::credential::{CredentialSource, extract_credential};
use crate::Error;

/// Which branch the stage took for a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeOutcome {
    /// Route does not exchange credentials
    PassThrough,
    /// Nothing to exchange in the inbound request
    NoCredential,
    /// Basic credential could not be decoded
    MalformedCredential,
    /// Provider call failed, timed out or was cancelled
    ExchangeFailed,
    /// `Authorization` now carries the issued token
    Rewritten(CredentialSource),
}

impl ExchangeOutcome {
    /// Whether the downstream `Authorization` header was replaced
    #[must_use]
    pub fn is_rewritten(self) -> bool {
        matches!(self, Self::Rewritten(_))
    }
}

/// Credential exchange pipeline stage
#[derive(Debug, Clone)]
pub struct ExchangeStage {
    client: TokenExchangeClient,
}

impl ExchangeStage {
    /// Create the stage over a token exchange client
    #[must_use]
    pub fn new(client: TokenExchangeClient) -> Self {
        Self { client }
    }

    /// Run the stage for one request.
    ///
    /// Only mutates `ctx.downstream`, and only on a successful exchange.
    pub async fn process(&self, ctx: &mut RequestContext<'_>) -> ExchangeOutcome {
        let route = ctx.route_name;

        if !ctx.auth.exchange_enabled {
            debug!(route = %route, "Token exchange disabled for route, passing through");
            return ExchangeOutcome::PassThrough;
        }

        let Some(credential) = extract_credential(&ctx.inbound, &ctx.auth) else {
            debug!(route = %route, "No credential to exchange");
            return ExchangeOutcome::NoCredential;
        };
        debug!(route = %route, source = %credential.source, "Found credential");

        if credential.source == CredentialSource::BasicAuthToken {
            match BasicAuthCredential::decode(&credential.value) {
                Ok(basic) => debug!(route = %route, client = %basic.id, "Decoded basic credential"),
                Err(e) => {
                    warn!(route = %route, error = %e, "Ignoring malformed basic credential");
                    return ExchangeOutcome::MalformedCredential;
                }
            }
        }

        // The provider call is the only await point; the caller's
        // cancellation aborts it.
        let result = tokio::select! {
            biased;
            () = ctx.cancel.cancelled() => {
                Err(Error::ExchangeFailed("request cancelled by caller".to_string()))
            }
            r = self.client.exchange(&credential, &ctx.auth) => r,
        };

        match result {
            Ok(token) => {
                if ctx.downstream.set_bearer(&token) {
                    debug!(route = %route, source = %credential.source, "Exchanged credential, authorization rewritten");
                    ExchangeOutcome::Rewritten(credential.source)
                } else {
                    warn!(route = %route, "Issued token is not a valid header value, leaving request unmodified");
                    ExchangeOutcome::ExchangeFailed
                }
            }
            Err(e) => {
                warn!(route = %route, source = %credential.source, error = %e, "Token exchange failed, leaving request unmodified");
                ExchangeOutcome::ExchangeFailed
            }
        }
    }
}
