//! Credential exchange
//!
//! Trades a caller-supplied credential for a provider-issued access token
//! and puts that token on the downstream request:
//!
//! - [`credential`]: find the caller's credential (bearer reference token,
//!   legacy header, Basic payload, query parameter)
//! - [`basic`]: decode Basic payloads
//! - [`client`]: call the provider's token endpoint
//! - [`stage`]: tie it together per request, failing open

pub mod basic;
pub mod client;
pub mod context;
pub mod credential;
pub mod route_auth;
pub mod stage;

pub use basic::BasicAuthCredential;
pub use client::{REFERENCE_TOKEN_GRANT, TW_TOKEN_GRANT, TokenExchangeClient};
pub use context::{DownstreamRequest, InboundRequest, RequestContext};
pub use credential::{CredentialSource, ExtractedCredential, extract_credential};
pub use route_auth::RouteAuthConfig;
pub use stage::{ExchangeOutcome, ExchangeStage};
