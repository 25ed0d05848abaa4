//! Error types for the exchange gateway

use std::io;

use thiserror::Error;

/// Result type alias for the exchange gateway
pub type Result<T> = std::result::Result<T, Error>;

/// Why a Basic credential could not be decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedReason {
    /// Payload is not valid base64
    InvalidBase64,
    /// Decoded bytes are not valid UTF-8
    InvalidUtf8,
    /// Decoded text has no `:` separator
    MissingSeparator,
}

impl std::fmt::Display for MalformedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidBase64 => write!(f, "payload is not valid base64"),
            Self::InvalidUtf8 => write!(f, "decoded payload is not valid UTF-8"),
            Self::MissingSeparator => write!(f, "decoded payload has no ':' separator"),
        }
    }
}

/// Exchange gateway errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error (fatal at load time)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Caller-supplied credential could not be decoded
    #[error("Malformed credential: {reason}")]
    MalformedCredential {
        /// What was wrong with the payload
        reason: MalformedReason,
        /// Original header value, kept for diagnostics
        header: String,
    },

    /// Token exchange with the identity provider failed
    #[error("Token exchange failed: {0}")]
    ExchangeFailed(String),

    /// No configured route matches the inbound request
    #[error("No route for {method} {path}")]
    RouteNotFound {
        /// Request method
        method: String,
        /// Request path
        path: String,
    },

    /// Downstream service could not be reached
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a malformed-credential error for the given header value
    pub fn malformed(reason: MalformedReason, header: impl Into<String>) -> Self {
        Self::MalformedCredential {
            reason,
            header: header.into(),
        }
    }
}
