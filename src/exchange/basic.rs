//! Basic credential decoding

use base64::{Engine as _, engine::general_purpose::STANDARD};

use crate::error::MalformedReason;
use crate::{Error, Result};

/// Identifier/secret pair carried in a Basic credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicAuthCredential {
    /// Identifier (before the first `:`)
    pub id: String,
    /// Secret (everything after the first `:`)
    pub secret: String,
    /// Payload the pair was decoded from
    pub header: String,
}

impl BasicAuthCredential {
    /// Decode a Basic payload (`base64(id:secret)`).
    ///
    /// A leading `Basic ` scheme is tolerated so callers can pass either the
    /// stripped payload or the full header value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedCredential`] if the payload is not base64,
    /// does not decode to UTF-8, or has no `:` separator.
    pub fn decode(header: &str) -> Result<Self> {
        let payload = strip_basic_scheme(header).trim();

        let bytes = STANDARD
            .decode(payload)
            .map_err(|_| Error::malformed(MalformedReason::InvalidBase64, header))?;
        let pair = String::from_utf8(bytes)
            .map_err(|_| Error::malformed(MalformedReason::InvalidUtf8, header))?;
        let (id, secret) = pair
            .split_once(':')
            .ok_or_else(|| Error::malformed(MalformedReason::MissingSeparator, header))?;

        Ok(Self {
            id: id.to_string(),
            secret: secret.to_string(),
            header: header.to_string(),
        })
    }
}

fn strip_basic_scheme(value: &str) -> &str {
    match value.get(..6) {
        Some(prefix) if prefix.eq_ignore_ascii_case("basic ") => &value[6..],
        _ => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn encode(s: &str) -> String {
        STANDARD.encode(s)
    }

    #[test]
    fn test_decode_splits_id_and_secret() {
        let cred = BasicAuthCredential::decode(&encode("alice:secret")).unwrap();
        assert_eq!(cred.id, "alice");
        assert_eq!(cred.secret, "secret");
    }

    #[test]
    fn test_decode_splits_at_first_separator_only() {
        let cred = BasicAuthCredential::decode(&encode("alice:sec:ret")).unwrap();
        assert_eq!(cred.id, "alice");
        assert_eq!(cred.secret, "sec:ret");
    }

    #[test]
    fn test_decode_allows_empty_parts() {
        let cred = BasicAuthCredential::decode(&encode(":")).unwrap();
        assert_eq!(cred.id, "");
        assert_eq!(cred.secret, "");
    }

    #[test]
    fn test_decode_accepts_full_header_value() {
        let header = format!("basic {}", encode("svc:pw"));
        let cred = BasicAuthCredential::decode(&header).unwrap();
        assert_eq!(cred.id, "svc");
        assert_eq!(cred.header, header);
    }

    #[test]
    fn test_invalid_base64() {
        let err = BasicAuthCredential::decode("not base64!!").unwrap_err();
        match err {
            Error::MalformedCredential { reason, header } => {
                assert_eq!(reason, MalformedReason::InvalidBase64);
                assert_eq!(header, "not base64!!");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_utf8() {
        let payload = STANDARD.encode([0xff, 0xfe, b':', b'x']);
        let err = BasicAuthCredential::decode(&payload).unwrap_err();
        assert!(matches!(
            err,
            Error::MalformedCredential {
                reason: MalformedReason::InvalidUtf8,
                ..
            }
        ));
    }

    #[test]
    fn test_missing_separator() {
        let err = BasicAuthCredential::decode(&encode("alice")).unwrap_err();
        assert!(matches!(
            err,
            Error::MalformedCredential {
                reason: MalformedReason::MissingSeparator,
                ..
            }
        ));
    }
}
