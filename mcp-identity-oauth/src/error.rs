//! Error taxonomy for the OAuth client layer.
//!
//! Each variant carries its own retriability, decided once here so every
//! downstream crate (verifier, delegation provider, coordinator) can match
//! on it instead of re-deriving the classification.

use thiserror::Error;

/// Result alias used throughout the OAuth client layer.
pub type Result<T> = std::result::Result<T, OAuthError>;

/// Body of an RFC 6749 `error` response (token, registration, introspection, ...).
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ProtocolErrorBody {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
    #[serde(default)]
    pub error_uri: Option<String>,
}

/// Errors raised by the OAuth client layer.
#[derive(Debug, Error)]
pub enum OAuthError {
    /// Missing required configuration, unresolvable endpoint, or an auth
    /// strategy referencing a zone that was never configured. Raised before
    /// any network I/O; never retriable.
    #[error("configuration error: {0}")]
    Config(String),

    /// DNS, TLS, socket, or read/write failure.
    #[error("network error: {0}")]
    Network(String),

    /// A non-OAuth HTTP status. Retriable iff the status is one of
    /// 408, 425, 429, 500, 502, 503, 504.
    #[error("http error: status={status}")]
    Http { status: u16, body: String },

    /// An RFC 6749 `error` response body from a non-token-exchange endpoint.
    #[error("protocol error: {0}", .0.error)]
    Protocol(ProtocolErrorBody),

    /// Specialization of `Protocol` for the token endpoint with
    /// `grant_type=urn:ietf:params:oauth:grant-type:token-exchange`, carrying
    /// the resource/audience that failed so callers can attribute it.
    #[error("token exchange error for {resource:?}: {body}", body = .body.error)]
    TokenExchange {
        resource: Option<String>,
        body: ProtocolErrorBody,
    },

    /// A presented token failed verification (bad signature, wrong
    /// audience, expired, revoked). Surfaced upward as an RFC 6750
    /// challenge by the delegation provider.
    #[error("authentication error: {0}")]
    Authentication(String),

    /// The response body could not be parsed as the expected JSON shape.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl OAuthError {
    /// Whether a retry loop (see `retry.rs`) should attempt this operation again.
    pub fn is_retriable(&self) -> bool {
        match self {
            OAuthError::Network(_) => true,
            OAuthError::Http { status, .. } => {
                matches!(status, 408 | 425 | 429 | 500 | 502 | 503 | 504)
            }
            OAuthError::Config(_)
            | OAuthError::Protocol(_)
            | OAuthError::TokenExchange { .. }
            | OAuthError::Authentication(_)
            | OAuthError::Malformed(_) => false,
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        OAuthError::Config(msg.into())
    }

    pub fn authentication(msg: impl Into<String>) -> Self {
        OAuthError::Authentication(msg.into())
    }
}

impl From<reqwest::Error> for OAuthError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            OAuthError::Network(err.to_string())
        } else if let Some(status) = err.status() {
            OAuthError::Http {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else {
            OAuthError::Network(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retriability_matches_taxonomy() {
        assert!(OAuthError::Network("boom".into()).is_retriable());
        assert!(OAuthError::Http { status: 429, body: String::new() }.is_retriable());
        assert!(OAuthError::Http { status: 503, body: String::new() }.is_retriable());
        assert!(!OAuthError::Http { status: 404, body: String::new() }.is_retriable());
        assert!(!OAuthError::Http { status: 400, body: String::new() }.is_retriable());
        assert!(!OAuthError::Config("missing endpoint".into()).is_retriable());
        assert!(!OAuthError::Protocol(ProtocolErrorBody {
            error: "invalid_grant".into(),
            error_description: None,
            error_uri: None,
        })
        .is_retriable());
    }
}
