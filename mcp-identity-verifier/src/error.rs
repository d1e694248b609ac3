//! Verifier-specific errors. Re-exported so callers rarely need to import
//! `mcp_identity_oauth::OAuthError` directly, though every verifier error
//! that originates from the OAuth client layer (a JWKS fetch) is wrapped
//! rather than re-derived.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, VerifierError>;

#[derive(Debug, Error)]
pub enum VerifierError {
    /// The presented token failed structural parsing, signature, issuer,
    /// audience, or time-window validation. Maps 1:1 onto
    /// `OAuthError::Authentication` at the delegation-provider boundary.
    #[error("invalid_token: {0}")]
    InvalidToken(String),

    /// The JWKS document could not be fetched or parsed.
    #[error("jwks fetch failed: {0}")]
    Jwks(#[from] mcp_identity_oauth::OAuthError),

    #[error("configuration error: {0}")]
    Config(String),
}
