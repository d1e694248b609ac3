//! RFC 6750 `WWW-Authenticate` challenge construction.

/// Why a request was rejected, driving which challenge fields are set.
#[derive(Debug, Clone)]
pub enum ChallengeReason {
    /// No bearer token was presented at all.
    Missing,
    /// Signature/audience/expiry failure, or any other verifier rejection.
    InvalidToken(String),
}

/// The `401` response a protected endpoint returns.
#[derive(Debug, Clone)]
pub struct UnauthorizedChallenge {
    pub reason: ChallengeReason,
    pub resource_metadata_url: String,
}

impl UnauthorizedChallenge {
    pub fn new(reason: ChallengeReason, resource_metadata_url: impl Into<String>) -> Self {
        Self { reason, resource_metadata_url: resource_metadata_url.into() }
    }

    /// Build the `WWW-Authenticate` header value. `error` is `invalid_token`
    /// for signature/audience/expiry failures and omitted entirely when no
    /// token was presented.
    pub fn header_value(&self) -> String {
        match &self.reason {
            ChallengeReason::Missing => {
                format!(r#"Bearer resource_metadata="{}""#, self.resource_metadata_url)
            }
            ChallengeReason::InvalidToken(description) => format!(
                r#"Bearer error="invalid_token", error_description="{}", resource_metadata="{}""#,
                description.replace('"', "'"),
                self.resource_metadata_url
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_token_challenge_omits_error_field() {
        let challenge = UnauthorizedChallenge::new(
            ChallengeReason::Missing,
            "http://srv:8000/.well-known/oauth-protected-resource/mcp",
        );
        let header = challenge.header_value();
        assert!(!header.contains("error="));
        assert!(header.contains("resource_metadata="));
    }

    #[test]
    fn invalid_token_challenge_carries_error_invalid_token() {
        let challenge = UnauthorizedChallenge::new(
            ChallengeReason::InvalidToken("token expired".into()),
            "http://srv:8000/.well-known/oauth-protected-resource/mcp",
        );
        let header = challenge.header_value();
        assert!(header.contains(r#"error="invalid_token""#));
        assert!(header.contains("token expired"));
    }
}
