//! Bearer token validation.
//!
//! Algorithm, in order: (1) parse the JWT; (2) find the key by `kid` in the
//! JWKS cache; (3) verify the signature for the token's `alg`; (4) check
//! `iss` equals the configured zone issuer; (5) check `aud` contains the
//! configured resource URL, exact match; (6) check `exp > now - skew` and
//! `nbf <= now + skew`, `skew <= 60s`; (7) extract the delegation-chain
//! claim when present, preserved verbatim.

use crate::error::{Result, VerifierError};
use crate::jwks::JwksCache;
use chrono::Duration;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// Claims extracted from a validated bearer token. Only the fields the
/// delegation provider and coordinator consume are named; everything else
/// is preserved in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifiedClaims {
    pub iss: String,
    pub sub: String,
    #[serde(default)]
    pub aud: AudienceClaim,
    pub exp: i64,
    #[serde(default)]
    pub nbf: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
    /// Delegation-chain claim, preserved verbatim in whatever shape the
    /// upstream zone emits it (the wire format is not standardized).
    #[serde(default, rename = "delegation_chain")]
    pub delegation_chain: Option<Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// `aud` may be a single string or an array of strings per RFC 7519 §4.1.3.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AudienceClaim {
    #[default]
    Empty,
    Single(String),
    Many(Vec<String>),
}

impl AudienceClaim {
    pub fn contains(&self, resource: &str) -> bool {
        match self {
            AudienceClaim::Empty => false,
            AudienceClaim::Single(value) => value == resource,
            AudienceClaim::Many(values) => values.iter().any(|v| v == resource),
        }
    }
}

/// Validator configuration: one per protected zone/resource pair.
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    pub issuer: String,
    pub resource: String,
    pub jwks_uri: String,
    /// Clock skew tolerance, capped at 60s by construction.
    pub clock_skew: Duration,
}

impl VerifierConfig {
    pub fn new(issuer: impl Into<String>, resource: impl Into<String>, jwks_uri: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            resource: resource.into(),
            jwks_uri: jwks_uri.into(),
            clock_skew: Duration::seconds(60),
        }
    }

    pub fn with_clock_skew(mut self, skew: Duration) -> Self {
        self.clock_skew = skew.min(Duration::seconds(60));
        self
    }
}

pub struct TokenVerifier {
    config: VerifierConfig,
    jwks: JwksCache,
}

impl TokenVerifier {
    pub fn new(config: VerifierConfig, jwks: JwksCache) -> Self {
        Self { config, jwks }
    }

    pub async fn validate(&self, token: &str) -> Result<VerifiedClaims> {
        let header = decode_header(token)
            .map_err(|e| VerifierError::InvalidToken(format!("malformed header: {e}")))?;
        let kid = header
            .kid
            .ok_or_else(|| VerifierError::InvalidToken("token header is missing kid".to_string()))?;

        let jwk = self.jwks.key_for(&self.config.jwks_uri, &kid).await?;
        let decoding_key = DecodingKey::from_jwk(&jwk)
            .map_err(|e| VerifierError::InvalidToken(format!("unusable jwk: {e}")))?;

        // exp/nbf/aud/iss are all re-checked manually below with the
        // design's exact-match and skew semantics, so the library's own
        // claim validation is disabled here and used only for the
        // signature check.
        let mut validation = Validation::new(header.alg);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims = HashSet::new();

        let data = decode::<VerifiedClaims>(token, &decoding_key, &validation)
            .map_err(|e| VerifierError::InvalidToken(format!("signature/claims check failed: {e}")))?;
        let claims = data.claims;

        if claims.iss != self.config.issuer {
            return Err(VerifierError::InvalidToken(format!(
                "issuer mismatch: expected {}, got {}",
                self.config.issuer, claims.iss
            )));
        }

        if !claims.aud.contains(&self.config.resource) {
            return Err(VerifierError::InvalidToken(format!(
                "audience does not contain resource {}",
                self.config.resource
            )));
        }

        let now = chrono::Utc::now().timestamp();
        let skew = self.config.clock_skew.num_seconds();
        if claims.exp <= now - skew {
            return Err(VerifierError::InvalidToken("token expired".to_string()));
        }
        if let Some(nbf) = claims.nbf {
            if nbf > now + skew {
                return Err(VerifierError::InvalidToken("token not yet valid".to_string()));
            }
        }

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audience_claim_exact_match_only() {
        let aud = AudienceClaim::Many(vec!["https://a.example".into(), "https://b.example".into()]);
        assert!(aud.contains("https://a.example"));
        assert!(!aud.contains("https://c.example"));

        let single = AudienceClaim::Single("https://a.example".into());
        assert!(single.contains("https://a.example"));
        assert!(!single.contains("https://a.example/"));
    }

    #[test]
    fn clock_skew_is_capped_at_sixty_seconds() {
        let config = VerifierConfig::new("iss", "res", "jwks").with_clock_skew(Duration::seconds(600));
        assert_eq!(config.clock_skew, Duration::seconds(60));
    }
}
