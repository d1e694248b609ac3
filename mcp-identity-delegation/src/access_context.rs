//! Per-call, per-user projection of downstream delegations.
//!
//! Constructed when a tool marked for delegation begins executing,
//! populated by concurrent token-exchange attempts before the tool body
//! runs, consumed read-only by the tool, and discarded at tool exit.

use mcp_identity_oauth::TokenRecord;
use std::collections::HashMap;

/// Why a per-resource exchange failed. Mirrors the taxonomy in
/// `mcp_identity_oauth::OAuthError`, flattened to what a tool author needs.
#[derive(Debug, Clone)]
pub enum FailureReason {
    /// `invalid_grant`, `invalid_target`, access denied, or any other RFC
    /// 6749 protocol error returned by the token endpoint.
    Protocol { error: String, description: Option<String> },
    /// Transport/5xx failure that exhausted retries.
    Transport(String),
    /// The exchange client itself was misconfigured (never resource-specific).
    Config(String),
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::Protocol { error, description } => {
                write!(f, "{error}")?;
                if let Some(d) = description {
                    write!(f, ": {d}")?;
                }
                Ok(())
            }
            FailureReason::Transport(msg) => write!(f, "transport error: {msg}"),
            FailureReason::Config(msg) => write!(f, "configuration error: {msg}"),
        }
    }
}

impl From<mcp_identity_oauth::OAuthError> for FailureReason {
    fn from(err: mcp_identity_oauth::OAuthError) -> Self {
        use mcp_identity_oauth::OAuthError;
        match err {
            OAuthError::TokenExchange { body, .. } => FailureReason::Protocol {
                error: body.error,
                description: body.error_description,
            },
            OAuthError::Protocol(body) => FailureReason::Protocol {
                error: body.error,
                description: body.error_description,
            },
            OAuthError::Network(msg) | OAuthError::Http { body: msg, .. } => {
                FailureReason::Transport(msg)
            }
            OAuthError::Config(msg) => FailureReason::Config(msg),
            OAuthError::Authentication(msg) => FailureReason::Config(msg),
            OAuthError::Malformed(msg) => FailureReason::Transport(msg),
        }
    }
}

/// Tagged-union result per resource: exactly one of a token or a failure
/// reason is ever set.
#[derive(Debug, Clone)]
pub enum ResourceAccess {
    Ok(TokenRecord),
    Err(FailureReason),
}

/// Read-only projection of downstream delegation results, handed to a
/// `@grant`-decorated tool body.
#[derive(Debug, Clone, Default)]
pub struct AccessContext {
    resources: HashMap<String, ResourceAccess>,
    global_error: Option<FailureReason>,
}

impl AccessContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&mut self, resource_url: impl Into<String>, token: TokenRecord) {
        self.resources.insert(resource_url.into(), ResourceAccess::Ok(token));
    }

    pub fn record_failure(&mut self, resource_url: impl Into<String>, reason: FailureReason) {
        self.resources.insert(resource_url.into(), ResourceAccess::Err(reason));
    }

    pub fn set_global_error(&mut self, reason: FailureReason) {
        self.global_error = Some(reason);
    }

    /// Fetch the delegated token for `resource_url`, if the exchange
    /// succeeded.
    pub fn access(&self, resource_url: &str) -> Option<&TokenRecord> {
        match self.resources.get(resource_url) {
            Some(ResourceAccess::Ok(token)) => Some(token),
            _ => None,
        }
    }

    pub fn has_resource_error(&self, resource_url: &str) -> bool {
        matches!(self.resources.get(resource_url), Some(ResourceAccess::Err(_)))
    }

    pub fn get_resource_errors(&self, resource_url: &str) -> Option<&FailureReason> {
        match self.resources.get(resource_url) {
            Some(ResourceAccess::Err(reason)) => Some(reason),
            _ => None,
        }
    }

    /// True iff the global error slot is set or any resource failed.
    pub fn has_errors(&self) -> bool {
        self.global_error.is_some()
            || self
                .resources
                .values()
                .any(|access| matches!(access, ResourceAccess::Err(_)))
    }

    pub fn get_errors(&self) -> Vec<(Option<String>, String)> {
        let mut errors = Vec::new();
        if let Some(global) = &self.global_error {
            errors.push((None, global.to_string()));
        }
        for (resource, access) in &self.resources {
            if let ResourceAccess::Err(reason) = access {
                errors.push((Some(resource.clone()), reason.to_string()));
            }
        }
        errors
    }

    /// True iff every requested resource has exactly one of a token or a
    /// failure reason set — always true by construction here since
    /// `record_success`/`record_failure` are mutually exclusive per key,
    /// but exposed for callers that want to assert completeness before
    /// running a tool body.
    pub fn is_complete_for(&self, resources: &[String]) -> bool {
        resources.iter().all(|r| self.resources.contains_key(r))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn token(access_token: &str) -> TokenRecord {
        TokenRecord {
            access_token: access_token.to_string(),
            token_type: "Bearer".to_string(),
            refresh_token: None,
            expires_at: Utc::now() + chrono::Duration::hours(1),
            scope: None,
            resource: None,
        }
    }

    #[test]
    fn successful_exchange_has_no_errors() {
        let mut ctx = AccessContext::new();
        ctx.record_success("https://api.github.com", token("T2"));

        assert_eq!(ctx.access("https://api.github.com").unwrap().access_token, "T2");
        assert!(!ctx.has_errors());
    }

    #[test]
    fn partial_failure_still_exposes_successful_resource() {
        let mut ctx = AccessContext::new();
        ctx.record_success("https://a.example", token("TA"));
        ctx.record_failure(
            "https://b.example",
            FailureReason::Protocol { error: "invalid_target".into(), description: None },
        );

        assert!(ctx.access("https://a.example").is_some());
        assert!(ctx.has_resource_error("https://b.example"));
        assert!(!ctx.has_resource_error("https://a.example"));
        assert!(ctx.has_errors());
    }

    #[test]
    fn global_error_sets_has_errors_without_any_resource_entry() {
        let mut ctx = AccessContext::new();
        ctx.set_global_error(FailureReason::Config("exchange client misconfigured".into()));
        assert!(ctx.has_errors());
        assert_eq!(ctx.get_errors().len(), 1);
    }
}
