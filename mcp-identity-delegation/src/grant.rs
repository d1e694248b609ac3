//! Declarative per-tool delegation requirements and the pre-handler stage
//! that resolves them into an `AccessContext` before a tool body runs.
//!
//! The source SDK this core is derived from exposes delegation as a
//! decorator around the tool function; here it is re-architected as a
//! tool-metadata field (`GrantSpec`) consumed by a pre-handler stage in the
//! middleware pipeline, with the inbound token passed explicitly rather
//! than read from an implicit per-call slot.

use crate::access_context::AccessContext;
use mcp_identity_oauth::{AuthStrategy, OAuthClient, TokenRequest};
use std::sync::Arc;

/// Declares that a tool needs a downstream access token for one or more
/// resources before its body runs. Attach this to tool metadata; the
/// middleware pipeline resolves it into an `AccessContext` argument.
#[derive(Debug, Clone)]
pub enum GrantSpec {
    Single(String),
    Multi(Vec<String>),
}

impl GrantSpec {
    pub fn resources(&self) -> Vec<String> {
        match self {
            GrantSpec::Single(r) => vec![r.clone()],
            GrantSpec::Multi(rs) => rs.clone(),
        }
    }
}

/// Performs the on-demand token exchange(s) a `GrantSpec` requires,
/// materializing a fully-populated `AccessContext` before the tool body
/// runs. `grant_multi` exchanges run concurrently with a bounded degree of
/// parallelism.
pub struct GrantResolver {
    client: Arc<OAuthClient>,
    zone: mcp_identity_oauth::Zone,
    max_parallel: usize,
}

impl GrantResolver {
    /// `exchange_auth` authenticates the token-exchange calls this resolver
    /// makes; it is applied to `client` here rather than carried alongside
    /// it, so there is exactly one place the exchange's credentials come
    /// from.
    pub fn new(
        client: Arc<OAuthClient>,
        zone: mcp_identity_oauth::Zone,
        exchange_auth: AuthStrategy,
        max_parallel: usize,
    ) -> Self {
        let client = Arc::new(client.with_auth_strategy(exchange_auth));
        Self { client, zone, max_parallel }
    }

    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel;
        self
    }

    /// Resolve a `GrantSpec` for the given inbound bearer token into an
    /// `AccessContext`. Per-resource protocol failures are recorded and the
    /// tool body still runs; a terminal transport failure after retries is
    /// recorded as the global error (only reachable here if the transport
    /// layer below raises it outside of a specific resource's call).
    pub async fn resolve(&self, inbound_token: &str, spec: &GrantSpec) -> AccessContext {
        let resources = spec.resources();
        let results = self.exchange_all(inbound_token, &resources).await;

        let mut ctx = AccessContext::new();
        // Completion order is irrelevant; each result already carries its
        // own resource, so there is no positional pairing to get wrong.
        for (resource, outcome) in results {
            match outcome {
                Ok(record) => ctx.record_success(resource, record),
                Err(err) => ctx.record_failure(resource, err.into()),
            }
        }
        ctx
    }

    async fn exchange_all(
        &self,
        inbound_token: &str,
        resources: &[String],
    ) -> Vec<(String, mcp_identity_oauth::Result<mcp_identity_oauth::TokenRecord>)> {
        use futures::stream::{self, StreamExt};

        stream::iter(resources.iter().cloned())
            .map(|resource| {
                let client = self.client.clone();
                let zone = self.zone.clone();
                let inbound_token = inbound_token.to_string();
                async move {
                    let request = TokenRequest::token_exchange(
                        inbound_token,
                        "urn:ietf:params:oauth:token-type:access_token",
                    )
                    .with_resource(resource.clone());
                    let result = client.request_token(&zone, request).await;
                    (resource, result)
                }
            })
            .buffer_unordered(self.max_parallel.max(1))
            .collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcp_identity_oauth::transport::test_support::ScriptedTransport;
    use mcp_identity_oauth::{Endpoint, HttpResponse, OAuthClientConfig};
    use std::collections::HashMap;

    #[test]
    fn grant_spec_resources_flattens_single_and_multi() {
        assert_eq!(GrantSpec::Single("a".into()).resources(), vec!["a".to_string()]);
        assert_eq!(
            GrantSpec::Multi(vec!["a".into(), "b".into()]).resources(),
            vec!["a".to_string(), "b".to_string()]
        );
    }

    fn ok_response(access_token: &str) -> Result<HttpResponse, String> {
        Ok(HttpResponse {
            status: 200,
            headers: HashMap::new(),
            body: serde_json::to_vec(&serde_json::json!({
                "access_token": access_token,
                "expires_in": 3600,
            }))
            .unwrap(),
        })
    }

    fn err_response(error: &str) -> Result<HttpResponse, String> {
        Ok(HttpResponse {
            status: 400,
            headers: HashMap::new(),
            body: serde_json::to_vec(&serde_json::json!({ "error": error })).unwrap(),
        })
    }

    #[tokio::test]
    async fn grant_multi_reports_one_success_and_one_failure_independently() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            ok_response("TA"),
            err_response("invalid_target"),
        ]));
        let client = Arc::new(
            mcp_identity_oauth::OAuthClient::with_transport(
                OAuthClientConfig::default(),
                mcp_identity_oauth::AuthStrategy::None,
                transport,
            )
            .with_endpoint_override(Endpoint::Token, "https://zone.example/oauth2/token"),
        );
        let resolver = GrantResolver::new(
            client,
            mcp_identity_oauth::Zone::from_url("https://zone.example/").unwrap(),
            mcp_identity_oauth::AuthStrategy::None,
            4,
        );

        let spec = GrantSpec::Multi(vec!["https://a.example".into(), "https://b.example".into()]);
        let ctx = resolver.resolve("T1", &spec).await;

        // Exactly one of the two resources succeeds and the other fails;
        // which is which depends on completion order of the scripted
        // responses, so check by outcome rather than by fixed resource.
        let successes = ["https://a.example", "https://b.example"]
            .iter()
            .filter(|r| ctx.access(r).is_some())
            .count();
        let failures = ["https://a.example", "https://b.example"]
            .iter()
            .filter(|r| ctx.has_resource_error(r))
            .count();
        assert_eq!(successes, 1);
        assert_eq!(failures, 1);
        assert!(ctx.has_errors());
    }
}
