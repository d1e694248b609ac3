//! The resource-server half of the SDK: authenticates incoming tool calls
//! and performs on-demand token exchange for `grant`/`grant_multi`-declared
//! dependencies.

use crate::access_context::AccessContext;
use crate::grant::{GrantResolver, GrantSpec};
use crate::metadata_routes::{metadata_router, MetadataState};
use crate::middleware::bearer_auth;
use mcp_identity_oauth::{AuthStrategy, OAuthClient, ServerMetadata, Zone};
use mcp_identity_verifier::{ProtectedResourcePublisher, TokenVerifier, VerifiedClaims};
use std::sync::Arc;

/// Wires a [`TokenVerifier`] (inbound auth) to a [`GrantResolver`]
/// (outbound, on-demand token exchange) behind one configuration surface,
/// and composes the protected HTTP application described in the public
/// contract: metadata endpoints, bearer-auth middleware, mounted MCP app.
pub struct DelegationProvider {
    verifier: TokenVerifier,
    resolver: GrantResolver,
    publisher: ProtectedResourcePublisher,
    protected_path: Option<String>,
    authorization_server: Option<Arc<ServerMetadata>>,
    service_name: String,
}

impl DelegationProvider {
    pub fn new(
        verifier: TokenVerifier,
        exchange_client: Arc<OAuthClient>,
        exchange_zone: Zone,
        exchange_auth: AuthStrategy,
        publisher: ProtectedResourcePublisher,
        protected_path: Option<String>,
    ) -> Self {
        Self {
            verifier,
            resolver: GrantResolver::new(exchange_client, exchange_zone, exchange_auth, 8),
            publisher,
            protected_path,
            authorization_server: None,
            service_name: "mcp-server".to_string(),
        }
    }

    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.resolver = self.resolver.with_max_parallel(max_parallel);
        self
    }

    /// The `service` field reported by `GET /status`. Defaults to
    /// `"mcp-server"`.
    pub fn with_service_name(mut self, service_name: impl Into<String>) -> Self {
        self.service_name = service_name.into();
        self
    }

    /// Mirror the upstream zone's RFC 8414 discovery document at
    /// `/.well-known/oauth-authorization-server` alongside the
    /// protected-resource metadata this provider always publishes.
    pub fn with_authorization_server_mirror(mut self, metadata: ServerMetadata) -> Self {
        self.authorization_server = Some(Arc::new(metadata));
        self
    }

    /// The absolute `resource_metadata` URL this provider advertises in its
    /// `401` challenges, per RFC 9728 §5.1.
    pub fn resource_metadata_url(&self) -> String {
        format!(
            "{}{}",
            self.publisher.resource_base_url.trim_end_matches('/'),
            ProtectedResourcePublisher::well_known_path(self.protected_path.as_deref())
        )
    }

    /// Validate an inbound bearer token. On success returns the verified
    /// claims; the caller (middleware) is responsible for pairing these
    /// with the raw token string it already holds.
    pub async fn authenticate(&self, raw_token: &str) -> Result<VerifiedClaims, String> {
        self.verifier
            .validate(raw_token)
            .await
            .map_err(|e| e.to_string())
    }

    /// `grant(resource_url)`: resolve a single downstream token for the
    /// caller's inbound token.
    pub async fn grant(&self, inbound_token: &str, resource_url: impl Into<String>) -> AccessContext {
        self.resolver
            .resolve(inbound_token, &GrantSpec::Single(resource_url.into()))
            .await
    }

    /// `grant_multi([resource_url, …])`: resolve N downstream tokens
    /// concurrently.
    pub async fn grant_multi(
        &self,
        inbound_token: &str,
        resource_urls: Vec<String>,
    ) -> AccessContext {
        self.resolver
            .resolve(inbound_token, &GrantSpec::Multi(resource_urls))
            .await
    }

    /// Compose the protected HTTP application: RFC 9728/8414 metadata
    /// endpoints are public, the MCP application mounted at
    /// `protected_path` sits behind [`bearer_auth`].
    pub fn app(self: Arc<Self>, mcp: axum::Router) -> axum::Router {
        let mount_path = match &self.protected_path {
            Some(p) => format!("/{}", p.trim_start_matches('/')),
            None => "/".to_string(),
        };

        let protected = mcp.layer(axum::middleware::from_fn_with_state(
            self.clone(),
            bearer_auth,
        ));

        axum::Router::new()
            .merge(metadata_router(MetadataState {
                publisher: Arc::new(self.publisher.clone()),
                protected_path: self.protected_path.clone(),
                authorization_server: self.authorization_server.clone(),
                service_name: self.service_name.clone(),
            }))
            .nest_service(&mount_path, protected)
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_metadata_url_matches_mounted_path() {
        let publisher = ProtectedResourcePublisher::new(
            "http://srv:8000",
            vec!["https://zone.example/".to_string()],
        );
        let verifier = TokenVerifier::new(
            mcp_identity_verifier::VerifierConfig::new(
                "https://zone.example/",
                "http://srv:8000/mcp",
                "https://zone.example/jwks.json",
            ),
            mcp_identity_verifier::JwksCache::new(
                chrono::Duration::minutes(15),
                std::sync::Arc::new(mcp_identity_oauth::ReqwestTransport::default()),
            ),
        );
        let client = Arc::new(OAuthClient::new(
            mcp_identity_oauth::OAuthClientConfig::default(),
            AuthStrategy::None,
        ));
        let provider = DelegationProvider::new(
            verifier,
            client,
            Zone::from_url("https://zone.example/").unwrap(),
            AuthStrategy::None,
            publisher,
            Some("mcp".to_string()),
        );

        assert_eq!(
            provider.resource_metadata_url(),
            "http://srv:8000/.well-known/oauth-protected-resource/mcp"
        );
    }
}
