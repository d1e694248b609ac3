//! A runnable protected MCP-adjacent HTTP service wiring together the
//! resource-server half of the SDK: the OAuth client layer (for outbound
//! token exchange), the token verifier (for inbound bearer auth), and the
//! delegation provider that ties the two together behind a small tool
//! surface.
//!
//! This is a small `axum` binary that stands up one security-flavored
//! concern on top of a stubbed-out MCP surface, with the MCP wire protocol
//! itself treated as an external collaborator. The client-side Auth
//! Coordinator has no role here — it drives an MCP
//! *client's* own authorization-code flow against an upstream server,
//! whereas this binary only ever plays the resource-server role.

use mcp_identity_delegation::DelegationProvider;
use mcp_identity_oauth::{AuthStrategy, OAuthClient, OAuthClientConfig, ReqwestTransport, Zone};
use mcp_identity_verifier::{JwksCache, ProtectedResourcePublisher, TokenVerifier, VerifierConfig};
use std::sync::Arc;
use tracing::info;

/// Configuration an operator supplies when standing up this server, using a
/// named `from_env` constructor rather than environment-variable magic
/// inside the library crates themselves.
struct ServerConfig {
    /// This server's own base URL, used both as the RFC 9728 `resource`
    /// value and as the `aud` this verifier checks inbound tokens against.
    resource_base_url: String,
    /// The upstream authorization server's issuer / zone URL.
    issuer: String,
    jwks_uri: String,
    /// Client credentials this server uses as the subject of its own
    /// outbound token-exchange calls (RFC 8693).
    exchange_client_id: String,
    exchange_client_secret: String,
    bind_addr: String,
}

impl ServerConfig {
    fn from_env() -> Self {
        Self {
            resource_base_url: std::env::var("MCP_RESOURCE_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8000".to_string()),
            issuer: std::env::var("MCP_ZONE_ISSUER")
                .unwrap_or_else(|_| "https://zone.example/".to_string()),
            jwks_uri: std::env::var("MCP_ZONE_JWKS_URI")
                .unwrap_or_else(|_| "https://zone.example/.well-known/jwks.json".to_string()),
            exchange_client_id: std::env::var("MCP_EXCHANGE_CLIENT_ID")
                .unwrap_or_else(|_| "delegating-server".to_string()),
            exchange_client_secret: std::env::var("MCP_EXCHANGE_CLIENT_SECRET")
                .unwrap_or_else(|_| "dev-secret".to_string()),
            bind_addr: std::env::var("MCP_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string()),
        }
    }
}

/// A stand-in for the MCP tool-call surface this SDK is designed to sit in
/// front of. The real wire protocol (JSON-RPC tool/resource/prompt RPCs) is
/// out of scope here; this router demonstrates the one seam the delegation
/// provider actually owns: a `grant`-decorated tool handler receiving a
/// populated `AccessContext`.
fn mcp_router(provider: Arc<DelegationProvider>) -> axum::Router {
    use axum::extract::Extension;
    use axum::response::IntoResponse;
    use axum::routing::post;
    use axum::Json;
    use mcp_identity_delegation::middleware::AuthenticatedRequest;

    async fn star_github_repo(
        Extension(auth): Extension<AuthenticatedRequest>,
        axum::extract::State(provider): axum::extract::State<Arc<DelegationProvider>>,
    ) -> impl IntoResponse {
        let ctx = provider.grant(&auth.raw_token, "https://api.github.com").await;
        if ctx.has_errors() {
            return Json(serde_json::json!({
                "error": "delegation_failed",
                "details": ctx.get_errors(),
            }));
        }
        let token = ctx
            .access("https://api.github.com")
            .expect("has_errors() was false, so the single requested resource must have succeeded");
        Json(serde_json::json!({
            "tool": "star_github_repo",
            "delegated_token_type": token.token_type,
            "caller": auth.claims.sub,
        }))
    }

    async fn cross_post(
        Extension(auth): Extension<AuthenticatedRequest>,
        axum::extract::State(provider): axum::extract::State<Arc<DelegationProvider>>,
    ) -> impl IntoResponse {
        let ctx = provider
            .grant_multi(
                &auth.raw_token,
                vec!["https://api.github.com".to_string(), "https://slack.com/api".to_string()],
            )
            .await;
        Json(serde_json::json!({
            "tool": "cross_post",
            "has_errors": ctx.has_errors(),
            "errors": ctx.get_errors(),
        }))
    }

    axum::Router::new()
        .route("/tools/star_github_repo", post(star_github_repo))
        .route("/tools/cross_post", post(cross_post))
        .with_state(provider)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "delegating_server=info,mcp_identity_delegation=info".to_string()),
        )
        .init();

    let config = ServerConfig::from_env();
    info!(resource = %config.resource_base_url, issuer = %config.issuer, "starting delegating MCP server");

    let zone = Zone::from_url(&config.issuer)?;
    let transport = Arc::new(ReqwestTransport::default());

    let verifier = TokenVerifier::new(
        VerifierConfig::new(
            config.issuer.clone(),
            format!("{}/mcp", config.resource_base_url),
            config.jwks_uri.clone(),
        ),
        JwksCache::new(chrono::Duration::minutes(15), transport.clone()),
    );

    let exchange_client = Arc::new(OAuthClient::new(
        OAuthClientConfig::default(),
        AuthStrategy::Basic {
            client_id: config.exchange_client_id.clone(),
            client_secret: config.exchange_client_secret.clone(),
        },
    ));

    let publisher = ProtectedResourcePublisher::new(
        config.resource_base_url.clone(),
        vec![config.issuer.clone()],
    )
    .with_jwks_uri(config.jwks_uri.clone());

    let provider = Arc::new(
        DelegationProvider::new(
            verifier,
            exchange_client,
            zone,
            AuthStrategy::Basic {
                client_id: config.exchange_client_id,
                client_secret: config.exchange_client_secret,
            },
            publisher,
            Some("mcp".to_string()),
        )
        .with_service_name("delegating-server")
        .with_max_parallel(4),
    );

    let app = provider.app(mcp_router(provider.clone()));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
