//! RFC 9728 protected-resource metadata, an RFC 8414 authorization-server
//! mirror, and a health/version endpoint, mounted unauthenticated alongside
//! the protected MCP application by [`crate::provider`].

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Json;
use mcp_identity_oauth::ServerMetadata;
use mcp_identity_verifier::ProtectedResourcePublisher;
use serde::Serialize;
use std::sync::Arc;

#[derive(Clone)]
pub struct MetadataState {
    pub publisher: Arc<ProtectedResourcePublisher>,
    pub protected_path: Option<String>,
    pub authorization_server: Option<Arc<ServerMetadata>>,
    pub service_name: String,
}

#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
    service: String,
    identity: &'static str,
    version: &'static str,
}

async fn protected_resource_metadata(State(state): State<MetadataState>) -> impl IntoResponse {
    Json(state.publisher.document_for_path(state.protected_path.as_deref()))
}

async fn authorization_server_metadata(
    State(state): State<MetadataState>,
) -> impl IntoResponse {
    Json(state.authorization_server.as_deref().cloned())
}

async fn status(State(state): State<MetadataState>) -> impl IntoResponse {
    Json(StatusResponse {
        status: "healthy",
        service: state.service_name.clone(),
        identity: "mcp-identity-delegation",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Mounts `/.well-known/oauth-protected-resource[/<path>]`, `/status`, and,
/// when `state.authorization_server` is populated,
/// `/.well-known/oauth-authorization-server` as a verbatim mirror of the
/// upstream zone's own discovery document.
pub fn metadata_router(state: MetadataState) -> axum::Router {
    let resource_path = ProtectedResourcePublisher::well_known_path(state.protected_path.as_deref());
    let mut router = axum::Router::new()
        .route(&resource_path, get(protected_resource_metadata))
        .route("/status", get(status));
    if state.authorization_server.is_some() {
        router = router.route(
            "/.well-known/oauth-authorization-server",
            get(authorization_server_metadata),
        );
    }
    router.with_state(state)
}
