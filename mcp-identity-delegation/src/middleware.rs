//! Bearer-auth middleware: verifies the inbound token on every request to a
//! protected path and rejects unauthenticated requests with the RFC 6750
//! challenge described in `challenge.rs`.

use crate::challenge::{ChallengeReason, UnauthorizedChallenge};
use crate::provider::DelegationProvider;
use axum::extract::State;
use axum::http::{header, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;

/// Per-request identity attached to the request extensions by
/// [`bearer_auth`] on success. Handlers that need the caller's claims or
/// raw token pull this out with `axum::extract::Extension`.
#[derive(Clone)]
pub struct AuthenticatedRequest {
    pub claims: mcp_identity_verifier::VerifiedClaims,
    pub raw_token: String,
}

fn bearer_token(req: &Request<axum::body::Body>) -> Option<String> {
    let header = req.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    header.strip_prefix("Bearer ").map(str::to_string)
}

fn challenge_response(provider: &DelegationProvider, reason: ChallengeReason) -> Response {
    let challenge = UnauthorizedChallenge::new(reason, provider.resource_metadata_url());
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, challenge.header_value())],
    )
        .into_response()
}

/// `axum::middleware::from_fn_with_state` handler: rejects any request
/// without a valid bearer token before it reaches the mounted MCP
/// application, and otherwise attaches an [`AuthenticatedRequest`].
pub async fn bearer_auth(
    State(provider): State<Arc<DelegationProvider>>,
    mut request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(&request) else {
        return challenge_response(&provider, ChallengeReason::Missing);
    };

    match provider.authenticate(&token).await {
        Ok(claims) => {
            request
                .extensions_mut()
                .insert(AuthenticatedRequest { claims, raw_token: token });
            next.run(request).await
        }
        Err(description) => challenge_response(&provider, ChallengeReason::InvalidToken(description)),
    }
}
