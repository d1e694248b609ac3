//! Authorization-URL construction for the PKCE authorization-code flow,
//! with an optional RFC 9126 pushed-authorization-request indirection.

use mcp_identity_oauth::{OAuthClient, PkcePair, Zone};
use std::collections::HashMap;
use url::Url;

/// One PKCE attempt's generated material, ready to be stored under
/// `pending:` and reverse-indexed under `state:` before redirecting the
/// user.
pub struct AuthorizationAttempt {
    pub pkce: PkcePair,
    pub state: String,
    pub authorization_url: String,
}

/// Builds the `/authorize` redirect URL: `client_id`, `redirect_uri`,
/// `response_type=code`, `code_challenge`, `code_challenge_method=S256`,
/// `state`, and `resource`.
///
/// When `use_par` is set, the parameters are pushed to the authorization
/// server's PAR endpoint first (RFC 9126) and the returned `request_uri` is
/// used in their place. Defaults to off, since it requires the upstream AS
/// to support PAR, which discovery does not guarantee.
pub async fn build_authorization_attempt(
    client: &OAuthClient,
    zone: &Zone,
    authorization_endpoint: &str,
    client_id: &str,
    redirect_uri: &str,
    resource: &str,
    use_par: bool,
) -> mcp_identity_oauth::Result<AuthorizationAttempt> {
    let pkce = PkcePair::generate();
    let state = mcp_identity_oauth::pkce::generate_state();

    let mut params: HashMap<String, String> = HashMap::new();
    params.insert("client_id".to_string(), client_id.to_string());
    params.insert("redirect_uri".to_string(), redirect_uri.to_string());
    params.insert("response_type".to_string(), "code".to_string());
    params.insert("code_challenge".to_string(), pkce.challenge.clone());
    params.insert("code_challenge_method".to_string(), "S256".to_string());
    params.insert("state".to_string(), state.clone());
    params.insert("resource".to_string(), resource.to_string());

    let authorization_url = if use_par {
        let par_response = client.par(zone, params).await?;
        let mut url = Url::parse(authorization_endpoint)
            .map_err(|e| mcp_identity_oauth::OAuthError::config(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("client_id", client_id)
            .append_pair("request_uri", &par_response.request_uri);
        url.to_string()
    } else {
        let mut url = Url::parse(authorization_endpoint)
            .map_err(|e| mcp_identity_oauth::OAuthError::config(e.to_string()))?;
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &params {
                pairs.append_pair(key, value);
            }
        }
        url.to_string()
    };

    Ok(AuthorizationAttempt { pkce, state, authorization_url })
}
