//! Typed request/response records for the standardized OAuth endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// RFC 8414 authorization-server metadata document, restricted to the
/// fields this SDK reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerMetadata {
    pub issuer: String,
    pub authorization_endpoint: Option<String>,
    pub token_endpoint: Option<String>,
    pub registration_endpoint: Option<String>,
    pub introspection_endpoint: Option<String>,
    pub revocation_endpoint: Option<String>,
    pub pushed_authorization_request_endpoint: Option<String>,
    pub jwks_uri: Option<String>,
    #[serde(default)]
    pub grant_types_supported: Vec<String>,
    #[serde(default)]
    pub code_challenge_methods_supported: Vec<String>,
    #[serde(default)]
    pub scopes_supported: Vec<String>,
    #[serde(default)]
    pub token_endpoint_auth_methods_supported: Vec<String>,
}

/// RFC 9728 protected-resource metadata document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtectedResourceMetadata {
    pub resource: String,
    pub authorization_servers: Vec<String>,
    pub jwks_uri: Option<String>,
    #[serde(default)]
    pub bearer_methods_supported: Vec<String>,
}

/// RFC 7591 dynamic client registration request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientRegistrationRequest {
    pub client_name: String,
    pub redirect_uris: Vec<String>,
    #[serde(default)]
    pub grant_types: Vec<String>,
    pub token_endpoint_auth_method: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub jwks_url: Option<String>,
}

/// A registered client record, as produced by dynamic registration and
/// persisted by the coordinator keyed by (zone, app name, redirect URIs).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisteredClient {
    pub client_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    pub redirect_uris: Vec<String>,
    pub grant_types: Vec<String>,
    pub token_endpoint_auth_method: String,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub jwks_url: Option<String>,
}

/// RFC 8693 token-exchange request, also doubling as the carrier for
/// authorization-code and refresh-token grants (the `grant_type` field
/// picks the shape the authorization server expects).
#[derive(Debug, Clone)]
pub struct TokenRequest {
    pub grant_type: GrantType,
    pub subject_token: Option<String>,
    pub subject_token_type: Option<String>,
    pub actor_token: Option<String>,
    pub actor_token_type: Option<String>,
    pub resource: Option<String>,
    pub audience: Option<String>,
    pub scope: Option<String>,
    pub requested_token_type: Option<String>,
    pub code: Option<String>,
    pub code_verifier: Option<String>,
    pub redirect_uri: Option<String>,
    pub refresh_token: Option<String>,
}

/// Grant types this client issues requests for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantType {
    TokenExchange,
    AuthorizationCode,
    ClientCredentials,
    RefreshToken,
}

impl GrantType {
    pub fn as_str(self) -> &'static str {
        match self {
            GrantType::TokenExchange => "urn:ietf:params:oauth:grant-type:token-exchange",
            GrantType::AuthorizationCode => "authorization_code",
            GrantType::ClientCredentials => "client_credentials",
            GrantType::RefreshToken => "refresh_token",
        }
    }
}

impl TokenRequest {
    /// Build the `application/x-www-form-urlencoded` body for this request.
    pub fn to_form(&self) -> String {
        let mut pairs: Vec<(&str, String)> = vec![("grant_type", self.grant_type.as_str().to_string())];
        macro_rules! push_opt {
            ($key:literal, $field:expr) => {
                if let Some(v) = &$field {
                    pairs.push(($key, v.clone()));
                }
            };
        }
        push_opt!("subject_token", self.subject_token);
        push_opt!("subject_token_type", self.subject_token_type);
        push_opt!("actor_token", self.actor_token);
        push_opt!("actor_token_type", self.actor_token_type);
        push_opt!("resource", self.resource);
        push_opt!("audience", self.audience);
        push_opt!("scope", self.scope);
        push_opt!("requested_token_type", self.requested_token_type);
        push_opt!("code", self.code);
        push_opt!("code_verifier", self.code_verifier);
        push_opt!("redirect_uri", self.redirect_uri);
        push_opt!("refresh_token", self.refresh_token);

        pairs
            .into_iter()
            .map(|(k, v)| format!("{k}={}", urlencoding::encode(&v)))
            .collect::<Vec<_>>()
            .join("&")
    }

    pub fn token_exchange(
        subject_token: impl Into<String>,
        subject_token_type: impl Into<String>,
    ) -> Self {
        Self {
            grant_type: GrantType::TokenExchange,
            subject_token: Some(subject_token.into()),
            subject_token_type: Some(subject_token_type.into()),
            actor_token: None,
            actor_token_type: None,
            resource: None,
            audience: None,
            scope: None,
            requested_token_type: None,
            code: None,
            code_verifier: None,
            redirect_uri: None,
            refresh_token: None,
        }
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn authorization_code(
        code: impl Into<String>,
        code_verifier: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            grant_type: GrantType::AuthorizationCode,
            subject_token: None,
            subject_token_type: None,
            actor_token: None,
            actor_token_type: None,
            resource: None,
            audience: None,
            scope: None,
            requested_token_type: None,
            code: Some(code.into()),
            code_verifier: Some(code_verifier.into()),
            redirect_uri: Some(redirect_uri.into()),
            refresh_token: None,
        }
    }

    pub fn refresh(refresh_token: impl Into<String>) -> Self {
        Self {
            grant_type: GrantType::RefreshToken,
            subject_token: None,
            subject_token_type: None,
            actor_token: None,
            actor_token_type: None,
            resource: None,
            audience: None,
            scope: None,
            requested_token_type: None,
            code: None,
            code_verifier: None,
            redirect_uri: None,
            refresh_token: Some(refresh_token.into()),
        }
    }
}

/// Raw token endpoint JSON response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponseBody {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
    pub scope: Option<String>,
    pub issued_token_type: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// A token record: immutable, replaced (never mutated) on refresh or
/// re-exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRecord {
    pub access_token: String,
    pub token_type: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub scope: Option<String>,
    pub resource: Option<String>,
}

impl TokenRecord {
    pub fn from_response(body: TokenResponseBody, resource: Option<String>) -> Self {
        let expires_at = Utc::now()
            + chrono::Duration::seconds(body.expires_in.unwrap_or(3600).max(0));
        Self {
            access_token: body.access_token,
            token_type: body.token_type,
            refresh_token: body.refresh_token,
            expires_at,
            scope: body.scope,
            resource,
        }
    }

    /// Whether this record is still valid, given a safety margin before the
    /// stated expiry (the caller should re-authenticate/refresh once this
    /// returns `false`).
    pub fn is_valid(&self, now: DateTime<Utc>, safety_margin: chrono::Duration) -> bool {
        self.expires_at - now > safety_margin
    }
}

/// RFC 7662 introspection response.
#[derive(Debug, Clone, Deserialize)]
pub struct IntrospectionResponse {
    pub active: bool,
    #[serde(flatten)]
    pub claims: serde_json::Map<String, serde_json::Value>,
}

/// RFC 9126 pushed-authorization-request response.
#[derive(Debug, Clone, Deserialize)]
pub struct ParResponse {
    pub request_uri: String,
    pub expires_in: i64,
}
