//! The OAuth client: builds RFC-conformant requests, applies an
//! authentication strategy, issues them over a configurable transport,
//! parses responses, and raises a classified error or typed result.

use crate::auth_strategy::AuthStrategy;
use crate::endpoints::{Endpoint, EndpointResolver};
use crate::error::{OAuthError, ProtocolErrorBody, Result};
use crate::models::{
    ClientRegistrationRequest, IntrospectionResponse, ParResponse, RegisteredClient,
    ServerMetadata, TokenRecord, TokenRequest, TokenResponseBody,
};
use crate::retry::RetryPolicy;
use crate::transport::{HttpMethod, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
use crate::zone::Zone;
use base64::Engine;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for an `OAuthClient`.
#[derive(Debug, Clone)]
pub struct OAuthClientConfig {
    pub discovery_enabled: bool,
    pub discovery_ttl: chrono::Duration,
    pub http_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for OAuthClientConfig {
    fn default() -> Self {
        Self {
            discovery_enabled: true,
            discovery_ttl: chrono::Duration::minutes(15),
            http_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

/// Stateless request builder and HTTP caller for the standardized OAuth
/// endpoints. One instance is shared across zones; the authentication
/// strategy and endpoint resolver decide per-call, per-zone behavior.
pub struct OAuthClient {
    transport: Arc<dyn HttpTransport>,
    resolver: EndpointResolver,
    auth: AuthStrategy,
    retry: RetryPolicy,
}

impl OAuthClient {
    pub fn new(config: OAuthClientConfig, auth: AuthStrategy) -> Self {
        Self {
            transport: Arc::new(ReqwestTransport::new(config.http_timeout)),
            resolver: EndpointResolver::new(config.discovery_enabled, config.discovery_ttl),
            auth,
            retry: config.retry,
        }
    }

    /// Construct a client over a caller-supplied transport (used by tests
    /// and by the blocking wrapper).
    pub fn with_transport(
        config: OAuthClientConfig,
        auth: AuthStrategy,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            transport,
            resolver: EndpointResolver::new(config.discovery_enabled, config.discovery_ttl),
            auth,
            retry: config.retry,
        }
    }

    pub fn with_endpoint_override(mut self, endpoint: Endpoint, url: impl Into<String>) -> Self {
        self.resolver = std::mem::replace(
            &mut self.resolver,
            EndpointResolver::new(true, chrono::Duration::minutes(15)),
        )
        .with_override(endpoint, url);
        self
    }

    /// Derive a client identical to this one but authenticating with
    /// `auth` instead, sharing the transport and retry policy and
    /// reapplying any endpoint overrides. The discovery cache is not
    /// carried over; it repopulates on first use.
    pub fn with_auth_strategy(&self, auth: AuthStrategy) -> OAuthClient {
        let resolver = self
            .resolver
            .overrides
            .iter()
            .fold(EndpointResolver::new(self.resolver.discovery_enabled, self.resolver.discovery_ttl), |r, (endpoint, url)| {
                r.with_override(*endpoint, url.clone())
            });
        Self { transport: self.transport.clone(), resolver, auth, retry: self.retry.clone() }
    }

    fn basic_auth_header(client_id: &str, client_secret: &str) -> String {
        let raw = format!("{client_id}:{client_secret}");
        format!("Basic {}", base64::engine::general_purpose::STANDARD.encode(raw))
    }

    async fn authenticated_headers(&self, zone: &Zone) -> Result<HashMap<String, String>> {
        let applied = self.auth.resolve(zone)?;
        let mut headers = HashMap::new();
        headers.insert(
            "Content-Type".to_string(),
            "application/x-www-form-urlencoded".to_string(),
        );
        if let Some((id, secret)) = applied.basic_auth {
            headers.insert("Authorization".to_string(), Self::basic_auth_header(&id, &secret));
        } else if let Some(token) = applied.bearer_header {
            headers.insert("Authorization".to_string(), format!("Bearer {token}"));
        }
        Ok(headers)
    }

    fn parse_protocol_error(response: &HttpResponse, resource: Option<&str>) -> OAuthError {
        match response.json::<ProtocolErrorBody>() {
            Ok(body) => {
                if body.error == "invalid_target" || resource.is_some() {
                    OAuthError::TokenExchange { resource: resource.map(str::to_string), body }
                } else {
                    OAuthError::Protocol(body)
                }
            }
            Err(_) => OAuthError::Http { status: response.status, body: response.text() },
        }
    }

    fn check_status(response: &HttpResponse, resource: Option<&str>) -> Result<()> {
        if response.status >= 200 && response.status < 300 {
            return Ok(());
        }
        if response.status == 400 || response.status == 401 || response.status == 403 {
            return Err(Self::parse_protocol_error(response, resource));
        }
        Err(OAuthError::Http { status: response.status, body: response.text() })
    }

    /// RFC 8414 discovery at `{base_url}/.well-known/oauth-authorization-server`.
    pub async fn discover_metadata(&self, zone: &Zone) -> Result<ServerMetadata> {
        if let Some(cached) = self.resolver.cached_metadata(zone).await {
            return Ok(cached);
        }

        let url = zone
            .base_url()
            .join(".well-known/oauth-authorization-server")
            .map_err(|e| OAuthError::config(e.to_string()))?;

        let response = self
            .retry
            .run(|| {
                let url = url.clone();
                async move {
                    self.transport
                        .send(HttpRequest {
                            method: HttpMethod::Get,
                            url: url.to_string(),
                            headers: HashMap::new(),
                            body: None,
                        })
                        .await
                }
            })
            .await?;

        Self::check_status(&response, None)?;
        let metadata: ServerMetadata = response
            .json()
            .map_err(|e| OAuthError::Malformed(e.to_string()))?;
        self.resolver.seed(zone, metadata.clone()).await;
        Ok(metadata)
    }

    /// RFC 7591 dynamic client registration.
    pub async fn register_client(
        &self,
        zone: &Zone,
        request: ClientRegistrationRequest,
    ) -> Result<RegisteredClient> {
        let url = self.resolver.resolve(zone, Endpoint::Registration).await?;
        let mut headers = HashMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        let body = serde_json::to_vec(&request).map_err(|e| OAuthError::Malformed(e.to_string()))?;

        let response = self
            .retry
            .run(|| {
                let url = url.clone();
                let body = body.clone();
                let headers = headers.clone();
                async move {
                    self.transport
                        .send(HttpRequest { method: HttpMethod::Post, url, headers, body: Some(body) })
                        .await
                }
            })
            .await?;

        Self::check_status(&response, None)?;
        #[derive(serde::Deserialize)]
        struct RegistrationResponse {
            client_id: String,
            client_secret: Option<String>,
            redirect_uris: Vec<String>,
            #[serde(default)]
            grant_types: Vec<String>,
            #[serde(default = "default_auth_method")]
            token_endpoint_auth_method: String,
            scope: Option<String>,
            jwks_url: Option<String>,
        }
        fn default_auth_method() -> String {
            "client_secret_basic".to_string()
        }

        let parsed: RegistrationResponse = response
            .json()
            .map_err(|e| OAuthError::Malformed(e.to_string()))?;

        Ok(RegisteredClient {
            client_id: parsed.client_id,
            client_secret: parsed.client_secret,
            redirect_uris: parsed.redirect_uris,
            grant_types: parsed.grant_types,
            token_endpoint_auth_method: parsed.token_endpoint_auth_method,
            scope: parsed.scope,
            jwks_url: parsed.jwks_url,
        })
    }

    /// Issue a token request (exchange/authorization-code/refresh) and
    /// parse the result into a `TokenRecord`.
    pub async fn request_token(&self, zone: &Zone, request: TokenRequest) -> Result<TokenRecord> {
        let url = self.resolver.resolve(zone, Endpoint::Token).await?;
        let mut headers = self.authenticated_headers(zone).await?;
        headers.insert("Content-Type".to_string(), "application/x-www-form-urlencoded".to_string());
        let body = request.to_form().into_bytes();
        let resource = request.resource.clone().or_else(|| request.audience.clone());

        let response = self
            .retry
            .run(|| {
                let url = url.clone();
                let body = body.clone();
                let headers = headers.clone();
                async move {
                    self.transport
                        .send(HttpRequest { method: HttpMethod::Post, url, headers, body: Some(body) })
                        .await
                }
            })
            .await?;

        Self::check_status(&response, resource.as_deref())?;
        let body: TokenResponseBody = response
            .json()
            .map_err(|e| OAuthError::Malformed(e.to_string()))?;

        if let Some(issued) = &body.issued_token_type {
            if issued != "urn:ietf:params:oauth:token-type:access_token" {
                tracing::warn!(issued_token_type = %issued, "issued token type is not an access token; surfacing record as-is, not usable for downstream API calls");
            }
        }

        Ok(TokenRecord::from_response(body, resource))
    }

    /// RFC 7662 token introspection.
    pub async fn introspect(&self, zone: &Zone, token: &str) -> Result<IntrospectionResponse> {
        let url = self.resolver.resolve(zone, Endpoint::Introspection).await?;
        let mut headers = self.authenticated_headers(zone).await?;
        headers.insert("Content-Type".to_string(), "application/x-www-form-urlencoded".to_string());
        let body = format!("token={}", urlencoding::encode(token)).into_bytes();

        let response = self
            .retry
            .run(|| {
                let url = url.clone();
                let body = body.clone();
                let headers = headers.clone();
                async move {
                    self.transport
                        .send(HttpRequest { method: HttpMethod::Post, url, headers, body: Some(body) })
                        .await
                }
            })
            .await?;

        Self::check_status(&response, None)?;
        response.json().map_err(|e| OAuthError::Malformed(e.to_string()))
    }

    /// RFC 7009 token revocation. Idempotent: revoking an already-revoked
    /// or unknown token still returns `Ok(())`.
    pub async fn revoke(&self, zone: &Zone, token: &str, hint: Option<&str>) -> Result<()> {
        let url = self.resolver.resolve(zone, Endpoint::Revocation).await?;
        let mut headers = self.authenticated_headers(zone).await?;
        headers.insert("Content-Type".to_string(), "application/x-www-form-urlencoded".to_string());
        let mut body = format!("token={}", urlencoding::encode(token));
        if let Some(hint) = hint {
            body.push_str(&format!("&token_type_hint={}", urlencoding::encode(hint)));
        }
        let body = body.into_bytes();

        let response = self
            .retry
            .run(|| {
                let url = url.clone();
                let body = body.clone();
                let headers = headers.clone();
                async move {
                    self.transport
                        .send(HttpRequest { method: HttpMethod::Post, url, headers, body: Some(body) })
                        .await
                }
            })
            .await?;

        // RFC 7009 §2.2: the AS responds 200 even for unknown tokens.
        Self::check_status(&response, None)
    }

    /// RFC 9126 pushed authorization request.
    pub async fn par(&self, zone: &Zone, params: HashMap<String, String>) -> Result<ParResponse> {
        let url = self.resolver.resolve(zone, Endpoint::Par).await?;
        let mut headers = self.authenticated_headers(zone).await?;
        headers.insert("Content-Type".to_string(), "application/x-www-form-urlencoded".to_string());
        let body = params
            .into_iter()
            .map(|(k, v)| format!("{k}={}", urlencoding::encode(&v)))
            .collect::<Vec<_>>()
            .join("&")
            .into_bytes();

        let response = self
            .retry
            .run(|| {
                let url = url.clone();
                let body = body.clone();
                let headers = headers.clone();
                async move {
                    self.transport
                        .send(HttpRequest { method: HttpMethod::Post, url, headers, body: Some(body) })
                        .await
                }
            })
            .await?;

        Self::check_status(&response, None)?;
        response.json().map_err(|e| OAuthError::Malformed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::test_support::ScriptedTransport;

    fn zone() -> Zone {
        Zone::from_url("https://zone.example/").unwrap()
    }

    fn ok_response(body: serde_json::Value) -> HttpResponse {
        HttpResponse {
            status: 200,
            headers: HashMap::new(),
            body: serde_json::to_vec(&body).unwrap(),
        }
    }

    fn err_response(status: u16, error: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: HashMap::new(),
            body: serde_json::to_vec(&serde_json::json!({ "error": error })).unwrap(),
        }
    }

    #[tokio::test]
    async fn exchange_token_sends_expected_request_and_parses_response() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(ok_response(serde_json::json!({
            "access_token": "T2",
            "token_type": "Bearer",
            "expires_in": 3600,
            "issued_token_type": "urn:ietf:params:oauth:token-type:access_token",
        })))]));
        let client = OAuthClient::with_transport(
            OAuthClientConfig::default(),
            AuthStrategy::Basic { client_id: "provider".into(), client_secret: "secret".into() },
            transport.clone(),
        )
        .with_endpoint_override(Endpoint::Token, "https://zone.example/oauth2/token");

        let req = TokenRequest::token_exchange("T1", "urn:ietf:params:oauth:token-type:access_token")
            .with_resource("https://api.github.com");
        let record = client.request_token(&zone(), req).await.unwrap();

        assert_eq!(record.access_token, "T2");
        assert_eq!(record.resource.as_deref(), Some("https://api.github.com"));

        let sent = &transport.requests.lock().unwrap()[0];
        let sent_body = String::from_utf8_lossy(sent.body.as_ref().unwrap());
        assert!(sent_body.contains("subject_token=T1"));
    }

    #[tokio::test]
    async fn exchange_token_invalid_target_is_token_exchange_error() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(err_response(400, "invalid_target"))]));
        let client = OAuthClient::with_transport(
            OAuthClientConfig::default(),
            AuthStrategy::None,
            transport,
        )
        .with_endpoint_override(Endpoint::Token, "https://zone.example/oauth2/token");

        let req = TokenRequest::token_exchange("T1", "urn:ietf:params:oauth:token-type:access_token")
            .with_resource("https://b.example");
        let err = client.request_token(&zone(), req).await.unwrap_err();

        match err {
            OAuthError::TokenExchange { resource, body } => {
                assert_eq!(resource.as_deref(), Some("https://b.example"));
                assert_eq!(body.error, "invalid_target");
            }
            other => panic!("expected TokenExchange error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn retries_5xx_then_succeeds() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok(HttpResponse { status: 503, headers: HashMap::new(), body: b"unavailable".to_vec() }),
            Ok(ok_response(serde_json::json!({ "access_token": "T2", "expires_in": 60 }))),
        ]));
        let mut config = OAuthClientConfig::default();
        config.retry.base_delay = std::time::Duration::from_millis(1);
        config.retry.max_delay = std::time::Duration::from_millis(2);
        let client = OAuthClient::with_transport(config, AuthStrategy::None, transport.clone())
            .with_endpoint_override(Endpoint::Token, "https://zone.example/oauth2/token");

        let req = TokenRequest::token_exchange("T1", "access_token");
        let record = client.request_token(&zone(), req).await.unwrap();
        assert_eq!(record.access_token, "T2");
        assert_eq!(transport.requests.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn revoke_unknown_token_is_idempotent_success() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(HttpResponse {
            status: 200,
            headers: HashMap::new(),
            body: Vec::new(),
        })]));
        let client = OAuthClient::with_transport(
            OAuthClientConfig::default(),
            AuthStrategy::None,
            transport,
        )
        .with_endpoint_override(Endpoint::Revocation, "https://zone.example/oauth2/revoke");

        client.revoke(&zone(), "unknown-token", Some("access_token")).await.unwrap();
    }
}
