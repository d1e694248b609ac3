//! Endpoint resolution and RFC 8414 discovery caching.
//!
//! Resolution precedence, strict: (1) explicit override, (2) a cached
//! discovery document, (3) hard-coded defaults relative to the zone's base
//! URL. An endpoint that resolves to nothing for an operation that
//! requires one is a `ConfigError`, raised before any network call.

use crate::error::{OAuthError, Result};
use crate::models::ServerMetadata;
use crate::zone::Zone;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Authorization,
    Token,
    Registration,
    Introspection,
    Revocation,
    Par,
    Jwks,
}

impl Endpoint {
    fn default_path(self) -> &'static str {
        match self {
            Endpoint::Authorization => "oauth2/authorize",
            Endpoint::Token => "oauth2/token",
            Endpoint::Registration => "oauth2/register",
            Endpoint::Introspection => "oauth2/introspect",
            Endpoint::Revocation => "oauth2/revoke",
            Endpoint::Par => "oauth2/par",
            Endpoint::Jwks => ".well-known/jwks.json",
        }
    }

    fn from_metadata(self, metadata: &ServerMetadata) -> Option<String> {
        match self {
            Endpoint::Authorization => metadata.authorization_endpoint.clone(),
            Endpoint::Token => metadata.token_endpoint.clone(),
            Endpoint::Registration => metadata.registration_endpoint.clone(),
            Endpoint::Introspection => metadata.introspection_endpoint.clone(),
            Endpoint::Revocation => metadata.revocation_endpoint.clone(),
            Endpoint::Par => metadata.pushed_authorization_request_endpoint.clone(),
            Endpoint::Jwks => metadata.jwks_uri.clone(),
        }
    }
}

/// A cached RFC 8414 document plus the overrides and discovery toggle the
/// resolver falls back through.
struct CacheEntry {
    metadata: ServerMetadata,
    fetched_at: DateTime<Utc>,
}

/// Resolves operation endpoints for a zone using the strict precedence
/// rule, caching discovery documents with a TTL.
pub struct EndpointResolver {
    pub(crate) overrides: HashMap<Endpoint, String>,
    pub(crate) discovery_enabled: bool,
    pub(crate) discovery_ttl: Duration,
    cache: RwLock<HashMap<String, CacheEntry>>,
}

impl EndpointResolver {
    pub fn new(discovery_enabled: bool, discovery_ttl: Duration) -> Self {
        Self {
            overrides: HashMap::new(),
            discovery_enabled,
            discovery_ttl,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_override(mut self, endpoint: Endpoint, url: impl Into<String>) -> Self {
        self.overrides.insert(endpoint, url.into());
        self
    }

    /// Seed the cache with an already-fetched metadata document (used by
    /// `discover_metadata` and by tests that want to skip a real fetch).
    pub async fn seed(&self, zone: &Zone, metadata: ServerMetadata) {
        let mut cache = self.cache.write().await;
        cache.insert(
            zone.key(),
            CacheEntry { metadata, fetched_at: Utc::now() },
        );
    }

    pub async fn cached_metadata(&self, zone: &Zone) -> Option<ServerMetadata> {
        let cache = self.cache.read().await;
        cache.get(&zone.key()).and_then(|entry| {
            if Utc::now() - entry.fetched_at < self.discovery_ttl {
                Some(entry.metadata.clone())
            } else {
                None
            }
        })
    }

    /// Resolve a single endpoint for `zone` following the precedence rule.
    pub async fn resolve(&self, zone: &Zone, endpoint: Endpoint) -> Result<String> {
        if let Some(url) = self.overrides.get(&endpoint) {
            return Ok(url.clone());
        }

        if self.discovery_enabled {
            if let Some(metadata) = self.cached_metadata(zone).await {
                if let Some(url) = endpoint.from_metadata(&metadata) {
                    return Ok(url);
                }
            }
        }

        let default = zone.base_url().join(endpoint.default_path()).map_err(|e| {
            OAuthError::config(format!("cannot build default endpoint: {e}"))
        })?;
        Ok(default.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone() -> Zone {
        Zone::from_url("https://zone.example/").unwrap()
    }

    fn metadata_with_token_endpoint(url: &str) -> ServerMetadata {
        ServerMetadata {
            issuer: "https://zone.example/".into(),
            authorization_endpoint: None,
            token_endpoint: Some(url.to_string()),
            registration_endpoint: None,
            introspection_endpoint: None,
            revocation_endpoint: None,
            pushed_authorization_request_endpoint: None,
            jwks_uri: None,
            grant_types_supported: vec![],
            code_challenge_methods_supported: vec![],
            scopes_supported: vec![],
            token_endpoint_auth_methods_supported: vec![],
        }
    }

    #[tokio::test]
    async fn override_wins_over_everything() {
        let resolver = EndpointResolver::new(true, Duration::minutes(15))
            .with_override(Endpoint::Token, "https://override.example/token");
        resolver
            .seed(&zone(), metadata_with_token_endpoint("https://discovered.example/token"))
            .await;

        let resolved = resolver.resolve(&zone(), Endpoint::Token).await.unwrap();
        assert_eq!(resolved, "https://override.example/token");
    }

    #[tokio::test]
    async fn discovery_wins_over_default_when_fresh() {
        let resolver = EndpointResolver::new(true, Duration::minutes(15));
        resolver
            .seed(&zone(), metadata_with_token_endpoint("https://discovered.example/token"))
            .await;
        let resolved = resolver.resolve(&zone(), Endpoint::Token).await.unwrap();
        assert_eq!(resolved, "https://discovered.example/token");
    }

    #[tokio::test]
    async fn falls_back_to_default_when_discovery_disabled() {
        let resolver = EndpointResolver::new(false, Duration::minutes(15));
        resolver
            .seed(&zone(), metadata_with_token_endpoint("https://discovered.example/token"))
            .await;
        let resolved = resolver.resolve(&zone(), Endpoint::Token).await.unwrap();
        assert_eq!(resolved, "https://zone.example/oauth2/token");
    }

    #[tokio::test]
    async fn expired_cache_falls_through_to_default() {
        let resolver = EndpointResolver::new(true, Duration::seconds(-1));
        resolver
            .seed(&zone(), metadata_with_token_endpoint("https://discovered.example/token"))
            .await;
        let resolved = resolver.resolve(&zone(), Endpoint::Token).await.unwrap();
        assert_eq!(resolved, "https://zone.example/oauth2/token");
    }
}
