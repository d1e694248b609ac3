//! JWKS cache.
//!
//! Keyed by `jwks_uri`, many-reader/occasional-writer. A refresh is
//! triggered by any reader observing a missing `kid`; concurrent refreshers
//! of the same URI coalesce to one in-flight fetch because the refresh
//! happens while holding the per-URI entry lock — every other caller simply
//! waits for it and then observes the freshly populated cache instead of
//! issuing its own request.

use crate::error::{Result, VerifierError};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::jwk::{Jwk, JwkSet};
use mcp_identity_oauth::{HttpMethod, HttpRequest, HttpTransport};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

struct CacheEntry {
    keys: JwkSet,
    fetched_at: DateTime<Utc>,
}

/// Caches JWKS documents fetched from `jwks_uri` endpoints.
pub struct JwksCache {
    ttl: Duration,
    transport: Arc<dyn HttpTransport>,
    entries: Mutex<HashMap<String, Arc<Mutex<Option<CacheEntry>>>>>,
}

impl JwksCache {
    pub fn new(ttl: Duration, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            ttl,
            transport,
            entries: Mutex::new(HashMap::new()),
        }
    }

    async fn slot_for(&self, jwks_uri: &str) -> Arc<Mutex<Option<CacheEntry>>> {
        let mut entries = self.entries.lock().await;
        entries
            .entry(jwks_uri.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    async fn fetch(&self, jwks_uri: &str) -> Result<JwkSet> {
        let response = self
            .transport
            .send(HttpRequest {
                method: HttpMethod::Get,
                url: jwks_uri.to_string(),
                headers: HashMap::new(),
                body: None,
            })
            .await
            .map_err(VerifierError::Jwks)?;

        if response.status < 200 || response.status >= 300 {
            return Err(VerifierError::InvalidToken(format!(
                "jwks fetch returned status {}",
                response.status
            )));
        }

        response
            .json()
            .map_err(|e| VerifierError::InvalidToken(format!("malformed jwks document: {e}")))
    }

    /// Resolve the key for `kid` at `jwks_uri`, fetching or refreshing as
    /// needed. On an unknown `kid`, forces exactly one refresh and retries
    /// once before giving up.
    pub async fn key_for(&self, jwks_uri: &str, kid: &str) -> Result<Jwk> {
        let slot = self.slot_for(jwks_uri).await;
        let mut guard = slot.lock().await;

        let needs_fetch = match &*guard {
            None => true,
            Some(entry) => Utc::now() - entry.fetched_at > self.ttl,
        };

        if needs_fetch {
            let keys = self.fetch(jwks_uri).await?;
            *guard = Some(CacheEntry { keys, fetched_at: Utc::now() });
        }

        if let Some(key) = Self::find(guard.as_ref().unwrap(), kid) {
            return Ok(key);
        }

        // Unknown kid: force one refresh and retry once before giving up,
        // in case the signing key rotated since the last fetch.
        let keys = self.fetch(jwks_uri).await?;
        *guard = Some(CacheEntry { keys, fetched_at: Utc::now() });

        Self::find(guard.as_ref().unwrap(), kid)
            .ok_or_else(|| VerifierError::InvalidToken(format!("unknown key id: {kid}")))
    }

    fn find(entry: &CacheEntry, kid: &str) -> Option<Jwk> {
        entry
            .keys
            .keys
            .iter()
            .find(|k| k.common.key_id.as_deref() == Some(kid))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mcp_identity_oauth::HttpResponse;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn jwk_set_json(kid: &str) -> serde_json::Value {
        serde_json::json!({
            "keys": [{
                "kty": "oct",
                "kid": kid,
                "k": "c2VjcmV0LWtleS1tYXRlcmlhbA",
                "alg": "HS256",
                "use": "sig",
            }]
        })
    }

    struct CountingTransport {
        calls: AtomicU32,
        kid: String,
    }

    #[async_trait]
    impl HttpTransport for CountingTransport {
        async fn send(&self, _req: HttpRequest) -> Result<HttpResponse, mcp_identity_oauth::OAuthError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(HttpResponse {
                status: 200,
                headers: HashMap::new(),
                body: serde_json::to_vec(&jwk_set_json(&self.kid)).unwrap(),
            })
        }
    }

    #[tokio::test]
    async fn known_kid_is_served_from_cache_without_refetch() {
        let transport = Arc::new(CountingTransport { calls: AtomicU32::new(0), kid: "k1".into() });
        let cache = JwksCache::new(Duration::minutes(15), transport.clone());

        cache.key_for("https://zone.example/jwks.json", "k1").await.unwrap();
        cache.key_for("https://zone.example/jwks.json", "k1").await.unwrap();

        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_kid_forces_one_refresh_then_fails() {
        let transport = Arc::new(CountingTransport { calls: AtomicU32::new(0), kid: "k1".into() });
        let cache = JwksCache::new(Duration::minutes(15), transport.clone());

        // Prime cache with k1.
        cache.key_for("https://zone.example/jwks.json", "k1").await.unwrap();
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);

        // Looking up an unknown kid forces exactly one more fetch.
        let result = cache.key_for("https://zone.example/jwks.json", "missing").await;
        assert!(result.is_err());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_readers_coalesce_to_one_fetch() {
        let transport = Arc::new(CountingTransport { calls: AtomicU32::new(0), kid: "k1".into() });
        let cache = Arc::new(JwksCache::new(Duration::minutes(15), transport.clone()));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                cache.key_for("https://zone.example/jwks.json", "k1").await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }
}
