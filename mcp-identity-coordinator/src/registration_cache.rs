//! Coalesces concurrent dynamic-client-registration attempts for the same
//! (zone, app_name) pair down to a single RFC 7591 call, the same coalescing
//! shape the verifier's JWKS cache uses for concurrent key lookups.

use crate::error::{CoordinatorError, Result};
use crate::storage::{client_key, StorageBackend};
use mcp_identity_oauth::{ClientRegistrationRequest, OAuthClient, RegisteredClient, Zone};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Ensures a registered client record exists for (zone, app_name),
/// registering via RFC 7591 at most once even under concurrent first
/// callers: the registration happens while holding the per-key lock, so a
/// second caller waits for the first's result and then reads it from
/// storage instead of issuing its own `/register` call.
pub struct RegistrationCache {
    client: Arc<OAuthClient>,
    storage: Arc<dyn StorageBackend>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl RegistrationCache {
    pub fn new(client: Arc<OAuthClient>, storage: Arc<dyn StorageBackend>) -> Self {
        Self { client, storage, locks: Mutex::new(HashMap::new()) }
    }

    async fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(key.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    pub async fn ensure_registered(
        &self,
        zone: &Zone,
        app_name: &str,
        request: impl Fn() -> ClientRegistrationRequest,
    ) -> Result<RegisteredClient> {
        let key = client_key(&zone.key(), app_name);
        let lock = self.lock_for(&key).await;
        let _guard = lock.lock().await;

        if let Some(bytes) = self
            .storage
            .get(&key)
            .await
            .map_err(|e| CoordinatorError::Storage(e.to_string()))?
        {
            let record: RegisteredClient = serde_json::from_slice(&bytes)
                .map_err(|e| CoordinatorError::Storage(e.to_string()))?;
            return Ok(record);
        }

        let record = self.client.register_client(zone, request()).await?;
        let bytes = serde_json::to_vec(&record).map_err(|e| CoordinatorError::Storage(e.to_string()))?;
        self.storage
            .set(&key, bytes)
            .await
            .map_err(|e| CoordinatorError::Storage(e.to_string()))?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorage;
    use mcp_identity_oauth::transport::test_support::ScriptedTransport;
    use mcp_identity_oauth::{AuthStrategy, Endpoint, HttpResponse, OAuthClientConfig};
    use std::collections::HashMap as StdHashMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn registration_response() -> Result<HttpResponse, String> {
        Ok(HttpResponse {
            status: 200,
            headers: StdHashMap::new(),
            body: serde_json::to_vec(&serde_json::json!({
                "client_id": "client-abc",
                "client_secret": "shh",
                "redirect_uris": ["http://127.0.0.1:8765/callback"],
                "grant_types": ["authorization_code"],
                "token_endpoint_auth_method": "client_secret_basic",
            }))
            .unwrap(),
        })
    }

    #[tokio::test]
    async fn concurrent_first_callers_coalesce_to_one_registration() {
        let transport = Arc::new(ScriptedTransport::new(vec![registration_response()]));
        let client = Arc::new(
            mcp_identity_oauth::OAuthClient::with_transport(
                OAuthClientConfig::default(),
                AuthStrategy::None,
                transport.clone(),
            )
            .with_endpoint_override(Endpoint::Registration, "https://zone.example/oauth2/register"),
        );
        let storage: Arc<dyn StorageBackend> = Arc::new(InMemoryStorage::new());
        let cache = Arc::new(RegistrationCache::new(client, storage));
        let zone = Zone::from_url("https://zone.example/").unwrap();

        let calls = Arc::new(AtomicU32::new(0));
        let mut handles = Vec::new();
        for _ in 0..5 {
            let cache = cache.clone();
            let zone = zone.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                cache
                    .ensure_registered(&zone, "agent", || ClientRegistrationRequest {
                        client_name: "agent".into(),
                        redirect_uris: vec!["http://127.0.0.1:8765/callback".into()],
                        grant_types: vec!["authorization_code".into()],
                        token_endpoint_auth_method: None,
                        scope: None,
                        jwks_url: None,
                    })
                    .await
                    .unwrap()
            }));
        }

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }

        assert_eq!(transport.requests.lock().unwrap().len(), 1);
        assert!(results.iter().all(|r| r.client_id == "client-abc"));
    }
}
