//! The narrow key/value storage contract the coordinator persists
//! registered clients, tokens, and pending authorizations through, plus an
//! in-memory implementation for tests and single-process deployments.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage error: {0}")]
    General(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Byte-string get/set/delete over a single namespace, plus an optional
/// atomic compare-and-set used by the pending-authorization record (so a
/// callback can only be consumed once even under a racing retry).
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;

    /// Atomically replace `key`'s value with `new` iff its current value
    /// equals `expected` (or iff it is absent, when `expected` is `None`).
    /// Returns whether the swap took place. The default implementation is
    /// not actually atomic — backends with a real CAS primitive (a KV
    /// store's conditional put, a SQL `UPDATE ... WHERE`) should override
    /// this.
    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new: Vec<u8>,
    ) -> Result<bool> {
        let current = self.get(key).await?;
        if current.as_deref() != expected {
            return Ok(false);
        }
        self.set(key, new).await?;
        Ok(true)
    }
}

/// Storage key for a registered client record.
pub fn client_key(zone: &str, app_name: &str) -> String {
    format!("client:{zone}:{app_name}")
}

/// Storage key for a token record.
pub fn token_key(context_id: &str, server_name: &str) -> String {
    format!("token:{context_id}:{server_name}")
}

/// Storage key for a pending PKCE authorization.
pub fn pending_key(context_id: &str, server_name: &str) -> String {
    format!("pending:{context_id}:{server_name}")
}

/// Storage key for the `state` → (context_id, server_name) reverse index.
pub fn state_key(opaque_state: &str) -> String {
    format!("state:{opaque_state}")
}

/// In-memory storage backend with a real compare-and-set, for tests and
/// single-process deployments that don't need to survive a restart.
#[derive(Default)]
pub struct InMemoryStorage {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for InMemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.entries.lock().unwrap().insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new: Vec<u8>,
    ) -> Result<bool> {
        let mut entries = self.entries.lock().unwrap();
        let current = entries.get(key).map(Vec::as_slice);
        if current != expected {
            return Ok(false);
        }
        entries.insert(key.to_string(), new);
        Ok(true)
    }
}
