//! Multi-tenant isolation: a cache of coordinator-bound clients keyed by
//! `context_id`. Every storage operation a context's client performs is
//! already prefixed with that `context_id` by the key helpers in
//! `storage.rs`; this cache exists so that two contexts calling the same
//! embedding process never share an in-memory `Session` either.

use crate::coordinator::AuthCoordinator;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Owns one [`AuthCoordinator`] per `context_id`. Two contexts never
/// observe each other's sessions, tokens, or pending records — see the
/// isolation test in `coordinator.rs`.
pub struct ClientManager {
    factory: Box<dyn Fn(&str) -> AuthCoordinator + Send + Sync>,
    clients: RwLock<HashMap<String, Arc<AuthCoordinator>>>,
}

impl ClientManager {
    pub fn new(factory: impl Fn(&str) -> AuthCoordinator + Send + Sync + 'static) -> Self {
        Self { factory: Box::new(factory), clients: RwLock::new(HashMap::new()) }
    }

    /// Returns the coordinator bound to `context_id`, constructing one via
    /// the factory on first use.
    pub async fn get_or_create(&self, context_id: &str) -> Arc<AuthCoordinator> {
        if let Some(existing) = self.clients.read().await.get(context_id) {
            return existing.clone();
        }

        let mut clients = self.clients.write().await;
        clients
            .entry(context_id.to_string())
            .or_insert_with(|| Arc::new((self.factory)(context_id)))
            .clone()
    }

    pub async fn remove(&self, context_id: &str) {
        self.clients.write().await.remove(context_id);
    }

    pub async fn context_count(&self) -> usize {
        self.clients.read().await.len()
    }
}
