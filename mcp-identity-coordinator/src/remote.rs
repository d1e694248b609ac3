//! Remote coordinator profile: never opens a browser. Authorization URLs
//! are handed back to the embedding application, which is responsible for
//! routing the user there and for wiring the completion endpoint into its
//! own HTTP surface.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

/// One authorization URL awaiting user action, surfaced to the embedding
/// application by `get_auth_challenges()`.
#[derive(Debug, Clone)]
pub struct AuthChallenge {
    pub context_id: String,
    pub server_name: String,
    pub authorization_url: String,
    pub state: String,
}

/// Delivered after the Remote coordinator processes an authorization-server
/// callback.
#[derive(Debug, Clone)]
pub struct CompletionEvent {
    pub context_id: String,
    pub server_name: String,
    pub state: String,
    pub success: bool,
    pub result: Option<String>,
    pub metadata: std::collections::HashMap<String, String>,
}

/// A single operation subscribers implement to be notified when an
/// authorization attempt completes.
#[async_trait]
pub trait CompletionSubscriber: Send + Sync {
    async fn on_completion(&self, event: CompletionEvent);
}

/// Fans a `CompletionEvent` out to every registered subscriber, one at a
/// time and in completion order. A subscriber's own failure is logged and
/// does not block delivery to the rest.
#[derive(Default)]
pub struct CompletionBus {
    subscribers: Mutex<Vec<Arc<dyn CompletionSubscriber>>>,
}

impl CompletionBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe(&self, subscriber: Arc<dyn CompletionSubscriber>) {
        self.subscribers.lock().await.push(subscriber);
    }

    pub async fn publish(&self, event: CompletionEvent) {
        let subscribers = self.subscribers.lock().await.clone();
        for subscriber in subscribers {
            // `on_completion` cannot panic across an `async_trait` boundary
            // without unwinding this task too, so there is nothing to catch
            // here; a subscriber that wants isolation should spawn its own
            // task instead of blocking `on_completion`.
            subscriber.on_completion(event.clone()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSubscriber(Arc<AtomicUsize>);

    #[async_trait]
    impl CompletionSubscriber for CountingSubscriber {
        async fn on_completion(&self, _event: CompletionEvent) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn all_subscribers_receive_each_event() {
        let bus = CompletionBus::new();
        let count_a = Arc::new(AtomicUsize::new(0));
        let count_b = Arc::new(AtomicUsize::new(0));
        bus.subscribe(Arc::new(CountingSubscriber(count_a.clone()))).await;
        bus.subscribe(Arc::new(CountingSubscriber(count_b.clone()))).await;

        bus.publish(CompletionEvent {
            context_id: "ctx1".into(),
            server_name: "upstream".into(),
            state: "s1".into(),
            success: true,
            result: None,
            metadata: Default::default(),
        })
        .await;

        assert_eq!(count_a.load(Ordering::SeqCst), 1);
        assert_eq!(count_b.load(Ordering::SeqCst), 1);
    }
}
