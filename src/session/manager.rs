use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::providers::{ModelClient, ProviderError, SessionOptions};
use crate::session::types::ConversationContext;
use crate::utils::Clock;

/// In-memory map of user id to conversation.
///
/// Holds at most one context per user id. Expired contexts are removed by
/// [`SessionStore::sweep`], which the relay runs on every message.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<ConversationContext>>>,
    client: Arc<dyn ModelClient>,
    options: SessionOptions,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl SessionStore {
    /// `ttl` of zero keeps conversations forever.
    pub fn new(
        client: Arc<dyn ModelClient>,
        options: SessionOptions,
        ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            client,
            options,
            ttl,
            clock,
        }
    }

    /// Returns the user's conversation, creating one bound to `model` if needed.
    ///
    /// **Lock Scope Pattern**: the backend session is created without holding
    /// the map lock. If another task inserted a context meanwhile, that one
    /// wins and the fresh session is dropped.
    pub async fn get_or_create(
        &self,
        user_id: &str,
        model: &str,
    ) -> Result<Arc<ConversationContext>, ProviderError> {
        {
            let guard = self.sessions.read().await;
            if let Some(ctx) = guard.get(user_id) {
                ctx.touch(self.clock.now());
                return Ok(Arc::clone(ctx));
            }
        }

        let session = self.client.create_session(model, &self.options).await?;
        let now = self.clock.now();

        let mut guard = self.sessions.write().await;
        let ctx = guard
            .entry(user_id.to_string())
            .or_insert_with(|| {
                info!(user_id = user_id, model = model, "Created conversation");
                Arc::new(ConversationContext::new(user_id, session, now))
            });
        ctx.touch(now);
        Ok(Arc::clone(ctx))
    }

    /// Forgets the user's conversation. Returns whether one existed.
    pub async fn clear(&self, user_id: &str) -> bool {
        let removed = self.sessions.write().await.remove(user_id).is_some();
        debug!(user_id = user_id, removed = removed, "Cleared conversation");
        removed
    }

    /// Removes every conversation idle for longer than the TTL.
    ///
    /// Returns the number of conversations evicted.
    pub async fn sweep(&self) -> usize {
        if self.ttl.is_zero() {
            return 0;
        }

        let now = self.clock.now();
        let mut guard = self.sessions.write().await;
        let before = guard.len();
        guard.retain(|user_id, ctx| {
            let keep = !ctx.is_expired(now, self.ttl);
            if !keep {
                debug!(
                    user_id = %user_id,
                    created_at = %ctx.created_at.to_rfc3339(),
                    "Evicting idle conversation"
                );
            }
            keep
        });
        let evicted = before - guard.len();

        if evicted > 0 {
            info!(evicted = evicted, remaining = guard.len(), "Swept idle conversations");
        }
        evicted
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    pub async fn contains(&self, user_id: &str) -> bool {
        self.sessions.read().await.contains_key(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::mock::MockModelClient;
    use crate::utils::ManualClock;

    fn store(ttl_secs: u64) -> (SessionStore, Arc<ManualClock>, Arc<MockModelClient>) {
        let clock = Arc::new(ManualClock::new());
        let client = Arc::new(MockModelClient::new());
        let store = SessionStore::new(
            client.clone(),
            SessionOptions::default(),
            Duration::from_secs(ttl_secs),
            clock.clone(),
        );
        (store, clock, client)
    }

    #[tokio::test]
    async fn test_get_or_create_reuses_context() {
        let (store, _clock, client) = store(60);

        let first = store.get_or_create("1", "flash").await.unwrap();
        let second = store.get_or_create("1", "pro").await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.lock_session().await.model, "flash");
        assert_eq!(client.sessions_created(), vec!["flash".to_string()]);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_access_refreshes_ttl() {
        let (store, clock, _client) = store(10);

        store.get_or_create("1", "m").await.unwrap();
        clock.advance(Duration::from_secs(8));
        store.get_or_create("1", "m").await.unwrap();
        clock.advance(Duration::from_secs(8));

        assert_eq!(store.sweep().await, 0);
        assert!(store.contains("1").await);
    }

    #[tokio::test]
    async fn test_sweep_keeps_fresh_contexts() {
        let (store, clock, _client) = store(10);

        store.get_or_create("old", "m").await.unwrap();
        clock.advance(Duration::from_secs(9));
        store.get_or_create("new", "m").await.unwrap();
        clock.advance(Duration::from_secs(2));

        assert_eq!(store.sweep().await, 1);
        assert!(!store.contains("old").await);
        assert!(store.contains("new").await);
    }

    #[tokio::test]
    async fn test_clear_reports_removal() {
        let (store, _clock, _client) = store(10);
        store.get_or_create("1", "m").await.unwrap();

        assert!(store.clear("1").await);
        assert!(!store.clear("1").await);
        assert!(store.is_empty().await);
    }
}
