use chrono::{DateTime, Utc};
use std::sync::Mutex as StdMutex;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::providers::ChatSession;

/// Live conversation of one user with the model.
///
/// The chat session sits behind an async mutex: a relay holds it from the
/// pre-flight check until the reply is finalized, so two messages from the
/// same user are answered one after the other.
#[derive(Debug)]
pub struct ConversationContext {
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    session: Mutex<ChatSession>,
    last_used: StdMutex<Instant>,
}

impl ConversationContext {
    pub fn new(user_id: impl Into<String>, session: ChatSession, now: Instant) -> Self {
        Self {
            user_id: user_id.into(),
            created_at: Utc::now(),
            session: Mutex::new(session),
            last_used: StdMutex::new(now),
        }
    }

    /// Exclusive access to the chat session.
    pub async fn lock_session(&self) -> tokio::sync::MutexGuard<'_, ChatSession> {
        self.session.lock().await
    }

    pub fn touch(&self, now: Instant) {
        *self.last_used.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn last_used(&self) -> Instant {
        *self.last_used.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Idle longer than `ttl` at `now`
    pub fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.last_used()) > ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::SessionOptions;

    fn context(now: Instant) -> ConversationContext {
        ConversationContext::new("42", ChatSession::new("m", SessionOptions::default()), now)
    }

    #[test]
    fn test_is_expired_strictly_after_ttl() {
        let start = Instant::now();
        let ctx = context(start);
        let ttl = Duration::from_secs(10);

        assert!(!ctx.is_expired(start + Duration::from_secs(10), ttl));
        assert!(ctx.is_expired(start + Duration::from_secs(11), ttl));
    }

    #[test]
    fn test_touch_refreshes_last_used() {
        let start = Instant::now();
        let ctx = context(start);
        let later = start + Duration::from_secs(30);

        ctx.touch(later);
        assert_eq!(ctx.last_used(), later);
        assert!(!ctx.is_expired(later + Duration::from_secs(5), Duration::from_secs(10)));
    }

    #[tokio::test]
    async fn test_lock_session_gives_mutable_access() {
        let ctx = context(Instant::now());
        ctx.lock_session()
            .await
            .record_exchange(vec![crate::providers::PromptPart::text("hi")], "hello");
        assert_eq!(ctx.lock_session().await.history.len(), 2);
    }
}
