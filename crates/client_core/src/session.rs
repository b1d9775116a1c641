use std::{collections::HashSet, sync::Arc};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::info;

/// Per-login application context. Created once at startup and handed to
/// whatever needs the auth token or the set of resources whose initial
/// sync has finished; `clear` on logout resets both.
#[derive(Default)]
pub struct SessionContext {
    inner: RwLock<SessionState>,
}

#[derive(Default)]
struct SessionState {
    token: Option<String>,
    completed_syncs: HashSet<String>,
    started_at: Option<DateTime<Utc>>,
}

impl SessionContext {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn initialize(&self, token: Option<String>) {
        let mut guard = self.inner.write().await;
        guard.token = token.filter(|token| !token.is_empty());
        guard.completed_syncs.clear();
        guard.started_at = Some(Utc::now());
        info!(
            authenticated = guard.token.is_some(),
            "session: initialized"
        );
    }

    pub async fn bearer_token(&self) -> Option<String> {
        self.inner.read().await.token.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.inner.read().await.token.is_some()
    }

    /// Drops the token but keeps sync flags; used when the server rejects
    /// the current credentials.
    pub async fn revoke_token(&self) {
        if self.inner.write().await.token.take().is_some() {
            info!("session: token revoked after authorization failure");
        }
    }

    pub async fn mark_sync_complete(&self, resource: &str) {
        self.inner
            .write()
            .await
            .completed_syncs
            .insert(resource.to_string());
    }

    pub async fn is_sync_complete(&self, resource: &str) -> bool {
        self.inner.read().await.completed_syncs.contains(resource)
    }

    pub async fn started_at(&self) -> Option<DateTime<Utc>> {
        self.inner.read().await.started_at
    }

    pub async fn clear(&self) {
        *self.inner.write().await = SessionState::default();
        info!("session: cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn initialize_then_logout_clears_everything() {
        let session = SessionContext::new();
        session.initialize(Some("token-1".into())).await;
        session.mark_sync_complete("products").await;

        assert!(session.is_authenticated().await);
        assert!(session.is_sync_complete("products").await);
        assert!(!session.is_sync_complete("orders").await);
        assert!(session.started_at().await.is_some());

        session.clear().await;
        assert!(!session.is_authenticated().await);
        assert!(!session.is_sync_complete("products").await);
        assert!(session.started_at().await.is_none());
    }

    #[tokio::test]
    async fn empty_token_counts_as_anonymous() {
        let session = SessionContext::new();
        session.initialize(Some(String::new())).await;
        assert!(session.bearer_token().await.is_none());
    }

    #[tokio::test]
    async fn revoking_keeps_sync_flags() {
        let session = SessionContext::new();
        session.initialize(Some("token-1".into())).await;
        session.mark_sync_complete("products").await;

        session.revoke_token().await;
        assert!(!session.is_authenticated().await);
        assert!(session.is_sync_complete("products").await);
    }

    #[tokio::test]
    async fn reinitializing_resets_sync_flags() {
        let session = SessionContext::new();
        session.initialize(Some("token-1".into())).await;
        session.mark_sync_complete("products").await;
        session.initialize(Some("token-2".into())).await;

        assert_eq!(session.bearer_token().await.as_deref(), Some("token-2"));
        assert!(!session.is_sync_complete("products").await);
    }
}
