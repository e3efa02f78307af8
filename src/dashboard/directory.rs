//! Agent directory
//!
//! Profile lookups go through a short-TTL dedup cache: several views asking
//! for the same agent at once share a single request.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::adapters::DashboardApi;
use crate::domain::{AgentKey, AgentProfile};
use crate::error::Result;
use crate::sync::{CacheStats, Clock, DedupCache};

pub struct AgentDirectory {
    api: Arc<dyn DashboardApi>,
    cache: DedupCache<AgentKey, AgentProfile>,
    ttl: Duration,
    shutdown: CancellationToken,
}

impl AgentDirectory {
    pub fn new(api: Arc<dyn DashboardApi>, ttl: Duration) -> Self {
        Self {
            api,
            cache: DedupCache::new(),
            ttl,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_clock(api: Arc<dyn DashboardApi>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            api,
            cache: DedupCache::with_clock(clock),
            ttl,
            shutdown: CancellationToken::new(),
        }
    }

    /// Agent enrolled by a user.
    pub async fn by_user(&self, user_id: i64) -> Result<AgentProfile> {
        self.get(AgentKey::User(user_id)).await
    }

    /// Agent by its own id.
    pub async fn by_id(&self, agent_id: i64) -> Result<AgentProfile> {
        self.get(AgentKey::Id(agent_id)).await
    }

    pub async fn get(&self, key: AgentKey) -> Result<AgentProfile> {
        let api = Arc::clone(&self.api);
        // shared loads outlive any single caller; only close() cancels them
        let token = self.shutdown.child_token();
        self.cache
            .get(key, self.ttl, move || async move { api.agent(key, token).await })
            .await
    }

    /// Force the next lookup of `key` to hit the backend.
    pub fn invalidate(&self, key: AgentKey) {
        self.cache.invalidate(&key);
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Cancel in-flight lookups and forget cached profiles.
    pub fn close(&self) {
        self.shutdown.cancel();
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MockDashboardApi;
    use serde_json::Map;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn profile(id: i64) -> AgentProfile {
        AgentProfile {
            id,
            user_id: Some(100 + id),
            name: Some(format!("agent-{id}")),
            extra: Map::new(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_lookups_share_one_request() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut api = MockDashboardApi::new();
        api.expect_agent().returning(move |key, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            match key {
                AgentKey::User(user) => Ok(profile(user - 100)),
                AgentKey::Id(id) => Ok(profile(id)),
            }
        });
        let directory = AgentDirectory::new(Arc::new(api), Duration::from_millis(5_000));

        let (a, b, c) = tokio::join!(
            directory.by_user(107),
            directory.by_user(107),
            directory.by_user(107)
        );
        assert_eq!(a.unwrap().id, 7);
        assert_eq!(b.unwrap().id, 7);
        assert_eq!(c.unwrap().id, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // different key, different request
        assert_eq!(directory.by_id(7).await.unwrap().id, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_profile_refetched_after_ttl() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut api = MockDashboardApi::new();
        api.expect_agent().returning(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(profile(1))
        });
        let directory = AgentDirectory::new(Arc::new(api), Duration::from_millis(5_000));

        directory.by_id(1).await.unwrap();
        tokio::time::advance(Duration::from_millis(4_000)).await;
        directory.by_id(1).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_millis(1_500)).await;
        directory.by_id(1).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        directory.invalidate(AgentKey::Id(1));
        directory.by_id(1).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(directory.stats().hits, 1);
    }
}
