//! Policy snapshot cache
//!
//! Holds the merged default+custom policy list with a time-boxed refresh
//! from the store. There is deliberately no refill mutex: concurrent
//! refreshes do duplicate, idempotent store reads, and the snapshot slot is
//! replaced as a single `Arc` swap so readers never observe a partially
//! updated list.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::error::Result;
use crate::policy::Policy;
use crate::store::PolicyStore;

struct Snapshot {
    policies: Arc<Vec<Policy>>,
    refreshed_at: Instant,
}

pub struct PolicyCache {
    store: Arc<dyn PolicyStore>,
    defaults: Vec<Policy>,
    ttl: Duration,
    slot: RwLock<Option<Snapshot>>,
}

impl PolicyCache {
    pub fn new(store: Arc<dyn PolicyStore>, defaults: Vec<Policy>, ttl: Duration) -> Self {
        PolicyCache {
            store,
            defaults,
            ttl,
            slot: RwLock::new(None),
        }
    }

    /// Combined default+custom policy list, reloaded from the store when
    /// the snapshot is missing or older than the TTL.
    ///
    /// Store failures propagate; stale data is never served past the TTL
    /// and a load error is never downgraded to an empty list.
    pub async fn get(&self) -> Result<Arc<Vec<Policy>>> {
        {
            let slot = self.slot.read();
            if let Some(snapshot) = slot.as_ref() {
                if snapshot.refreshed_at.elapsed() < self.ttl {
                    return Ok(Arc::clone(&snapshot.policies));
                }
            }
        }
        self.refresh().await
    }

    async fn refresh(&self) -> Result<Arc<Vec<Policy>>> {
        let custom = self.store.load_policies().await?;

        let mut merged = Vec::with_capacity(self.defaults.len() + custom.len());
        merged.extend(self.defaults.iter().cloned());
        merged.extend(custom);
        let policies = Arc::new(merged);

        *self.slot.write() = Some(Snapshot {
            policies: Arc::clone(&policies),
            refreshed_at: Instant::now(),
        });
        tracing::debug!("Policy cache refreshed: {} policies", policies.len());

        Ok(policies)
    }

    /// Drop the snapshot so the next `get()` reloads. Called by the admin
    /// layer after any policy mutation.
    pub fn invalidate(&self) {
        *self.slot.write() = None;
    }

    /// Whether a fresh snapshot is currently held.
    pub fn is_fresh(&self) -> bool {
        self.slot
            .read()
            .as_ref()
            .is_some_and(|snapshot| snapshot.refreshed_at.elapsed() < self.ttl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Effect;
    use crate::store::InMemoryPolicyStore;

    fn allow(id: &str) -> Policy {
        Policy::new(id, id, "*", "*", Effect::Allow)
    }

    #[tokio::test]
    async fn test_defaults_precede_custom_policies() {
        let store = Arc::new(InMemoryPolicyStore::with_policies(vec![allow("custom")]));
        let cache = PolicyCache::new(store, vec![allow("default")], Duration::from_secs(300));

        let policies = cache.get().await.unwrap();
        assert_eq!(policies.len(), 2);
        assert_eq!(policies[0].id, "default");
        assert_eq!(policies[1].id, "custom");
    }

    #[tokio::test]
    async fn test_snapshot_reused_within_ttl() {
        let store = Arc::new(InMemoryPolicyStore::new());
        let cache = PolicyCache::new(store.clone(), vec![], Duration::from_secs(300));

        let first = cache.get().await.unwrap();
        store.put(allow("late"));
        let second = cache.get().await.unwrap();

        // Same snapshot: the late policy is not visible yet
        assert!(Arc::ptr_eq(&first, &second));
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn test_invalidate_forces_reload() {
        let store = Arc::new(InMemoryPolicyStore::new());
        let cache = PolicyCache::new(store.clone(), vec![], Duration::from_secs(300));

        cache.get().await.unwrap();
        store.put(allow("late"));
        cache.invalidate();
        assert!(!cache.is_fresh());

        let reloaded = cache.get().await.unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded[0].id, "late");
    }

    #[tokio::test]
    async fn test_zero_ttl_always_reloads() {
        let store = Arc::new(InMemoryPolicyStore::new());
        let cache = PolicyCache::new(store.clone(), vec![], Duration::ZERO);

        cache.get().await.unwrap();
        store.put(allow("fresh"));
        let reloaded = cache.get().await.unwrap();
        assert_eq!(reloaded.len(), 1);
    }
}
