//! Policy store boundary
//!
//! The engine only ever reads policies; create/update/delete belong to an
//! admin surface that is expected to call
//! [`PolicyEngine::invalidate_cache`](crate::PolicyEngine::invalidate_cache)
//! after any mutation.

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::Result;
use crate::policy::Policy;

/// Read contract for externally stored custom policies.
///
/// Implementations typically wrap a database or an HTTP service. A load
/// failure must surface as [`PolicyLoadError`](crate::PolicyLoadError) so
/// the caller can refuse the request instead of defaulting open.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Return every custom policy, enabled or not.
    async fn load_policies(&self) -> Result<Vec<Policy>>;
}

/// In-memory policy store for embedding and tests.
#[derive(Default)]
pub struct InMemoryPolicyStore {
    policies: RwLock<Vec<Policy>>,
}

impl InMemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policies(policies: Vec<Policy>) -> Self {
        InMemoryPolicyStore {
            policies: RwLock::new(policies),
        }
    }

    /// Insert or replace a policy by id.
    pub fn put(&self, policy: Policy) {
        let mut policies = self.policies.write();
        match policies.iter_mut().find(|existing| existing.id == policy.id) {
            Some(existing) => *existing = policy,
            None => policies.push(policy),
        }
    }

    pub fn remove(&self, id: &str) {
        self.policies.write().retain(|policy| policy.id != id);
    }

    pub fn len(&self) -> usize {
        self.policies.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.read().is_empty()
    }
}

#[async_trait]
impl PolicyStore for InMemoryPolicyStore {
    async fn load_policies(&self) -> Result<Vec<Policy>> {
        Ok(self.policies.read().clone())
    }
}
