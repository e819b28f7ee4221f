//! Policy evaluation engine with deny precedence
//!
//! Orchestrates the cache fetch, per-policy matching, priority ordering,
//! and deny-overrides-allow resolution, plus per-field authorization
//! filtering on top of it. The engine owns all mutable state (the policy
//! snapshot cache); evaluation itself is stateless per call.

use std::sync::Arc;

use crate::cache::PolicyCache;
use crate::condition::ConditionEvaluator;
use crate::config::EngineConfig;
use crate::context::{AttrMap, EvaluationContext, EvaluationResult, FieldView};
use crate::error::Result;
use crate::expr::ExpressionSandbox;
use crate::matcher::PolicyMatcher;
use crate::policy::{Effect, Policy};
use crate::store::PolicyStore;

/// Attribute-based access control engine.
///
/// Construct one long-lived instance per process with a store handle and
/// the compiled-in default policies; it is cheap to share behind an `Arc`
/// and safe to call from arbitrary concurrent tasks.
pub struct PolicyEngine {
    cache: PolicyCache,
    matcher: PolicyMatcher,
}

impl PolicyEngine {
    /// Engine with production defaults (5-minute cache TTL, 10ms
    /// expression budget).
    pub fn new(store: Arc<dyn PolicyStore>, defaults: Vec<Policy>) -> Self {
        Self::with_config(store, defaults, EngineConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn PolicyStore>,
        defaults: Vec<Policy>,
        config: EngineConfig,
    ) -> Self {
        let sandbox =
            ExpressionSandbox::new(config.expr_budget, config.expr_max_len, config.expr_max_depth);
        PolicyEngine {
            cache: PolicyCache::new(store, defaults, config.cache_ttl),
            matcher: PolicyMatcher::new(ConditionEvaluator::new(sandbox)),
        }
    }

    /// Decide whether the context's subject may perform the action on the
    /// resource.
    ///
    /// Matching policies are sorted by priority descending (stable among
    /// equals) and partitioned into deny and allow id lists. The decision
    /// is deny-overrides-allow with a default deny: allowed iff nothing
    /// denied and at least one policy allowed. Both id lists are collected
    /// in full for audit, never short-circuited.
    ///
    /// # Errors
    ///
    /// Propagates [`PolicyLoadError`](crate::PolicyLoadError) when the
    /// policy store cannot be read. Callers must surface that as a server
    /// error, never as an allow.
    pub async fn evaluate(&self, ctx: &EvaluationContext) -> Result<EvaluationResult> {
        let policies = self.cache.get().await?;

        let mut matched: Vec<&Policy> = policies
            .iter()
            .filter(|policy| self.matcher.matches(policy, ctx))
            .collect();
        matched.sort_by(|a, b| b.priority.cmp(&a.priority));

        let mut denied_by = Vec::new();
        let mut allowed_by = Vec::new();
        for policy in matched {
            match policy.effect {
                Effect::Deny => denied_by.push(policy.id.clone()),
                Effect::Allow => allowed_by.push(policy.id.clone()),
            }
        }

        let allowed = denied_by.is_empty() && !allowed_by.is_empty();
        tracing::debug!(
            "Evaluated {} on {}: allowed={} ({} deny, {} allow)",
            ctx.action,
            ctx.resource.kind,
            allowed,
            denied_by.len(),
            allowed_by.len()
        );

        Ok(EvaluationResult {
            allowed,
            denied_by,
            allowed_by,
        })
    }

    /// Redact a resource's child attributes down to those the subject may
    /// read.
    ///
    /// Each field is evaluated against a synthetic sub-context: the
    /// resource type gains a `field` segment, the field's own attributes
    /// are merged over the parent's, and the action is fixed to `read`.
    /// Output preserves input order; an empty input yields an empty output.
    pub async fn filter_fields<F: FieldView>(
        &self,
        ctx: &EvaluationContext,
        fields: Vec<F>,
    ) -> Result<Vec<F>> {
        let mut kept = Vec::with_capacity(fields.len());
        for field in fields {
            let sub_ctx = field_context(ctx, field.attributes());
            if self.evaluate(&sub_ctx).await?.allowed {
                kept.push(field);
            }
        }
        Ok(kept)
    }

    /// Force the next evaluation to reload policies from the store. The
    /// admin layer calls this immediately after any policy mutation.
    pub fn invalidate_cache(&self) {
        self.cache.invalidate();
    }
}

/// Sub-context for one field read check.
fn field_context(ctx: &EvaluationContext, field_attrs: &AttrMap) -> EvaluationContext {
    let mut resource = ctx.resource.clone();
    resource.kind = ctx.resource.kind.child("field");
    for (key, value) in field_attrs {
        resource.attributes.insert(key.clone(), value.clone());
    }

    EvaluationContext {
        subject: ctx.subject.clone(),
        resource,
        action: "read".to_string(),
        subscription: ctx.subscription.clone(),
        env: ctx.env.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Resource, ResourceField, Subject};
    use crate::policy::{
        AttributeClause, AttributeSource, ComparisonOp, ConditionSet, OwnershipClause,
    };
    use crate::store::InMemoryPolicyStore;
    use serde_json::json;

    fn engine(policies: Vec<Policy>) -> PolicyEngine {
        PolicyEngine::new(Arc::new(InMemoryPolicyStore::with_policies(policies)), vec![])
    }

    #[tokio::test]
    async fn test_default_deny_with_no_matches() {
        let engine = engine(vec![]);
        let ctx = EvaluationContext::new(Subject::new("u1"), Resource::new("form"), "read");

        let result = engine.evaluate(&ctx).await.unwrap();
        assert!(!result.allowed);
        assert!(result.denied_by.is_empty());
        assert!(result.allowed_by.is_empty());
    }

    #[tokio::test]
    async fn test_single_allow() {
        let engine = engine(vec![Policy::new("p1", "read-forms", "form", "read", Effect::Allow)]);
        let ctx = EvaluationContext::new(Subject::new("u1"), Resource::new("form"), "read");

        let result = engine.evaluate(&ctx).await.unwrap();
        assert!(result.allowed);
        assert_eq!(result.allowed_by, vec!["p1"]);
    }

    #[tokio::test]
    async fn test_deny_overrides_allow_regardless_of_priority() {
        let engine = engine(vec![
            Policy::new("allow-high", "allow", "form", "*", Effect::Allow).with_priority(1000),
            Policy::new("deny-low", "deny", "form", "*", Effect::Deny).with_priority(1),
        ]);
        let ctx = EvaluationContext::new(Subject::new("u1"), Resource::new("form"), "read");

        let result = engine.evaluate(&ctx).await.unwrap();
        assert!(!result.allowed);
        assert_eq!(result.denied_by, vec!["deny-low"]);
        assert_eq!(result.allowed_by, vec!["allow-high"]);
    }

    #[tokio::test]
    async fn test_id_lists_follow_priority_order() {
        let engine = engine(vec![
            Policy::new("a", "a", "form", "*", Effect::Allow).with_priority(10),
            Policy::new("b", "b", "form", "*", Effect::Allow).with_priority(50),
            Policy::new("c", "c", "form", "*", Effect::Allow).with_priority(10),
        ]);
        let ctx = EvaluationContext::new(Subject::new("u1"), Resource::new("form"), "read");

        let result = engine.evaluate(&ctx).await.unwrap();
        // Stable sort: b first, then a and c in insertion order
        assert_eq!(result.allowed_by, vec!["b", "a", "c"]);
    }

    #[tokio::test]
    async fn test_scenario_ownership_allow() {
        // P1: allow any action on owned forms
        let p1 = Policy::new("P1", "own-forms", "form", "*", Effect::Allow)
            .with_priority(100)
            .with_conditions(ConditionSet {
                ownership: Some(OwnershipClause::owner_of("userId")),
                ..ConditionSet::default()
            });
        let engine = engine(vec![p1]);

        let ctx = EvaluationContext::new(
            Subject::new("u1"),
            Resource::new("form").with_attr("userId", json!("u1")),
            "update",
        );

        let result = engine.evaluate(&ctx).await.unwrap();
        assert!(result.allowed);
        assert_eq!(result.allowed_by, vec!["P1"]);
    }

    #[tokio::test]
    async fn test_scenario_non_admin_update_denied() {
        let p1 = Policy::new("P1", "own-forms", "form", "*", Effect::Allow)
            .with_priority(100)
            .with_conditions(ConditionSet {
                ownership: Some(OwnershipClause::owner_of("userId")),
                ..ConditionSet::default()
            });
        // P2: deny updates from non-admins, higher priority
        let p2 = Policy::new("P2", "admin-updates", "form", "update", Effect::Deny)
            .with_priority(150)
            .with_conditions(ConditionSet {
                attributes: vec![AttributeClause {
                    source: AttributeSource::Subject,
                    field: "role".to_string(),
                    operator: ComparisonOp::NotEquals,
                    value: json!("admin"),
                }],
                ..ConditionSet::default()
            });
        let engine = engine(vec![p1, p2]);

        let ctx = EvaluationContext::new(
            Subject::new("u1").with_role("user"),
            Resource::new("form").with_attr("userId", json!("u1")),
            "update",
        );

        let result = engine.evaluate(&ctx).await.unwrap();
        assert!(!result.allowed);
        assert_eq!(result.denied_by, vec!["P2"]);
        assert_eq!(result.allowed_by, vec!["P1"]);
    }

    #[tokio::test]
    async fn test_filter_fields_redacts_by_visibility() {
        // Fields are readable unless marked internal
        let engine = engine(vec![
            Policy::new("read-fields", "fields", "form:field", "read", Effect::Allow),
            Policy::new("hide-internal", "internal", "form:field", "read", Effect::Deny)
                .with_priority(10)
                .with_conditions(ConditionSet {
                    attributes: vec![AttributeClause {
                        source: AttributeSource::Resource,
                        field: "internal".to_string(),
                        operator: ComparisonOp::Equals,
                        value: json!(true),
                    }],
                    ..ConditionSet::default()
                }),
        ]);

        let ctx = EvaluationContext::new(Subject::new("u1"), Resource::new("form"), "read");
        let fields = vec![
            ResourceField::new("title"),
            ResourceField::new("secret_notes").with_attr("internal", json!(true)),
            ResourceField::new("status"),
        ];

        let kept = engine.filter_fields(&ctx, fields).await.unwrap();
        let names: Vec<&str> = kept.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["title", "status"]);
    }

    #[tokio::test]
    async fn test_filter_fields_empty_input() {
        let engine = engine(vec![]);
        let ctx = EvaluationContext::new(Subject::new("u1"), Resource::new("form"), "read");

        let kept = engine
            .filter_fields(&ctx, Vec::<ResourceField>::new())
            .await
            .unwrap();
        assert!(kept.is_empty());
    }

    #[tokio::test]
    async fn test_invalidate_cache_picks_up_mutation() {
        let store = Arc::new(InMemoryPolicyStore::new());
        let engine = PolicyEngine::new(store.clone(), vec![]);
        let ctx = EvaluationContext::new(Subject::new("u1"), Resource::new("form"), "read");

        assert!(!engine.evaluate(&ctx).await.unwrap().allowed);

        store.put(Policy::new("p1", "allow", "form", "read", Effect::Allow));
        engine.invalidate_cache();

        assert!(engine.evaluate(&ctx).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        struct FailingStore;

        #[async_trait::async_trait]
        impl PolicyStore for FailingStore {
            async fn load_policies(&self) -> Result<Vec<Policy>> {
                Err(crate::error::PolicyLoadError::StoreUnavailable(
                    anyhow::anyhow!("connection refused"),
                ))
            }
        }

        let engine = PolicyEngine::new(Arc::new(FailingStore), vec![]);
        let ctx = EvaluationContext::new(Subject::new("u1"), Resource::new("form"), "read");

        assert!(engine.evaluate(&ctx).await.is_err());
    }
}
