//! Policy applicability
//!
//! Decides whether one policy applies to one evaluation context. Ordering
//! and deny/allow resolution live in the engine; this module only answers
//! "does this policy speak to this request at all".

use crate::condition::ConditionEvaluator;
use crate::context::EvaluationContext;
use crate::policy::Policy;

pub struct PolicyMatcher {
    conditions: ConditionEvaluator,
}

impl PolicyMatcher {
    pub fn new(conditions: ConditionEvaluator) -> Self {
        PolicyMatcher { conditions }
    }

    /// A policy matches iff it is enabled, its resource and action patterns
    /// cover the context, its subject scope (when present) names the
    /// requesting subject, and every condition clause holds.
    pub fn matches(&self, policy: &Policy, ctx: &EvaluationContext) -> bool {
        if !policy.enabled {
            return false;
        }
        if !policy.resource.matches(&ctx.resource.kind) {
            return false;
        }
        if !policy.action.matches(&ctx.action) {
            return false;
        }
        if let Some(scope) = &policy.subject_id {
            if scope != &ctx.subject.id {
                return false;
            }
        }
        match &policy.conditions {
            // No condition set: matches unconditionally
            None => true,
            Some(set) => self.conditions.holds(set, ctx, &policy.id),
        }
    }
}
