//! Condition evaluation
//!
//! Total predicate functions for each condition clause kind. Nothing here
//! throws: missing attributes, type mismatches, and unrecognized operators
//! all evaluate to false, and custom-expression sandbox errors are caught,
//! logged, and treated as unsatisfied. The one documented exception is the
//! geography clause, which passes when the request country is unknown.

use serde_json::Value;

use crate::context::EvaluationContext;
use crate::expr::{Bindings, ExpressionSandbox};
use crate::policy::{
    AttributeClause, AttributeSource, ComparisonOp, ConditionSet, GeoClause, OwnershipClause,
    TimeClause,
};

/// Placeholder in ownership clause values, resolved to the subject id.
pub(crate) const USER_ID_PLACEHOLDER: &str = "{{user.id}}";

/// Evaluates the clauses of a condition set against an evaluation context.
pub struct ConditionEvaluator {
    sandbox: ExpressionSandbox,
}

impl ConditionEvaluator {
    pub fn new(sandbox: ExpressionSandbox) -> Self {
        ConditionEvaluator { sandbox }
    }

    /// AND semantics: every present clause must hold. An empty set holds.
    ///
    /// `policy_id` is only used to attribute sandbox failures in the log.
    pub fn holds(&self, set: &ConditionSet, ctx: &EvaluationContext, policy_id: &str) -> bool {
        set.attributes.iter().all(|clause| attribute_holds(clause, ctx))
            && set
                .ownership
                .as_ref()
                .is_none_or(|clause| ownership_holds(clause, ctx))
            && set.time.as_ref().is_none_or(|clause| time_holds(clause, ctx))
            && set.geo.as_ref().is_none_or(|clause| geo_holds(clause, ctx))
            && set
                .custom
                .as_ref()
                .is_none_or(|expr| self.custom_holds(expr, ctx, policy_id))
    }

    /// Sandbox delegation. Any sandbox error fails closed.
    fn custom_holds(&self, expression: &str, ctx: &EvaluationContext, policy_id: &str) -> bool {
        let subscription = ctx
            .subscription
            .as_ref()
            .and_then(|limits| serde_json::to_value(limits).ok())
            .unwrap_or(Value::Null);
        let bindings = Bindings::new(
            ctx.subject.to_binding(),
            ctx.resource.to_binding(),
            subscription,
        );

        match self.sandbox.evaluate(expression, &bindings) {
            Ok(satisfied) => satisfied,
            Err(err) => {
                tracing::warn!(
                    "Custom condition failed in policy {}: {} (expression: {:?})",
                    policy_id,
                    err,
                    expression
                );
                false
            }
        }
    }
}

fn attribute_holds(clause: &AttributeClause, ctx: &EvaluationContext) -> bool {
    let actual = match clause.source {
        AttributeSource::Subject => ctx.subject.attr(&clause.field),
        AttributeSource::Resource => ctx.resource.attr(&clause.field),
    };
    match actual {
        Some(actual) => compare(clause.operator, &actual, &clause.value),
        // Missing attribute fails the clause regardless of operator
        None => false,
    }
}

fn ownership_holds(clause: &OwnershipClause, ctx: &EvaluationContext) -> bool {
    let expected = resolve_placeholder(&clause.value, &ctx.subject.id);
    match ctx.resource.attr(&clause.field) {
        Some(actual) => compare(clause.operator, &actual, &expected),
        None => false,
    }
}

fn resolve_placeholder(value: &Value, subject_id: &str) -> Value {
    match value {
        Value::String(s) if s.contains(USER_ID_PLACEHOLDER) => {
            Value::String(s.replace(USER_ID_PLACEHOLDER, subject_id))
        }
        other => other.clone(),
    }
}

fn time_holds(clause: &TimeClause, ctx: &EvaluationContext) -> bool {
    use chrono::{Datelike, Timelike};

    let now = ctx.evaluation_time();

    if let Some(not_before) = clause.not_before {
        if now < not_before {
            return false;
        }
    }
    if let Some(not_after) = clause.not_after {
        if now > not_after {
            return false;
        }
    }
    if let Some(hours) = clause.hours {
        if !hours.contains(now.hour() as u8) {
            return false;
        }
    }
    if let Some(days) = &clause.days {
        if !days.contains(&now.weekday()) {
            return false;
        }
    }
    true
}

fn geo_holds(clause: &GeoClause, ctx: &EvaluationContext) -> bool {
    let country = ctx.env.as_ref().and_then(|env| env.country.as_deref());
    let country = match country {
        Some(code) => code,
        // Unknown origin passes: fail-open so unresolved traffic is not
        // blocked by geo restrictions
        None => return true,
    };

    if let Some(allow) = &clause.allow {
        return allow.iter().any(|code| code.eq_ignore_ascii_case(country));
    }
    if let Some(deny) = &clause.deny {
        return !deny.iter().any(|code| code.eq_ignore_ascii_case(country));
    }
    true
}

/// Operator dispatch over JSON values. Type mismatches and unrecognized
/// operators evaluate to false.
pub(crate) fn compare(op: ComparisonOp, actual: &Value, expected: &Value) -> bool {
    match op {
        ComparisonOp::Equals => loose_eq(actual, expected),
        ComparisonOp::NotEquals => !loose_eq(actual, expected),
        ComparisonOp::In => member_of(expected, actual),
        ComparisonOp::NotIn => match expected {
            Value::Array(_) => !member_of(expected, actual),
            _ => false,
        },
        ComparisonOp::Greater => matches!(ordering(actual, expected), Some(o) if o.is_gt()),
        ComparisonOp::Less => matches!(ordering(actual, expected), Some(o) if o.is_lt()),
        ComparisonOp::GreaterOrEqual => matches!(ordering(actual, expected), Some(o) if o.is_ge()),
        ComparisonOp::LessOrEqual => matches!(ordering(actual, expected), Some(o) if o.is_le()),
        ComparisonOp::Contains => match (actual, expected) {
            (Value::String(haystack), Value::String(needle)) => haystack.contains(needle),
            (Value::Array(items), needle) => items.iter().any(|item| loose_eq(item, needle)),
            _ => false,
        },
        ComparisonOp::StartsWith => match (actual, expected) {
            (Value::String(s), Value::String(prefix)) => s.starts_with(prefix),
            _ => false,
        },
        ComparisonOp::EndsWith => match (actual, expected) {
            (Value::String(s), Value::String(suffix)) => s.ends_with(suffix),
            _ => false,
        },
        ComparisonOp::Unrecognized => {
            tracing::warn!("Unrecognized comparison operator; clause evaluates to false");
            false
        }
    }
}

fn member_of(collection: &Value, item: &Value) -> bool {
    match collection {
        Value::Array(items) => items.iter().any(|candidate| loose_eq(candidate, item)),
        _ => false,
    }
}

fn loose_eq(lhs: &Value, rhs: &Value) -> bool {
    match (lhs.as_f64(), rhs.as_f64()) {
        (Some(l), Some(r)) => l == r,
        _ => lhs == rhs,
    }
}

fn ordering(lhs: &Value, rhs: &Value) -> Option<std::cmp::Ordering> {
    match (lhs, rhs) {
        (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
        _ => lhs.as_f64()?.partial_cmp(&rhs.as_f64()?),
    }
}
