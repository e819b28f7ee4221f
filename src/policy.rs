//! Policy document structure
//!
//! Policies pair a resource/action pattern with an effect, an optional
//! condition set, and a priority. Custom policies arrive from the policy
//! store as JSON; the compiled-in defaults are built through the same type.

use chrono::{DateTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::pattern::{ActionPattern, ResourcePattern};

/// Effect of a policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    /// Allow the action
    Allow,
    /// Deny the action (takes precedence over Allow)
    Deny,
}

/// Comparison operator for attribute and ownership clauses.
///
/// Operators not in this list deserialize to [`Unrecognized`] and always
/// evaluate to false rather than failing the whole policy load.
///
/// [`Unrecognized`]: ComparisonOp::Unrecognized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ComparisonOp {
    Equals,
    NotEquals,
    In,
    NotIn,
    Greater,
    Less,
    GreaterOrEqual,
    LessOrEqual,
    Contains,
    StartsWith,
    EndsWith,
    #[serde(other)]
    Unrecognized,
}

/// Which attribute record an attribute clause reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeSource {
    #[default]
    Subject,
    Resource,
}

/// One attribute comparison within a condition set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeClause {
    #[serde(default)]
    pub source: AttributeSource,
    pub field: String,
    pub operator: ComparisonOp,
    pub value: Value,
}

/// Ownership clause: compared against resource attributes, with the
/// `{{user.id}}` placeholder in the expected value resolved to the
/// subject's id at evaluation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnershipClause {
    pub field: String,
    #[serde(default = "default_equals")]
    pub operator: ComparisonOp,
    pub value: Value,
}

fn default_equals() -> ComparisonOp {
    ComparisonOp::Equals
}

impl OwnershipClause {
    /// Standard ownership check: resource attribute `field` must equal the
    /// requesting subject's id.
    pub fn owner_of(field: &str) -> Self {
        OwnershipClause {
            field: field.to_string(),
            operator: ComparisonOp::Equals,
            value: Value::String(crate::condition::USER_ID_PLACEHOLDER.to_string()),
        }
    }
}

/// Hour-of-day window, end-exclusive.
///
/// `start > end` wraps past midnight: `{start: 22, end: 6}` covers 22:00
/// through 05:59. `start == end` is the empty window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourRange {
    pub start: u8,
    pub end: u8,
}

impl HourRange {
    pub fn contains(&self, hour: u8) -> bool {
        if self.start <= self.end {
            hour >= self.start && hour < self.end
        } else {
            hour >= self.start || hour < self.end
        }
    }
}

/// Time window clause. Every specified sub-check must hold.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeClause {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_before: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_after: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hours: Option<HourRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days: Option<Vec<Weekday>>,
}

/// Geography clause over ISO country codes, compared case-insensitively.
///
/// An unknown request country passes unconditionally, including past a
/// deny-list. That fail-open default is deliberate (unknown-origin traffic
/// is not blocked) and security-relevant for Deny-based geo restrictions.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoClause {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deny: Option<Vec<String>>,
}

/// Condition set attached to a policy. All present clauses must hold.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionSet {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<AttributeClause>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ownership: Option<OwnershipClause>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<TimeClause>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geo: Option<GeoClause>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom: Option<String>,
}

impl ConditionSet {
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
            && self.ownership.is_none()
            && self.time.is_none()
            && self.geo.is_none()
            && self.custom.is_none()
    }
}

/// A single access-control policy.
///
/// A policy without a condition set matches unconditionally whenever its
/// resource/action patterns and subject scope match.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    /// Unique policy id, reported in evaluation results for audit.
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub resource: ResourcePattern,
    pub action: ActionPattern,
    pub effect: Effect,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conditions: Option<ConditionSet>,
    /// Higher priority policies sort first in evaluation results.
    #[serde(default)]
    pub priority: i32,
    /// When set, the policy only applies to this subject.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_enabled() -> bool {
    true
}

impl Policy {
    /// Create an enabled policy with priority 0 and no conditions.
    pub fn new(id: &str, name: &str, resource: &str, action: &str, effect: Effect) -> Self {
        let now = Utc::now();
        Policy {
            id: id.to_string(),
            name: name.to_string(),
            description: None,
            resource: ResourcePattern::from(resource),
            action: ActionPattern::from(action),
            effect,
            conditions: None,
            priority: 0,
            subject_id: None,
            enabled: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_conditions(mut self, conditions: ConditionSet) -> Self {
        self.conditions = Some(conditions);
        self
    }

    /// Scope the policy to a single subject id.
    pub fn with_subject(mut self, subject_id: &str) -> Self {
        self.subject_id = Some(subject_id.to_string());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Parse a policy from its JSON wire format.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
