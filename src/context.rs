//! Evaluation context and result types
//!
//! The engine is pure with respect to the context: the caller assembles
//! subject, resource, action, subscription limits, and request environment,
//! and the engine never fetches attributes on its own.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Arbitrary attribute map attached to subjects, resources, and fields.
pub type AttrMap = Map<String, Value>;

/// The requesting subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub tier: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub attributes: AttrMap,
    /// Usage counters (e.g. how many forms the subject has created),
    /// exposed to custom expressions as `user.stats.*`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<AttrMap>,
}

impl Subject {
    pub fn new(id: &str) -> Self {
        Subject {
            id: id.to_string(),
            role: String::new(),
            tier: String::new(),
            attributes: AttrMap::new(),
            stats: None,
        }
    }

    pub fn with_role(mut self, role: &str) -> Self {
        self.role = role.to_string();
        self
    }

    pub fn with_tier(mut self, tier: &str) -> Self {
        self.tier = tier.to_string();
        self
    }

    pub fn with_attr(mut self, key: &str, value: Value) -> Self {
        self.attributes.insert(key.to_string(), value);
        self
    }

    pub fn with_stat(mut self, key: &str, value: Value) -> Self {
        self.stats
            .get_or_insert_with(AttrMap::new)
            .insert(key.to_string(), value);
        self
    }

    /// Look up a subject attribute: well-known fields first, then the
    /// free-form attribute map.
    pub(crate) fn attr(&self, field: &str) -> Option<Value> {
        match field {
            "id" => Some(Value::String(self.id.clone())),
            "role" => Some(Value::String(self.role.clone())),
            "tier" => Some(Value::String(self.tier.clone())),
            _ => self.attributes.get(field).cloned(),
        }
    }

    /// Record handed to the expression sandbox as `subject` / `user`.
    /// Free-form attributes sit at the top level; well-known fields win on
    /// key collisions.
    pub(crate) fn to_binding(&self) -> Value {
        let mut record = self.attributes.clone();
        record.insert("id".to_string(), Value::String(self.id.clone()));
        record.insert("role".to_string(), Value::String(self.role.clone()));
        record.insert("tier".to_string(), Value::String(self.tier.clone()));
        if let Some(stats) = &self.stats {
            record.insert("stats".to_string(), Value::Object(stats.clone()));
        }
        Value::Object(record)
    }
}

/// The resource being acted on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    #[serde(rename = "type")]
    pub kind: crate::pattern::ResourcePath,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visibility: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub attributes: AttrMap,
}

impl Resource {
    pub fn new(kind: &str) -> Self {
        Resource {
            kind: crate::pattern::ResourcePath::from(kind),
            id: None,
            owner: None,
            visibility: None,
            attributes: AttrMap::new(),
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn with_owner(mut self, owner: &str) -> Self {
        self.owner = Some(owner.to_string());
        self
    }

    pub fn with_visibility(mut self, visibility: &str) -> Self {
        self.visibility = Some(visibility.to_string());
        self
    }

    pub fn with_attr(mut self, key: &str, value: Value) -> Self {
        self.attributes.insert(key.to_string(), value);
        self
    }

    pub(crate) fn attr(&self, field: &str) -> Option<Value> {
        match field {
            "type" => Some(Value::String(self.kind.to_string())),
            "id" => self.id.clone().map(Value::String),
            "owner" => self.owner.clone().map(Value::String),
            "visibility" => self.visibility.clone().map(Value::String),
            _ => self.attributes.get(field).cloned(),
        }
    }

    /// Record handed to the expression sandbox as `resource`.
    pub(crate) fn to_binding(&self) -> Value {
        let mut record = self.attributes.clone();
        record.insert("type".to_string(), Value::String(self.kind.to_string()));
        if let Some(id) = &self.id {
            record.insert("id".to_string(), Value::String(id.clone()));
        }
        if let Some(owner) = &self.owner {
            record.insert("owner".to_string(), Value::String(owner.clone()));
        }
        if let Some(visibility) = &self.visibility {
            record.insert("visibility".to_string(), Value::String(visibility.clone()));
        }
        Value::Object(record)
    }
}

/// Subscription limits exposed to custom expressions as
/// `subscription.limits.*`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SubscriptionLimits {
    #[serde(default)]
    pub limits: AttrMap,
}

impl SubscriptionLimits {
    pub fn with_limit(mut self, key: &str, value: Value) -> Self {
        self.limits.insert(key.to_string(), value);
        self
    }
}

/// Request environment captured by the caller.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEnv {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    /// ISO country code, when geo resolution succeeded upstream.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Everything the engine needs to decide one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationContext {
    pub subject: Subject,
    pub resource: Resource,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription: Option<SubscriptionLimits>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<RequestEnv>,
}

impl EvaluationContext {
    pub fn new(subject: Subject, resource: Resource, action: &str) -> Self {
        EvaluationContext {
            subject,
            resource,
            action: action.to_string(),
            subscription: None,
            env: None,
        }
    }

    pub fn with_subscription(mut self, subscription: SubscriptionLimits) -> Self {
        self.subscription = Some(subscription);
        self
    }

    pub fn with_env(mut self, env: RequestEnv) -> Self {
        self.env = Some(env);
        self
    }

    /// Instant used for time-window clauses: the caller-supplied request
    /// timestamp when present (keeps evaluation replayable), otherwise now.
    pub(crate) fn evaluation_time(&self) -> DateTime<Utc> {
        self.env
            .as_ref()
            .and_then(|env| env.timestamp)
            .unwrap_or_else(Utc::now)
    }
}

/// Outcome of one evaluation.
///
/// `allowed` holds exactly when no matching policy denied and at least one
/// allowed. Both id lists are always complete, in priority order, so audit
/// logs can report every contributing policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    pub allowed: bool,
    pub denied_by: Vec<String>,
    pub allowed_by: Vec<String>,
}

/// A child attribute of a resource, as seen by field filtering.
///
/// Callers with richer field types implement [`FieldView`] instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceField {
    pub name: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub attributes: AttrMap,
}

impl ResourceField {
    pub fn new(name: &str) -> Self {
        ResourceField {
            name: name.to_string(),
            attributes: AttrMap::new(),
        }
    }

    pub fn with_attr(mut self, key: &str, value: Value) -> Self {
        self.attributes.insert(key.to_string(), value);
        self
    }
}

/// Field filtering works over any element type that can expose its
/// attribute map.
pub trait FieldView {
    fn attributes(&self) -> &AttrMap;
}

impl FieldView for ResourceField {
    fn attributes(&self) -> &AttrMap {
        &self.attributes
    }
}
