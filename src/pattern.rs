//! Resource and action patterns
//!
//! Resource types form a shallow `:`-separated hierarchy (e.g. `form`,
//! `form:field`, `template:page`). A pattern matches a concrete path when
//! it is the `*` wildcard, equals the path exactly, or shares the path's
//! base segment. Action patterns are flat: `*` or an exact verb.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A resource type as an ordered list of `:`-separated segments.
///
/// Parsing never fails; an empty string yields a single empty segment.
///
/// # Examples
/// ```
/// use warden_rs::ResourcePath;
///
/// let path = ResourcePath::from("form:field");
/// assert_eq!(path.base(), "form");
/// assert_eq!(path.to_string(), "form:field");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ResourcePath {
    segments: Vec<String>,
}

impl ResourcePath {
    /// First segment of the hierarchy (`form` for `form:field`).
    pub fn base(&self) -> &str {
        &self.segments[0]
    }

    /// Path segments in order.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Derive a child path by appending one segment.
    pub fn child(&self, segment: &str) -> ResourcePath {
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        ResourcePath { segments }
    }
}

impl From<&str> for ResourcePath {
    fn from(raw: &str) -> Self {
        ResourcePath {
            segments: raw.split(':').map(str::to_string).collect(),
        }
    }
}

impl From<String> for ResourcePath {
    fn from(raw: String) -> Self {
        ResourcePath::from(raw.as_str())
    }
}

impl From<ResourcePath> for String {
    fn from(path: ResourcePath) -> Self {
        path.to_string()
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join(":"))
    }
}

/// Resource pattern carried by a policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ResourcePattern {
    /// Matches every resource type.
    Any,
    /// Matches an exact path or anything under the same base segment.
    Path(ResourcePath),
}

impl ResourcePattern {
    /// Check whether a concrete resource path falls under this pattern.
    ///
    /// A non-wildcard pattern matches on exact equality or on base-segment
    /// equality, so the pattern `form` covers `form:field` and `form:*`
    /// covers plain `form`.
    pub fn matches(&self, path: &ResourcePath) -> bool {
        match self {
            ResourcePattern::Any => true,
            ResourcePattern::Path(pattern) => {
                pattern == path || pattern.base() == path.base()
            }
        }
    }
}

impl From<&str> for ResourcePattern {
    fn from(raw: &str) -> Self {
        if raw == "*" {
            ResourcePattern::Any
        } else {
            ResourcePattern::Path(ResourcePath::from(raw))
        }
    }
}

impl From<String> for ResourcePattern {
    fn from(raw: String) -> Self {
        ResourcePattern::from(raw.as_str())
    }
}

impl From<ResourcePattern> for String {
    fn from(pattern: ResourcePattern) -> Self {
        match pattern {
            ResourcePattern::Any => "*".to_string(),
            ResourcePattern::Path(path) => path.to_string(),
        }
    }
}

/// Action pattern carried by a policy: `*` or one exact verb.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActionPattern {
    Any,
    Exact(String),
}

impl ActionPattern {
    pub fn matches(&self, action: &str) -> bool {
        match self {
            ActionPattern::Any => true,
            ActionPattern::Exact(verb) => verb == action,
        }
    }
}

impl From<&str> for ActionPattern {
    fn from(raw: &str) -> Self {
        if raw == "*" {
            ActionPattern::Any
        } else {
            ActionPattern::Exact(raw.to_string())
        }
    }
}

impl From<String> for ActionPattern {
    fn from(raw: String) -> Self {
        ActionPattern::from(raw.as_str())
    }
}

impl From<ActionPattern> for String {
    fn from(pattern: ActionPattern) -> Self {
        match pattern {
            ActionPattern::Any => "*".to_string(),
            ActionPattern::Exact(verb) => verb,
        }
    }
}
