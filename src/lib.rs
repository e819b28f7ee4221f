//! # Warden - Attribute-Based Access Control
//!
//! Decides, per request, whether a subject may perform an action on a
//! resource, and which child attributes ("fields") of a resource may be
//! exposed to that subject.
//!
//! ## Features
//!
//! - **Priority-ordered policies** with explicit deny precedence and a
//!   default-deny posture
//! - **Multi-clause conditions**: attribute comparison, ownership, time
//!   windows, geography, and sandboxed custom expressions
//! - **Hierarchical resource types** (`form` covers `form:field`)
//! - **TTL-boxed policy cache** merging compiled-in defaults with an
//!   external store, refreshed by atomic snapshot replacement
//! - **Field-level filtering** that reuses the same policy evaluation per
//!   child attribute
//! - **Complete audit trail**: every contributing policy id is reported,
//!   not just the winning one
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use serde_json::json;
//! use warden_rs::{
//!     ConditionSet, Effect, EvaluationContext, InMemoryPolicyStore, OwnershipClause,
//!     Policy, PolicyEngine, Resource, Subject,
//! };
//!
//! # async fn demo() -> warden_rs::Result<()> {
//! // Subjects may do anything to forms they own
//! let own_forms = Policy::new("own-forms", "Own forms", "form", "*", Effect::Allow)
//!     .with_priority(100)
//!     .with_conditions(ConditionSet {
//!         ownership: Some(OwnershipClause::owner_of("userId")),
//!         ..ConditionSet::default()
//!     });
//!
//! let store = Arc::new(InMemoryPolicyStore::new());
//! let engine = PolicyEngine::new(store, vec![own_forms]);
//!
//! let ctx = EvaluationContext::new(
//!     Subject::new("u1").with_role("user"),
//!     Resource::new("form").with_attr("userId", json!("u1")),
//!     "update",
//! );
//!
//! let decision = engine.evaluate(&ctx).await?;
//! assert!(decision.allowed);
//! # Ok(())
//! # }
//! ```
//!
//! ## Failure semantics
//!
//! A policy store failure aborts evaluation with
//! [`PolicyLoadError`]; it is never converted into an allow. Everything
//! else fails closed (unrecognized operators, missing attributes, sandbox
//! parse errors and timeouts), with one documented exception: a geography
//! clause passes when the request country is unknown.

mod cache;
mod condition;
mod config;
mod context;
mod engine;
mod error;
mod expr;
mod matcher;
mod pattern;
mod policy;
mod store;

pub use condition::ConditionEvaluator;
pub use config::EngineConfig;
pub use context::{
    AttrMap, EvaluationContext, EvaluationResult, FieldView, RequestEnv, Resource, ResourceField,
    Subject, SubscriptionLimits,
};
pub use engine::PolicyEngine;
pub use error::{ExprError, PolicyLoadError, Result};
pub use expr::{Bindings, ExpressionSandbox};
pub use matcher::PolicyMatcher;
pub use pattern::{ActionPattern, ResourcePath, ResourcePattern};
pub use policy::{
    AttributeClause, AttributeSource, ComparisonOp, ConditionSet, Effect, GeoClause, HourRange,
    OwnershipClause, Policy, TimeClause,
};
pub use store::{InMemoryPolicyStore, PolicyStore};
