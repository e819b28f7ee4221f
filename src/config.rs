//! Engine configuration
//!
//! Tunables for the policy cache and the expression sandbox. The defaults
//! match the production deployment: 5-minute policy staleness window and a
//! 10ms budget for administrator-supplied expressions.

use std::time::Duration;

/// Configuration for [`PolicyEngine`](crate::PolicyEngine).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum age of the cached policy snapshot before `get()` reloads
    /// from the store.
    pub cache_ttl: Duration,

    /// Execution budget for a single custom-expression evaluation. A
    /// pathological expression is cut off at this deadline and the clause
    /// fails closed.
    pub expr_budget: Duration,

    /// Maximum accepted byte length of a custom expression.
    pub expr_max_len: usize,

    /// Maximum nesting depth of a custom expression.
    pub expr_max_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            cache_ttl: Duration::from_secs(300),
            expr_budget: Duration::from_millis(10),
            expr_max_len: 4096,
            expr_max_depth: 32,
        }
    }
}
