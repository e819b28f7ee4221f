use thiserror::Error;

/// Errors surfaced to callers of the evaluation API.
///
/// A failed policy load always aborts evaluation; it is never converted
/// into an allow decision by this crate.
#[derive(Error, Debug)]
pub enum PolicyLoadError {
    #[error("policy store unavailable: {0}")]
    StoreUnavailable(#[from] anyhow::Error),

    #[error("malformed policy document: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Errors raised inside the expression sandbox.
///
/// These never cross the evaluation API: the condition evaluator catches
/// them, logs the offending expression, and treats the clause as
/// unsatisfied.
#[derive(Error, Debug)]
pub enum ExprError {
    #[error("parse error at offset {pos}: {msg}")]
    Parse { pos: usize, msg: String },

    #[error("unknown binding: {0} (expected subject, user, resource, or subscription)")]
    UnknownBinding(String),

    #[error("expression did not evaluate to a boolean")]
    NotBoolean,

    #[error("expression exceeds {0} byte limit")]
    TooLong(usize),

    #[error("expression nesting exceeds depth limit {0}")]
    TooDeep(usize),

    #[error("execution budget exhausted")]
    BudgetExhausted,
}

pub type Result<T> = std::result::Result<T, PolicyLoadError>;
