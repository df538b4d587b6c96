//! Error types. Every user-visible failure in the engine surfaces through
//! [`EngineError`] rather than a panic; the only panics left in the crate
//! are `unreachable!()`s for states the planner/executor should never
//! produce (genuine internal bugs, per spec.md 7).

use std::fmt;
use thiserror::Error;

/// Source location of a parse/resolution failure.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {} column {}", self.line, self.column)
    }
}

/// All error conditions the engine can report. Mirrors the error kinds
/// enumerated in spec.md 7 (Syntax, Resolution, Backend-open, Constraint,
/// Runtime, Plan-time sanity).
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    #[error("syntax error: {msg} at {loc}")]
    Syntax { msg: String, loc: Location },

    #[error("{msg}")]
    Resolution { msg: String },

    #[error("cannot open table '{spec}': {reason}")]
    BackendOpen { spec: String, reason: String },

    #[error("constraint violation: {msg}")]
    Constraint { msg: String },

    #[error("{msg}")]
    Runtime { msg: String },

    #[error("unbounded scan of {table}: a predicate is required")]
    Unbounded { table: String },
}

impl EngineError {
    pub fn syntax(msg: impl Into<String>, loc: Location) -> Self {
        EngineError::Syntax { msg: msg.into(), loc }
    }
    pub fn resolution(msg: impl Into<String>) -> Self {
        EngineError::Resolution { msg: msg.into() }
    }
    pub fn backend_open(spec: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::BackendOpen { spec: spec.into(), reason: reason.into() }
    }
    pub fn constraint(msg: impl Into<String>) -> Self {
        EngineError::Constraint { msg: msg.into() }
    }
    pub fn runtime(msg: impl Into<String>) -> Self {
        EngineError::Runtime { msg: msg.into() }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
