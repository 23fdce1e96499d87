//! Formula error types.
//!
//! Parse errors are fatal to loading a rule; evaluation errors make a
//! condition non-matching.

use thiserror::Error;

/// Error raised while parsing a formula.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormulaError {
    #[error("unexpected character `{ch}` at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },

    #[error("unterminated string literal starting at offset {offset}")]
    UnterminatedString { offset: usize },

    #[error("invalid number `{0}`")]
    InvalidNumber(String),

    #[error("unknown name `{0}` (expected user, rec, newRec, OWNER, EDITOR or VIEWER)")]
    UnknownName(String),

    #[error("expected attribute name after `.`")]
    ExpectedAttribute,

    #[error("unexpected {found}, expected {expected}")]
    UnexpectedToken { found: String, expected: &'static str },

    #[error("unexpected end of formula, expected {expected}")]
    UnexpectedEnd { expected: &'static str },

    #[error("formula nests deeper than {limit} levels")]
    TooDeep { limit: usize },

    #[error("formula has more than {limit} `and`/`or` connectives")]
    TooManyConnectives { limit: usize },
}

/// Error raised while evaluating a parsed formula.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    /// `rec` or `newRec` was referenced but nothing is bound to it.
    #[error("`{0}` is not available for this check")]
    Unbound(&'static str),

    #[error("{binding} has no column `{column}`")]
    UnknownColumn {
        binding: &'static str,
        column: String,
    },

    #[error("no attribute `{0}`")]
    UnknownAttribute(String),

    #[error("cannot apply `{op}` to {left} and {right}")]
    TypeMismatch {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },

    #[error("evaluation budget of {budget} steps exhausted")]
    BudgetExhausted { budget: u32 },
}

impl EvalError {
    /// Returns whether the failure only means a row binding was absent.
    ///
    /// Checks made without a row (column visibility, table-level
    /// pre-checks) hit this routinely; it is not a fault in the rule.
    pub fn is_unbound(&self) -> bool {
        matches!(self, EvalError::Unbound(_))
    }
}
