//! # docacl-formula: Access rule conditions
//!
//! Parses and evaluates the condition attached to each access rule part.
//! A condition is a small boolean expression over three bindings:
//!
//! | Binding  | Meaning                                         |
//! |----------|-------------------------------------------------|
//! | `user`   | The requesting user (`user.Email`, `user.Access`, custom attributes) |
//! | `rec`    | The existing row, keyed by column id (`rec.Owner`, `rec.id`) |
//! | `newRec` | The proposed row for an add or update           |
//!
//! The role constants `OWNER`, `EDITOR` and `VIEWER` compare against
//! `user.Access`. Operators: `==`, `!=`, `<`, `<=`, `>`, `>=`, `in`,
//! `not in`, `is`, `is not`, `and`, `or`, `not` (also `&&`, `||`, `!`).
//!
//! ```
//! use docacl_formula::{Bindings, Formula};
//! use docacl_types::{Access, Record, UserInfo};
//!
//! let formula = Formula::parse("rec.Owner == user.Email or user.Access == OWNER")?;
//!
//! let user = UserInfo::new("ada@example.com", Access::Editor);
//! let row = Record::new(1).with("Owner", "ada@example.com");
//!
//! let matched = formula.evaluate(&Bindings::new(&user).with_rec(&row), 1_000)?;
//! assert!(matched);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Parsing resolves every name up front, so a formula that parses can only
//! fail at evaluation time because of the data bound to it (a missing
//! column, a type mismatch) or because it ran out of evaluation budget.

mod ast;
mod error;
mod eval;
mod lexer;
mod parser;

use std::fmt;

pub use ast::{Binding, CompareOp, Expr, Literal, References};
pub use error::{EvalError, FormulaError};
pub use eval::{Bindings, Budget, DEFAULT_EVALUATION_BUDGET};

/// A parsed condition formula.
///
/// A blank formula is the "everyone" condition and always matches.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    source: String,
    expr: Option<Expr>,
}

impl Formula {
    /// Parses formula text.
    pub fn parse(source: &str) -> Result<Self, FormulaError> {
        let expr = parser::parse(source)?;
        Ok(Self {
            source: source.trim().to_string(),
            expr,
        })
    }

    /// The condition that matches everyone.
    pub fn always() -> Self {
        Self {
            source: String::new(),
            expr: None,
        }
    }

    /// Returns whether this is the blank "everyone" condition.
    pub fn is_always(&self) -> bool {
        self.expr.is_none()
    }

    /// The trimmed source text.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> Option<&Expr> {
        self.expr.as_ref()
    }

    /// Names this formula reads from its bindings.
    pub fn references(&self) -> References {
        let mut refs = References::default();
        if let Some(expr) = &self.expr {
            expr.collect_references(&mut refs);
        }
        refs
    }

    /// Evaluates the condition with at most `budget` evaluation steps.
    pub fn evaluate(&self, bindings: &Bindings<'_>, budget: u32) -> Result<bool, EvalError> {
        match &self.expr {
            None => Ok(true),
            Some(expr) => {
                let mut budget = Budget::new(budget);
                eval::evaluate(expr, bindings, &mut budget).map(|value| value.is_truthy())
            }
        }
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.source.is_empty() {
            f.write_str("(everyone)")
        } else {
            f.write_str(&self.source)
        }
    }
}

#[cfg(test)]
mod tests;
