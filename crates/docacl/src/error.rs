//! Error types for policy construction and authorization.

use docacl_formula::FormulaError;
use thiserror::Error;

use crate::permissions::{Bit, PermissionTextError};
use crate::resource::ResourceError;

/// A persisted rule set that cannot be turned into a [`Policy`](crate::Policy).
///
/// Fatal to loading a document's policy. Callers must refuse access to the
/// document rather than fall back to an empty policy.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PolicyError {
    /// The same resource is declared by more than one resource record.
    #[error("resource {resource} is declared more than once")]
    DuplicateResource { resource: String },

    /// Two resource records share an id.
    #[error("resource record id {id} is used more than once")]
    DuplicateResourceId { id: u64 },

    /// Two rule parts share an id.
    #[error("rule id {id} is used more than once")]
    DuplicateRuleId { id: u64 },

    /// A rule record names a resource record that does not exist.
    #[error("rule {rule} refers to unknown resource record {resource}")]
    UnknownResource { rule: u64, resource: u64 },

    /// A resource record cannot be decoded.
    #[error("resource record {id} is invalid: {source}")]
    InvalidResource {
        id: u64,
        #[source]
        source: ResourceError,
    },

    /// A rule's condition does not parse.
    #[error("rule {rule} has an invalid condition `{formula}`: {source}")]
    InvalidFormula {
        rule: u64,
        formula: String,
        #[source]
        source: FormulaError,
    },

    /// A rule's permission text does not parse.
    #[error("rule {rule} has invalid permissions: {source}")]
    InvalidPermissions {
        rule: u64,
        #[source]
        source: PermissionTextError,
    },

    /// A rule's position is not a finite number.
    #[error("rule {rule} has a non-finite position")]
    InvalidPosition { rule: u64 },

    /// An edit addressed a rule part that does not exist.
    #[error("resource {resource} has no rule part at index {index}")]
    NoSuchPart { resource: String, index: usize },
}

/// An operation rejected by the policy.
///
/// Returned as a value; a denial is an expected outcome, not a fault.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{action} denied: requires {}{}", bit_list(.denied), memo_suffix(.memos))]
pub struct AccessDenied {
    /// The operation that was attempted, e.g. `RenameTable(T1)`.
    pub action: String,
    /// Required bits that resolved to deny.
    pub denied: Vec<Bit>,
    /// Explanations from every rule part that denied a required bit.
    pub memos: Vec<String>,
}

fn bit_list(bits: &[Bit]) -> String {
    bits.iter().map(|bit| bit.letter()).collect()
}

fn memo_suffix(memos: &[String]) -> String {
    if memos.is_empty() {
        String::new()
    } else {
        format!(" ({})", memos.join("; "))
    }
}
