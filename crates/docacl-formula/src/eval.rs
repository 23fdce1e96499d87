//! Bounded evaluation of parsed formulas.
//!
//! Evaluation only reads the values bound in [`Bindings`]; there is no
//! function call or formula invocation, and every node visited spends one
//! step from a fixed budget, so a condition cannot loop or block.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use docacl_types::{CellValue, Record, UserInfo};

use crate::ast::{Binding, CompareOp, Expr, Literal};
use crate::error::EvalError;

/// Default number of evaluation steps allowed per condition.
pub const DEFAULT_EVALUATION_BUDGET: u32 = 10_000;

/// The environment a condition is evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct Bindings<'a> {
    pub user: &'a UserInfo,
    pub rec: Option<&'a Record>,
    pub new_rec: Option<&'a Record>,
}

impl<'a> Bindings<'a> {
    pub fn new(user: &'a UserInfo) -> Self {
        Self {
            user,
            rec: None,
            new_rec: None,
        }
    }

    pub fn with_rec(mut self, rec: &'a Record) -> Self {
        self.rec = Some(rec);
        self
    }

    pub fn with_new_rec(mut self, new_rec: &'a Record) -> Self {
        self.new_rec = Some(new_rec);
        self
    }
}

/// Remaining evaluation steps for one condition.
#[derive(Debug, Clone, Copy)]
pub struct Budget {
    limit: u32,
    remaining: u32,
}

impl Budget {
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            remaining: limit,
        }
    }

    fn spend(&mut self, steps: usize) -> Result<(), EvalError> {
        let steps = u32::try_from(steps).unwrap_or(u32::MAX);
        if steps > self.remaining {
            self.remaining = 0;
            return Err(EvalError::BudgetExhausted { budget: self.limit });
        }
        self.remaining -= steps;
        Ok(())
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }
}

impl Default for Budget {
    fn default() -> Self {
        Self::new(DEFAULT_EVALUATION_BUDGET)
    }
}

pub(crate) fn evaluate(
    expr: &Expr,
    bindings: &Bindings<'_>,
    budget: &mut Budget,
) -> Result<CellValue, EvalError> {
    budget.spend(1)?;
    match expr {
        Expr::Literal(lit) => Ok(literal_value(lit)),
        Expr::Binding(binding) => binding_value(*binding, bindings),
        Expr::Attribute { base, name } => match base.as_ref() {
            Expr::Binding(binding) => bound_attribute(*binding, name, bindings),
            other => {
                let value = evaluate(other, bindings, budget)?;
                field(&value, name)
            }
        },
        Expr::List(items) => items
            .iter()
            .map(|item| evaluate(item, bindings, budget))
            .collect::<Result<Vec<_>, _>>()
            .map(CellValue::List),
        Expr::Not(inner) => Ok(CellValue::Bool(
            !evaluate(inner, bindings, budget)?.is_truthy(),
        )),
        Expr::And(left, right) => connective(false, left, right, bindings, budget),
        Expr::Or(left, right) => connective(true, left, right, bindings, budget),
        Expr::Compare { op, left, right } => {
            let left = evaluate(left, bindings, budget)?;
            let right = evaluate(right, bindings, budget)?;
            compare(*op, &left, &right, budget).map(CellValue::Bool)
        }
    }
}

/// `and` (`decisive == false`) or `or` (`decisive == true`) over values
/// that may be unknown.
///
/// An operand equal to `decisive` settles the result even when the other
/// operand is unbound. Otherwise an unbound operand leaves the result
/// unbound. Errors other than [`EvalError::Unbound`] always propagate.
fn connective(
    decisive: bool,
    left: &Expr,
    right: &Expr,
    bindings: &Bindings<'_>,
    budget: &mut Budget,
) -> Result<CellValue, EvalError> {
    let unknown = match evaluate(left, bindings, budget) {
        Ok(value) if value.is_truthy() == decisive => return Ok(CellValue::Bool(decisive)),
        Ok(_) => {
            return evaluate(right, bindings, budget)
                .map(|value| CellValue::Bool(value.is_truthy()));
        }
        Err(error) if error.is_unbound() => error,
        Err(error) => return Err(error),
    };
    match evaluate(right, bindings, budget) {
        Ok(value) if value.is_truthy() == decisive => Ok(CellValue::Bool(decisive)),
        Ok(_) => Err(unknown),
        Err(error) if error.is_unbound() => Err(unknown),
        Err(error) => Err(error),
    }
}

fn literal_value(lit: &Literal) -> CellValue {
    match lit {
        Literal::None => CellValue::Null,
        Literal::Bool(b) => CellValue::Bool(*b),
        Literal::Int(n) => CellValue::Int(*n),
        Literal::Float(f) => CellValue::Float(*f),
        Literal::Text(s) => CellValue::Text(s.clone()),
    }
}

fn row<'a>(binding: Binding, bindings: &Bindings<'a>) -> Result<&'a Record, EvalError> {
    let bound = match binding {
        Binding::Rec => bindings.rec,
        Binding::NewRec => bindings.new_rec,
        Binding::User => None,
    };
    bound.ok_or(EvalError::Unbound(binding.name()))
}

fn binding_value(binding: Binding, bindings: &Bindings<'_>) -> Result<CellValue, EvalError> {
    match binding {
        Binding::User => {
            let user = bindings.user;
            let mut fields: BTreeMap<String, CellValue> = user.attributes.clone();
            for name in ["Email", "Name", "Access", "UserID"] {
                if let Some(value) = user.attribute(name) {
                    fields.insert(name.to_string(), value);
                }
            }
            Ok(CellValue::Record(fields))
        }
        Binding::Rec | Binding::NewRec => {
            let record = row(binding, bindings)?;
            let mut fields: BTreeMap<String, CellValue> = record
                .cells
                .iter()
                .map(|(col, value)| (col.to_string(), value.clone()))
                .collect();
            fields.insert("id".to_string(), CellValue::Int(record.id.into()));
            Ok(CellValue::Record(fields))
        }
    }
}

fn bound_attribute(
    binding: Binding,
    name: &str,
    bindings: &Bindings<'_>,
) -> Result<CellValue, EvalError> {
    match binding {
        Binding::User => bindings
            .user
            .attribute(name)
            .ok_or_else(|| EvalError::UnknownAttribute(format!("user.{name}"))),
        Binding::Rec | Binding::NewRec => {
            let record = row(binding, bindings)?;
            if name == "id" {
                return Ok(CellValue::Int(record.id.into()));
            }
            record
                .get(name)
                .cloned()
                .ok_or_else(|| EvalError::UnknownColumn {
                    binding: binding.name(),
                    column: name.to_string(),
                })
        }
    }
}

fn field(value: &CellValue, name: &str) -> Result<CellValue, EvalError> {
    match value {
        // Lookups through an empty reference stay empty.
        CellValue::Null => Ok(CellValue::Null),
        CellValue::Record(fields) => fields
            .get(name)
            .cloned()
            .ok_or_else(|| EvalError::UnknownAttribute(name.to_string())),
        _ => Err(EvalError::UnknownAttribute(name.to_string())),
    }
}

fn values_equal(left: &CellValue, right: &CellValue) -> bool {
    match (left, right) {
        (CellValue::Int(a), CellValue::Float(b)) | (CellValue::Float(b), CellValue::Int(a)) => {
            (*a as f64) == *b
        }
        _ => left == right,
    }
}

fn order(op: CompareOp, left: &CellValue, right: &CellValue) -> Result<Ordering, EvalError> {
    let ordering = match (left, right) {
        (CellValue::Int(a), CellValue::Int(b)) => Some(a.cmp(b)),
        (CellValue::Int(a), CellValue::Float(b)) => (*a as f64).partial_cmp(b),
        (CellValue::Float(a), CellValue::Int(b)) => a.partial_cmp(&(*b as f64)),
        (CellValue::Float(a), CellValue::Float(b)) => a.partial_cmp(b),
        (CellValue::Text(a), CellValue::Text(b)) => Some(a.cmp(b)),
        (CellValue::Bool(a), CellValue::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    };
    ordering.ok_or(EvalError::TypeMismatch {
        op: op.symbol(),
        left: left.type_name(),
        right: right.type_name(),
    })
}

fn contains(
    op: CompareOp,
    element: &CellValue,
    collection: &CellValue,
    budget: &mut Budget,
) -> Result<bool, EvalError> {
    match (element, collection) {
        (_, CellValue::List(items)) => {
            budget.spend(items.len())?;
            Ok(items.iter().any(|item| values_equal(element, item)))
        }
        (CellValue::Text(needle), CellValue::Text(haystack)) => {
            budget.spend(haystack.len())?;
            Ok(haystack.contains(needle.as_str()))
        }
        (CellValue::Text(key), CellValue::Record(fields)) => Ok(fields.contains_key(key)),
        (_, CellValue::Null) => Ok(false),
        _ => Err(EvalError::TypeMismatch {
            op: op.symbol(),
            left: element.type_name(),
            right: collection.type_name(),
        }),
    }
}

fn compare(
    op: CompareOp,
    left: &CellValue,
    right: &CellValue,
    budget: &mut Budget,
) -> Result<bool, EvalError> {
    match op {
        CompareOp::Eq | CompareOp::Is => Ok(values_equal(left, right)),
        CompareOp::Ne | CompareOp::IsNot => Ok(!values_equal(left, right)),
        CompareOp::Lt => Ok(order(op, left, right)? == Ordering::Less),
        CompareOp::Le => Ok(order(op, left, right)? != Ordering::Greater),
        CompareOp::Gt => Ok(order(op, left, right)? == Ordering::Greater),
        CompareOp::Ge => Ok(order(op, left, right)? != Ordering::Less),
        CompareOp::In => contains(op, left, right, budget),
        CompareOp::NotIn => contains(op, left, right, budget).map(|found| !found),
    }
}
