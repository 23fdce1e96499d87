//! Formula syntax tree and reference extraction.

use std::collections::BTreeSet;
use std::fmt;

/// A name bound by the evaluation environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Binding {
    /// The requesting user.
    User,
    /// The existing row.
    Rec,
    /// The proposed row for an add or update.
    NewRec,
}

impl Binding {
    pub fn name(&self) -> &'static str {
        match self {
            Binding::User => "user",
            Binding::Rec => "rec",
            Binding::NewRec => "newRec",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    Is,
    IsNot,
}

impl CompareOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::In => "in",
            CompareOp::NotIn => "not in",
            CompareOp::Is => "is",
            CompareOp::IsNot => "is not",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Binding(Binding),
    Attribute { base: Box<Expr>, name: String },
    List(Vec<Expr>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

/// Names a formula reads from its bindings.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct References {
    /// Columns read through `rec.<col>`.
    pub rec_columns: BTreeSet<String>,
    /// Columns read through `newRec.<col>`.
    pub new_rec_columns: BTreeSet<String>,
    /// Top-level attributes read through `user.<attr>`.
    pub user_attributes: BTreeSet<String>,
    /// Whether `rec` is used at all.
    pub uses_rec: bool,
    /// Whether `newRec` is used at all.
    pub uses_new_rec: bool,
}

impl References {
    /// Returns whether the formula depends on row data.
    pub fn uses_row(&self) -> bool {
        self.uses_rec || self.uses_new_rec
    }

    /// All row columns referenced through either `rec` or `newRec`.
    pub fn row_columns(&self) -> BTreeSet<&str> {
        self.rec_columns
            .iter()
            .chain(self.new_rec_columns.iter())
            .map(String::as_str)
            .collect()
    }
}

impl Expr {
    pub(crate) fn collect_references(&self, refs: &mut References) {
        match self {
            Expr::Literal(_) => {}
            Expr::Binding(binding) => mark_binding(*binding, refs),
            Expr::Attribute { base, name } => {
                if let Expr::Binding(binding) = base.as_ref() {
                    mark_binding(*binding, refs);
                    match binding {
                        Binding::User => refs.user_attributes.insert(name.clone()),
                        Binding::Rec => refs.rec_columns.insert(name.clone()),
                        Binding::NewRec => refs.new_rec_columns.insert(name.clone()),
                    };
                } else {
                    base.collect_references(refs);
                }
            }
            Expr::List(items) => {
                for item in items {
                    item.collect_references(refs);
                }
            }
            Expr::Not(inner) => inner.collect_references(refs),
            Expr::And(left, right) | Expr::Or(left, right) => {
                left.collect_references(refs);
                right.collect_references(refs);
            }
            Expr::Compare { left, right, .. } => {
                left.collect_references(refs);
                right.collect_references(refs);
            }
        }
    }
}

fn mark_binding(binding: Binding, refs: &mut References) {
    match binding {
        Binding::User => {}
        Binding::Rec => refs.uses_rec = true,
        Binding::NewRec => refs.uses_new_rec = true,
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(Literal::None) => f.write_str("None"),
            Expr::Literal(Literal::Bool(true)) => f.write_str("True"),
            Expr::Literal(Literal::Bool(false)) => f.write_str("False"),
            Expr::Literal(Literal::Int(n)) => write!(f, "{n}"),
            Expr::Literal(Literal::Float(v)) => write!(f, "{v:?}"),
            Expr::Literal(Literal::Text(s)) => write!(f, "{s:?}"),
            Expr::Binding(binding) => f.write_str(binding.name()),
            Expr::Attribute { base, name } => write!(f, "{base}.{name}"),
            Expr::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Expr::Not(inner) => write!(f, "not ({inner})"),
            Expr::And(left, right) => write!(f, "({left}) and ({right})"),
            Expr::Or(left, right) => write!(f, "({left}) or ({right})"),
            Expr::Compare { op, left, right } => write!(f, "{left} {} {right}", op.symbol()),
        }
    }
}
