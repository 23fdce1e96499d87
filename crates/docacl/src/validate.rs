//! Static checks of a policy against a document schema.
//!
//! Validation never affects resolution. It reports rules that point at
//! tables or columns that do not exist, permissions a resource cannot use,
//! and parts that can never take effect.

use std::fmt::{self, Display};

use docacl_types::{DocSchema, TableId};
use serde::Serialize;

use crate::permissions::{Bit, BitMask};
use crate::policy::Policy;
use crate::resource::{Resource, SpecialKind};
use crate::rule::{RulePart, RuleSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        })
    }
}

/// One finding about a policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    pub message: String,
    /// The resource the finding is about, in display form.
    pub resource: Option<String>,
    pub severity: Severity,
}

impl Warning {
    pub fn new(severity: Severity, resource: Option<&Resource>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            resource: resource.map(ToString::to_string),
            severity,
        }
    }

    pub fn error(resource: Option<&Resource>, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, resource, message)
    }
}

impl Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.resource {
            Some(resource) => write!(f, "{}: {resource}: {}", self.severity, self.message),
            None => write!(f, "{}: {}", self.severity, self.message),
        }
    }
}

/// Bits each kind of resource can meaningfully set.
fn usable_bits(resource: &Resource) -> BitMask {
    match resource {
        Resource::Special(SpecialKind::SchemaEdit) => BitMask::only(Bit::Schema),
        Resource::Special(SpecialKind::AccessRules) => BitMask::of(&[Bit::Read, Bit::Update]),
        Resource::Special(SpecialKind::DocCopies | SpecialKind::FullCopies) => {
            BitMask::only(Bit::Read)
        }
        Resource::Column(..) => BitMask::of(&[Bit::Read, Bit::Update, Bit::Create, Bit::Schema]),
        Resource::Default | Resource::Table(_) | Resource::Special(SpecialKind::SeedRule) => {
            BitMask::ALL
        }
    }
}

/// Checks `policy` against the tables and columns in `schema`.
///
/// Findings come out in [`Policy::rule_sets`] order, and within a rule set
/// in part order.
pub fn validate(policy: &Policy, schema: &DocSchema) -> Vec<Warning> {
    let mut warnings = Vec::new();
    for set in policy.rule_sets() {
        check_resource(set.resource(), schema, &mut warnings);
        check_parts(set, schema, &mut warnings);
    }
    warnings
}

fn check_resource(resource: &Resource, schema: &DocSchema, warnings: &mut Vec<Warning>) {
    match resource {
        Resource::Table(table) if !schema.has_table(table.as_str()) => {
            warnings.push(Warning::error(
                Some(resource),
                format!("table {table} does not exist"),
            ));
        }
        Resource::Column(table, _) if !schema.has_table(table.as_str()) => {
            warnings.push(Warning::error(
                Some(resource),
                format!("table {table} does not exist"),
            ));
        }
        Resource::Column(table, col) if !schema.has_column(table.as_str(), col.as_str()) => {
            warnings.push(Warning::error(
                Some(resource),
                format!("column {col} does not exist in table {table}"),
            ));
        }
        _ => {}
    }
}

fn check_parts(set: &RuleSet, schema: &DocSchema, warnings: &mut Vec<Warning>) {
    let resource = set.resource();
    let usable = usable_bits(resource);
    // Bits already fixed for everyone by an earlier catch-all part.
    let mut settled = BitMask::NONE;

    for part in set.parts() {
        if part.permissions.is_empty() {
            warnings.push(Warning::new(
                Severity::Info,
                Some(resource),
                format!("rule {} sets no permissions", part.id),
            ));
            continue;
        }

        let unusable: String = part
            .permissions
            .iter()
            .filter(|(bit, _)| !usable.contains(*bit))
            .map(|(bit, _)| bit.letter())
            .collect();
        if !unusable.is_empty() {
            warnings.push(Warning::new(
                Severity::Warning,
                Some(resource),
                format!("rule {} sets {unusable}, which has no effect here", part.id),
            ));
        }

        if part
            .permissions
            .iter()
            .all(|(bit, _)| settled.contains(bit))
        {
            warnings.push(Warning::new(
                Severity::Warning,
                Some(resource),
                format!(
                    "rule {} can never apply: an earlier rule for everyone sets the same permissions",
                    part.id
                ),
            ));
        }
        if part.is_catch_all() {
            settled = part
                .permissions
                .iter()
                .fold(settled, |mask, (bit, _)| mask.with(bit));
        }

        check_columns(resource, part, schema, warnings);
    }
}

fn check_columns(resource: &Resource, part: &RulePart, schema: &DocSchema, warnings: &mut Vec<Warning>) {
    let refs = part.condition.references();
    if !refs.uses_row() {
        return;
    }

    match resource {
        Resource::Table(table) | Resource::Column(table, _) => {
            if !schema.has_table(table.as_str()) {
                return;
            }
            for col in refs.row_columns() {
                if col != "id" && !schema.has_column(table.as_str(), col) {
                    warnings.push(Warning::error(
                        Some(resource),
                        format!("rule {} uses column {col}, which is not in table {table}", part.id),
                    ));
                }
            }
        }
        Resource::Default | Resource::Special(SpecialKind::SeedRule) => {
            for col in refs.row_columns() {
                if col == "id" {
                    continue;
                }
                let missing: Vec<&TableId> = schema
                    .tables
                    .keys()
                    .filter(|table| !schema.has_column(table.as_str(), col))
                    .collect();
                if !missing.is_empty() {
                    let tables: Vec<String> = missing.iter().map(ToString::to_string).collect();
                    warnings.push(Warning::new(
                        Severity::Warning,
                        Some(resource),
                        format!(
                            "rule {} uses column {col}, which is missing from {}",
                            part.id,
                            tables.join(", ")
                        ),
                    ));
                }
            }
        }
        Resource::Special(_) => warnings.push(Warning::new(
            Severity::Warning,
            Some(resource),
            format!(
                "rule {} reads row data, but this resource is checked without a row and the rule never matches",
                part.id
            ),
        )),
    }
}
