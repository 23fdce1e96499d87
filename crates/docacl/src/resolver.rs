//! Permission resolution.
//!
//! Resolution walks the rule sets that apply to a resource from most to
//! least specific:
//!
//! ```text
//! Column(t, c)  ->  Column(t, c), Table(t) | SeedRule, SchemaEdit[S], Default
//! Table(t)      ->  Table(t) | SeedRule, SchemaEdit[S], Default
//! Default       ->  SchemaEdit[S], Default
//! SchemaEdit    ->  SchemaEdit[S], Default[S]
//! DocCopies     ->  DocCopies, Default[R]
//! FullCopies    ->  FullCopies, Default[R]
//! AccessRules   ->  AccessRules
//! SeedRule      ->  SeedRule
//! ```
//!
//! `[..]` restricts which bits a link may decide. `SeedRule` stands in for a
//! table that has no rule set of its own.
//!
//! Within the walk, the first part whose condition matches fixes every bit
//! it sets that is still open. Each bit is decided independently, and bits
//! nothing decides fall back to role defaults.
//!
//! When no row is bound, a part whose condition needs one cannot be decided.
//! The bits it would set become row-dependent: later parts no longer decide
//! them, and the final answer is left to a per-row resolution.

use docacl_formula::Bindings;
use docacl_types::Access;
use serde::Serialize;
use tracing::trace;

use crate::permissions::{Bit, BitMask, BitState};
use crate::policy::Policy;
use crate::resource::{Resource, SpecialKind};
use crate::rule::{RuleId, RuleSet};

/// What fixed a bit's value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    /// A matching rule part.
    Rule { rule: RuleId, resource: String },
    /// The first part that could set the bit needs a row, and none was
    /// bound. The bit reads as allowed until it is resolved per row.
    RowDependent { rule: RuleId, resource: String },
    /// No rule set the bit; the role default applies.
    RoleDefault,
}

/// The resolved value of one bit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BitDecision {
    pub bit: Bit,
    pub allowed: bool,
    pub source: DecisionSource,
    /// Memo of the denying part, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
}

/// Per-bit outcome of one resolution, with the memos of denying parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    bits: Vec<BitDecision>,
    memos: Vec<String>,
}

impl Decision {
    pub fn allows(&self, bit: Bit) -> bool {
        self.bit(bit).allowed
    }

    pub fn allows_all(&self, bits: &[Bit]) -> bool {
        bits.iter().all(|bit| self.allows(*bit))
    }

    pub fn bit(&self, bit: Bit) -> &BitDecision {
        // One entry per bit, in `Bit::ALL` order.
        &self.bits[bit as usize]
    }

    pub fn bits(&self) -> &[BitDecision] {
        &self.bits
    }

    /// Memos of every part that denied a bit, in walk order.
    pub fn memos(&self) -> &[String] {
        &self.memos
    }

    /// Returns whether `bit` can only be decided with a row bound.
    pub fn is_row_dependent(&self, bit: Bit) -> bool {
        matches!(self.bit(bit).source, DecisionSource::RowDependent { .. })
    }

    /// Of `required`, the bits that were denied.
    pub fn denied(&self, required: &[Bit]) -> Vec<Bit> {
        required
            .iter()
            .copied()
            .filter(|bit| !self.allows(*bit))
            .collect()
    }

    /// Memos of the parts that denied any of `bits`, in walk order.
    pub fn memos_for(&self, bits: &[Bit]) -> Vec<String> {
        self.memos
            .iter()
            .filter(|memo| {
                bits.iter().any(|bit| {
                    let decision = self.bit(*bit);
                    !decision.allowed && decision.memo.as_ref() == Some(*memo)
                })
            })
            .cloned()
            .collect()
    }
}

struct Link<'p> {
    set: &'p RuleSet,
    mask: BitMask,
}

fn link(set: Option<&RuleSet>, mask: BitMask) -> Option<Link<'_>> {
    set.map(|set| Link { set, mask })
}

fn table_or_seed<'p>(policy: &'p Policy, table: &str) -> Option<&'p RuleSet> {
    policy
        .table_rules(table)
        .or_else(|| policy.special_rules(SpecialKind::SeedRule))
}

/// Rule sets consulted for `resource`, most specific first.
fn applicable<'p>(policy: &'p Policy, resource: &Resource) -> Vec<Link<'p>> {
    let schema_only = BitMask::only(Bit::Schema);
    let schema_edit = policy.special_rules(SpecialKind::SchemaEdit);
    let default = Some(policy.default_rules());

    let links = match resource {
        Resource::Column(table, col) => vec![
            link(policy.column_rules(table.as_str(), col.as_str()), BitMask::ALL),
            link(table_or_seed(policy, table.as_str()), BitMask::ALL),
            link(schema_edit, schema_only),
            link(default, BitMask::ALL),
        ],
        Resource::Table(table) => vec![
            link(table_or_seed(policy, table.as_str()), BitMask::ALL),
            link(schema_edit, schema_only),
            link(default, BitMask::ALL),
        ],
        Resource::Default => vec![link(schema_edit, schema_only), link(default, BitMask::ALL)],
        Resource::Special(SpecialKind::SchemaEdit) => {
            vec![link(schema_edit, schema_only), link(default, schema_only)]
        }
        Resource::Special(kind @ (SpecialKind::DocCopies | SpecialKind::FullCopies)) => vec![
            link(policy.special_rules(*kind), BitMask::ALL),
            link(default, BitMask::only(Bit::Read)),
        ],
        Resource::Special(kind @ (SpecialKind::AccessRules | SpecialKind::SeedRule)) => {
            vec![link(policy.special_rules(*kind), BitMask::ALL)]
        }
    };
    links.into_iter().flatten().collect()
}

/// Value of a bit no rule decided.
fn role_default(bit: Bit, resource: &Resource, access: Access) -> bool {
    match (bit, resource) {
        (Bit::Read | Bit::Update, Resource::Special(SpecialKind::AccessRules)) => {
            access.is_owner()
        }
        (Bit::Schema, _) => access.can_edit_structure(),
        _ => true,
    }
}

/// Resolves every bit of `resource` for the bound user and rows.
///
/// With no row bound, conditions that need one leave their bits
/// row-dependent (see [`DecisionSource::RowDependent`]). With a row bound,
/// a condition that needs the other row does not match. Conditions that
/// fail for any other reason do not match either, and are reported once
/// per snapshot.
pub fn resolve(policy: &Policy, resource: &Resource, bindings: &Bindings<'_>) -> Decision {
    let budget = policy.settings().evaluation_budget;
    let row_bound = bindings.rec.is_some() || bindings.new_rec.is_some();
    let mut fixed: [Option<BitDecision>; 5] = Default::default();
    let mut memos: Vec<String> = Vec::new();

    'walk: for Link { set, mask } in applicable(policy, resource) {
        for part in set.parts() {
            let open: Vec<(Bit, BitState)> = part
                .permissions
                .iter()
                .filter(|(bit, _)| mask.contains(*bit) && fixed[*bit as usize].is_none())
                .collect();
            if open.is_empty() {
                continue;
            }

            match part.condition.evaluate(bindings, budget) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(error) if error.is_unbound() => {
                    if !row_bound {
                        for (bit, _) in open {
                            fixed[bit as usize] = Some(BitDecision {
                                bit,
                                allowed: true,
                                source: DecisionSource::RowDependent {
                                    rule: part.id,
                                    resource: set.resource().to_string(),
                                },
                                memo: None,
                            });
                        }
                    }
                    continue;
                }
                Err(error) => {
                    policy.diagnostics().report(set.resource(), part, &error);
                    continue;
                }
            }

            let mut denied = false;
            for (bit, state) in open {
                let allowed = state == BitState::Allow;
                denied |= !allowed;
                fixed[bit as usize] = Some(BitDecision {
                    bit,
                    allowed,
                    source: DecisionSource::Rule {
                        rule: part.id,
                        resource: set.resource().to_string(),
                    },
                    memo: if allowed { None } else { part.memo.clone() },
                });
            }
            if denied {
                if let Some(memo) = &part.memo {
                    if !memos.contains(memo) {
                        memos.push(memo.clone());
                    }
                }
            }

            if fixed.iter().all(Option::is_some) {
                break 'walk;
            }
        }
    }

    let access = bindings.user.access;
    let bits: Vec<BitDecision> = Bit::ALL
        .into_iter()
        .zip(fixed)
        .map(|(bit, decision)| {
            decision.unwrap_or_else(|| BitDecision {
                bit,
                allowed: role_default(bit, resource, access),
                source: DecisionSource::RoleDefault,
                memo: None,
            })
        })
        .collect();

    trace!(
        resource = %resource,
        user = %bindings.user.email,
        allowed = %bits.iter().filter(|b| b.allowed).map(|b| b.bit.letter()).collect::<String>(),
        "resolved"
    );
    Decision { bits, memos }
}
