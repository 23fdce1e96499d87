//! The immutable policy snapshot.
//!
//! A [`Policy`] holds every rule set of one document. It is never mutated
//! once built: edits return a new policy that shares unchanged rule sets
//! with the old one through `Arc`, so many resolutions can read a snapshot
//! while an editor builds the next one.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use docacl_formula::{
    Binding, CompareOp, DEFAULT_EVALUATION_BUDGET, EvalError, Expr, Formula, Literal,
};
use docacl_types::{Access, ColId, TableId};
use tracing::{debug, warn};

use crate::error::PolicyError;
use crate::permissions::{Bit, BitState};
use crate::resource::{Resource, SpecialKind};
use crate::rule::{RuleId, RulePart, RuleSet};
use crate::store::{PersistedRules, ResourceRecord, RuleRecord};

/// Evaluation settings carried by a policy snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    /// Evaluation steps allowed per condition.
    pub evaluation_budget: u32,
    /// Whether denied decisions are logged at debug level.
    pub log_denials: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            evaluation_budget: DEFAULT_EVALUATION_BUDGET,
            log_denials: true,
        }
    }
}

// ============================================================================
// Evaluation diagnostics
// ============================================================================

/// Rule parts whose conditions failed to evaluate against this snapshot.
///
/// Each failing part is logged once per snapshot.
#[derive(Debug, Default)]
pub(crate) struct Diagnostics {
    reported: Mutex<HashSet<RuleId>>,
}

impl Diagnostics {
    pub(crate) fn report(&self, resource: &Resource, part: &RulePart, error: &EvalError) {
        let first = self
            .reported
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(part.id);
        if first {
            warn!(
                rule = %part.id,
                resource = %resource,
                formula = %part.condition,
                error = %error,
                "rule condition failed to evaluate, treating as not matching"
            );
        }
    }

    fn failing(&self) -> Vec<RuleId> {
        let mut ids: Vec<RuleId> = self
            .reported
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .copied()
            .collect();
        ids.sort();
        ids
    }
}

impl Clone for Diagnostics {
    /// A derived policy starts with a clean registry.
    fn clone(&self) -> Self {
        Self::default()
    }
}

// ============================================================================
// Policy
// ============================================================================

/// Every rule set of one document.
///
/// The default rule set always exists, possibly empty.
#[derive(Debug, Clone)]
pub struct Policy {
    default_rules: Arc<RuleSet>,
    table_rules: BTreeMap<TableId, Arc<RuleSet>>,
    column_rules: BTreeMap<(TableId, ColId), Arc<RuleSet>>,
    special_rules: BTreeMap<SpecialKind, Arc<RuleSet>>,
    settings: EngineSettings,
    version: u64,
    diagnostics: Diagnostics,
}

impl Default for Policy {
    fn default() -> Self {
        Self::new()
    }
}

impl Policy {
    /// A policy with no rules: everything falls through to role defaults.
    pub fn new() -> Self {
        Self {
            default_rules: Arc::new(RuleSet::new(Resource::Default)),
            table_rules: BTreeMap::new(),
            column_rules: BTreeMap::new(),
            special_rules: BTreeMap::new(),
            settings: EngineSettings::default(),
            version: 0,
            diagnostics: Diagnostics::default(),
        }
    }

    pub fn builder() -> PolicyBuilder {
        PolicyBuilder::default()
    }

    /// The rules a new document starts with. See [`PersistedRules::starter`].
    pub fn starter() -> Result<Self, PolicyError> {
        Self::from_records(&PersistedRules::starter())
    }

    /// Builds a policy from persisted records.
    ///
    /// Fails on anything the records cannot mean: a resource declared
    /// twice, a rule id used twice, a rule naming a missing resource, or
    /// text that does not parse.
    pub fn from_records(records: &PersistedRules) -> Result<Self, PolicyError> {
        Self::from_records_with(records, EngineSettings::default())
    }

    pub fn from_records_with(
        records: &PersistedRules,
        settings: EngineSettings,
    ) -> Result<Self, PolicyError> {
        let mut resources: HashMap<u64, Resource> = HashMap::new();
        let mut builder = Self::builder().settings(settings);
        let mut seen: HashSet<Resource> = HashSet::new();

        for record in &records.resources {
            let resource = Resource::from_parts(&record.table_id, &record.col_ids).map_err(
                |source| PolicyError::InvalidResource {
                    id: record.id,
                    source,
                },
            )?;
            if !seen.insert(resource.clone()) {
                return Err(PolicyError::DuplicateResource {
                    resource: resource.to_string(),
                });
            }
            if resources.insert(record.id, resource).is_some() {
                return Err(PolicyError::DuplicateResourceId { id: record.id });
            }
        }

        let mut sets: Vec<RuleSet> = Vec::new();
        for rule in records.ordered_rules() {
            if !rule.position.is_finite() {
                return Err(PolicyError::InvalidPosition { rule: rule.id });
            }
            let resource = resources
                .get(&rule.resource)
                .ok_or(PolicyError::UnknownResource {
                    rule: rule.id,
                    resource: rule.resource,
                })?;
            let part = RulePart::parse(
                rule.id,
                &rule.acl_formula,
                &rule.permissions_text,
                rule.memo.as_deref(),
            )?;
            match sets.iter_mut().find(|set| set.resource() == resource) {
                Some(set) => set.parts_mut().push(part),
                None => sets.push(RuleSet::new(resource.clone()).with_part(part)),
            }
        }

        for set in sets {
            builder = builder.rule_set(set);
        }
        let policy = builder.build()?;
        debug!(
            rule_sets = policy.rule_sets().count(),
            rules = records.rules.len(),
            "built policy from records"
        );
        Ok(policy)
    }

    /// Re-encodes this policy as persisted records.
    ///
    /// Resource records are numbered in [`Policy::rule_sets`] order; an
    /// empty default rule set is omitted.
    pub fn to_records(&self) -> PersistedRules {
        let mut records = PersistedRules::new();
        let mut position = 0u32;
        for set in self.rule_sets().filter(|set| !set.is_empty()) {
            let resource_id = records.resources.len() as u64 + 1;
            records
                .resources
                .push(ResourceRecord::for_resource(resource_id, set.resource()));
            for part in set.parts() {
                position += 1;
                records.rules.push(RuleRecord {
                    id: part.id.as_u64(),
                    resource: resource_id,
                    acl_formula: part.condition.source().to_string(),
                    permissions_text: part.permissions.to_string(),
                    memo: part.memo.clone(),
                    position: f64::from(position),
                });
            }
        }
        records
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn settings(&self) -> EngineSettings {
        self.settings
    }

    /// Version assigned by the [`PolicyHandle`](crate::PolicyHandle) that
    /// published this snapshot, 0 if never published.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn default_rules(&self) -> &RuleSet {
        &self.default_rules
    }

    pub fn table_rules(&self, table: &str) -> Option<&RuleSet> {
        self.table_rules.get(table).map(|set| &**set)
    }

    pub fn column_rules(&self, table: &str, col: &str) -> Option<&RuleSet> {
        self.column_rules
            .get(&(TableId::from(table), ColId::from(col)))
            .map(|set| &**set)
    }

    pub fn special_rules(&self, kind: SpecialKind) -> Option<&RuleSet> {
        self.special_rules.get(&kind).map(|set| &**set)
    }

    /// The rule set attached to exactly this resource.
    pub fn rule_set(&self, resource: &Resource) -> Option<&RuleSet> {
        match resource {
            Resource::Default => Some(self.default_rules()),
            Resource::Table(table) => self.table_rules(table.as_str()),
            Resource::Column(table, col) => self.column_rules(table.as_str(), col.as_str()),
            Resource::Special(kind) => self.special_rules(*kind),
        }
    }

    /// Every rule set: columns, then tables, then default, then specials.
    pub fn rule_sets(&self) -> impl Iterator<Item = &RuleSet> {
        self.column_rules
            .values()
            .chain(self.table_rules.values())
            .chain(std::iter::once(&self.default_rules))
            .chain(self.special_rules.values())
            .map(|set| &**set)
    }

    /// Rule parts whose conditions have failed to evaluate so far.
    pub fn failing_rules(&self) -> Vec<RuleId> {
        self.diagnostics.failing()
    }

    pub(crate) fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Returns whether the document-copies resource should be offered in the
    /// rule editor: the access rules grant rule access to someone other
    /// than owners.
    pub fn exposes_doc_copies(&self) -> bool {
        self.special_rules(SpecialKind::AccessRules)
            .is_some_and(|set| {
                set.parts().iter().any(|part| {
                    let grants = [Bit::Read, Bit::Update]
                        .into_iter()
                        .any(|bit| part.sets(bit) == BitState::Allow);
                    grants && !is_owner_only(&part.condition)
                })
            })
    }

    // ------------------------------------------------------------------------
    // Copy-on-write edits
    // ------------------------------------------------------------------------

    /// Returns a policy with `part` appended to the rule set for `resource`,
    /// creating the set if needed. A part without an id is given a fresh one;
    /// an explicit id already in use is rejected.
    pub fn with_part(&self, resource: Resource, mut part: RulePart) -> Result<Self, PolicyError> {
        let mut next = self.derive();
        if part.id == RuleId::default() {
            part.id = next.next_rule_id();
        } else if next.uses_rule_id(part.id, None) {
            return Err(PolicyError::DuplicateRuleId {
                id: part.id.as_u64(),
            });
        }
        let mut set = next
            .rule_set(&resource)
            .cloned()
            .unwrap_or_else(|| RuleSet::new(resource));
        set.parts_mut().push(part);
        next.insert_set(set);
        Ok(next)
    }

    /// Returns a policy without the part at `index` in the rule set for
    /// `resource`. A table, column or special set left empty is dropped.
    pub fn without_part(&self, resource: &Resource, index: usize) -> Result<Self, PolicyError> {
        let no_such_part = || PolicyError::NoSuchPart {
            resource: resource.to_string(),
            index,
        };
        let mut set = self.rule_set(resource).cloned().ok_or_else(no_such_part)?;
        if index >= set.len() {
            return Err(no_such_part());
        }
        set.parts_mut().remove(index);

        let mut next = self.derive();
        if set.is_empty() && *resource != Resource::Default {
            next.remove_set(resource);
        } else {
            next.insert_set(set);
        }
        Ok(next)
    }

    /// Returns a policy whose rule set for `set.resource()` is `set`.
    ///
    /// Explicit ids in `set` may repeat ids of the set being replaced, but
    /// not each other or ids of any other rule set.
    pub fn replace_rule_set(&self, mut set: RuleSet) -> Result<Self, PolicyError> {
        let mut next = self.derive();
        let mut ids: HashSet<RuleId> = HashSet::new();
        for part in set.parts() {
            if part.id == RuleId::default() {
                continue;
            }
            if !ids.insert(part.id) || next.uses_rule_id(part.id, Some(set.resource())) {
                return Err(PolicyError::DuplicateRuleId {
                    id: part.id.as_u64(),
                });
            }
        }
        for part in set.parts_mut() {
            if part.id == RuleId::default() {
                part.id = next.next_rule_id_after(&ids);
                ids.insert(part.id);
            }
        }
        next.insert_set(set);
        Ok(next)
    }

    /// Returns a policy without a rule set for `resource`.
    /// Removing the default rule set empties it.
    pub fn remove_rule_set(&self, resource: &Resource) -> Self {
        let mut next = self.derive();
        next.remove_set(resource);
        next
    }

    /// Returns a policy where `table` has its own copy of the seed rules.
    ///
    /// Does nothing if the table already has rules or there are no seed
    /// rules.
    pub fn seed_table(&self, table: impl Into<TableId>) -> Self {
        let table = table.into();
        let seeds = match self.special_rules(SpecialKind::SeedRule) {
            Some(seeds) if !seeds.is_empty() && self.table_rules(table.as_str()).is_none() => {
                seeds.clone()
            }
            _ => return self.derive(),
        };

        let mut next = self.derive();
        let mut set = seeds.retarget(Resource::Table(table));
        for part in set.parts_mut() {
            part.id = next.next_rule_id();
        }
        next.insert_set(set);
        next
    }

    /// Same rules with different settings.
    pub fn with_settings(&self, settings: EngineSettings) -> Self {
        let mut next = self.derive();
        next.settings = settings;
        next
    }

    pub(crate) fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    fn derive(&self) -> Self {
        let mut next = self.clone();
        next.version = 0;
        next
    }

    fn next_rule_id(&self) -> RuleId {
        self.next_rule_id_after(&HashSet::new())
    }

    /// Next id above every id in use and every id in `reserved`.
    fn next_rule_id_after(&self, reserved: &HashSet<RuleId>) -> RuleId {
        let max = self
            .rule_sets()
            .flat_map(|set| set.parts().iter().map(|part| part.id))
            .chain(reserved.iter().copied())
            .map(|id| id.as_u64())
            .max()
            .unwrap_or(0);
        RuleId::new(max + 1)
    }

    /// Whether any rule set other than `except` has a part with `id`.
    fn uses_rule_id(&self, id: RuleId, except: Option<&Resource>) -> bool {
        self.rule_sets()
            .filter(|set| Some(set.resource()) != except)
            .any(|set| set.parts().iter().any(|part| part.id == id))
    }

    fn insert_set(&mut self, set: RuleSet) {
        let resource = set.resource().clone();
        let set = Arc::new(set);
        match resource {
            Resource::Default => self.default_rules = set,
            Resource::Table(table) => {
                self.table_rules.insert(table, set);
            }
            Resource::Column(table, col) => {
                self.column_rules.insert((table, col), set);
            }
            Resource::Special(kind) => {
                self.special_rules.insert(kind, set);
            }
        }
    }

    fn remove_set(&mut self, resource: &Resource) {
        match resource {
            Resource::Default => self.default_rules = Arc::new(RuleSet::new(Resource::Default)),
            Resource::Table(table) => {
                self.table_rules.remove(table);
            }
            Resource::Column(table, col) => {
                self.column_rules.remove(&(table.clone(), col.clone()));
            }
            Resource::Special(kind) => {
                self.special_rules.remove(kind);
            }
        }
    }
}

/// Matches `user.Access == OWNER` in either operand order.
fn is_owner_only(condition: &Formula) -> bool {
    let Some(Expr::Compare { op, left, right }) = condition.expr() else {
        return false;
    };
    if *op != CompareOp::Eq {
        return false;
    }
    let is_access = |expr: &Expr| {
        matches!(expr, Expr::Attribute { base, name }
            if name == "Access" && matches!(base.as_ref(), Expr::Binding(Binding::User)))
    };
    let is_owner = |expr: &Expr| {
        matches!(expr, Expr::Literal(Literal::Text(text)) if text == Access::Owner.as_str())
    };
    (is_access(left) && is_owner(right)) || (is_owner(left) && is_access(right))
}

// ============================================================================
// Builder
// ============================================================================

/// Assembles a [`Policy`] from rule sets, rejecting duplicate resources.
#[derive(Debug, Default)]
pub struct PolicyBuilder {
    sets: Vec<RuleSet>,
    settings: EngineSettings,
}

impl PolicyBuilder {
    pub fn settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn rule_set(mut self, set: RuleSet) -> Self {
        self.sets.push(set);
        self
    }

    /// Appends a part to the rule set for `resource`, creating it if needed.
    pub fn part(mut self, resource: Resource, part: RulePart) -> Self {
        match self.sets.iter_mut().find(|set| *set.resource() == resource) {
            Some(set) => set.parts_mut().push(part),
            None => self.sets.push(RuleSet::new(resource).with_part(part)),
        }
        self
    }

    pub fn build(self) -> Result<Policy, PolicyError> {
        let mut policy = Policy::new();
        policy.settings = self.settings;

        let mut seen: HashSet<Resource> = HashSet::new();
        for set in self.sets {
            if !seen.insert(set.resource().clone()) {
                return Err(PolicyError::DuplicateResource {
                    resource: set.resource().to_string(),
                });
            }
            policy.insert_set(set);
        }

        let mut ids: HashSet<RuleId> = HashSet::new();
        for part in policy.rule_sets().flat_map(|set| set.parts()) {
            if part.id != RuleId::default() && !ids.insert(part.id) {
                return Err(PolicyError::DuplicateRuleId {
                    id: part.id.as_u64(),
                });
            }
        }

        // Parts built in code have no id yet.
        let mut next_id = policy.next_rule_id().as_u64();
        let unassigned: Vec<Resource> = policy
            .rule_sets()
            .filter(|set| set.parts().iter().any(|part| part.id == RuleId::default()))
            .map(|set| set.resource().clone())
            .collect();
        for resource in unassigned {
            if let Some(mut set) = policy.rule_set(&resource).cloned() {
                for part in set.parts_mut() {
                    if part.id == RuleId::default() {
                        part.id = RuleId::new(next_id);
                        next_id += 1;
                    }
                }
                policy.insert_set(set);
            }
        }
        Ok(policy)
    }
}
