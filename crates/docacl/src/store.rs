//! Persisted rule records.
//!
//! Documents carry their rules as two record lists: resources and rules.
//! This encoding is the stable contract between versions; a [`Policy`]
//! is built from it and re-encoded into it.
//!
//! [`Policy`]: crate::Policy

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::permissions::PermissionDelta;
use crate::resource::{Resource, SpecialKind};

/// Memo of the starter rule that limits structure edits to owners.
pub const OWNERS_ONLY_SCHEMA_MEMO: &str = "Only owners can change document structure";

/// A persisted resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRecord {
    pub id: u64,
    pub table_id: String,
    pub col_ids: String,
}

impl ResourceRecord {
    pub fn new(id: u64, table_id: impl Into<String>, col_ids: impl Into<String>) -> Self {
        Self {
            id,
            table_id: table_id.into(),
            col_ids: col_ids.into(),
        }
    }

    pub fn for_resource(id: u64, resource: &Resource) -> Self {
        let (table_id, col_ids) = resource.to_parts();
        Self {
            id,
            table_id,
            col_ids,
        }
    }
}

/// A persisted rule part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleRecord {
    pub id: u64,
    /// Id of the [`ResourceRecord`] this rule belongs to.
    pub resource: u64,
    #[serde(default)]
    pub acl_formula: String,
    #[serde(default)]
    pub permissions_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
    #[serde(default)]
    pub position: f64,
}

impl RuleRecord {
    pub fn new(
        id: u64,
        resource: u64,
        acl_formula: impl Into<String>,
        permissions_text: impl Into<String>,
    ) -> Self {
        Self {
            id,
            resource,
            acl_formula: acl_formula.into(),
            permissions_text: permissions_text.into(),
            memo: None,
            position: id as f64,
        }
    }

    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = Some(memo.into());
        self
    }

    pub fn at(mut self, position: f64) -> Self {
        self.position = position;
        self
    }

    /// Returns whether two rules would behave identically.
    ///
    /// Each field has its own equality: formulas compare as trimmed text,
    /// permissions by their parsed per-bit state (so `+R-U` equals `-U+R`)
    /// and memos treat a missing memo as an empty one. The resource id is
    /// compared as-is; see [`PersistedRules::needs_saving`] for comparison
    /// across documents whose record ids differ.
    pub fn is_equivalent(&self, other: &RuleRecord) -> bool {
        self.resource == other.resource && self.same_content(other)
    }

    fn same_content(&self, other: &RuleRecord) -> bool {
        self.acl_formula.trim() == other.acl_formula.trim()
            && same_permissions(&self.permissions_text, &other.permissions_text)
            && memo_text(self.memo.as_deref()) == memo_text(other.memo.as_deref())
    }
}

fn same_permissions(left: &str, right: &str) -> bool {
    match (PermissionDelta::parse(left), PermissionDelta::parse(right)) {
        (Ok(left), Ok(right)) => left == right,
        _ => left.trim() == right.trim(),
    }
}

fn memo_text(memo: Option<&str>) -> &str {
    memo.map_or("", str::trim)
}

/// The full persisted rule state of one document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PersistedRules {
    #[serde(default)]
    pub resources: Vec<ResourceRecord>,
    #[serde(default)]
    pub rules: Vec<RuleRecord>,
}

impl PersistedRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resource(mut self, record: ResourceRecord) -> Self {
        self.resources.push(record);
        self
    }

    pub fn with_rule(mut self, record: RuleRecord) -> Self {
        self.rules.push(record);
        self
    }

    /// The rules a new document carries: only owners change structure, and
    /// owners can always see the rules.
    pub fn starter() -> Self {
        Self::new()
            .with_resource(ResourceRecord::for_resource(
                1,
                &Resource::Special(SpecialKind::SchemaEdit),
            ))
            .with_resource(ResourceRecord::for_resource(
                2,
                &Resource::Special(SpecialKind::AccessRules),
            ))
            .with_rule(
                RuleRecord::new(1, 1, "user.Access != OWNER", "-S")
                    .with_memo(OWNERS_ONLY_SCHEMA_MEMO),
            )
            .with_rule(RuleRecord::new(2, 2, "user.Access == OWNER", "+R"))
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn resource(&self, id: u64) -> Option<&ResourceRecord> {
        self.resources.iter().find(|record| record.id == id)
    }

    /// Rules in evaluation order: by position, ties in record order.
    ///
    /// Non-finite positions sort last.
    pub fn ordered_rules(&self) -> Vec<&RuleRecord> {
        let mut rules: Vec<&RuleRecord> = self.rules.iter().collect();
        rules.sort_by(|a, b| match (a.position.is_finite(), b.position.is_finite()) {
            (true, true) => a.position.total_cmp(&b.position),
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => Ordering::Equal,
        });
        rules
    }

    /// Returns whether `self` differs in behavior from the `saved` state.
    ///
    /// Rules are grouped by the resource they name (not by record id) and
    /// compared in evaluation order within each group, with
    /// [`RuleRecord::is_equivalent`] semantics for their content. Only the
    /// order of rules within one resource affects behavior.
    pub fn needs_saving(&self, saved: &PersistedRules) -> bool {
        let ours = self.rules_by_resource();
        let theirs = saved.rules_by_resource();
        if ours.len() != theirs.len() {
            return true;
        }
        ours.iter().any(|(resource, rules)| match theirs.get(resource) {
            Some(saved_rules) => {
                rules.len() != saved_rules.len()
                    || !rules
                        .iter()
                        .zip(saved_rules)
                        .all(|(a, b)| a.same_content(b))
            }
            None => true,
        })
    }

    fn rules_by_resource(&self) -> BTreeMap<(String, String), Vec<&RuleRecord>> {
        let mut groups: BTreeMap<(String, String), Vec<&RuleRecord>> = BTreeMap::new();
        for rule in self.ordered_rules() {
            let key = self.resource(rule.resource).map_or_else(
                || (String::new(), rule.resource.to_string()),
                normalized_parts,
            );
            groups.entry(key).or_default().push(rule);
        }
        groups
    }
}

fn normalized_parts(record: &ResourceRecord) -> (String, String) {
    (
        record.table_id.trim().to_string(),
        record.col_ids.trim().to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn saved() -> PersistedRules {
        PersistedRules::new()
            .with_resource(ResourceRecord::new(1, "*", "*"))
            .with_resource(ResourceRecord::new(2, "T1", "*"))
            .with_rule(
                RuleRecord::new(1, 2, "rec.Owner != user.Email", "-UD")
                    .with_memo("Only the owner may edit"),
            )
            .with_rule(RuleRecord::new(2, 1, "user.Access != OWNER", "-S"))
    }

    #[test]
    fn identical_rules_need_no_save() {
        assert!(!saved().needs_saving(&saved()));
    }

    #[test]
    fn reordered_permission_letters_are_equivalent() {
        let mut edited = saved();
        edited.rules[0].permissions_text = "-DU".into();
        edited.rules[1].acl_formula = "  user.Access != OWNER ".into();
        assert!(edited.rules[0].is_equivalent(&saved().rules[0]));
        assert!(!edited.needs_saving(&saved()));
    }

    #[test]
    fn missing_memo_equals_empty_memo() {
        let mut left = saved();
        let mut right = saved();
        left.rules[1].memo = None;
        right.rules[1].memo = Some(String::new());
        assert!(left.rules[1].is_equivalent(&right.rules[1]));
        assert!(!left.needs_saving(&right));
    }

    #[test]
    fn permission_change_needs_save() {
        let mut edited = saved();
        edited.rules[0].permissions_text = "-U".into();
        assert!(edited.needs_saving(&saved()));
    }

    #[test]
    fn reordering_rules_within_a_resource_needs_save() {
        let base = saved().with_rule(RuleRecord::new(3, 2, "", "-R").at(3.0));
        let mut edited = base.clone();
        edited.rules[0].position = 10.0;
        assert!(edited.needs_saving(&base));
    }

    #[test]
    fn reordering_across_resources_needs_no_save() {
        let mut edited = saved();
        edited.rules[0].position = 10.0;
        assert!(!edited.needs_saving(&saved()));
    }

    #[test]
    fn resource_ids_may_differ() {
        let renumbered = PersistedRules::new()
            .with_resource(ResourceRecord::new(7, "T1", "*"))
            .with_resource(ResourceRecord::new(9, "*", "*"))
            .with_rule(
                RuleRecord::new(1, 7, "rec.Owner != user.Email", "-UD")
                    .with_memo("Only the owner may edit"),
            )
            .with_rule(RuleRecord::new(2, 9, "user.Access != OWNER", "-S"));
        assert!(!renumbered.needs_saving(&saved()));
    }

    #[test]
    fn ordering_is_stable_for_equal_positions() {
        let rules = PersistedRules::new()
            .with_rule(RuleRecord::new(5, 1, "", "+R").at(1.0))
            .with_rule(RuleRecord::new(3, 1, "", "-R").at(1.0))
            .with_rule(RuleRecord::new(4, 1, "", "-U").at(0.5))
            .with_rule(RuleRecord::new(6, 1, "", "-C").at(f64::NAN));
        let ids: Vec<u64> = rules.ordered_rules().iter().map(|rule| rule.id).collect();
        assert_eq!(ids, vec![4, 5, 3, 6]);
    }

    #[test]
    fn json_uses_camel_case_fields() {
        let json = r#"{
            "resources": [{"id": 1, "tableId": "*", "colIds": "*"}],
            "rules": [{"id": 1, "resource": 1, "aclFormula": "", "permissionsText": "all", "position": 1}]
        }"#;
        let rules = PersistedRules::from_json(json).unwrap();
        assert_eq!(rules.resources[0], ResourceRecord::new(1, "*", "*"));
        assert_eq!(rules.rules[0].permissions_text, "all");
        assert_eq!(rules.rules[0].memo, None);
    }
}
