//! Token resolution for imported rules.
//!
//! Rules copied between documents refer to columns by placeholder tokens
//! (`[R0]`, `[R1]`, ...) until the target columns are known. Resolution is a
//! separate pass before a [`Policy`](crate::Policy) is built: each token is
//! replaced by a concrete column id, and a token that cannot be resolved is
//! left in place. An unresolved token does not parse as a formula, so
//! building a policy from such rules fails instead of dropping the rule.

use std::collections::BTreeMap;

use docacl_types::{ColId, DocSchema};
use tracing::debug;

use crate::resource::{Resource, WILDCARD};
use crate::store::PersistedRules;
use crate::validate::{Severity, Warning};

/// What a token stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenTarget {
    /// A column created by the same import.
    Imported(ColId),
    /// A column expected to exist already in the target document.
    Existing(ColId),
}

/// Token names (without brackets) to the columns they stand for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenMap {
    tokens: BTreeMap<String, TokenTarget>,
}

impl TokenMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn imported(mut self, token: impl Into<String>, col: impl Into<ColId>) -> Self {
        self.tokens
            .insert(token.into(), TokenTarget::Imported(col.into()));
        self
    }

    pub fn existing(mut self, token: impl Into<String>, col: impl Into<ColId>) -> Self {
        self.tokens
            .insert(token.into(), TokenTarget::Existing(col.into()));
        self
    }

    pub fn get(&self, token: &str) -> Option<&TokenTarget> {
        self.tokens.get(token)
    }
}

/// Rules with tokens substituted, and what could not be substituted.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenResolution {
    pub rules: PersistedRules,
    pub warnings: Vec<Warning>,
}

impl TokenResolution {
    /// Returns whether every token was resolved.
    pub fn is_complete(&self) -> bool {
        !self
            .warnings
            .iter()
            .any(|warning| warning.severity == Severity::Error)
    }
}

/// Substitutes `[R<n>]` tokens in resource column ids and rule formulas.
///
/// A token mapped to an imported column always resolves. A token mapped to
/// an existing column resolves only if `schema` has that column in the
/// table the rule applies to (for default rules, in any table).
pub fn resolve_tokens(
    rules: &PersistedRules,
    tokens: &TokenMap,
    schema: &DocSchema,
) -> TokenResolution {
    let mut resolved = rules.clone();
    let mut warnings = Vec::new();

    for record in &mut resolved.resources {
        let table = record.table_id.trim().to_string();
        let (text, missing) = substitute(&record.col_ids, |token| {
            resolve_column(tokens, token, Some(table.as_str()), schema)
        });
        record.col_ids = text;
        for token in missing {
            warnings.push(unresolved(&token, describe(&record.table_id, &record.col_ids)));
        }
    }

    for rule in &mut resolved.rules {
        let table = resolved
            .resources
            .iter()
            .find(|record| record.id == rule.resource)
            .map(|record| record.table_id.trim().to_string())
            .filter(|table| !table.starts_with(WILDCARD));
        let (text, missing) = substitute(&rule.acl_formula, |token| {
            resolve_column(tokens, token, table.as_deref(), schema)
        });
        rule.acl_formula = text;
        for token in missing {
            let location = resolved
                .resources
                .iter()
                .find(|record| record.id == rule.resource)
                .map(|record| describe(&record.table_id, &record.col_ids));
            let location = match location {
                Some(location) => format!("{location}, rule {}", rule.id),
                None => format!("rule {}", rule.id),
            };
            warnings.push(unresolved(&token, location));
        }
    }

    debug!(
        resources = resolved.resources.len(),
        rules = resolved.rules.len(),
        unresolved = warnings.len(),
        "resolved import tokens"
    );
    TokenResolution {
        rules: resolved,
        warnings,
    }
}

fn resolve_column(
    tokens: &TokenMap,
    token: &str,
    table: Option<&str>,
    schema: &DocSchema,
) -> Option<String> {
    match tokens.get(token)? {
        TokenTarget::Imported(col) => Some(col.to_string()),
        TokenTarget::Existing(col) => {
            let exists = match table {
                Some(table) => schema.has_column(table, col.as_str()),
                None => schema
                    .tables
                    .keys()
                    .any(|table| schema.has_column(table.as_str(), col.as_str())),
            };
            exists.then(|| col.to_string())
        }
    }
}

fn describe(table_id: &str, col_ids: &str) -> String {
    Resource::from_parts(table_id, col_ids).map_or_else(
        |_| format!("{table_id}:{col_ids}"),
        |resource| resource.to_string(),
    )
}

fn unresolved(token: &str, location: String) -> Warning {
    Warning {
        message: format!("token [{token}] does not match an imported or existing column"),
        resource: Some(location),
        severity: Severity::Error,
    }
}

/// The token name if `text` starts with `R<digits>]`.
fn token_at(text: &str) -> Option<&str> {
    let end = text.find(']')?;
    let token = &text[..end];
    let digits = token.strip_prefix('R')?;
    (!digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())).then_some(token)
}

/// Replaces each `[R<digits>]` in `text` for which `lookup` yields a column.
/// Returns the new text and the tokens left in place.
fn substitute<F>(text: &str, lookup: F) -> (String, Vec<String>)
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(text.len());
    let mut missing: Vec<String> = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find('[') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match token_at(after) {
            Some(token) => {
                match lookup(token) {
                    Some(col) => out.push_str(&col),
                    None => {
                        out.push('[');
                        out.push_str(token);
                        out.push(']');
                        if !missing.iter().any(|seen| seen == token) {
                            missing.push(token.to_string());
                        }
                    }
                }
                rest = &after[token.len() + 1..];
            }
            None => {
                out.push('[');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    (out, missing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ResourceRecord, RuleRecord};

    #[test]
    fn substitutes_tokens_and_keeps_lists() {
        let (text, missing) = substitute("rec.[R0] in ['a', 'b'] and rec.[R1] == 1", |token| {
            (token == "R0").then(|| "Owner".to_string())
        });
        assert_eq!(text, "rec.Owner in ['a', 'b'] and rec.[R1] == 1");
        assert_eq!(missing, vec!["R1".to_string()]);
    }

    #[test]
    fn ignores_bracketed_text_that_is_not_a_token() {
        let (text, missing) = substitute("[R] [Rx] [R12", |_| Some("X".into()));
        assert_eq!(text, "[R] [Rx] [R12");
        assert!(missing.is_empty());
    }

    #[test]
    fn existing_tokens_must_exist_in_the_rule_table() {
        let schema = DocSchema::new().with_table("T1", ["Owner"]);
        let tokens = TokenMap::new().existing("R0", "Owner").existing("R1", "Gone");
        let rules = PersistedRules::new()
            .with_resource(ResourceRecord::new(1, "T1", "*"))
            .with_rule(RuleRecord::new(1, 1, "rec.[R0] == user.Email", "-R"))
            .with_rule(RuleRecord::new(2, 1, "rec.[R1] == 1", "-U"));

        let resolution = resolve_tokens(&rules, &tokens, &schema);
        assert_eq!(resolution.rules.rules[0].acl_formula, "rec.Owner == user.Email");
        assert_eq!(resolution.rules.rules[1].acl_formula, "rec.[R1] == 1");
        assert!(!resolution.is_complete());
        assert_eq!(resolution.warnings.len(), 1);
        assert_eq!(
            resolution.warnings[0].resource.as_deref(),
            Some("T1, rule 2")
        );
    }
}
