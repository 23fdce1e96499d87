//! Rule parts and rule sets.

use std::fmt::{self, Display};

use docacl_formula::Formula;
use serde::{Deserialize, Serialize};

use crate::error::PolicyError;
use crate::permissions::{Bit, BitState, PermissionDelta};
use crate::resource::Resource;

/// Identifier of a rule part, stable across policy edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(u64);

impl RuleId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One condition with its permission deltas and an optional explanation.
#[derive(Debug, Clone, PartialEq)]
pub struct RulePart {
    pub id: RuleId,
    pub condition: Formula,
    pub permissions: PermissionDelta,
    pub memo: Option<String>,
}

impl RulePart {
    /// Creates a part with an unassigned id; policies assign ids on insert.
    pub fn new(condition: Formula, permissions: PermissionDelta) -> Self {
        Self {
            id: RuleId::default(),
            condition,
            permissions,
            memo: None,
        }
    }

    /// Parses a part from its persisted text fields.
    pub fn parse(
        id: u64,
        formula: &str,
        permissions: &str,
        memo: Option<&str>,
    ) -> Result<Self, PolicyError> {
        let condition = Formula::parse(formula).map_err(|source| PolicyError::InvalidFormula {
            rule: id,
            formula: formula.to_string(),
            source,
        })?;
        let permissions = PermissionDelta::parse(permissions)
            .map_err(|source| PolicyError::InvalidPermissions { rule: id, source })?;
        Ok(Self {
            id: RuleId::new(id),
            condition,
            permissions,
            memo: memo
                .map(str::trim)
                .filter(|memo| !memo.is_empty())
                .map(str::to_string),
        })
    }

    pub fn with_id(mut self, id: RuleId) -> Self {
        self.id = id;
        self
    }

    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = Some(memo.into());
        self
    }

    pub fn sets(&self, bit: Bit) -> BitState {
        self.permissions.get(bit)
    }

    /// Returns whether this part matches everyone.
    pub fn is_catch_all(&self) -> bool {
        self.condition.is_always()
    }
}

/// Ordered rule parts attached to one resource. First match wins per bit.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleSet {
    resource: Resource,
    parts: Vec<RulePart>,
}

impl RuleSet {
    pub fn new(resource: Resource) -> Self {
        Self {
            resource,
            parts: Vec::new(),
        }
    }

    pub fn with_part(mut self, part: RulePart) -> Self {
        self.parts.push(part);
        self
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    pub fn parts(&self) -> &[RulePart] {
        &self.parts
    }

    pub(crate) fn parts_mut(&mut self) -> &mut Vec<RulePart> {
        &mut self.parts
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Returns whether an explicit "everyone" part exists.
    pub fn has_catch_all(&self) -> bool {
        self.parts.iter().any(RulePart::is_catch_all)
    }

    /// Same parts, attached to another resource.
    pub(crate) fn retarget(&self, resource: Resource) -> Self {
        Self {
            resource,
            parts: self.parts.clone(),
        }
    }
}
