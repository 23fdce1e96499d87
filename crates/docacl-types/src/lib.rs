//! # docacl-types: Core types for `docacl`
//!
//! This crate contains shared types used across the `docacl` crates:
//! - Document identifiers ([`TableId`], [`ColId`], [`RowId`])
//! - Coarse document roles ([`Access`])
//! - Cell values and rows ([`CellValue`], [`Record`])
//! - User identity bindings ([`UserInfo`])
//! - Document structure ([`DocSchema`])

use std::{
    borrow::Borrow,
    collections::BTreeMap,
    fmt::Display,
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Document Identifiers
// ============================================================================

/// Identifier of a user table within a document.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableId(String);

impl TableId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for TableId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TableId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TableId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Borrow<str> for TableId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Identifier of a column within a table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColId(String);

impl ColId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ColId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ColId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ColId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Borrow<str> for ColId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Row identifier, unique within a table.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct RowId(i64);

impl RowId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }
}

impl Display for RowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for RowId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<RowId> for i64 {
    fn from(id: RowId) -> Self {
        id.0
    }
}

// ============================================================================
// Access
// ============================================================================

/// Coarse document role supplied by the session layer.
///
/// Roles are ordered from least to most privileged:
/// Viewer < Editor < Owner
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Access {
    /// May read the document.
    #[serde(rename = "viewers", alias = "viewer")]
    Viewer,
    /// May read and edit data and structure.
    #[serde(rename = "editors", alias = "editor")]
    Editor,
    /// Full control, including access rules.
    #[serde(rename = "owners", alias = "owner")]
    Owner,
}

impl Access {
    /// Value of the role as seen by formulas (`user.Access`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Access::Viewer => "viewers",
            Access::Editor => "editors",
            Access::Owner => "owners",
        }
    }

    /// Returns whether this role may change document structure when no
    /// rule says otherwise.
    pub fn can_edit_structure(&self) -> bool {
        match self {
            Access::Viewer => false,
            Access::Editor | Access::Owner => true,
        }
    }

    pub fn is_owner(&self) -> bool {
        matches!(self, Access::Owner)
    }
}

impl Display for Access {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error parsing an [`Access`] role.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown access role `{0}` (expected owners, editors or viewers)")]
pub struct ParseAccessError(String);

impl FromStr for Access {
    type Err = ParseAccessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "owners" | "owner" => Ok(Access::Owner),
            "editors" | "editor" => Ok(Access::Editor),
            "viewers" | "viewer" => Ok(Access::Viewer),
            _ => Err(ParseAccessError(s.to_string())),
        }
    }
}

// ============================================================================
// Cell Values
// ============================================================================

/// A value bound into formula evaluation: a cell, a user attribute, or a
/// nested record such as `user.Team`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum CellValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<CellValue>),
    Record(BTreeMap<String, CellValue>),
}

impl CellValue {
    /// Truthiness used by conditions: null, `false`, zero, and empty text
    /// or lists are false.
    pub fn is_truthy(&self) -> bool {
        match self {
            CellValue::Null => false,
            CellValue::Bool(b) => *b,
            CellValue::Int(i) => *i != 0,
            CellValue::Float(f) => *f != 0.0,
            CellValue::Text(s) => !s.is_empty(),
            CellValue::List(items) => !items.is_empty(),
            CellValue::Record(fields) => !fields.is_empty(),
        }
    }

    /// Short type name for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            CellValue::Null => "null",
            CellValue::Bool(_) => "bool",
            CellValue::Int(_) => "int",
            CellValue::Float(_) => "float",
            CellValue::Text(_) => "text",
            CellValue::List(_) => "list",
            CellValue::Record(_) => "record",
        }
    }
}

impl Display for CellValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CellValue::Null => f.write_str(""),
            CellValue::Bool(b) => write!(f, "{b}"),
            CellValue::Int(i) => write!(f, "{i}"),
            CellValue::Float(v) => write!(f, "{v}"),
            CellValue::Text(s) => f.write_str(s),
            CellValue::List(items) => {
                let parts: Vec<String> = items.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            CellValue::Record(fields) => {
                let parts: Vec<String> = fields.iter().map(|(k, v)| format!("{k}: {v}")).collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Int(value)
    }
}

impl From<i32> for CellValue {
    fn from(value: i32) -> Self {
        CellValue::Int(i64::from(value))
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Float(value)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Bool(value)
    }
}

// ============================================================================
// Records
// ============================================================================

/// One row of a table, keyed by column id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Record {
    pub id: RowId,
    #[serde(flatten)]
    pub cells: BTreeMap<ColId, CellValue>,
}

impl Record {
    pub fn new(id: i64) -> Self {
        Self {
            id: RowId::new(id),
            cells: BTreeMap::new(),
        }
    }

    /// Sets a cell (builder pattern).
    pub fn with(mut self, col: impl Into<ColId>, value: impl Into<CellValue>) -> Self {
        self.cells.insert(col.into(), value.into());
        self
    }

    pub fn get(&self, col: &str) -> Option<&CellValue> {
        self.cells.get(col)
    }

    /// Drops every cell whose column is not in `keep`.
    ///
    /// Dropped columns are removed from the row shape, not nulled.
    pub fn retain_columns(&mut self, keep: &[ColId]) {
        self.cells.retain(|col, _| keep.contains(col));
    }

    /// Columns whose values differ between `self` and `other`, including
    /// columns present in only one of them.
    pub fn changed_columns(&self, other: &Record) -> Vec<ColId> {
        let mut changed: Vec<ColId> = self
            .cells
            .iter()
            .filter(|(col, value)| other.cells.get(*col) != Some(*value))
            .map(|(col, _)| col.clone())
            .collect();
        changed.extend(
            other
                .cells
                .keys()
                .filter(|col| !self.cells.contains_key(*col))
                .cloned(),
        );
        changed.sort();
        changed
    }
}

// ============================================================================
// User Identity
// ============================================================================

/// Identity of the requesting user, bound as `user` in formulas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    #[serde(default)]
    pub user_id: Option<i64>,
    pub email: String,
    #[serde(default)]
    pub name: String,
    pub access: Access,
    /// Custom attributes supplied by the session layer (e.g. `user.Team`).
    #[serde(default)]
    pub attributes: BTreeMap<String, CellValue>,
}

impl UserInfo {
    pub fn new(email: impl Into<String>, access: Access) -> Self {
        Self {
            user_id: None,
            email: email.into(),
            name: String::new(),
            access,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<CellValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Looks up an attribute as seen by formulas.
    ///
    /// Built-in attributes (`Email`, `Name`, `Access`, `UserID`) shadow
    /// custom ones with the same name.
    pub fn attribute(&self, name: &str) -> Option<CellValue> {
        match name {
            "Email" => Some(CellValue::Text(self.email.clone())),
            "Name" => Some(CellValue::Text(self.name.clone())),
            "Access" => Some(CellValue::Text(self.access.as_str().to_string())),
            "UserID" => Some(self.user_id.map_or(CellValue::Null, CellValue::Int)),
            other => self.attributes.get(other).cloned(),
        }
    }
}

// ============================================================================
// Document Schema
// ============================================================================

/// Tables and columns that exist in a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DocSchema {
    pub tables: BTreeMap<TableId, Vec<ColId>>,
}

impl DocSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table with its columns (builder pattern).
    pub fn with_table<I, C>(mut self, table: impl Into<TableId>, columns: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<ColId>,
    {
        self.tables
            .insert(table.into(), columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    pub fn has_column(&self, table: &str, col: &str) -> bool {
        self.tables
            .get(table)
            .is_some_and(|cols| cols.iter().any(|c| c.as_str() == col))
    }

    pub fn columns(&self, table: &str) -> &[ColId] {
        self.tables.get(table).map_or(&[], Vec::as_slice)
    }
}

#[cfg(test)]
mod tests;
