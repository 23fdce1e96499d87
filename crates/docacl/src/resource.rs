//! What a rule applies to.
//!
//! Persisted resources are a `(table_id, col_ids)` pair:
//!
//! | `table_id`  | `col_ids` | Resource            |
//! |-------------|-----------|---------------------|
//! | `*`         | `*`       | Default             |
//! | `T`         | `*`       | Table `T`           |
//! | `T`         | `C`       | Column `T.C`        |
//! | `*SPECIAL`  | `Kind`    | Special `Kind`      |

use std::fmt::{self, Display};
use std::str::FromStr;

use docacl_types::{ColId, TableId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Wildcard used for the default table and for "all columns".
pub const WILDCARD: &str = "*";

/// Table id under which special resources are persisted.
pub const SPECIAL_TABLE: &str = "*SPECIAL";

/// Cross-cutting resources that govern meta-operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SpecialKind {
    /// Rules that stand in for any table without rules of its own.
    SeedRule,
    /// Structural edits: tables, columns, column types.
    SchemaEdit,
    /// Viewing and editing the access rules themselves.
    AccessRules,
    /// Downloading or copying the document.
    DocCopies,
    /// Copying the full document as a template.
    FullCopies,
}

impl SpecialKind {
    pub const ALL: [SpecialKind; 5] = [
        SpecialKind::SeedRule,
        SpecialKind::SchemaEdit,
        SpecialKind::AccessRules,
        SpecialKind::DocCopies,
        SpecialKind::FullCopies,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SpecialKind::SeedRule => "SeedRule",
            SpecialKind::SchemaEdit => "SchemaEdit",
            SpecialKind::AccessRules => "AccessRules",
            SpecialKind::DocCopies => "DocCopies",
            SpecialKind::FullCopies => "FullCopies",
        }
    }
}

impl Display for SpecialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SpecialKind {
    type Err = ResourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ResourceError::UnknownSpecial(s.to_string()))
    }
}

/// Errors from decoding a persisted resource.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    #[error("table id is empty")]
    EmptyTable,

    #[error("column list is empty")]
    EmptyColumns,

    #[error("unknown special resource `{0}`")]
    UnknownSpecial(String),

    #[error("the default table cannot name columns (`{0}`)")]
    DefaultWithColumns(String),

    #[error("resources name a single column, got `{0}`")]
    MultipleColumns(String),
}

/// The thing a rule set applies to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Resource {
    /// Every table and column not otherwise covered.
    Default,
    Table(TableId),
    Column(TableId, ColId),
    Special(SpecialKind),
}

impl Resource {
    pub fn table(id: impl Into<TableId>) -> Self {
        Resource::Table(id.into())
    }

    pub fn column(table: impl Into<TableId>, col: impl Into<ColId>) -> Self {
        Resource::Column(table.into(), col.into())
    }

    /// Decodes a persisted `(table_id, col_ids)` pair.
    pub fn from_parts(table_id: &str, col_ids: &str) -> Result<Self, ResourceError> {
        let table_id = table_id.trim();
        let col_ids = col_ids.trim();
        if table_id.is_empty() {
            return Err(ResourceError::EmptyTable);
        }
        if col_ids.is_empty() {
            return Err(ResourceError::EmptyColumns);
        }

        match (table_id, col_ids) {
            (SPECIAL_TABLE, kind) => kind.parse().map(Resource::Special),
            (WILDCARD, WILDCARD) => Ok(Resource::Default),
            (WILDCARD, cols) => Err(ResourceError::DefaultWithColumns(cols.to_string())),
            (table, WILDCARD) => Ok(Resource::table(table)),
            (_, cols) if cols.contains(',') => {
                Err(ResourceError::MultipleColumns(cols.to_string()))
            }
            (table, col) => Ok(Resource::column(table, col)),
        }
    }

    /// Encodes as a persisted `(table_id, col_ids)` pair.
    pub fn to_parts(&self) -> (String, String) {
        match self {
            Resource::Default => (WILDCARD.into(), WILDCARD.into()),
            Resource::Table(table) => (table.to_string(), WILDCARD.into()),
            Resource::Column(table, col) => (table.to_string(), col.to_string()),
            Resource::Special(kind) => (SPECIAL_TABLE.into(), kind.as_str().into()),
        }
    }

    /// The table a table or column resource belongs to.
    pub fn table_id(&self) -> Option<&TableId> {
        match self {
            Resource::Table(table) | Resource::Column(table, _) => Some(table),
            Resource::Default | Resource::Special(_) => None,
        }
    }

    pub fn is_special(&self, kind: SpecialKind) -> bool {
        *self == Resource::Special(kind)
    }
}

impl Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Default => f.write_str("*"),
            Resource::Table(table) => write!(f, "{table}"),
            Resource::Column(table, col) => write!(f, "{table}.{col}"),
            Resource::Special(kind) => write!(f, "{SPECIAL_TABLE}:{kind}"),
        }
    }
}
