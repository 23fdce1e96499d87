//! Document operations and the bits they require.

use std::fmt::{self, Display};

use docacl_formula::Bindings;
use docacl_types::{ColId, TableId};
use tracing::debug;

use crate::error::AccessDenied;
use crate::permissions::Bit;
use crate::policy::Policy;
use crate::resolver::{Decision, resolve};
use crate::resource::{Resource, SpecialKind};

/// An operation a user attempts on a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Action {
    ReadRows { table: TableId },
    ExportTable { table: TableId },
    AddRecord { table: TableId },
    UpdateRecord { table: TableId },
    RemoveRecord { table: TableId },
    AddTable { table: TableId },
    RenameTable { table: TableId },
    RemoveTable { table: TableId },
    AddColumn { table: TableId },
    RenameColumn { table: TableId, col: ColId },
    RemoveColumn { table: TableId, col: ColId },
    ModifyColumn { table: TableId, col: ColId },
    ViewAccessRules,
    EditAccessRules,
    DownloadDocument,
    CopyAsTemplate,
}

impl Action {
    /// The resource whose rules decide this action.
    pub fn resource(&self) -> Resource {
        match self {
            Action::ReadRows { table }
            | Action::ExportTable { table }
            | Action::AddRecord { table }
            | Action::UpdateRecord { table }
            | Action::RemoveRecord { table }
            | Action::AddTable { table }
            | Action::RenameTable { table }
            | Action::RemoveTable { table }
            | Action::AddColumn { table } => Resource::Table(table.clone()),
            Action::RenameColumn { table, col }
            | Action::RemoveColumn { table, col }
            | Action::ModifyColumn { table, col } => Resource::Column(table.clone(), col.clone()),
            Action::ViewAccessRules | Action::EditAccessRules => {
                Resource::Special(SpecialKind::AccessRules)
            }
            Action::DownloadDocument => Resource::Special(SpecialKind::DocCopies),
            Action::CopyAsTemplate => Resource::Special(SpecialKind::FullCopies),
        }
    }

    /// Bits that must all be allowed.
    pub fn required_bits(&self) -> &'static [Bit] {
        match self {
            Action::ReadRows { .. }
            | Action::ExportTable { .. }
            | Action::ViewAccessRules
            | Action::DownloadDocument
            | Action::CopyAsTemplate => &[Bit::Read],
            Action::AddRecord { .. } => &[Bit::Create],
            Action::UpdateRecord { .. } | Action::EditAccessRules => &[Bit::Update],
            Action::RemoveRecord { .. } => &[Bit::Delete],
            Action::AddTable { .. }
            | Action::RenameTable { .. }
            | Action::RemoveTable { .. }
            | Action::AddColumn { .. }
            | Action::RenameColumn { .. }
            | Action::RemoveColumn { .. }
            | Action::ModifyColumn { .. } => &[Bit::Schema],
        }
    }

    /// Returns whether the action is enforced again on each row it touches.
    ///
    /// Only these actions may pass on a row-dependent bit; the row filter
    /// or the mutation check settles it per row.
    pub fn is_row_scoped(&self) -> bool {
        matches!(
            self,
            Action::ReadRows { .. }
                | Action::ExportTable { .. }
                | Action::AddRecord { .. }
                | Action::UpdateRecord { .. }
                | Action::RemoveRecord { .. }
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Action::ReadRows { .. } => "ReadRows",
            Action::ExportTable { .. } => "ExportTable",
            Action::AddRecord { .. } => "AddRecord",
            Action::UpdateRecord { .. } => "UpdateRecord",
            Action::RemoveRecord { .. } => "RemoveRecord",
            Action::AddTable { .. } => "AddTable",
            Action::RenameTable { .. } => "RenameTable",
            Action::RemoveTable { .. } => "RemoveTable",
            Action::AddColumn { .. } => "AddColumn",
            Action::RenameColumn { .. } => "RenameColumn",
            Action::RemoveColumn { .. } => "RemoveColumn",
            Action::ModifyColumn { .. } => "ModifyColumn",
            Action::ViewAccessRules => "ViewAccessRules",
            Action::EditAccessRules => "EditAccessRules",
            Action::DownloadDocument => "DownloadDocument",
            Action::CopyAsTemplate => "CopyAsTemplate",
        }
    }

    /// Parses `Name`, `Name(table)` or `Name(table.col)`.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let (name, target) = match text.split_once('(') {
            Some((name, rest)) => (name.trim(), rest.strip_suffix(')')?.trim()),
            None => (text, ""),
        };
        let table = || (!target.is_empty()).then(|| TableId::from(target));
        let column = || {
            target
                .split_once('.')
                .filter(|(table, col)| !table.is_empty() && !col.is_empty())
                .map(|(table, col)| (TableId::from(table), ColId::from(col)))
        };

        let action = match name {
            "ReadRows" => Action::ReadRows { table: table()? },
            "ExportTable" => Action::ExportTable { table: table()? },
            "AddRecord" => Action::AddRecord { table: table()? },
            "UpdateRecord" => Action::UpdateRecord { table: table()? },
            "RemoveRecord" => Action::RemoveRecord { table: table()? },
            "AddTable" => Action::AddTable { table: table()? },
            "RenameTable" => Action::RenameTable { table: table()? },
            "RemoveTable" => Action::RemoveTable { table: table()? },
            "AddColumn" => Action::AddColumn { table: table()? },
            "RenameColumn" => {
                let (table, col) = column()?;
                Action::RenameColumn { table, col }
            }
            "RemoveColumn" => {
                let (table, col) = column()?;
                Action::RemoveColumn { table, col }
            }
            "ModifyColumn" => {
                let (table, col) = column()?;
                Action::ModifyColumn { table, col }
            }
            "ViewAccessRules" => Action::ViewAccessRules,
            "EditAccessRules" => Action::EditAccessRules,
            "DownloadDocument" => Action::DownloadDocument,
            "CopyAsTemplate" => Action::CopyAsTemplate,
            _ => return None,
        };
        Some(action)
    }
}

impl Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.resource() {
            Resource::Table(table) => write!(f, "{}({table})", self.name()),
            Resource::Column(table, col) => write!(f, "{}({table}.{col})", self.name()),
            Resource::Default | Resource::Special(_) => f.write_str(self.name()),
        }
    }
}

/// Decides whether `action` is permitted.
///
/// On denial, only the memos of parts that denied a required bit are
/// reported, so a rule that denies an unrelated bit under the same
/// condition does not leak into the explanation.
///
/// A required bit that depends on row data passes for row-scoped actions
/// and is denied for every other action.
pub fn authorize(
    policy: &Policy,
    action: &Action,
    bindings: &Bindings<'_>,
) -> Result<Decision, AccessDenied> {
    let decision = resolve(policy, &action.resource(), bindings);
    let required = action.required_bits();
    let mut denied = decision.denied(required);
    if !action.is_row_scoped() {
        denied.extend(
            required
                .iter()
                .copied()
                .filter(|bit| decision.is_row_dependent(*bit)),
        );
    }
    if denied.is_empty() {
        debug!(action = %action, user = %bindings.user.email, "allowed");
        return Ok(decision);
    }

    let memos = decision.memos_for(&denied);
    if policy.settings().log_denials {
        debug!(
            action = %action,
            user = %bindings.user.email,
            denied = ?denied,
            memos = ?memos,
            "denied"
        );
    }
    Err(AccessDenied {
        action: action.to_string(),
        denied,
        memos,
    })
}
