//! Row and column filtering, and write checks.
//!
//! Reads are filtered up front: a column the user cannot read is removed
//! from the row shape and from the column listing, and a row the user cannot
//! read is removed from results, counts and exports. Writes are checked at
//! mutation time against the rows they touch.

use std::sync::Arc;

use docacl_formula::Bindings;
use docacl_types::{ColId, Record, TableId, UserInfo};
use tracing::{debug, warn};

use crate::error::AccessDenied;
use crate::permissions::Bit;
use crate::policy::Policy;
use crate::resolver::{Decision, resolve};
use crate::resource::Resource;

// ============================================================================
// Columns
// ============================================================================

/// Columns split by read access.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ColumnFilter {
    pub visible: Vec<ColId>,
    pub restricted: Vec<ColId>,
    /// Visible columns whose Read depends on row data. Their cells are
    /// checked again on each row.
    pub row_dependent: Vec<ColId>,
}

/// Resolves read access for each column of `table`, without row data.
///
/// A column is restricted only when rules decide its Read without looking
/// at a row. If a row-dependent part comes first, the column stays visible
/// and [`censor_row`] settles each of its cells.
pub fn filter_columns(
    policy: &Policy,
    table: &TableId,
    user: &UserInfo,
    col_ids: &[ColId],
) -> ColumnFilter {
    let bindings = Bindings::new(user);
    let mut filter = ColumnFilter::default();
    for col in col_ids {
        let resource = Resource::Column(table.clone(), col.clone());
        let decision = resolve(policy, &resource, &bindings);
        if !decision.allows(Bit::Read) {
            filter.restricted.push(col.clone());
            continue;
        }
        if decision.is_row_dependent(Bit::Read) {
            filter.row_dependent.push(col.clone());
        }
        filter.visible.push(col.clone());
    }

    if !filter.restricted.is_empty() {
        warn!(
            table = %table,
            user = %user.email,
            restricted = ?filter.restricted,
            "columns filtered by policy"
        );
    }
    filter
}

/// Removes the cells of `row` the user may not read: columns outside
/// `columns.visible`, and row-dependent columns whose rules deny this row.
pub fn censor_row(
    policy: &Policy,
    table: &TableId,
    user: &UserInfo,
    columns: &ColumnFilter,
    row: &mut Record,
) {
    row.retain_columns(&columns.visible);
    let bindings = Bindings::new(user).with_rec(row);
    let hidden: Vec<ColId> = columns
        .row_dependent
        .iter()
        .filter(|col| {
            let resource = Resource::Column(table.clone(), (*col).clone());
            !resolve(policy, &resource, &bindings).allows(Bit::Read)
        })
        .cloned()
        .collect();
    for col in &hidden {
        row.cells.remove(col);
    }
}

// ============================================================================
// Rows
// ============================================================================

/// Rows the user can read, each with its resolved table decision.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RowFilter {
    pub visible: Vec<Record>,
    /// One decision per visible row, in the same order.
    pub permissions: Vec<Decision>,
}

/// Resolves read access for each row of `table` with `rec` bound to it.
pub fn filter_rows(
    policy: &Policy,
    table: &TableId,
    user: &UserInfo,
    rows: &[Record],
) -> RowFilter {
    let resource = Resource::Table(table.clone());
    let mut filter = RowFilter::default();
    for row in rows {
        let decision = resolve(policy, &resource, &Bindings::new(user).with_rec(row));
        if decision.allows(Bit::Read) {
            filter.visible.push(row.clone());
            filter.permissions.push(decision);
        }
    }

    debug!(
        table = %table,
        user = %user.email,
        total = rows.len(),
        visible = filter.visible.len(),
        "filtered rows"
    );
    filter
}

// ============================================================================
// Table views
// ============================================================================

/// One user's view of a table, built from a single policy snapshot and a
/// single set of rows.
///
/// Every page and the total count come from the same view, so a page can
/// never disagree with the count it is shown with.
#[derive(Debug, Clone)]
pub struct TableView {
    policy: Arc<Policy>,
    table: TableId,
    columns: Vec<ColId>,
    restricted: Vec<ColId>,
    rows: Vec<Record>,
    permissions: Vec<Decision>,
}

/// A slice of a [`TableView`].
#[derive(Debug, Clone, Copy)]
pub struct Page<'v> {
    pub rows: &'v [Record],
    pub permissions: &'v [Decision],
    pub offset: usize,
    pub total: usize,
}

impl TableView {
    /// Filters columns, then rows, against `policy`.
    ///
    /// Restricted columns are removed from each visible row entirely; a
    /// row-dependent column loses its cell on rows its rules deny.
    pub fn build(
        policy: Arc<Policy>,
        table: impl Into<TableId>,
        user: &UserInfo,
        col_ids: &[ColId],
        rows: &[Record],
    ) -> Self {
        let table = table.into();
        let columns = filter_columns(&policy, &table, user, col_ids);
        let RowFilter {
            visible,
            permissions,
        } = filter_rows(&policy, &table, user, rows);

        let rows = visible
            .into_iter()
            .map(|mut row| {
                censor_row(&policy, &table, user, &columns, &mut row);
                row
            })
            .collect();

        Self {
            policy,
            table,
            columns: columns.visible,
            restricted: columns.restricted,
            rows,
            permissions,
        }
    }

    pub fn table(&self) -> &TableId {
        &self.table
    }

    /// Columns the user may see, in request order.
    pub fn columns(&self) -> &[ColId] {
        &self.columns
    }

    pub fn restricted_columns(&self) -> &[ColId] {
        &self.restricted
    }

    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    pub fn permissions(&self) -> &[Decision] {
        &self.permissions
    }

    /// Number of visible rows.
    pub fn total(&self) -> usize {
        self.rows.len()
    }

    /// Version of the policy snapshot this view was built from.
    pub fn policy_version(&self) -> u64 {
        self.policy.version()
    }

    pub fn page(&self, offset: usize, limit: usize) -> Page<'_> {
        let start = offset.min(self.rows.len());
        let end = start.saturating_add(limit).min(self.rows.len());
        Page {
            rows: &self.rows[start..end],
            permissions: &self.permissions[start..end],
            offset: start,
            total: self.total(),
        }
    }
}

// ============================================================================
// Mutations
// ============================================================================

/// A proposed row change.
#[derive(Debug, Clone, Copy)]
pub enum Mutation<'a> {
    Add {
        table: &'a TableId,
        new: &'a Record,
    },
    Update {
        table: &'a TableId,
        old: &'a Record,
        new: &'a Record,
    },
    Remove {
        table: &'a TableId,
        old: &'a Record,
    },
}

impl Mutation<'_> {
    fn label(&self) -> String {
        match self {
            Mutation::Add { table, .. } => format!("AddRecord({table})"),
            Mutation::Update { table, .. } => format!("UpdateRecord({table})"),
            Mutation::Remove { table, .. } => format!("RemoveRecord({table})"),
        }
    }
}

/// Checks a row change against the table rules and, for adds and updates,
/// the rules of every column it writes.
///
/// `rec` is bound to the existing row and `newRec` to the proposed one.
pub fn check_mutation(
    policy: &Policy,
    user: &UserInfo,
    mutation: Mutation<'_>,
) -> Result<(), AccessDenied> {
    let (table, bindings, row_bit, columns, column_bit) = match mutation {
        Mutation::Add { table, new } => (
            table,
            Bindings::new(user).with_new_rec(new),
            Bit::Create,
            new.cells.keys().cloned().collect::<Vec<_>>(),
            Bit::Create,
        ),
        Mutation::Update { table, old, new } => (
            table,
            Bindings::new(user).with_rec(old).with_new_rec(new),
            Bit::Update,
            old.changed_columns(new),
            Bit::Update,
        ),
        Mutation::Remove { table, old } => (
            table,
            Bindings::new(user).with_rec(old),
            Bit::Delete,
            Vec::new(),
            Bit::Delete,
        ),
    };

    let mut denied: Vec<Bit> = Vec::new();
    let mut memos: Vec<String> = Vec::new();
    let mut note = |decision: &Decision, bit: Bit| {
        if decision.allows(bit) {
            return;
        }
        if !denied.contains(&bit) {
            denied.push(bit);
        }
        for memo in decision.memos_for(&[bit]) {
            if !memos.contains(&memo) {
                memos.push(memo);
            }
        }
    };

    let row = resolve(policy, &Resource::Table(table.clone()), &bindings);
    note(&row, row_bit);
    for col in columns {
        let decision = resolve(policy, &Resource::Column(table.clone(), col), &bindings);
        note(&decision, column_bit);
    }

    if denied.is_empty() {
        return Ok(());
    }
    let denial = AccessDenied {
        action: mutation.label(),
        denied,
        memos,
    };
    if policy.settings().log_denials {
        debug!(user = %user.email, error = %denial, "mutation denied");
    }
    Err(denial)
}
