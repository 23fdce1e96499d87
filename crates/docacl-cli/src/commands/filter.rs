//! Filter command: one user's view of a table.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use comfy_table::Cell;
use docacl::{Bit, EngineSettings, TableView};
use docacl_types::{ColId, Record};
use serde_json::json;

use super::common::{UserArgs, check_format, load_policy, read_json};
use crate::style::SemanticStyle;
use crate::style::table::styled_table;

pub struct FilterArgs<'a> {
    pub rules: &'a Path,
    pub table: &'a str,
    pub data: &'a Path,
    pub columns: &'a [String],
    pub offset: usize,
    pub limit: usize,
    pub format: &'a str,
}

pub fn run(args: &FilterArgs<'_>, user: &UserArgs, settings: EngineSettings) -> Result<()> {
    check_format(args.format, &["text", "json"])?;
    let policy = Arc::new(load_policy(args.rules, settings)?);
    let rows: Vec<Record> = read_json(args.data)?;
    let columns = requested_columns(args.columns, &rows);
    let user = user.user();

    let view = TableView::build(policy, args.table, &user, &columns, &rows);
    let page = view.page(args.offset, args.limit);

    if args.format == "json" {
        let report = json!({
            "table": view.table(),
            "columns": view.columns(),
            "restricted_columns": view.restricted_columns(),
            "offset": page.offset,
            "total": page.total,
            "rows": page.rows,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let mut headers = vec!["id"];
    headers.extend(view.columns().iter().map(ColId::as_str));
    headers.push("can edit");
    let mut table = styled_table(&headers);
    for (row, decision) in page.rows.iter().zip(page.permissions) {
        let mut cells = vec![Cell::new(row.id)];
        cells.extend(view.columns().iter().map(|col| {
            let value = row.get(col.as_str()).map(ToString::to_string);
            Cell::new(value.unwrap_or_default())
        }));
        cells.push(Cell::new(if decision.allows(Bit::Update) { "yes" } else { "no" }));
        table.add_row(cells);
    }
    println!("{table}");

    let shown_end = page.offset + page.rows.len();
    println!(
        "{}",
        format!(
            "rows {}-{} of {} visible (of {} in data)",
            if page.rows.is_empty() { 0 } else { page.offset + 1 },
            shown_end,
            page.total,
            rows.len()
        )
        .muted()
    );
    if !view.restricted_columns().is_empty() {
        let restricted: Vec<String> = view
            .restricted_columns()
            .iter()
            .map(ToString::to_string)
            .collect();
        println!(
            "{}",
            format!("restricted columns: {}", restricted.join(", ")).warning()
        );
    }
    Ok(())
}

/// Explicit columns, or every column present in the data in sorted order.
fn requested_columns(explicit: &[String], rows: &[Record]) -> Vec<ColId> {
    if !explicit.is_empty() {
        return explicit.iter().map(|c| ColId::from(c.trim())).collect();
    }
    let all: BTreeSet<&ColId> = rows.iter().flat_map(|row| row.cells.keys()).collect();
    all.into_iter().cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns_default_to_data() {
        let rows = vec![
            Record::new(1).with("B", 1).with("A", 2),
            Record::new(2).with("C", 3),
        ];
        let cols = requested_columns(&[], &rows);
        assert_eq!(cols, vec![ColId::from("A"), ColId::from("B"), ColId::from("C")]);

        let explicit = requested_columns(&["C".to_string(), " A".to_string()], &rows);
        assert_eq!(explicit, vec![ColId::from("C"), ColId::from("A")]);
    }
}
