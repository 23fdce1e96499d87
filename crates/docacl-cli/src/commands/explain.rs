//! Explain command: resolve one action and show how each bit was decided.

use std::path::Path;

use anyhow::{Context, Result};
use docacl::{Action, Bindings, Decision, DecisionSource, EngineSettings, authorize, resolve};
use docacl_types::Record;
use serde_json::json;

use super::common::{UserArgs, check_format, load_policy, read_json};
use crate::style::SemanticStyle;
use crate::style::table::{outcome_cell, styled_table};

pub fn run(
    rules: &Path,
    action: &str,
    user: &UserArgs,
    row: Option<&Path>,
    new_row: Option<&Path>,
    settings: EngineSettings,
    format: &str,
) -> Result<()> {
    check_format(format, &["text", "json"])?;
    let policy = load_policy(rules, settings)?;
    let action = Action::parse(action)
        .with_context(|| format!("Unknown action `{action}` (expected e.g. RenameTable(T1))"))?;

    let user = user.user();
    let rec: Option<Record> = row.map(read_json::<Record>).transpose()?;
    let new_rec: Option<Record> = new_row.map(read_json::<Record>).transpose()?;
    let mut bindings = Bindings::new(&user);
    if let Some(rec) = &rec {
        bindings = bindings.with_rec(rec);
    }
    if let Some(new_rec) = &new_rec {
        bindings = bindings.with_new_rec(new_rec);
    }

    let decision = resolve(&policy, &action.resource(), &bindings);
    let outcome = authorize(&policy, &action, &bindings);

    if format == "json" {
        let report = json!({
            "action": action.to_string(),
            "resource": action.resource().to_string(),
            "allowed": outcome.is_ok(),
            "decision": decision,
            "denial": outcome.as_ref().err().map(ToString::to_string),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_decision(&action, &decision);
        match &outcome {
            Ok(_) => println!("{}", format!("{action} allowed").success()),
            Err(denied) => println!("{}", denied.to_string().error()),
        }
    }

    outcome.map(|_| ()).map_err(Into::into)
}

fn print_decision(action: &Action, decision: &Decision) {
    println!(
        "{} {} on {}",
        "Resolving".header(),
        action,
        action.resource()
    );
    let required = action.required_bits();
    let mut table = styled_table(&["Bit", "Required", "Outcome", "Decided by", "Memo"]);
    for bit in decision.bits() {
        let source = match &bit.source {
            DecisionSource::Rule { rule, resource } => format!("rule {rule} on {resource}"),
            DecisionSource::RowDependent { rule, resource } => {
                format!("rule {rule} on {resource} (per row)")
            }
            DecisionSource::RoleDefault => "role default".to_string(),
        };
        table.add_row(vec![
            comfy_table::Cell::new(bit.bit.to_string()),
            comfy_table::Cell::new(if required.contains(&bit.bit) { "yes" } else { "" }),
            outcome_cell(bit.allowed),
            comfy_table::Cell::new(source),
            comfy_table::Cell::new(bit.memo.as_deref().unwrap_or("")),
        ]);
    }
    println!("{table}");
}
