//! Check command: build a policy and report what is wrong with it.

use std::path::Path;

use anyhow::Result;
use docacl::validate::{Severity, Warning, validate};
use docacl::{EngineSettings, Policy};
use docacl_types::DocSchema;
use serde_json::json;

use super::common::{check_format, load_policy, read_json};
use crate::style::SemanticStyle;

pub fn run(
    rules: &Path,
    schema: Option<&Path>,
    settings: EngineSettings,
    format: &str,
) -> Result<()> {
    check_format(format, &["text", "json"])?;
    let policy = load_policy(rules, settings)?;

    let mut findings = Vec::new();
    if let Some(path) = schema {
        let schema: DocSchema = read_json(path)?;
        findings = validate(&policy, &schema);
    }
    if policy.exposes_doc_copies() {
        findings.push(Warning::new(
            Severity::Warning,
            None,
            "access rules are readable by non-owners; copies of the document may reveal restricted data",
        ));
    }

    let errors = findings
        .iter()
        .filter(|w| w.severity == Severity::Error)
        .count();

    if format == "json" {
        let report = json!({
            "rule_sets": policy.rule_sets().count(),
            "rules": rule_count(&policy),
            "exposes_doc_copies": policy.exposes_doc_copies(),
            "findings": findings,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "{} {} rule sets, {} rules",
            "Checked".header(),
            policy.rule_sets().count(),
            rule_count(&policy)
        );
        for finding in &findings {
            let line = finding.to_string();
            match finding.severity {
                Severity::Error => println!("  {}", line.error()),
                Severity::Warning => println!("  {}", line.warning()),
                Severity::Info => println!("  {}", line.muted()),
            }
        }
        if findings.is_empty() {
            println!("{}", "No problems found".success());
        }
    }

    if errors > 0 {
        anyhow::bail!("{errors} error(s) in {}", rules.display());
    }
    Ok(())
}

fn rule_count(policy: &Policy) -> usize {
    policy.rule_sets().map(|set| set.len()).sum()
}
