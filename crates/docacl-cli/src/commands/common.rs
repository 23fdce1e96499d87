//! Inputs shared by the commands: rule files, row files and the user.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use docacl::{EngineSettings, PersistedRules, Policy};
use docacl_types::{Access, CellValue, UserInfo};
use serde::de::DeserializeOwned;

/// The user a command resolves permissions for.
#[derive(Debug, Args)]
pub struct UserArgs {
    /// User email (`user.Email`).
    #[arg(long, default_value = "anon@example.com")]
    pub email: String,

    /// Document role (owners, editors, viewers).
    #[arg(long, default_value = "viewers")]
    pub access: Access,

    /// User name (`user.Name`).
    #[arg(long)]
    pub name: Option<String>,

    /// Numeric user id (`user.UserID`).
    #[arg(long)]
    pub user_id: Option<i64>,

    /// Custom attribute as KEY=VALUE; VALUE is read as JSON, else as text.
    #[arg(long = "attr", value_parser = parse_attribute)]
    pub attributes: Vec<(String, CellValue)>,
}

impl UserArgs {
    pub fn user(&self) -> UserInfo {
        let mut user = UserInfo::new(&self.email, self.access);
        if let Some(name) = &self.name {
            user = user.with_name(name);
        }
        user.user_id = self.user_id;
        for (key, value) in &self.attributes {
            user = user.with_attribute(key, value.clone());
        }
        user
    }
}

fn parse_attribute(text: &str) -> Result<(String, CellValue), String> {
    let (key, value) = text
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{text}`"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing attribute name in `{text}`"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| CellValue::from(value));
    Ok((key.to_string(), value))
}

/// Reads and parses a JSON file.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Reads rule records and builds a policy from them.
pub fn load_policy(path: &Path, settings: EngineSettings) -> Result<Policy> {
    let records: PersistedRules = read_json(path)?;
    Policy::from_records_with(&records, settings)
        .with_context(|| format!("Invalid rules in {}", path.display()))
}

/// Fails on an output format the command does not support.
pub fn check_format(format: &str, supported: &[&str]) -> Result<()> {
    if supported.contains(&format) {
        Ok(())
    } else {
        anyhow::bail!(
            "Unknown format `{format}` (expected {})",
            supported.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attributes_parse_json_then_text() {
        assert_eq!(
            parse_attribute("Team=Finance").unwrap(),
            ("Team".to_string(), CellValue::Text("Finance".into()))
        );
        assert_eq!(
            parse_attribute("Level=3").unwrap(),
            ("Level".to_string(), CellValue::Int(3))
        );
        assert_eq!(
            parse_attribute("Tags=[\"a\"]").unwrap().1,
            CellValue::List(vec![CellValue::Text("a".into())])
        );
        assert!(parse_attribute("Team").is_err());
        assert!(parse_attribute("=x").is_err());
    }
}
