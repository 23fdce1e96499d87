//! Configuration commands.

use anyhow::Result;
use docacl_config::DocaclConfig;

use super::common::check_format;
use crate::style::SemanticStyle;

/// Show the merged configuration.
pub fn show(config: &DocaclConfig, format: &str) -> Result<()> {
    check_format(format, &["text", "json", "toml"])?;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(config)?),
        "toml" => println!("{}", config.to_toml()?),
        _ => {
            println!("{}", "docacl Configuration".header());
            println!("====================\n");

            println!("Engine:");
            println!("  Evaluation budget: {}", config.engine.evaluation_budget);
            println!("  Log denials: {}", config.engine.log_denials);
            println!();

            println!("Logging:");
            println!("  Level: {}", config.logging.level);
            println!();

            println!("History:");
            println!("  Max versions: {}", config.history.max_versions);
        }
    }
    Ok(())
}
