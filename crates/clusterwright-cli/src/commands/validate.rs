//! Validate command - pre-flight checks on a spec file

use clusterwright_core::validate;
use console::style;
use std::path::Path;

use crate::commands::load_spec;
use crate::display::print_validation_errors;
use crate::error::Result;
use crate::exit_codes;

pub fn run(path: &Path, json_output: bool) -> Result<i32> {
    let spec = load_spec(path)?;
    let errors = validate(&spec);

    if json_output {
        let output = serde_json::json!({
            "valid": errors.is_empty(),
            "cluster": spec.id().to_string(),
            "errors": errors,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if errors.is_empty() {
        println!(
            "{} {} ({} role group(s), tier {})",
            style("✓").green().bold(),
            style(spec.id()).cyan(),
            spec.roles.len(),
            spec.tier
        );
        println!("{} Validation passed!", style("✓").green().bold());
    } else {
        print_validation_errors(&path.display().to_string(), &errors);
    }

    Ok(if errors.is_empty() {
        exit_codes::SUCCESS
    } else {
        exit_codes::VALIDATION_ERROR
    })
}
