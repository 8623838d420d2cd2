//! Display formatting for CLI output
//!
//! Provides structured display for:
//! - Validation errors grouped by field path
//! - Change sets with operation colors and drift notes
//! - Schema field tables

use clusterwright_core::{FieldConstraint, Mutability, ValidationError};
use clusterwright_engine::{ChangeSet, Operation};
use console::style;
use std::collections::BTreeMap;

/// Print validation errors grouped by their top-level section
pub fn print_validation_errors(source: &str, errors: &[ValidationError]) {
    let mut by_section: BTreeMap<&str, Vec<&ValidationError>> = BTreeMap::new();
    for error in errors {
        let section = error.path.split(['.', '[']).next().unwrap_or(&error.path);
        by_section.entry(section).or_default().push(error);
    }

    println!("{} {}", style("✗").red().bold(), style(source).bold());
    for (section, errors) in by_section {
        println!("  {}", style(section).cyan());
        for error in errors {
            println!(
                "    {} {} {}",
                style("•").red(),
                style(&error.path).dim(),
                error.message
            );
        }
    }
    println!();
    println!(
        "{} {} validation error(s)",
        style("✗").red().bold(),
        errors.len()
    );
}

/// Print a change set the way `plan` reports it
pub fn print_change_set(change_set: &ChangeSet) {
    let header = match change_set.operation {
        Operation::Create => style(format!("+ create {}", change_set.id)).green().bold(),
        Operation::Update => style(format!("~ update {} in place", change_set.id)).yellow().bold(),
        Operation::Replace => style(format!("-/+ replace {}", change_set.id)).red().bold(),
        Operation::NoOp => style(format!("  {} is up to date", change_set.id)).dim(),
    };
    println!("{}", header);

    for change in &change_set.replacements {
        println!(
            "    {} {} {} {} {}",
            style("-/+").red(),
            change.field,
            style(&change.from).dim(),
            style("→").dim(),
            change.to
        );
    }
    for change in &change_set.changes {
        println!(
            "    {} {} {} {} {}",
            style("~").yellow(),
            change.field,
            style(&change.from).dim(),
            style("→").dim(),
            change.to
        );
    }
    if change_set.operation == Operation::Replace {
        println!(
            "    {} {}",
            style("!").red(),
            style("immutable field(s) changed; the cluster will be deleted and recreated").red()
        );
    }

    if !change_set.drift.is_empty() {
        println!();
        println!("{}", style("Drift (not corrected):").yellow());
        for drift in &change_set.drift {
            println!("    {} {}", style("⚠").yellow(), drift);
        }
    }
}

/// Short label for a field's mutability
pub fn mutability_label(mutability: Mutability) -> String {
    match mutability {
        Mutability::Immutable => "immutable".to_string(),
        Mutability::ForceReplace => "force-replace".to_string(),
        Mutability::Mutable => "mutable".to_string(),
        Mutability::MutableOnTiers(tiers) => {
            let tiers: Vec<String> = tiers.iter().map(|t| t.to_string()).collect();
            format!("mutable ({})", tiers.join(", "))
        }
        Mutability::Computed => "computed".to_string(),
        Mutability::WriteOnly => "write-only".to_string(),
    }
}

/// Print one row per field
pub fn print_schema_table(constraints: &[&FieldConstraint]) {
    let width = constraints
        .iter()
        .map(|c| c.field.path().len())
        .max()
        .unwrap_or(0);

    for constraint in constraints {
        let label = mutability_label(constraint.mutability);
        let label = match constraint.mutability {
            Mutability::Immutable | Mutability::ForceReplace => style(label).red(),
            Mutability::Mutable | Mutability::MutableOnTiers(_) => style(label).green(),
            Mutability::Computed | Mutability::WriteOnly => style(label).dim(),
        };
        println!(
            "{:width$}  {:<22} {}{}",
            constraint.field.path(),
            label,
            constraint.description,
            if constraint.required { " (required)" } else { "" },
            width = width
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clusterwright_core::Tier;

    #[test]
    fn test_mutability_labels() {
        assert_eq!(mutability_label(Mutability::ForceReplace), "force-replace");
        assert_eq!(
            mutability_label(Mutability::MutableOnTiers(&[Tier::Standard])),
            "mutable (Standard)"
        );
        assert_eq!(mutability_label(Mutability::WriteOnly), "write-only");
    }
}
