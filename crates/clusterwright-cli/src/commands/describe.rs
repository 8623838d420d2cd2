//! Describe command - show the field schema

use clusterwright_core::{Field, FieldConstraint, Schema};
use console::style;

use crate::display::{mutability_label, print_schema_table};
use crate::error::Result;
use crate::exit_codes;

pub fn run(field: Option<&str>, json_output: bool) -> Result<i32> {
    let constraints: Vec<&FieldConstraint> = match field {
        Some(path) => vec![Schema::describe_path(path)?],
        None => Schema::global().constraints().iter().collect(),
    };

    if json_output {
        println!("{}", serde_json::to_string_pretty(&constraints)?);
        return Ok(exit_codes::SUCCESS);
    }

    match constraints.as_slice() {
        [single] if field.is_some() => print_field(single),
        all => print_schema_table(all),
    }
    Ok(exit_codes::SUCCESS)
}

fn print_field(constraint: &FieldConstraint) {
    println!("{}", style(constraint.field.path()).bold());
    println!("  {}", constraint.description);
    println!("  Mutability:  {}", mutability_label(constraint.mutability));
    println!("  Required:    {}", constraint.required);
    println!("  Comparison:  {:?}", constraint.comparison);

    if !constraint.conflicts_with.is_empty() {
        println!("  Conflicts:   {}", join_paths(&constraint.conflicts_with));
    }
    if !constraint.required_with.is_empty() {
        println!("  Requires:    {}", join_paths(&constraint.required_with));
    }
}

fn join_paths(fields: &[Field]) -> String {
    fields.iter().map(|f| f.path()).collect::<Vec<_>>().join(", ")
}
