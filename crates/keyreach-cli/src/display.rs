use colored::*;
use keyreach_core::error::WalkError;
use keyreach_core::model::{AnalyzerResult, Metadata, Permission, Resource};
use serde_json::Value;

/// Print an analysis result to the terminal.
pub fn print_result(result: &AnalyzerResult) {
    println!();
    println!(
        "{}",
        format!(
            " keyreach v{} — {} credential",
            env!("CARGO_PKG_VERSION"),
            result.analyzer_type
        )
        .bold()
    );
    println!();

    if !result.metadata.is_empty() {
        println!(" {}", "Credential".bold().underline());
        print_metadata(&result.metadata, " ");
        println!();
    }

    println!(" {}", "=".repeat(60).dimmed());
    println!();

    let bound = result.bound_resources();
    if bound.is_empty() {
        println!(
            " {} The credential holds no permission on any discovered resource.",
            "--".dimmed()
        );
    } else {
        println!(" {}", "Access".bold().underline());
        for resource in &bound {
            print_resource_header(resource);
            let permissions: Vec<&Permission> = result
                .bindings
                .iter()
                .filter(|b| b.resource.fully_qualified_name == resource.fully_qualified_name)
                .map(|b| &b.permission)
                .collect();
            for permission in permissions {
                print_permission(permission);
            }
        }
    }
    println!();

    if !result.unbounded_resources.is_empty() {
        println!(" {}", "Visible without permissions".bold().underline());
        for resource in &result.unbounded_resources {
            println!(
                " {} {} {}",
                "|-".dimmed(),
                resource.fully_qualified_name.yellow(),
                format!("({})", resource.resource_type).dimmed()
            );
        }
        println!();
    }

    println!(" {}", "=".repeat(60).dimmed());
    println!();
    println!(" {}", "Summary".bold().underline());
    println!(
        " {} Resources:    {}",
        "|-".dimmed(),
        result.resource_count()
    );
    println!(
        " {} Bound:        {}",
        "|-".dimmed(),
        bound.len().to_string().green().bold()
    );
    println!(
        " {} Unbounded:    {}",
        "|-".dimmed(),
        result.unbounded_resources.len()
    );
    println!(
        " {} Bindings:     {}",
        "|-".dimmed(),
        result.bindings.len()
    );
    println!();
}

fn print_resource_header(resource: &Resource) {
    let mut path: Vec<&str> = resource.ancestors().map(|r| r.name.as_str()).collect();
    path.reverse();
    let location = if path.is_empty() {
        String::new()
    } else {
        format!(" in {}", path.join(" / "))
    };

    println!(
        " {} {} {}{}",
        format!(" {} ", resource.resource_type).on_blue().white().bold(),
        resource.name.bold(),
        resource.fully_qualified_name.dimmed(),
        location.dimmed()
    );
    if !resource.metadata.is_empty() {
        print_metadata(&resource.metadata, "   ");
    }
}

fn print_permission(permission: &Permission) {
    match &permission.parent {
        Some(parent) => println!(
            "   {} {} {}",
            "+".green(),
            permission.value.green(),
            format!("(via {})", parent.value).dimmed()
        ),
        None => println!("   {} {}", "+".green(), permission.value.green()),
    }
}

fn print_metadata(metadata: &Metadata, indent: &str) {
    for (key, value) in metadata {
        println!("{}{} {}: {}", indent, "|".dimmed(), key, format_value(value));
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) if items.is_empty() => "none".dimmed().to_string(),
        Value::Array(items) => items
            .iter()
            .map(format_value)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Bool(true) => "yes".to_string(),
        Value::Bool(false) => "no".to_string(),
        other => other.to_string(),
    }
}

/// Print the branches a partial walk lost.
pub fn print_partial_error(err: &WalkError) {
    println!(
        " {} {}",
        " PARTIAL ".on_yellow().black().bold(),
        format!("{} branch(es) could not be walked; results above are incomplete", err.len()).bold()
    );
    for branch in &err.branches {
        println!("   {} {}", "|".dimmed(), branch.to_string().red());
    }
    println!();
}
