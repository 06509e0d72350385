use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use comfy_table::{Cell, Color as TableColor, Table};
use std::path::PathBuf;

use schemaplan::{ChangeType, DiffOperation, DiffReport};

use crate::examples::ExampleGroup;
use crate::output::{OutputManager, TableDisplay};
use crate::theme::THEME;

pub const EXAMPLES: &[ExampleGroup] = &[ExampleGroup {
    title: "Plan",
    commands: &[
        "schemaplan diff                              # Compare the live schema to the configured snapshot",
        "schemaplan diff --snapshot staging.json      # Compare against another snapshot",
        "schemaplan --output json diff                # Machine-readable plan",
    ],
}];

#[derive(Args)]
pub struct DiffArgs {
    /// Desired snapshot (defaults to snapshot_path from config.toml)
    #[arg(long, value_name = "PATH")]
    pub snapshot: Option<PathBuf>,
}

pub async fn handle_diff(args: DiffArgs, output: &OutputManager) -> Result<()> {
    let ctx = super::require_project(output)?;
    let (path, desired) = super::load_desired(&ctx, args.snapshot)?;
    let store = super::load_store(&ctx.store_path())?;

    output.heading("Schema Diff");
    output.key_value("Desired", &super::display_path(&ctx, &path));

    output.progress("Capturing live schema");
    let current = schemaplan::snapshot(&store.metadata, None)
        .await
        .context("Failed to capture the live schema")?;
    output.clear_line();

    let plan = schemaplan::plan(&current, &desired).context("Failed to compute the diff")?;
    show_plan(&plan, output)?;

    if !plan.is_empty() && !output.is_json() {
        output.info("Run 'schemaplan apply' to apply these changes");
    }
    Ok(())
}

/// Print a plan, or a short note when there is nothing to do.
pub fn show_plan(plan: &DiffReport, output: &OutputManager) -> Result<()> {
    if plan.is_empty() && !output.is_json() {
        output.success("Live schema matches the snapshot");
        return Ok(());
    }
    output.display(plan)?;
    if !output.is_json() {
        output.key_value("Summary", &plan.summary.to_string());
    }
    Ok(())
}

/// Extra detail shown next to an operation.
fn details(operation: &DiffOperation) -> String {
    match operation {
        DiffOperation::CreateField { field } => {
            let mut parts = vec![field.field_type.to_string()];
            if field.is_primary_key() {
                parts.push("primary key".to_string());
            } else if field.schema.as_ref().is_some_and(|s| !s.is_nullable) {
                parts.push("not null".to_string());
            }
            parts.join(", ")
        }
        DiffOperation::CreateRelation { relation } => match &relation.schema {
            Some(schema) => format!("on delete {}", schema.on_delete),
            None => "metadata only".to_string(),
        },
        DiffOperation::CreateCollection { collection } if !collection.has_table() => "folder".to_string(),
        DiffOperation::AlterCollection { .. }
        | DiffOperation::AlterField { .. }
        | DiffOperation::AlterRelation { .. } => operation.changed_attributes().join(", "),
        _ => String::new(),
    }
}

fn change_color(change: ChangeType) -> TableColor {
    match change {
        ChangeType::Create => TableColor::Green,
        ChangeType::Alter => TableColor::Yellow,
        ChangeType::Drop => TableColor::Red,
    }
}

impl TableDisplay for DiffReport {
    fn to_table(&self, output: &OutputManager) -> Table {
        let mut table = output.create_table();
        output.add_table_header(&mut table, &["#", "Change", "Entity", "Target", "Details"]);

        for (index, operation) in self.operations.iter().enumerate() {
            let change = operation.change_type();
            table.add_row(vec![
                Cell::new(index + 1),
                output.cell(change.verb(), change_color(change)),
                Cell::new(operation.entity_kind()),
                Cell::new(operation.target()),
                Cell::new(details(operation)),
            ]);
        }
        table
    }

    fn to_compact(&self) -> String {
        self.operations
            .iter()
            .map(|operation| {
                let change = operation.change_type();
                format!(
                    "{} {} {}",
                    change.symbol().color(THEME.change(change)),
                    operation.entity_kind(),
                    operation.target()
                )
            })
            .chain(std::iter::once(self.summary.to_string()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
