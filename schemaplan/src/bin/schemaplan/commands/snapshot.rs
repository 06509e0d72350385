use anyhow::{Context, Result};
use clap::Args;
use comfy_table::{Cell, Color as TableColor, Table};
use std::path::PathBuf;

use schemaplan::{Snapshot, loader};

use crate::examples::ExampleGroup;
use crate::output::{OutputManager, TableDisplay};

pub const EXAMPLES: &[ExampleGroup] = &[ExampleGroup {
    title: "Capture",
    commands: &[
        "schemaplan snapshot                          # Capture the live schema to the configured path",
        "schemaplan snapshot posts                    # Capture a single collection",
        "schemaplan snapshot --out backup.json        # Write somewhere else",
        "schemaplan --output json snapshot --print    # Print without writing",
    ],
}];

#[derive(Args)]
pub struct SnapshotArgs {
    /// Only capture this collection
    pub collection: Option<String>,

    /// Output file (defaults to snapshot_path from config.toml)
    #[arg(long, value_name = "PATH")]
    pub out: Option<PathBuf>,

    /// Show the snapshot without writing it
    #[arg(long)]
    pub print: bool,
}

pub async fn handle_snapshot(args: SnapshotArgs, output: &OutputManager) -> Result<()> {
    let ctx = super::require_project(output)?;
    let store = super::load_store(&ctx.store_path())?;

    output.heading("Snapshot");
    output.progress("Capturing live schema");
    let snapshot = schemaplan::snapshot(&store.metadata, args.collection.as_deref())
        .await
        .context("Failed to capture the live schema")?;
    output.clear_line();

    if let Some(collection) = &args.collection
        && snapshot.collection(collection).is_none()
    {
        output.warning(&format!("Collection '{collection}' not found"));
    }

    output.display(&snapshot)?;

    if args.print {
        return Ok(());
    }

    let path = args.out.unwrap_or_else(|| ctx.snapshot_path());
    loader::save_snapshot(&path, &snapshot)
        .with_context(|| format!("Failed to write snapshot: {}", path.display()))?;
    output.success(&format!(
        "Wrote {} ({} collection(s), {} field(s), {} relation(s))",
        super::display_path(&ctx, &path),
        snapshot.collections.len(),
        snapshot.fields.len(),
        snapshot.relations.len()
    ));
    output.verbose(&format!("hash {}", snapshot.hash()));

    Ok(())
}

impl TableDisplay for Snapshot {
    fn to_table(&self, output: &OutputManager) -> Table {
        let mut table = output.create_table();
        output.add_table_header(&mut table, &["Collection", "Kind", "Fields", "Relations", "Group"]);

        if self.collections.is_empty() {
            table.add_row(vec![Cell::new("(no collections)")]);
            return table;
        }

        let field_counts = self.field_counts();
        for collection in &self.collections {
            let name = collection.collection.as_str();
            let relations = self.relations.iter().filter(|r| r.collection == name).count();
            let kind = if collection.has_table() { "table" } else { "folder" };
            table.add_row(vec![
                output.cell(name, TableColor::Cyan),
                Cell::new(kind),
                Cell::new(field_counts.get(name).copied().unwrap_or(0)),
                Cell::new(relations),
                Cell::new(collection.group().unwrap_or("-")),
            ]);
        }
        table
    }

    fn to_compact(&self) -> String {
        format!(
            "collections={} fields={} relations={} hash={}",
            self.collections.len(),
            self.fields.len(),
            self.relations.len(),
            self.hash()
        )
    }
}
