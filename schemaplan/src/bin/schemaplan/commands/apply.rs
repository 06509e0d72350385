use anyhow::{Context, Result};
use clap::Args;
use comfy_table::{Cell, Color as TableColor, Table};
use std::path::PathBuf;
use std::time::Duration;

use schemaplan::orchestrator;
use schemaplan::{ApplyOptions, ApplyReport, SchemaError, cancel_pair};

use crate::examples::ExampleGroup;
use crate::output::{OutputManager, TableDisplay};

pub const EXAMPLES: &[ExampleGroup] = &[
    ExampleGroup {
        title: "Apply",
        commands: &[
            "schemaplan apply                             # Apply the configured snapshot",
            "schemaplan apply --snapshot staging.json     # Apply another snapshot",
            "schemaplan apply --timeout-secs 120          # Allow the batch more time",
        ],
    },
    ExampleGroup {
        title: "Preview",
        commands: &["schemaplan apply --dry-run                   # Show what would run, change nothing"],
    },
];

#[derive(Args)]
pub struct ApplyArgs {
    /// Desired snapshot (defaults to snapshot_path from config.toml)
    #[arg(long, value_name = "PATH")]
    pub snapshot: Option<PathBuf>,

    /// Report the plan without executing it
    #[arg(long)]
    pub dry_run: bool,

    /// Timeout for the whole batch (defaults to [apply] timeout_secs)
    #[arg(long, value_name = "SECS")]
    pub timeout_secs: Option<u64>,
}

pub async fn handle_apply(args: ApplyArgs, output: &OutputManager) -> Result<()> {
    let ctx = super::require_project(output)?;
    let (path, desired) = super::load_desired(&ctx, args.snapshot)?;
    let store_path = ctx.store_path();
    let mut store = super::load_store(&store_path)?;

    output.heading("Schema Apply");
    output.key_value("Desired", &super::display_path(&ctx, &path));

    let current = schemaplan::snapshot(&store.metadata, None)
        .await
        .context("Failed to capture the live schema")?;
    let plan = schemaplan::plan(&current, &desired).context("Failed to compute the diff")?;

    if plan.is_empty() {
        output.success("Live schema already matches the snapshot");
        return Ok(());
    }

    super::diff::show_plan(&plan, output)?;

    if args.dry_run {
        output.warning("DRY RUN MODE - No changes will be made");
    }

    let timeout = args
        .timeout_secs
        .map(Duration::from_secs)
        .unwrap_or_else(|| ctx.apply_timeout());
    let (handle, signal) = cancel_pair();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.cancel();
        }
    });
    let options = ApplyOptions::default()
        .with_timeout(timeout)
        .with_dry_run(args.dry_run)
        .with_cancel(signal);

    output.progress(&format!("Applying {} operation(s)", plan.operations.len()));
    let result = orchestrator::apply(&mut store.metadata, &mut store.catalog, &plan, &options).await;
    output.clear_line();
    interrupt.abort();

    if !args.dry_run {
        // Persist whatever state the store ended in, including a partial apply.
        super::save_store(&store_path, &store)?;
    }

    match result {
        Ok(report) => {
            output.display(&report)?;
            if report.dry_run {
                output.info(&format!("{} operation(s) would be applied", report.applied.len()));
            } else {
                output.success(&format!(
                    "Applied {} operation(s) in {}ms",
                    report.applied.len(),
                    report.elapsed_ms
                ));
            }
            Ok(())
        }
        Err(err) => {
            explain_failure(&err, output);
            Err(err).context("Apply failed")
        }
    }
}

fn explain_failure(err: &SchemaError, output: &OutputManager) {
    match err {
        SchemaError::Execution { operation, .. } => {
            output.error(&format!("{operation} failed; the whole batch was rolled back"));
        }
        SchemaError::PartialApply {
            completed,
            failed,
            remaining,
            ..
        } => {
            output.error(&format!(
                "{failed} failed; {} operation(s) stay applied, {} were not attempted",
                completed.len(),
                remaining.len()
            ));
            for operation in completed {
                output.bullet(&format!("applied: {operation}"));
            }
            output.info("Run 'schemaplan diff' to plan the remaining changes");
        }
        SchemaError::MetadataCommit { applied, .. } => {
            output.error(&format!(
                "{} operation(s) reached the schema but their metadata was not recorded",
                applied.len()
            ));
            output.info("Run 'schemaplan diff' to see what the metadata store still lacks");
        }
        SchemaError::StaleDiff { .. } => {
            output.error("The live schema changed while planning");
            output.info("Run the command again to plan against the current schema");
        }
        SchemaError::Cancelled => output.warning("Apply cancelled before any change was made"),
        _ => {}
    }
}

impl TableDisplay for ApplyReport {
    fn to_table(&self, output: &OutputManager) -> Table {
        let mut table = output.create_table();
        let status = if self.dry_run { "planned" } else { "applied" };
        output.add_table_header(&mut table, &["#", "Operation", "Status"]);

        for (index, operation) in self.applied.iter().enumerate() {
            table.add_row(vec![
                Cell::new(index + 1),
                Cell::new(operation),
                output.cell(status, TableColor::Green),
            ]);
        }
        table
    }

    fn to_compact(&self) -> String {
        format!(
            "applied={} transactional={} dry_run={} elapsed_ms={}",
            self.applied.len(),
            self.transactional,
            self.dry_run,
            self.elapsed_ms
        )
    }
}
