use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

use schemaplan::{StoreFile, loader};

use crate::context::{ProjectContext, SchemaplanConfig};
use crate::examples::ExampleGroup;
use crate::output::OutputManager;

pub const EXAMPLES: &[ExampleGroup] = &[
    ExampleGroup {
        title: "Initialize",
        commands: &[
            "schemaplan init                              # Create .schemaplan/ with default config",
            "schemaplan init --force                      # Rewrite config.toml with defaults",
        ],
    },
    ExampleGroup {
        title: "Development Store",
        commands: &[
            "schemaplan init --seed schema/snapshot.json  # Start the store from an existing snapshot",
            "schemaplan init --non-transactional          # Store behaves like auto-committing DDL",
        ],
    },
];

#[derive(Args)]
pub struct InitArgs {
    /// Overwrite an existing config.toml
    #[arg(long)]
    pub force: bool,

    /// Seed the development store with the schema in this snapshot
    #[arg(long, value_name = "SNAPSHOT")]
    pub seed: Option<PathBuf>,

    /// Make the development store's DDL non-transactional
    #[arg(long)]
    pub non_transactional: bool,
}

pub async fn handle_init(args: InitArgs, output: &OutputManager) -> Result<()> {
    let current_dir = std::env::current_dir().context("Failed to get current directory")?;
    let ctx = ProjectContext::from_root(current_dir)?;

    output.heading("Initialize schemaplan");

    if ctx.is_initialized() && !args.force {
        output.warning(&format!(
            "Already initialized at {}",
            ctx.schemaplan_dir.display()
        ));
        output.info("Use --force to rewrite config.toml");
        return Ok(());
    }

    std::fs::create_dir_all(&ctx.schemaplan_dir)
        .with_context(|| format!("Failed to create {}", ctx.schemaplan_dir.display()))?;

    let config = SchemaplanConfig::default();
    let content = toml::to_string_pretty(&config).context("Failed to render config.toml")?;
    std::fs::write(&ctx.config_path, content).context("Failed to write config.toml")?;
    output.success(&format!("Wrote {}", super::display_path(&ctx, &ctx.config_path)));

    // Reload so store_path reflects the config just written.
    let ctx = ProjectContext::from_root(ctx.project_root)?;
    let store_path = ctx.store_path();

    if store_path.exists() && args.seed.is_none() {
        output.info(&format!(
            "Keeping existing store {}",
            super::display_path(&ctx, &store_path)
        ));
        return Ok(());
    }

    let mut store = match &args.seed {
        Some(path) => {
            let snapshot = loader::load_snapshot(path)
                .with_context(|| format!("Failed to load seed snapshot: {}", path.display()))?;
            output.info(&format!(
                "Seeding store with {} collection(s) from {}",
                snapshot.collections.len(),
                path.display()
            ));
            StoreFile::from_snapshot(&snapshot)
        }
        None => StoreFile::default(),
    };
    if args.non_transactional {
        store.catalog.set_transactional(false);
    }

    super::save_store(&store_path, &store)?;
    output.success(&format!("Created store {}", super::display_path(&ctx, &store_path)));
    output.key_value("Desired snapshot", &super::display_path(&ctx, &ctx.snapshot_path()));

    Ok(())
}
