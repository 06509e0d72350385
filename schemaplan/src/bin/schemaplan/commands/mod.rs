pub mod apply;
pub mod diff;
pub mod init;
pub mod snapshot;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use schemaplan::{Snapshot, StoreFile, loader};

use crate::context::ProjectContext;
use crate::output::OutputManager;

/// Locate an initialized project or explain how to create one.
pub fn require_project(output: &OutputManager) -> Result<ProjectContext> {
    let ctx = ProjectContext::find()?;
    if !ctx.is_initialized() {
        output.error("schemaplan is not initialized in this project.");
        output.info("Run 'schemaplan init' first to initialize.");
        anyhow::bail!("Project not initialized");
    }
    Ok(ctx)
}

/// Load the desired snapshot from `path` or the configured location.
pub fn load_desired(ctx: &ProjectContext, path: Option<PathBuf>) -> Result<(PathBuf, Snapshot)> {
    let path = path.unwrap_or_else(|| ctx.snapshot_path());
    let snapshot = loader::load_snapshot(&path)
        .with_context(|| format!("Failed to load snapshot: {}", path.display()))?;
    Ok((path, snapshot))
}

pub fn load_store(path: &Path) -> Result<StoreFile> {
    loader::load_store(path).with_context(|| format!("Failed to load store: {}", path.display()))
}

pub fn save_store(path: &Path, store: &StoreFile) -> Result<()> {
    loader::save_store(path, store).with_context(|| format!("Failed to save store: {}", path.display()))
}

/// Path relative to the project root when possible, for messages.
pub fn display_path(ctx: &ProjectContext, path: &Path) -> String {
    path.strip_prefix(&ctx.project_root)
        .unwrap_or(path)
        .display()
        .to_string()
}
