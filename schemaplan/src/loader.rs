//! Snapshot and store file I/O.

use std::path::Path;

use crate::errors::SchemaError;
use crate::memory::StoreFile;
use crate::types::Snapshot;

fn io_error(path: &Path, source: std::io::Error) -> SchemaError {
    SchemaError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Load a snapshot document. The version tag is checked before the body is parsed.
pub fn load_snapshot(path: &Path) -> Result<Snapshot, SchemaError> {
    let content = std::fs::read_to_string(path).map_err(|err| io_error(path, err))?;
    Snapshot::from_json(&content)
}

/// Write a snapshot as pretty JSON, creating parent directories as needed.
pub fn save_snapshot(path: &Path, snapshot: &Snapshot) -> Result<(), SchemaError> {
    let mut content = snapshot.to_json_pretty()?;
    content.push('\n');
    write_file(path, &content)
}

/// Load the development store. A missing file is an empty store.
pub fn load_store(path: &Path) -> Result<StoreFile, SchemaError> {
    if !path.exists() {
        return Ok(StoreFile::default());
    }
    let content = std::fs::read_to_string(path).map_err(|err| io_error(path, err))?;
    Ok(serde_json::from_str(&content)?)
}

pub fn save_store(path: &Path, store: &StoreFile) -> Result<(), SchemaError> {
    let content = serde_json::to_string_pretty(store)?;
    write_file(path, &content)
}

fn write_file(path: &Path, content: &str) -> Result<(), SchemaError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|err| io_error(parent, err))?;
    }
    std::fs::write(path, content).map_err(|err| io_error(path, err))
}
