use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const PROJECT_DIR: &str = ".schemaplan";
const DEFAULT_STORE_PATH: &str = ".schemaplan/store.json";

/// Project context for schemaplan operations
pub struct ProjectContext {
    /// Directory containing `.schemaplan/`
    pub project_root: PathBuf,
    pub schemaplan_dir: PathBuf,
    pub config_path: PathBuf,
    pub config: Option<SchemaplanConfig>,
}

/// Configuration stored in .schemaplan/config.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaplanConfig {
    #[serde(default)]
    pub schemaplan: SchemaplanSettings,
    #[serde(default)]
    pub apply: ApplySettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaplanSettings {
    /// Desired snapshot, relative to the project root
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: String,
    /// Development store file; `${VAR}` is expanded from the environment
    #[serde(default = "default_store_path")]
    pub store_path: String,
}

impl Default for SchemaplanSettings {
    fn default() -> Self {
        Self {
            snapshot_path: default_snapshot_path(),
            store_path: default_store_path(),
        }
    }
}

fn default_snapshot_path() -> String {
    "schema/snapshot.json".to_string()
}

fn default_store_path() -> String {
    "${SCHEMAPLAN_STORE}".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplySettings {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ApplySettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

impl ProjectContext {
    /// Find the project from the current directory or its ancestors
    pub fn find() -> Result<Self> {
        let current_dir = std::env::current_dir().context("Failed to get current directory")?;
        Self::find_from(&current_dir)
    }

    pub fn find_from(start: &Path) -> Result<Self> {
        let project_root = Self::find_project_root(start)?;
        Self::from_root(project_root)
    }

    /// Create context from a known project root
    pub fn from_root(project_root: PathBuf) -> Result<Self> {
        let schemaplan_dir = project_root.join(PROJECT_DIR);
        let config_path = schemaplan_dir.join("config.toml");

        let config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path).context("Failed to read config.toml")?;
            let config: SchemaplanConfig = toml::from_str(&content).context("Failed to parse config.toml")?;
            Some(config)
        } else {
            None
        };

        Ok(Self {
            project_root,
            schemaplan_dir,
            config_path,
            config,
        })
    }

    /// Nearest ancestor that contains a `.schemaplan` directory
    fn find_project_root(start: &Path) -> Result<PathBuf> {
        let mut current = start.to_path_buf();

        loop {
            if current.join(PROJECT_DIR).is_dir() {
                return Ok(current);
            }

            if !current.pop() {
                anyhow::bail!(
                    "Could not find a {PROJECT_DIR} directory in {start:?} or any parent directory. \
                     Run 'schemaplan init' first."
                );
            }
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.schemaplan_dir.exists() && self.config_path.exists()
    }

    fn settings(&self) -> SchemaplanSettings {
        self.config.as_ref().map(|c| c.schemaplan.clone()).unwrap_or_default()
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.project_root.join(self.settings().snapshot_path)
    }

    /// Store file path. An unset `${VAR}` falls back to `.schemaplan/store.json`.
    pub fn store_path(&self) -> PathBuf {
        let configured = self.settings().store_path;
        let path = match expand_env(&configured) {
            Some(path) => path,
            None => {
                log::debug!("{configured} is not set; using {DEFAULT_STORE_PATH}");
                DEFAULT_STORE_PATH.to_string()
            }
        };
        self.project_root.join(path)
    }

    pub fn apply_timeout(&self) -> Duration {
        let secs = self
            .config
            .as_ref()
            .map(|c| c.apply.timeout_secs)
            .unwrap_or_else(default_timeout_secs);
        Duration::from_secs(secs)
    }
}

/// Expand a value of the form `${VAR}`. Other values are returned unchanged.
fn expand_env(value: &str) -> Option<String> {
    match value.strip_prefix("${").and_then(|rest| rest.strip_suffix('}')) {
        Some(var_name) => std::env::var(var_name).ok().filter(|v| !v.is_empty()),
        None => Some(value.to_string()),
    }
}
