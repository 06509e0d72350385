use std::time::Duration;

use thiserror::Error;

use crate::differ::DiffOperation;

/// Top-level error type returned by capture, diff and apply.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// Input snapshot is malformed. Nothing was executed.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Snapshot document carries a format version this build cannot read.
    #[error("unsupported snapshot version {found} (this build reads version {supported})")]
    UnsupportedVersion { found: u64, supported: u32 },

    /// Operations cannot be ordered, e.g. a relation references a field that
    /// is never created. Raised before anything is applied.
    #[error("dependency error on {entity}: {message}")]
    Dependency { entity: String, message: String },

    /// An operation failed under a transactional executor. The whole batch
    /// was rolled back.
    #[error("{operation} failed, batch rolled back: {cause}")]
    Execution {
        operation: Box<DiffOperation>,
        #[source]
        cause: ApplyFailure,
    },

    /// An operation failed under a non-transactional executor. Completed
    /// operations stay applied; re-diff before retrying.
    #[error(
        "{failed} failed after {} of {} operation(s) were applied: {cause}",
        .completed.len(),
        .completed.len() + 1 + .remaining.len()
    )]
    PartialApply {
        completed: Vec<DiffOperation>,
        failed: Box<DiffOperation>,
        remaining: Vec<DiffOperation>,
        #[source]
        cause: ApplyFailure,
    },

    /// The executor committed every operation but the metadata store failed to
    /// commit its records. Tables reflect `applied`; the metadata does not.
    #[error("{} operation(s) were committed to the schema but the metadata commit failed: {cause}", .applied.len())]
    MetadataCommit {
        applied: Vec<DiffOperation>,
        #[source]
        cause: ApplyFailure,
    },

    /// The live schema no longer matches the schema the diff was planned against.
    #[error("live schema changed since the diff was planned (expected hash {expected}, found {actual})")]
    StaleDiff { expected: String, actual: String },

    /// Apply was cancelled before the first operation ran.
    #[error("apply cancelled before any operation was executed")]
    Cancelled,

    /// Reading from the metadata store failed.
    #[error("metadata repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("failed to access {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("snapshot serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SchemaError {
    pub fn dependency(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Dependency {
            entity: entity.into(),
            message: message.into(),
        }
    }

    /// Whether live state may have changed because of this error.
    pub fn left_residual_changes(&self) -> bool {
        match self {
            SchemaError::PartialApply { completed, .. } => !completed.is_empty(),
            SchemaError::MetadataCommit { .. } => true,
            _ => false,
        }
    }
}

/// Why a single operation could not be applied.
#[derive(Debug, Clone, Error)]
pub enum ApplyFailure {
    #[error("executor error: {0}")]
    Executor(#[from] ExecutorError),

    #[error("metadata write failed: {0}")]
    Metadata(#[from] RepositoryError),

    #[error("apply timed out after {0:?}")]
    Timeout(Duration),

    #[error("apply cancelled")]
    Cancelled,
}

/// Error reported by a [`crate::SchemaExecutor`] implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ExecutorError {
    pub message: String,
}

impl ExecutorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Error reported by a [`crate::MetadataRepository`] implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    #[error("metadata store unavailable: {message}")]
    Unavailable { message: String },

    #[error("{entity} not found")]
    NotFound { entity: String },

    #[error("{entity} already exists")]
    AlreadyExists { entity: String },

    #[error("{message}")]
    Other { message: String },
}

/// Collection of validation issues found in a snapshot.
#[derive(Debug, Clone, Error)]
#[error("validation failed: {}", render_issues(.issues))]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

fn render_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(|issue| format!("{} ({}): {}", issue.entity, issue.code, issue.message))
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationError {
    pub fn new<I>(issues: I) -> Self
    where
        I: IntoIterator<Item = ValidationIssue>,
    {
        Self {
            issues: issues.into_iter().collect(),
        }
    }

    /// Convenience helper for constructing a single-entity validation error.
    pub fn single(entity: impl Into<String>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new([ValidationIssue::new(entity, code, message)])
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.issues.iter().any(|issue| issue.code == code)
    }
}

/// A single problem with one entity of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Entity path such as `posts` or `posts.title`
    pub entity: String,
    pub code: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(entity: impl Into<String>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            code: code.into(),
            message: message.into(),
        }
    }
}
