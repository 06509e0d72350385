//! Public entry points: capture, plan, apply and reconcile.

use serde::Serialize;

use crate::applier::{self, ApplyOptions, ApplyReport};
use crate::capture;
use crate::differ::{self, DiffOperation, DiffSummary};
use crate::errors::SchemaError;
use crate::repository::{MetadataRepository, SchemaExecutor};
use crate::types::Snapshot;

/// A planned diff, ready to be shown or applied.
#[derive(Debug, Clone, Serialize)]
pub struct DiffReport {
    pub operations: Vec<DiffOperation>,
    pub summary: DiffSummary,
    /// Hash of the schema the plan was computed against. `None` skips the
    /// drift check on apply.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_hash: Option<String>,
    /// Collection filter `current` was captured with; the drift check
    /// captures the same slice.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_scope: Option<String>,
}

impl DiffReport {
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// Result of [`reconcile`].
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub plan: DiffReport,
    pub report: ApplyReport,
}

/// Capture the live schema, optionally for a single collection.
pub async fn snapshot<R>(repository: &R, collection: Option<&str>) -> Result<Snapshot, SchemaError>
where
    R: MetadataRepository,
{
    capture::capture(repository, collection).await
}

/// Diff `current` against `desired` and summarize the result.
pub fn plan(current: &Snapshot, desired: &Snapshot) -> Result<DiffReport, SchemaError> {
    plan_scoped(current, desired, None)
}

/// Like [`plan`], for a `current` captured with `snapshot(repository, scope)`.
pub fn plan_scoped(current: &Snapshot, desired: &Snapshot, scope: Option<&str>) -> Result<DiffReport, SchemaError> {
    let operations = differ::diff(current, desired)?;
    let summary = DiffSummary::from_operations(&operations);
    Ok(DiffReport {
        operations,
        summary,
        base_hash: Some(current.hash()),
        base_scope: scope.map(str::to_string),
    })
}

/// Apply a planned diff.
///
/// When the plan carries a base hash, the live schema is captured again first
/// and a mismatch fails with [`SchemaError::StaleDiff`] before anything runs.
pub async fn apply<R, E>(
    repository: &mut R,
    executor: &mut E,
    plan: &DiffReport,
    options: &ApplyOptions,
) -> Result<ApplyReport, SchemaError>
where
    R: MetadataRepository,
    E: SchemaExecutor,
{
    if let Some(expected) = &plan.base_hash {
        let live = capture::capture(repository, plan.base_scope.as_deref()).await?;
        let actual = live.hash();
        if &actual != expected {
            log::warn!("live schema drifted since planning: expected {expected}, found {actual}");
            return Err(SchemaError::StaleDiff {
                expected: expected.clone(),
                actual,
            });
        }
    }

    let report = applier::apply(repository, executor, &plan.operations, options).await?;
    log::info!(
        "applied {} operation(s) in {}ms{}",
        report.applied.len(),
        report.elapsed_ms,
        if report.dry_run { " (dry run)" } else { "" }
    );
    Ok(report)
}

/// Capture, plan and apply in one step.
pub async fn reconcile<R, E>(
    repository: &mut R,
    executor: &mut E,
    desired: &Snapshot,
    options: &ApplyOptions,
) -> Result<Reconciliation, SchemaError>
where
    R: MetadataRepository,
    E: SchemaExecutor,
{
    let current = capture::capture(repository, None).await?;
    let mut plan = plan(&current, desired)?;
    // Captured just now; there is nothing to drift from.
    plan.base_hash = None;

    let report = applier::apply(repository, executor, &plan.operations, options).await?;
    Ok(Reconciliation { plan, report })
}
