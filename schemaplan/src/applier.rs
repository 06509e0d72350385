//! Executes an ordered diff against a live system.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

use crate::differ::DiffOperation;
use crate::errors::{ApplyFailure, SchemaError};
use crate::repository::{MetadataRepository, MetadataWrite, SchemaExecutor};
use crate::types::{Field, Relation};

/// Default budget for a whole apply batch.
pub const DEFAULT_APPLY_TIMEOUT: Duration = Duration::from_secs(30);

/// Options controlling a single apply.
#[derive(Debug, Clone)]
pub struct ApplyOptions {
    /// Budget for the whole batch, not per operation
    pub timeout: Duration,
    /// Report what would run without touching the executor or the metadata store
    pub dry_run: bool,
    pub cancel: Option<CancelSignal>,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_APPLY_TIMEOUT,
            dry_run: false,
            cancel: None,
        }
    }
}

impl ApplyOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_cancel(mut self, signal: CancelSignal) -> Self {
        self.cancel = Some(signal);
        self
    }
}

/// Receiving half of a cancellation pair, see [`cancel_pair`].
#[derive(Debug, Clone)]
pub struct CancelSignal {
    receiver: watch::Receiver<bool>,
}

/// Sending half of a cancellation pair.
#[derive(Debug)]
pub struct CancelHandle {
    sender: watch::Sender<bool>,
}

/// Create a linked handle/signal pair for cancelling an apply.
pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (sender, receiver) = watch::channel(false);
    (CancelHandle { sender }, CancelSignal { receiver })
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }
}

impl CancelSignal {
    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once cancellation is requested. Never resolves if the handle
    /// is dropped without cancelling.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.receiver.borrow_and_update() {
                return;
            }
            if self.receiver.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Outcome of a successful apply.
#[derive(Debug, Clone, Serialize)]
pub struct ApplyReport {
    /// Operations executed, in order (planned operations for a dry run)
    pub applied: Vec<DiffOperation>,
    pub transactional: bool,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

impl ApplyReport {
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }
}

/// Apply `operations` strictly in order.
///
/// With a transactional executor any failure rolls back the executor and the
/// repository and returns [`SchemaError::Execution`]. Otherwise the operations
/// before the failure stay applied and [`SchemaError::PartialApply`] reports
/// the high-water mark; the caller must re-diff before retrying.
///
/// The timeout covers begin, every operation and commit. If the executor
/// commits but the repository does not, the error is
/// [`SchemaError::MetadataCommit`].
pub async fn apply<R, E>(
    repository: &mut R,
    executor: &mut E,
    operations: &[DiffOperation],
    options: &ApplyOptions,
) -> Result<ApplyReport, SchemaError>
where
    R: MetadataRepository,
    E: SchemaExecutor,
{
    let started_at = Utc::now();
    let start = Instant::now();
    let transactional = executor.supports_transactions();

    if options.cancel.as_ref().is_some_and(CancelSignal::is_cancelled) {
        log::debug!("apply cancelled before start");
        return Err(SchemaError::Cancelled);
    }

    let report = |applied: Vec<DiffOperation>| ApplyReport {
        applied,
        transactional,
        dry_run: options.dry_run,
        started_at,
        elapsed_ms: start.elapsed().as_millis() as u64,
    };

    if options.dry_run {
        for operation in operations {
            log::debug!("dry run: would apply {operation}");
        }
        return Ok(report(operations.to_vec()));
    }
    if operations.is_empty() {
        return Ok(report(Vec::new()));
    }

    let mut progress = Progress::default();
    let mut cancel = options.cancel.clone();
    let outcome = {
        let batch = run_batch(repository, executor, operations, transactional, &mut progress);
        let cancelled = async {
            match cancel.as_mut() {
                Some(signal) => signal.cancelled().await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            result = tokio::time::timeout(options.timeout, batch) => {
                result.unwrap_or(Err(ApplyFailure::Timeout(options.timeout)))
            }
            _ = cancelled => Err(ApplyFailure::Cancelled),
        }
    };

    let cause = match outcome {
        Ok(()) => return Ok(report(operations.to_vec())),
        Err(cause) => cause,
    };

    if progress.schema_committed {
        log::error!("schema committed but metadata commit failed ({cause}); records are out of date");
        if let Err(err) = repository.rollback().await {
            log::warn!("metadata rollback failed: {err}");
        }
        return Err(SchemaError::MetadataCommit {
            applied: operations.to_vec(),
            cause,
        });
    }

    let index = progress.completed.min(operations.len() - 1);
    let failed = operations[index].clone();

    if transactional {
        log::warn!("{failed} failed ({cause}); rolling back {index} applied operation(s)");
        if let Err(err) = executor.rollback().await {
            log::warn!("executor rollback failed: {err}");
        }
        if let Err(err) = repository.rollback().await {
            log::warn!("metadata rollback failed: {err}");
        }
        return Err(SchemaError::Execution {
            operation: Box::new(failed),
            cause,
        });
    }

    log::warn!("{failed} failed ({cause}); {index} operation(s) remain applied");
    Err(SchemaError::PartialApply {
        completed: operations[..index].to_vec(),
        failed: Box::new(failed),
        remaining: operations[index + 1..].to_vec(),
        cause,
    })
}

/// How far a batch got before it stopped.
#[derive(Debug, Default)]
struct Progress {
    completed: usize,
    /// The executor commit went through; its DDL can no longer be rolled back.
    schema_committed: bool,
}

async fn run_batch<R, E>(
    repository: &mut R,
    executor: &mut E,
    operations: &[DiffOperation],
    transactional: bool,
    progress: &mut Progress,
) -> Result<(), ApplyFailure>
where
    R: MetadataRepository,
    E: SchemaExecutor,
{
    if transactional {
        executor.begin().await?;
        repository.begin().await?;
    }

    run_operations(repository, executor, operations, &mut progress.completed).await?;

    if transactional {
        executor.commit().await?;
        progress.schema_committed = true;
        repository.commit().await?;
    }
    Ok(())
}

async fn run_operations<R, E>(
    repository: &mut R,
    executor: &mut E,
    operations: &[DiffOperation],
    completed: &mut usize,
) -> Result<(), ApplyFailure>
where
    R: MetadataRepository,
    E: SchemaExecutor,
{
    for operation in operations {
        log::debug!("applying {operation}");
        apply_operation(repository, executor, operation).await?;
        *completed += 1;
    }
    Ok(())
}

/// DDL first, then the metadata record.
async fn apply_operation<R, E>(
    repository: &mut R,
    executor: &mut E,
    operation: &DiffOperation,
) -> Result<(), ApplyFailure>
where
    R: MetadataRepository,
    E: SchemaExecutor,
{
    match operation {
        DiffOperation::CreateCollection { collection } => {
            if collection.has_table() {
                executor.create_table(collection).await?;
            }
            repository.write_collection(MetadataWrite::Upsert(collection)).await?;
        }
        DiffOperation::DropCollection { collection } => {
            if collection.has_table() {
                executor.drop_table(collection).await?;
            }
            repository.write_collection(MetadataWrite::Delete(collection)).await?;
        }
        DiffOperation::AlterCollection { before, after } => {
            match (before.has_table(), after.has_table()) {
                (true, true) if before.schema != after.schema => executor.alter_table(before, after).await?,
                (false, true) => executor.create_table(after).await?,
                (true, false) => executor.drop_table(before).await?,
                _ => {}
            }
            repository.write_collection(MetadataWrite::Upsert(after)).await?;
        }
        DiffOperation::CreateField { field } => {
            if field.has_column() {
                executor.add_column(field).await?;
            }
            repository.write_field(MetadataWrite::Upsert(field)).await?;
        }
        DiffOperation::DropField { field } => {
            if field.has_column() {
                executor.drop_column(field).await?;
            }
            repository.write_field(MetadataWrite::Delete(field)).await?;
        }
        DiffOperation::AlterField { before, after } => {
            match (before.has_column(), after.has_column()) {
                (true, true) if column_changed(before, after) => executor.alter_column(before, after).await?,
                (false, true) => executor.add_column(after).await?,
                (true, false) => executor.drop_column(before).await?,
                _ => {}
            }
            repository.write_field(MetadataWrite::Upsert(after)).await?;
        }
        DiffOperation::CreateRelation { relation } => {
            if relation.schema.is_some() {
                executor.add_foreign_key(relation).await?;
            }
            repository.write_relation(MetadataWrite::Upsert(relation)).await?;
        }
        DiffOperation::DropRelation { relation } => {
            if relation.schema.is_some() {
                executor.drop_foreign_key(relation).await?;
            }
            repository.write_relation(MetadataWrite::Delete(relation)).await?;
        }
        DiffOperation::AlterRelation { before, after } => {
            if constraint_changed(before, after) {
                if before.schema.is_some() {
                    executor.drop_foreign_key(before).await?;
                }
                if after.schema.is_some() {
                    executor.add_foreign_key(after).await?;
                }
            }
            repository.write_relation(MetadataWrite::Upsert(after)).await?;
        }
    }
    Ok(())
}

fn column_changed(before: &Field, after: &Field) -> bool {
    before.field_type != after.field_type || before.schema != after.schema
}

fn constraint_changed(before: &Relation, after: &Relation) -> bool {
    before.schema != after.schema || before.related_collection != after.related_collection
}
