//! Schema snapshot, diff and apply engine.
//!
//! Captures the logical schema of a collection/field/relation metadata store
//! into a versioned [`Snapshot`], computes a dependency-ordered list of
//! [`DiffOperation`]s between two snapshots, and applies that list through a
//! [`SchemaExecutor`] either transactionally or with a high-water mark.

pub mod applier;
pub mod capture;
pub mod differ;
pub mod errors;
pub mod loader;
pub mod memory;
pub mod orchestrator;
pub mod repository;
pub mod types;

pub use applier::{ApplyOptions, ApplyReport, CancelHandle, CancelSignal, cancel_pair};
pub use capture::{capture, strip_field_identity, strip_relation_identity};
pub use differ::{ChangeType, DiffOperation, DiffSummary, EntityKind, KindCounts, diff, validate_snapshot};
pub use errors::{ApplyFailure, ExecutorError, RepositoryError, SchemaError, ValidationError, ValidationIssue};
pub use memory::{MemoryExecutor, MemoryRepository, StoreFile};
pub use orchestrator::{DiffReport, Reconciliation, plan, plan_scoped, reconcile, snapshot};
pub use repository::{MetadataRepository, MetadataWrite, SchemaExecutor};
pub use types::{
    Collection, CollectionMeta, CollectionSchema, Field, FieldMeta, FieldSchema, FieldType, OnDelete, Relation,
    RelationMeta, RelationSchema, SNAPSHOT_VERSION, Snapshot,
};
