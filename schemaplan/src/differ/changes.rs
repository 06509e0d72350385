//! Types for representing schema changes between two snapshots.

use serde::{Deserialize, Serialize};

use crate::types::{Collection, Field, Relation};

/// Type of change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Create,
    Alter,
    Drop,
}

impl ChangeType {
    pub fn verb(self) -> &'static str {
        match self {
            ChangeType::Create => "create",
            ChangeType::Alter => "alter",
            ChangeType::Drop => "drop",
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            ChangeType::Create => "+",
            ChangeType::Alter => "~",
            ChangeType::Drop => "-",
        }
    }
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// Kind of entity an operation touches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Collection,
    Field,
    Relation,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Collection => write!(f, "collection"),
            EntityKind::Field => write!(f, "field"),
            EntityKind::Relation => write!(f, "relation"),
        }
    }
}

/// One atomic structural change. Every variant carries the full entity
/// payload needed to execute it or to revert it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DiffOperation {
    CreateCollection { collection: Collection },
    DropCollection { collection: Collection },
    AlterCollection { before: Collection, after: Collection },
    CreateField { field: Field },
    DropField { field: Field },
    AlterField { before: Field, after: Field },
    CreateRelation { relation: Relation },
    DropRelation { relation: Relation },
    AlterRelation { before: Relation, after: Relation },
}

impl DiffOperation {
    pub fn change_type(&self) -> ChangeType {
        match self {
            DiffOperation::CreateCollection { .. }
            | DiffOperation::CreateField { .. }
            | DiffOperation::CreateRelation { .. } => ChangeType::Create,
            DiffOperation::AlterCollection { .. }
            | DiffOperation::AlterField { .. }
            | DiffOperation::AlterRelation { .. } => ChangeType::Alter,
            DiffOperation::DropCollection { .. }
            | DiffOperation::DropField { .. }
            | DiffOperation::DropRelation { .. } => ChangeType::Drop,
        }
    }

    pub fn entity_kind(&self) -> EntityKind {
        match self {
            DiffOperation::CreateCollection { .. }
            | DiffOperation::DropCollection { .. }
            | DiffOperation::AlterCollection { .. } => EntityKind::Collection,
            DiffOperation::CreateField { .. } | DiffOperation::DropField { .. } | DiffOperation::AlterField { .. } => {
                EntityKind::Field
            }
            DiffOperation::CreateRelation { .. }
            | DiffOperation::DropRelation { .. }
            | DiffOperation::AlterRelation { .. } => EntityKind::Relation,
        }
    }

    /// Collection the operation belongs to (the many side for relations).
    pub fn collection(&self) -> &str {
        match self {
            DiffOperation::CreateCollection { collection } | DiffOperation::DropCollection { collection } => {
                &collection.collection
            }
            DiffOperation::AlterCollection { after, .. } => &after.collection,
            DiffOperation::CreateField { field } | DiffOperation::DropField { field } => &field.collection,
            DiffOperation::AlterField { after, .. } => &after.collection,
            DiffOperation::CreateRelation { relation } | DiffOperation::DropRelation { relation } => {
                &relation.collection
            }
            DiffOperation::AlterRelation { after, .. } => &after.collection,
        }
    }

    /// Human-readable entity path: `posts`, `posts.title`, `posts.author_id -> users`.
    pub fn target(&self) -> String {
        match self {
            DiffOperation::CreateCollection { collection } | DiffOperation::DropCollection { collection } => {
                collection.collection.clone()
            }
            DiffOperation::AlterCollection { after, .. } => after.collection.clone(),
            DiffOperation::CreateField { field } | DiffOperation::DropField { field } => field.path(),
            DiffOperation::AlterField { after, .. } => after.path(),
            DiffOperation::CreateRelation { relation } | DiffOperation::DropRelation { relation } => {
                relation_target(relation)
            }
            DiffOperation::AlterRelation { after, .. } => relation_target(after),
        }
    }

    /// The operation that undoes this one.
    pub fn inverse(&self) -> DiffOperation {
        match self.clone() {
            DiffOperation::CreateCollection { collection } => DiffOperation::DropCollection { collection },
            DiffOperation::DropCollection { collection } => DiffOperation::CreateCollection { collection },
            DiffOperation::AlterCollection { before, after } => DiffOperation::AlterCollection {
                before: after,
                after: before,
            },
            DiffOperation::CreateField { field } => DiffOperation::DropField { field },
            DiffOperation::DropField { field } => DiffOperation::CreateField { field },
            DiffOperation::AlterField { before, after } => DiffOperation::AlterField {
                before: after,
                after: before,
            },
            DiffOperation::CreateRelation { relation } => DiffOperation::DropRelation { relation },
            DiffOperation::DropRelation { relation } => DiffOperation::CreateRelation { relation },
            DiffOperation::AlterRelation { before, after } => DiffOperation::AlterRelation {
                before: after,
                after: before,
            },
        }
    }

    /// Attributes that differ between `before` and `after` for alter operations.
    pub fn changed_attributes(&self) -> Vec<&'static str> {
        let mut changed = Vec::new();
        match self {
            DiffOperation::AlterCollection { before, after } => {
                if before.meta != after.meta {
                    changed.push("meta");
                }
                if before.schema != after.schema {
                    changed.push("schema");
                }
            }
            DiffOperation::AlterField { before, after } => {
                if before.field_type != after.field_type {
                    changed.push("type");
                }
                let (b, a) = (before.schema.as_ref(), after.schema.as_ref());
                if b.map(|s| s.is_nullable) != a.map(|s| s.is_nullable) {
                    changed.push("nullable");
                }
                if b.and_then(|s| s.default_value.as_ref()) != a.and_then(|s| s.default_value.as_ref()) {
                    changed.push("default");
                }
                if before.is_primary_key() != after.is_primary_key() {
                    changed.push("primary_key");
                }
                if before.meta != after.meta {
                    changed.push("meta");
                }
            }
            DiffOperation::AlterRelation { before, after } => {
                if before.related_collection != after.related_collection {
                    changed.push("related_collection");
                }
                if before.schema != after.schema {
                    changed.push("constraint");
                }
                if before.meta != after.meta {
                    changed.push("meta");
                }
            }
            _ => {}
        }
        changed
    }
}

fn relation_target(relation: &Relation) -> String {
    match &relation.related_collection {
        Some(related) => format!("{} -> {related}", relation.path()),
        None => relation.path(),
    }
}

impl std::fmt::Display for DiffOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.change_type().verb(), self.entity_kind(), self.target())
    }
}

/// Created/altered/dropped counts for one entity kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindCounts {
    pub created: usize,
    pub altered: usize,
    pub dropped: usize,
}

impl KindCounts {
    pub fn total(&self) -> usize {
        self.created + self.altered + self.dropped
    }

    fn record(&mut self, change: ChangeType) {
        match change {
            ChangeType::Create => self.created += 1,
            ChangeType::Alter => self.altered += 1,
            ChangeType::Drop => self.dropped += 1,
        }
    }
}

impl std::fmt::Display for KindCounts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "+{} ~{} -{}", self.created, self.altered, self.dropped)
    }
}

/// Per-kind counts of a diff
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub collections: KindCounts,
    pub fields: KindCounts,
    pub relations: KindCounts,
}

impl DiffSummary {
    pub fn from_operations(operations: &[DiffOperation]) -> Self {
        let mut summary = DiffSummary::default();
        for operation in operations {
            let counts = match operation.entity_kind() {
                EntityKind::Collection => &mut summary.collections,
                EntityKind::Field => &mut summary.fields,
                EntityKind::Relation => &mut summary.relations,
            };
            counts.record(operation.change_type());
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.collections.total() + self.fields.total() + self.relations.total()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    pub fn counts(&self, kind: EntityKind) -> KindCounts {
        match kind {
            EntityKind::Collection => self.collections,
            EntityKind::Field => self.fields,
            EntityKind::Relation => self.relations,
        }
    }
}

impl std::fmt::Display for DiffSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "no changes");
        }
        let mut parts = Vec::new();
        for (label, counts) in [
            ("collections", self.collections),
            ("fields", self.fields),
            ("relations", self.relations),
        ] {
            if counts.total() == 0 {
                continue;
            }
            let mut detail = Vec::new();
            if counts.created > 0 {
                detail.push(format!("{} created", counts.created));
            }
            if counts.altered > 0 {
                detail.push(format!("{} altered", counts.altered));
            }
            if counts.dropped > 0 {
                detail.push(format!("{} dropped", counts.dropped));
            }
            parts.push(format!("{label}: {}", detail.join(", ")));
        }
        write!(f, "{}", parts.join("; "))
    }
}
