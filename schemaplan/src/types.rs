//! Snapshot model: collections, fields and relations as portable value data.
//!
//! Nothing in this module holds a live resource. A [`Snapshot`] is produced by
//! [`crate::capture`] or loaded from disk, and compared by [`crate::differ`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::errors::{SchemaError, ValidationError};

/// Snapshot format version written and accepted by this build.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Version tag stamped into every snapshot this crate emits.
pub const SOURCE_VERSION: &str = env!("CARGO_PKG_VERSION");

fn is_false(b: &bool) -> bool {
    !*b
}

fn default_true() -> bool {
    true
}

/// A named logical table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    /// Unique collection name
    pub collection: String,

    /// Display and behaviour metadata
    #[serde(default)]
    pub meta: Option<CollectionMeta>,

    /// Backing table. `None` for folder collections that only group others.
    #[serde(default)]
    pub schema: Option<CollectionSchema>,
}

impl Collection {
    /// Create a table-backed collection with default metadata.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            schema: Some(CollectionSchema {
                name: name.clone(),
                comment: None,
            }),
            meta: Some(CollectionMeta::default()),
            collection: name,
        }
    }

    /// Create a folder collection (no backing table).
    pub fn folder(name: impl Into<String>) -> Self {
        Self {
            collection: name.into(),
            meta: Some(CollectionMeta::default()),
            schema: None,
        }
    }

    pub fn is_system(&self) -> bool {
        self.meta.as_ref().is_some_and(|m| m.system)
    }

    /// Whether the collection has a physical table.
    pub fn has_table(&self) -> bool {
        self.schema.is_some()
    }

    /// Parent folder, if the collection is nested in one.
    pub fn group(&self) -> Option<&str> {
        self.meta.as_ref().and_then(|m| m.group.as_deref())
    }

    pub fn with_meta(mut self, meta: CollectionMeta) -> Self {
        self.meta = Some(meta);
        self
    }
}

/// Collection-level metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_template: Option<String>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub hidden: bool,

    #[serde(default, skip_serializing_if = "is_false")]
    pub singleton: bool,

    /// Field used for manual sorting
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_field: Option<String>,

    /// Parent folder collection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub system: bool,
}

/// Physical table description for a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSchema {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Semantic data type of a field. Vendor types are the executor's concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Integer,
    Decimal,
    Boolean,
    Timestamp,
    Uuid,
    Json,
    /// Virtual field without a column (reverse side of a relation)
    Alias,
}

impl FieldType {
    pub fn is_alias(self) -> bool {
        matches!(self, FieldType::Alias)
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldType::Text => write!(f, "text"),
            FieldType::Integer => write!(f, "integer"),
            FieldType::Decimal => write!(f, "decimal"),
            FieldType::Boolean => write!(f, "boolean"),
            FieldType::Timestamp => write!(f, "timestamp"),
            FieldType::Uuid => write!(f, "uuid"),
            FieldType::Json => write!(f, "json"),
            FieldType::Alias => write!(f, "alias"),
        }
    }
}

/// A typed attribute of a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    /// Owning collection
    pub collection: String,

    /// Field name, unique within the collection
    pub field: String,

    #[serde(rename = "type")]
    pub field_type: FieldType,

    /// Column definition. `None` for alias fields.
    #[serde(default)]
    pub schema: Option<FieldSchema>,

    #[serde(default)]
    pub meta: Option<FieldMeta>,
}

impl Field {
    /// Create a nullable column-backed field.
    pub fn new(collection: impl Into<String>, field: impl Into<String>, field_type: FieldType) -> Self {
        let schema = if field_type.is_alias() {
            None
        } else {
            Some(FieldSchema::default())
        };
        Self {
            collection: collection.into(),
            field: field.into(),
            field_type,
            schema,
            meta: Some(FieldMeta::default()),
        }
    }

    /// Mark the field as the collection's primary key (implies not null).
    pub fn primary_key(mut self) -> Self {
        let schema = self.schema.get_or_insert_with(FieldSchema::default);
        schema.is_primary_key = true;
        schema.is_nullable = false;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.schema.get_or_insert_with(FieldSchema::default).is_nullable = false;
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.schema.get_or_insert_with(FieldSchema::default).default_value = Some(value);
        self
    }

    pub fn key(&self) -> (&str, &str) {
        (&self.collection, &self.field)
    }

    /// `collection.field`, used in messages.
    pub fn path(&self) -> String {
        format!("{}.{}", self.collection, self.field)
    }

    pub fn is_system(&self) -> bool {
        self.meta.as_ref().is_some_and(|m| m.system)
    }

    pub fn is_primary_key(&self) -> bool {
        self.schema.as_ref().is_some_and(|s| s.is_primary_key)
    }

    /// Whether the field is backed by a physical column.
    pub fn has_column(&self) -> bool {
        !self.field_type.is_alias() && self.schema.is_some()
    }
}

/// Column definition of a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    #[serde(default = "default_true")]
    pub is_nullable: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub is_primary_key: bool,

    #[serde(default, skip_serializing_if = "is_false")]
    pub has_auto_increment: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numeric_precision: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numeric_scale: Option<u32>,
}

impl Default for FieldSchema {
    fn default() -> Self {
        Self {
            is_nullable: true,
            default_value: None,
            is_primary_key: false,
            has_auto_increment: false,
            max_length: None,
            numeric_precision: None,
            numeric_scale: None,
        }
    }
}

/// Field-level metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldMeta {
    /// Instance-specific record id. Never part of a portable snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub hidden: bool,

    #[serde(default, skip_serializing_if = "is_false")]
    pub readonly: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<i32>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub system: bool,
}

/// Referential action applied when the referenced row is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnDelete {
    Cascade,
    SetNull,
    #[default]
    NoAction,
}

impl std::fmt::Display for OnDelete {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OnDelete::Cascade => write!(f, "CASCADE"),
            OnDelete::SetNull => write!(f, "SET NULL"),
            OnDelete::NoAction => write!(f, "NO ACTION"),
        }
    }
}

/// A structural link from a foreign-key field (many side) to a collection (one side).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    /// Many-side collection
    pub collection: String,

    /// Many-side foreign-key field
    pub field: String,

    /// One-side collection. `None` for polymorphic keys.
    #[serde(default)]
    pub related_collection: Option<String>,

    /// Foreign-key constraint. `None` when the link exists only in metadata.
    #[serde(default)]
    pub schema: Option<RelationSchema>,

    #[serde(default)]
    pub meta: Option<RelationMeta>,
}

impl Relation {
    /// Create a constrained relation referencing `related.id` with no referential action.
    pub fn new(collection: impl Into<String>, field: impl Into<String>, related: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            field: field.into(),
            related_collection: Some(related.into()),
            schema: Some(RelationSchema {
                foreign_key_column: "id".to_string(),
                on_delete: OnDelete::NoAction,
                constraint_name: None,
            }),
            meta: Some(RelationMeta::default()),
        }
    }

    pub fn on_delete(mut self, action: OnDelete) -> Self {
        if let Some(schema) = self.schema.as_mut() {
            schema.on_delete = action;
        }
        self
    }

    /// Name the reverse alias field on the one side.
    pub fn one_field(mut self, name: impl Into<String>) -> Self {
        self.meta.get_or_insert_with(RelationMeta::default).one_field = Some(name.into());
        self
    }

    pub fn key(&self) -> (&str, &str) {
        (&self.collection, &self.field)
    }

    pub fn path(&self) -> String {
        format!("{}.{}", self.collection, self.field)
    }

    pub fn is_system(&self) -> bool {
        self.meta.as_ref().is_some_and(|m| m.system)
    }

    /// Referenced column on the one side, when a constraint exists.
    pub fn foreign_key_column(&self) -> Option<&str> {
        self.schema.as_ref().map(|s| s.foreign_key_column.as_str())
    }
}

/// Foreign-key constraint of a relation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationSchema {
    pub foreign_key_column: String,

    #[serde(default)]
    pub on_delete: OnDelete,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraint_name: Option<String>,
}

/// Relation-level metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationMeta {
    /// Instance-specific record id. Never part of a portable snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,

    /// Reverse alias field on the one side
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub one_field: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_field: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub junction_field: Option<String>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub system: bool,
}

/// Portable, versioned description of a schema without system entities or
/// instance identifiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Format version, see [`SNAPSHOT_VERSION`]
    pub version: u32,

    /// Version of the system that emitted the snapshot
    pub source_version: String,

    #[serde(default)]
    pub collections: Vec<Collection>,

    #[serde(default)]
    pub fields: Vec<Field>,

    #[serde(default)]
    pub relations: Vec<Relation>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::new(Vec::new(), Vec::new(), Vec::new())
    }
}

impl Snapshot {
    pub fn new(collections: Vec<Collection>, fields: Vec<Field>, relations: Vec<Relation>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            source_version: SOURCE_VERSION.to_string(),
            collections,
            fields,
            relations,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty() && self.fields.is_empty() && self.relations.is_empty()
    }

    pub fn collection(&self, name: &str) -> Option<&Collection> {
        self.collections.iter().find(|c| c.collection == name)
    }

    pub fn field(&self, collection: &str, field: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.key() == (collection, field))
    }

    pub fn relation(&self, collection: &str, field: &str) -> Option<&Relation> {
        self.relations.iter().find(|r| r.key() == (collection, field))
    }

    /// Copy with every entity list sorted by natural identity.
    pub fn canonical(&self) -> Snapshot {
        let mut canonical = self.clone();
        canonical.collections.sort_by(|a, b| a.collection.cmp(&b.collection));
        canonical.fields.sort_by(|a, b| a.key().cmp(&b.key()));
        canonical.relations.sort_by(|a, b| a.key().cmp(&b.key()));
        canonical
    }

    /// Set equality over natural identity. Array order and the emitting
    /// version tag do not matter.
    pub fn schema_eq(&self, other: &Snapshot) -> bool {
        let left = self.canonical();
        let right = other.canonical();
        left.version == right.version
            && left.collections == right.collections
            && left.fields == right.fields
            && left.relations == right.relations
    }

    /// SHA-256 over the canonical schema content, hex encoded.
    pub fn hash(&self) -> String {
        #[derive(Serialize)]
        struct Hashed<'a> {
            version: u32,
            collections: &'a [Collection],
            fields: &'a [Field],
            relations: &'a [Relation],
        }

        let canonical = self.canonical();
        let hashed = Hashed {
            version: canonical.version,
            collections: &canonical.collections,
            fields: &canonical.fields,
            relations: &canonical.relations,
        };
        // Serializing plain data with string keys cannot fail.
        let bytes = serde_json::to_vec(&hashed).unwrap_or_default();
        hex::encode(Sha256::digest(&bytes))
    }

    /// Count of user fields per collection.
    pub fn field_counts(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for field in &self.fields {
            *counts.entry(field.collection.as_str()).or_insert(0) += 1;
        }
        counts
    }

    /// Parse a snapshot document. The `version` tag is checked before the
    /// rest of the document is interpreted.
    pub fn from_json(input: &str) -> Result<Snapshot, SchemaError> {
        let raw: Value = serde_json::from_str(input)?;
        let version = raw.get("version").and_then(Value::as_u64).ok_or_else(|| {
            ValidationError::single(
                "snapshot",
                "missing_version",
                "snapshot document has no integer `version` field",
            )
        })?;
        if version != u64::from(SNAPSHOT_VERSION) {
            return Err(SchemaError::UnsupportedVersion {
                found: version,
                supported: SNAPSHOT_VERSION,
            });
        }
        Ok(serde_json::from_value(raw)?)
    }

    pub fn to_json_pretty(&self) -> Result<String, SchemaError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
