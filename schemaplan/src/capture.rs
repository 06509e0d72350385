//! Builds a portable snapshot from live metadata.

use crate::errors::SchemaError;
use crate::repository::MetadataRepository;
use crate::types::{Collection, Field, Relation, Snapshot};

/// Capture the live schema, optionally restricted to one collection.
///
/// The three reads run concurrently; if any of them fails the capture fails
/// and no partial snapshot is returned. System entities are dropped and
/// instance ids are removed.
pub async fn capture<R>(repository: &R, collection: Option<&str>) -> Result<Snapshot, SchemaError>
where
    R: MetadataRepository,
{
    let (collections, fields, relations) = tokio::try_join!(
        repository.list_collections(collection),
        repository.list_fields(collection),
        repository.list_relations(collection),
    )?;

    let collections: Vec<Collection> = collections.into_iter().filter(|c| !c.is_system()).collect();
    let fields: Vec<Field> = fields
        .into_iter()
        .filter(|f| !f.is_system())
        .map(strip_field_identity)
        .collect();
    let relations: Vec<Relation> = relations
        .into_iter()
        .filter(|r| !r.is_system())
        .map(strip_relation_identity)
        .collect();

    log::debug!(
        "captured {} collection(s), {} field(s), {} relation(s){}",
        collections.len(),
        fields.len(),
        relations.len(),
        collection.map(|name| format!(" for {name}")).unwrap_or_default()
    );

    Ok(Snapshot::new(collections, fields, relations).canonical())
}

/// Remove the instance-specific record id from a field.
pub fn strip_field_identity(mut field: Field) -> Field {
    if let Some(meta) = field.meta.as_mut() {
        meta.id = None;
    }
    field
}

/// Remove the instance-specific record id from a relation.
pub fn strip_relation_identity(mut relation: Relation) -> Relation {
    if let Some(meta) = relation.meta.as_mut() {
        meta.id = None;
    }
    relation
}
