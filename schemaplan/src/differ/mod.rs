//! Computes the ordered list of operations that turns one snapshot into another.

mod changes;
mod ordering;

pub use changes::{ChangeType, DiffOperation, DiffSummary, EntityKind, KindCounts};

use std::collections::{BTreeMap, BTreeSet};

use crate::capture::{strip_field_identity, strip_relation_identity};
use crate::errors::{SchemaError, ValidationError, ValidationIssue};
use crate::types::{Collection, Field, Relation, SNAPSHOT_VERSION, Snapshot};

/// Matched but not yet ordered changes, grouped by entity kind.
#[derive(Debug, Default)]
pub(crate) struct ChangeSet {
    pub(crate) collections: Vec<DiffOperation>,
    pub(crate) fields: Vec<DiffOperation>,
    pub(crate) relations: Vec<DiffOperation>,
}

/// Compute the operations that transform `current` into `desired`.
///
/// Both snapshots are validated first and the desired schema is checked for
/// references that the diff would leave dangling. The result is ordered so
/// that applying it front to back never references a missing entity.
pub fn diff(current: &Snapshot, desired: &Snapshot) -> Result<Vec<DiffOperation>, SchemaError> {
    validate_snapshot(current, "current")?;
    validate_snapshot(desired, "desired")?;
    check_dependencies(current, desired)?;

    let changes = match_changes(current, desired);
    let operations = ordering::order_operations(changes);

    log::debug!(
        "diff produced {} operation(s): {}",
        operations.len(),
        DiffSummary::from_operations(&operations)
    );
    Ok(operations)
}

/// Structural validation of a single snapshot. All issues are collected
/// before returning.
pub fn validate_snapshot(snapshot: &Snapshot, label: &str) -> Result<(), ValidationError> {
    let mut issues = Vec::new();

    if snapshot.version != SNAPSHOT_VERSION {
        issues.push(ValidationIssue::new(
            label,
            "unsupported_version",
            format!(
                "snapshot version {} is not supported (expected {SNAPSHOT_VERSION})",
                snapshot.version
            ),
        ));
    }

    let mut collections: BTreeMap<&str, &Collection> = BTreeMap::new();
    for collection in &snapshot.collections {
        check_name(&mut issues, &collection.collection, &collection.collection);
        if collection.is_system() {
            issues.push(ValidationIssue::new(
                &collection.collection,
                "system_entity",
                "system collections cannot be part of a snapshot",
            ));
        }
        if collections.insert(&collection.collection, collection).is_some() {
            issues.push(ValidationIssue::new(
                &collection.collection,
                "duplicate_collection",
                "collection is declared more than once",
            ));
        }
    }

    let mut fields: BTreeSet<(&str, &str)> = BTreeSet::new();
    let mut primary_keys: BTreeMap<&str, usize> = BTreeMap::new();
    let mut column_fields: BTreeMap<&str, usize> = BTreeMap::new();
    for field in &snapshot.fields {
        let path = field.path();
        check_name(&mut issues, &path, &field.field);
        if field.is_system() {
            issues.push(ValidationIssue::new(
                &path,
                "system_entity",
                "system fields cannot be part of a snapshot",
            ));
        }
        if !fields.insert(field.key()) {
            issues.push(ValidationIssue::new(&path, "duplicate_field", "field is declared more than once"));
        }
        if field.field_type.is_alias() && field.schema.is_some() {
            issues.push(ValidationIssue::new(
                &path,
                "alias_has_schema",
                "alias fields have no column and must not carry a schema",
            ));
        }
        if field.has_column() {
            *column_fields.entry(&field.collection).or_default() += 1;
        }
        if field.is_primary_key() {
            *primary_keys.entry(&field.collection).or_default() += 1;
        }
    }

    for (name, collection) in &collections {
        let keys = primary_keys.get(name).copied().unwrap_or(0);
        if keys > 1 {
            issues.push(ValidationIssue::new(
                *name,
                "multiple_primary_keys",
                format!("collection declares {keys} primary key fields"),
            ));
        } else if keys == 0 && collection.has_table() && column_fields.get(name).is_some_and(|n| *n > 0) {
            issues.push(ValidationIssue::new(
                *name,
                "missing_primary_key",
                "collection has columns but no primary key field",
            ));
        }
        if !collection.has_table() && column_fields.get(name).is_some_and(|n| *n > 0) {
            issues.push(ValidationIssue::new(
                *name,
                "folder_has_columns",
                "folder collections have no table and can only hold alias fields",
            ));
        }
    }

    let mut relations: BTreeSet<(&str, &str)> = BTreeSet::new();
    for relation in &snapshot.relations {
        let path = relation.path();
        if relation.is_system() {
            issues.push(ValidationIssue::new(
                &path,
                "system_entity",
                "system relations cannot be part of a snapshot",
            ));
        }
        if !relations.insert(relation.key()) {
            issues.push(ValidationIssue::new(
                &path,
                "duplicate_relation",
                "more than one relation is declared for this field",
            ));
        }
        if let Some(related) = &relation.related_collection {
            check_name(&mut issues, &path, related);
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        log::debug!("{label} snapshot failed validation with {} issue(s)", issues.len());
        Err(ValidationError::new(issues))
    }
}

/// Names are opaque to the differ; dialect rules belong to the executor.
fn check_name(issues: &mut Vec<ValidationIssue>, entity: &str, name: &str) {
    if name.trim().is_empty() {
        issues.push(ValidationIssue::new(entity, "empty_name", "name must not be empty"));
    }
}

/// Reject a desired schema whose references could never be satisfied.
/// Collections known to neither snapshot are treated as external and left alone.
fn check_dependencies(current: &Snapshot, desired: &Snapshot) -> Result<(), SchemaError> {
    let current_collections: BTreeSet<&str> = current.collections.iter().map(|c| c.collection.as_str()).collect();
    let desired_collections: BTreeSet<&str> = desired.collections.iter().map(|c| c.collection.as_str()).collect();
    let desired_fields: BTreeSet<(&str, &str)> = desired.fields.iter().map(Field::key).collect();
    let dropped = |name: &str| !desired_collections.contains(name) && current_collections.contains(name);

    let mut relations: Vec<&Relation> = desired.relations.iter().collect();
    relations.sort_by(|a, b| a.key().cmp(&b.key()));
    for relation in relations {
        if !desired_fields.contains(&relation.key()) {
            return Err(SchemaError::dependency(
                relation.path(),
                format!("relation references field {} which is not in the desired schema", relation.path()),
            ));
        }
        let Some(related) = relation.related_collection.as_deref() else {
            continue;
        };
        if dropped(related) {
            return Err(SchemaError::dependency(
                relation.path(),
                format!("relation targets collection {related} which the desired schema removes"),
            ));
        }
        if desired_collections.contains(related)
            && let Some(column) = relation.foreign_key_column()
            && !desired_fields.contains(&(related, column))
        {
            return Err(SchemaError::dependency(
                relation.path(),
                format!("relation references {related}.{column} which is not in the desired schema"),
            ));
        }
    }

    let mut fields: Vec<&Field> = desired.fields.iter().collect();
    fields.sort_by(|a, b| a.key().cmp(&b.key()));
    for field in fields {
        if dropped(field.collection.as_str()) {
            return Err(SchemaError::dependency(
                field.path(),
                format!("field belongs to collection {} which the desired schema removes", field.collection),
            ));
        }
    }

    let groups: BTreeMap<&str, &str> = desired
        .collections
        .iter()
        .filter_map(|c| c.group().map(|group| (c.collection.as_str(), group)))
        .collect();
    for (name, group) in &groups {
        if dropped(*group) {
            return Err(SchemaError::dependency(
                *name,
                format!("collection is grouped under {group} which the desired schema removes"),
            ));
        }

        let mut seen = BTreeSet::new();
        let mut cursor = *name;
        while let Some(next) = groups.get(cursor) {
            if !seen.insert(cursor) {
                return Err(SchemaError::dependency(*name, "collection groups form a cycle"));
            }
            cursor = *next;
        }
    }

    Ok(())
}

/// Pair entities by natural identity and classify each pair.
fn match_changes(current: &Snapshot, desired: &Snapshot) -> ChangeSet {
    let mut changes = ChangeSet::default();

    let before: BTreeMap<&str, &Collection> = current.collections.iter().map(|c| (c.collection.as_str(), c)).collect();
    let after: BTreeMap<&str, &Collection> = desired.collections.iter().map(|c| (c.collection.as_str(), c)).collect();
    for (name, desired_collection) in &after {
        match before.get(name) {
            None => changes.collections.push(DiffOperation::CreateCollection {
                collection: (*desired_collection).clone(),
            }),
            Some(current_collection) if current_collection != desired_collection => {
                changes.collections.push(DiffOperation::AlterCollection {
                    before: (*current_collection).clone(),
                    after: (*desired_collection).clone(),
                })
            }
            Some(_) => {}
        }
    }
    for (name, current_collection) in &before {
        if !after.contains_key(name) {
            changes.collections.push(DiffOperation::DropCollection {
                collection: (*current_collection).clone(),
            });
        }
    }

    let before: BTreeMap<(&str, &str), Field> = current
        .fields
        .iter()
        .map(|f| (f.key(), strip_field_identity(f.clone())))
        .collect();
    let after: BTreeMap<(&str, &str), Field> = desired
        .fields
        .iter()
        .map(|f| (f.key(), strip_field_identity(f.clone())))
        .collect();
    for (key, desired_field) in &after {
        match before.get(key) {
            None => changes.fields.push(DiffOperation::CreateField {
                field: desired_field.clone(),
            }),
            Some(current_field) if current_field != desired_field => changes.fields.push(DiffOperation::AlterField {
                before: current_field.clone(),
                after: desired_field.clone(),
            }),
            Some(_) => {}
        }
    }
    for (key, current_field) in &before {
        if !after.contains_key(key) {
            changes.fields.push(DiffOperation::DropField {
                field: current_field.clone(),
            });
        }
    }

    let before: BTreeMap<(&str, &str), Relation> = current
        .relations
        .iter()
        .map(|r| (r.key(), strip_relation_identity(r.clone())))
        .collect();
    let after: BTreeMap<(&str, &str), Relation> = desired
        .relations
        .iter()
        .map(|r| (r.key(), strip_relation_identity(r.clone())))
        .collect();
    for (key, desired_relation) in &after {
        match before.get(key) {
            None => changes.relations.push(DiffOperation::CreateRelation {
                relation: desired_relation.clone(),
            }),
            Some(current_relation) if current_relation != desired_relation => {
                changes.relations.push(DiffOperation::AlterRelation {
                    before: current_relation.clone(),
                    after: desired_relation.clone(),
                })
            }
            Some(_) => {}
        }
    }
    for (key, current_relation) in &before {
        if !after.contains_key(key) {
            changes.relations.push(DiffOperation::DropRelation {
                relation: current_relation.clone(),
            });
        }
    }

    changes
}
