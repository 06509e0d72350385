//! Dependency ordering of matched changes.
//!
//! Teardown runs first and in reverse dependency order (relations, then
//! fields, then collections). Build-up is grouped into one unit per
//! collection and the units are sorted topologically over the references
//! between them. Units caught in a reference cycle are still created, but
//! their relations move to a final pass so no step needs deferred
//! constraints.

use std::collections::{BTreeMap, BTreeSet};

use super::ChangeSet;
use super::changes::DiffOperation;
use crate::types::Relation;

/// Build-up operations for a single collection.
#[derive(Debug, Default)]
struct Unit {
    collection: Option<DiffOperation>,
    fields: Vec<DiffOperation>,
    relations: Vec<DiffOperation>,
}

/// Names of entities created or dropped by the change set.
#[derive(Debug, Default)]
struct Footprint {
    created_collections: BTreeSet<String>,
    created_fields: BTreeSet<(String, String)>,
    dropped_collections: BTreeSet<String>,
    dropped_fields: BTreeSet<(String, String)>,
}

impl Footprint {
    fn of(changes: &ChangeSet) -> Self {
        let mut footprint = Footprint::default();
        for op in &changes.collections {
            match op {
                DiffOperation::CreateCollection { collection } => {
                    footprint.created_collections.insert(collection.collection.clone());
                }
                DiffOperation::DropCollection { collection } => {
                    footprint.dropped_collections.insert(collection.collection.clone());
                }
                _ => {}
            }
        }
        for op in &changes.fields {
            match op {
                DiffOperation::CreateField { field } => {
                    footprint
                        .created_fields
                        .insert((field.collection.clone(), field.field.clone()));
                }
                DiffOperation::DropField { field } => {
                    footprint
                        .dropped_fields
                        .insert((field.collection.clone(), field.field.clone()));
                }
                _ => {}
            }
        }
        footprint
    }

    /// Whether `relation`'s constraint points at something this diff creates.
    fn relation_needs_creation_of(&self, relation: &Relation) -> Option<String> {
        let related = relation.related_collection.as_ref()?;
        if related == &relation.collection {
            return None;
        }
        let creates_target = self.created_collections.contains(related)
            || relation
                .foreign_key_column()
                .is_some_and(|fk| self.created_fields.contains(&(related.clone(), fk.to_string())));
        creates_target.then(|| related.clone())
    }

    /// Whether `relation`'s constraint points at something this diff drops.
    fn relation_blocks_teardown(&self, relation: &Relation) -> bool {
        let Some(related) = relation.related_collection.as_ref() else {
            return false;
        };
        relation.schema.is_some()
            && (self.dropped_collections.contains(related)
                || relation
                    .foreign_key_column()
                    .is_some_and(|fk| self.dropped_fields.contains(&(related.clone(), fk.to_string()))))
    }
}

/// Order matched changes so every intermediate state is valid.
pub(crate) fn order_operations(changes: ChangeSet) -> Vec<DiffOperation> {
    let footprint = Footprint::of(&changes);

    let mut drop_relations = Vec::new();
    let mut drop_fields = Vec::new();
    let mut drop_collections = Vec::new();
    let mut units: BTreeMap<String, Unit> = BTreeMap::new();

    for op in changes.collections {
        match op {
            DiffOperation::DropCollection { .. } => drop_collections.push(op),
            _ => {
                let name = op.collection().to_string();
                units.entry(name).or_default().collection = Some(op);
            }
        }
    }

    for op in changes.fields {
        match op {
            DiffOperation::DropField { .. } => drop_fields.push(op),
            _ => {
                let name = op.collection().to_string();
                units.entry(name).or_default().fields.push(op);
            }
        }
    }

    for op in changes.relations {
        match op {
            DiffOperation::DropRelation { .. } => drop_relations.push(op),
            // The old constraint must go before its target is torn down, so
            // the alter becomes a drop now and a create later.
            DiffOperation::AlterRelation { before, after } if footprint.relation_blocks_teardown(&before) => {
                log::debug!(
                    "splitting alter of relation {} around teardown of {:?}",
                    before.path(),
                    before.related_collection
                );
                drop_relations.push(DiffOperation::DropRelation { relation: before });
                units
                    .entry(after.collection.clone())
                    .or_default()
                    .relations
                    .push(DiffOperation::CreateRelation { relation: after });
            }
            _ => {
                let name = op.collection().to_string();
                units.entry(name).or_default().relations.push(op);
            }
        }
    }

    let mut ordered = Vec::new();

    drop_relations.sort_by(|a, b| relation_of(a).key().cmp(&relation_of(b).key()));
    ordered.extend(drop_relations);

    drop_fields.sort_by_key(|op| op.target());
    ordered.extend(drop_fields);

    ordered.extend(order_collection_drops(drop_collections));

    ordered.extend(order_build_up(units, &footprint));

    ordered
}

fn relation_of(op: &DiffOperation) -> &Relation {
    match op {
        DiffOperation::CreateRelation { relation } | DiffOperation::DropRelation { relation } => relation,
        DiffOperation::AlterRelation { after, .. } => after,
        _ => unreachable!("relation_of called with a non-relation operation"),
    }
}

/// Folder children are dropped before the folder that contains them.
fn order_collection_drops(drops: Vec<DiffOperation>) -> Vec<DiffOperation> {
    let mut pending: BTreeMap<String, DiffOperation> =
        drops.into_iter().map(|op| (op.collection().to_string(), op)).collect();
    let mut ordered = Vec::with_capacity(pending.len());

    while !pending.is_empty() {
        let has_pending_child = |name: &str| {
            pending.values().any(|op| match op {
                DiffOperation::DropCollection { collection } => {
                    collection.collection != name && collection.group() == Some(name)
                }
                _ => false,
            })
        };
        let next = pending
            .keys()
            .find(|name| !has_pending_child(name))
            .or_else(|| pending.keys().next())
            .cloned();
        if let Some(name) = next
            && let Some(op) = pending.remove(&name)
        {
            ordered.push(op);
        }
    }

    ordered
}

fn order_build_up(mut units: BTreeMap<String, Unit>, footprint: &Footprint) -> Vec<DiffOperation> {
    let mut relation_edges: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut group_edges: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

    for (name, unit) in units.iter_mut() {
        sort_unit(unit);

        for op in &unit.relations {
            let relation = relation_of(op);
            if let Some(target) = footprint.relation_needs_creation_of(relation) {
                relation_edges.entry(name.clone()).or_default().insert(target);
            }
        }

        let group = match &unit.collection {
            Some(DiffOperation::CreateCollection { collection }) => collection.group(),
            Some(DiffOperation::AlterCollection { after, .. }) => after.group(),
            _ => None,
        };
        if let Some(group) = group
            && group != name
            && footprint.created_collections.contains(group)
        {
            group_edges.entry(name.clone()).or_default().insert(group.to_string());
        }
    }

    let mut pending: BTreeSet<String> = units.keys().cloned().collect();
    let mut relaxed: BTreeSet<String> = BTreeSet::new();
    let mut ordered = Vec::new();
    let mut deferred = Vec::new();

    while !pending.is_empty() {
        let satisfied = |name: &String| {
            let unmet = |edges: &BTreeMap<String, BTreeSet<String>>| {
                edges
                    .get(name)
                    .is_some_and(|deps| deps.iter().any(|dep| dep != name && pending.contains(dep)))
            };
            !unmet(&relation_edges) && !unmet(&group_edges)
        };

        let next = match pending.iter().find(|name| satisfied(name)) {
            Some(name) => name.clone(),
            None => {
                let cyclic: BTreeSet<String> = pending
                    .iter()
                    .filter(|name| !relaxed.contains(*name))
                    .filter(|name| on_cycle(name, &pending, [&relation_edges, &group_edges]))
                    .cloned()
                    .collect();
                if cyclic.is_empty() {
                    // Only folder-group edges remain and they loop; fall back to name order.
                    match pending.iter().next() {
                        Some(name) => name.clone(),
                        None => break,
                    }
                } else {
                    log::debug!("reference cycle between {cyclic:?}; deferring their relations to a final pass");
                    for name in cyclic {
                        relation_edges.remove(&name);
                        relaxed.insert(name);
                    }
                    continue;
                }
            }
        };

        pending.remove(&next);
        if let Some(unit) = units.remove(&next) {
            ordered.extend(unit.collection);
            ordered.extend(unit.fields);
            if relaxed.contains(&next) {
                deferred.extend(unit.relations);
            } else {
                ordered.extend(unit.relations);
            }
        }
    }

    ordered.extend(deferred);
    ordered
}

/// Whether `start` can reach itself over edges between pending units.
fn on_cycle(start: &str, pending: &BTreeSet<String>, edge_sets: [&BTreeMap<String, BTreeSet<String>>; 2]) -> bool {
    let mut stack = vec![start];
    let mut seen: BTreeSet<&str> = BTreeSet::new();
    while let Some(node) = stack.pop() {
        for edges in edge_sets {
            for dep in edges.get(node).into_iter().flatten() {
                if dep == node || !pending.contains(dep) {
                    continue;
                }
                if dep == start {
                    return true;
                }
                if seen.insert(dep.as_str()) {
                    stack.push(dep.as_str());
                }
            }
        }
    }
    false
}

/// Field creates first (primary key leading), then field alters; relations by field name.
fn sort_unit(unit: &mut Unit) {
    unit.fields.sort_by_key(|op| match op {
        DiffOperation::CreateField { field } => (0, !field.is_primary_key(), field.field.clone()),
        DiffOperation::AlterField { after, .. } => (1, true, after.field.clone()),
        other => (2, true, other.target()),
    });
    unit.relations.sort_by(|a, b| relation_of(a).field.cmp(&relation_of(b).field));
}
