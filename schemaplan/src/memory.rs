//! In-memory metadata store and DDL catalog.
//!
//! Both backends are serializable so the CLI can keep a development store in
//! a single JSON file (see [`StoreFile`]).

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{ExecutorError, RepositoryError};
use crate::repository::{MetadataRepository, MetadataWrite, SchemaExecutor};
use crate::types::{Collection, Field, FieldType, OnDelete, Relation, Snapshot};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct MetadataState {
    collections: BTreeMap<String, Collection>,
    /// collection -> field -> definition
    fields: BTreeMap<String, BTreeMap<String, Field>>,
    /// many-side collection -> field -> definition
    relations: BTreeMap<String, BTreeMap<String, Relation>>,
    next_id: u64,
}

impl MetadataState {
    fn assign_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Metadata repository backed by ordered maps. Assigns instance ids to
/// fields and relations the way a database-backed store would.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryRepository {
    #[serde(flatten)]
    state: MetadataState,

    #[serde(skip)]
    saved: Option<MetadataState>,

    #[serde(skip)]
    read_failure: Option<RepositoryError>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a repository with every entity of `snapshot`.
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let mut repository = Self::new();
        for collection in &snapshot.collections {
            repository.insert_collection(collection.clone());
        }
        for field in &snapshot.fields {
            repository.insert_field(field.clone());
        }
        for relation in &snapshot.relations {
            repository.insert_relation(relation.clone());
        }
        repository
    }

    pub fn insert_collection(&mut self, collection: Collection) {
        self.state
            .collections
            .insert(collection.collection.clone(), collection);
    }

    /// Insert or replace a field, keeping its existing id or assigning a new one.
    pub fn insert_field(&mut self, mut field: Field) {
        let existing = self
            .state
            .fields
            .get(&field.collection)
            .and_then(|fields| fields.get(&field.field))
            .and_then(|f| f.meta.as_ref())
            .and_then(|meta| meta.id);
        let id = match existing {
            Some(id) => id,
            None => self.state.assign_id(),
        };
        field.meta.get_or_insert_with(Default::default).id = Some(id);
        self.state
            .fields
            .entry(field.collection.clone())
            .or_default()
            .insert(field.field.clone(), field);
    }

    /// Insert or replace a relation, keeping its existing id or assigning a new one.
    pub fn insert_relation(&mut self, mut relation: Relation) {
        let existing = self
            .state
            .relations
            .get(&relation.collection)
            .and_then(|relations| relations.get(&relation.field))
            .and_then(|r| r.meta.as_ref())
            .and_then(|meta| meta.id);
        let id = match existing {
            Some(id) => id,
            None => self.state.assign_id(),
        };
        relation.meta.get_or_insert_with(Default::default).id = Some(id);
        self.state
            .relations
            .entry(relation.collection.clone())
            .or_default()
            .insert(relation.field.clone(), relation);
    }

    /// Make every subsequent read fail with `error`.
    pub fn fail_reads_with(&mut self, error: RepositoryError) {
        self.read_failure = Some(error);
    }

    pub fn field(&self, collection: &str, field: &str) -> Option<&Field> {
        self.state.fields.get(collection).and_then(|fields| fields.get(field))
    }

    pub fn relation(&self, collection: &str, field: &str) -> Option<&Relation> {
        self.state
            .relations
            .get(collection)
            .and_then(|relations| relations.get(field))
    }

    pub fn in_transaction(&self) -> bool {
        self.saved.is_some()
    }

    fn check_reads(&self) -> Result<(), RepositoryError> {
        match &self.read_failure {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

fn matches_filter(collection: &str, filter: Option<&str>) -> bool {
    filter.is_none_or(|name| name == collection)
}

impl MetadataRepository for MemoryRepository {
    async fn list_collections(&self, filter: Option<&str>) -> Result<Vec<Collection>, RepositoryError> {
        self.check_reads()?;
        Ok(self
            .state
            .collections
            .values()
            .filter(|c| matches_filter(&c.collection, filter))
            .cloned()
            .collect())
    }

    async fn list_fields(&self, filter: Option<&str>) -> Result<Vec<Field>, RepositoryError> {
        self.check_reads()?;
        Ok(self
            .state
            .fields
            .iter()
            .filter(|(collection, _)| matches_filter(collection, filter))
            .flat_map(|(_, fields)| fields.values().cloned())
            .collect())
    }

    async fn list_relations(&self, filter: Option<&str>) -> Result<Vec<Relation>, RepositoryError> {
        self.check_reads()?;
        Ok(self
            .state
            .relations
            .iter()
            .filter(|(collection, _)| matches_filter(collection, filter))
            .flat_map(|(_, relations)| relations.values().cloned())
            .collect())
    }

    async fn write_collection(&mut self, write: MetadataWrite<'_, Collection>) -> Result<(), RepositoryError> {
        match write {
            MetadataWrite::Upsert(collection) => self.insert_collection(collection.clone()),
            MetadataWrite::Delete(collection) => {
                if self.state.collections.remove(&collection.collection).is_none() {
                    return Err(RepositoryError::NotFound {
                        entity: format!("collection {}", collection.collection),
                    });
                }
            }
        }
        Ok(())
    }

    async fn write_field(&mut self, write: MetadataWrite<'_, Field>) -> Result<(), RepositoryError> {
        match write {
            MetadataWrite::Upsert(field) => self.insert_field(field.clone()),
            MetadataWrite::Delete(field) => {
                let removed = self
                    .state
                    .fields
                    .get_mut(&field.collection)
                    .and_then(|fields| fields.remove(&field.field));
                if removed.is_none() {
                    return Err(RepositoryError::NotFound {
                        entity: format!("field {}", field.path()),
                    });
                }
                if self.state.fields.get(&field.collection).is_some_and(BTreeMap::is_empty) {
                    self.state.fields.remove(&field.collection);
                }
            }
        }
        Ok(())
    }

    async fn write_relation(&mut self, write: MetadataWrite<'_, Relation>) -> Result<(), RepositoryError> {
        match write {
            MetadataWrite::Upsert(relation) => self.insert_relation(relation.clone()),
            MetadataWrite::Delete(relation) => {
                let removed = self
                    .state
                    .relations
                    .get_mut(&relation.collection)
                    .and_then(|relations| relations.remove(&relation.field));
                if removed.is_none() {
                    return Err(RepositoryError::NotFound {
                        entity: format!("relation {}", relation.path()),
                    });
                }
                if self.state.relations.get(&relation.collection).is_some_and(BTreeMap::is_empty) {
                    self.state.relations.remove(&relation.collection);
                }
            }
        }
        Ok(())
    }

    async fn begin(&mut self) -> Result<(), RepositoryError> {
        if self.saved.is_some() {
            return Err(RepositoryError::Other {
                message: "transaction already open".to_string(),
            });
        }
        self.saved = Some(self.state.clone());
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), RepositoryError> {
        self.saved = None;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), RepositoryError> {
        if let Some(saved) = self.saved.take() {
            self.state = saved;
        }
        Ok(())
    }
}

/// Physical column in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnState {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub nullable: bool,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
}

impl ColumnState {
    fn of(field: &Field) -> Self {
        let schema = field.schema.clone().unwrap_or_default();
        Self {
            field_type: field.field_type,
            nullable: schema.is_nullable,
            primary_key: schema.is_primary_key,
            default_value: schema.default_value,
        }
    }
}

/// Foreign-key constraint in the catalog, keyed by its column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyState {
    pub references_table: String,
    pub references_column: String,
    pub on_delete: OnDelete,
}

/// Physical table in the catalog.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableState {
    #[serde(default)]
    pub columns: BTreeMap<String, ColumnState>,
    #[serde(default)]
    pub foreign_keys: BTreeMap<String, ForeignKeyState>,
}

/// DDL executor over an in-memory catalog.
///
/// Enforces the preconditions a real database would: no duplicate tables or
/// columns, no constraint to a missing column, no dropping a table or column
/// that a constraint still references.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryExecutor {
    tables: BTreeMap<String, TableState>,

    #[serde(default = "default_transactional")]
    transactional: bool,

    #[serde(skip)]
    saved: Option<BTreeMap<String, TableState>>,

    #[serde(skip)]
    fail_on: Option<String>,

    #[serde(skip)]
    delay: Option<Duration>,

    #[serde(skip)]
    calls: Vec<String>,
}

fn default_transactional() -> bool {
    true
}

impl Default for MemoryExecutor {
    fn default() -> Self {
        Self {
            tables: BTreeMap::new(),
            transactional: true,
            saved: None,
            fail_on: None,
            delay: None,
            calls: Vec::new(),
        }
    }
}

impl MemoryExecutor {
    /// Transactional executor with an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Executor whose DDL auto-commits, like MySQL.
    pub fn non_transactional() -> Self {
        Self {
            transactional: false,
            ..Self::default()
        }
    }

    /// Build the catalog that `snapshot` describes.
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let mut executor = Self::new();
        executor.load_snapshot(snapshot);
        executor
    }

    pub fn load_snapshot(&mut self, snapshot: &Snapshot) {
        for collection in snapshot.collections.iter().filter(|c| c.has_table()) {
            self.tables.entry(collection.collection.clone()).or_default();
        }
        for field in snapshot.fields.iter().filter(|f| f.has_column()) {
            self.tables
                .entry(field.collection.clone())
                .or_default()
                .columns
                .insert(field.field.clone(), ColumnState::of(field));
        }
        for relation in &snapshot.relations {
            if let Some(foreign_key) = foreign_key_of(relation) {
                self.tables
                    .entry(relation.collection.clone())
                    .or_default()
                    .foreign_keys
                    .insert(relation.field.clone(), foreign_key);
            }
        }
    }

    /// Fail the call whose description equals `step`, e.g. `add_column posts.body`.
    pub fn fail_on(mut self, step: impl Into<String>) -> Self {
        self.fail_on = Some(step.into());
        self
    }

    /// Sleep before every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_transactional(&mut self, transactional: bool) {
        self.transactional = transactional;
    }

    /// Every DDL call made so far, in order.
    pub fn calls(&self) -> &[String] {
        &self.calls
    }

    pub fn tables(&self) -> &BTreeMap<String, TableState> {
        &self.tables
    }

    pub fn table(&self, name: &str) -> Option<&TableState> {
        self.tables.get(name)
    }

    pub fn has_foreign_key(&self, table: &str, column: &str) -> bool {
        self.tables
            .get(table)
            .is_some_and(|t| t.foreign_keys.contains_key(column))
    }

    async fn step(&mut self, description: String) -> Result<(), ExecutorError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let result = if self.fail_on.as_deref() == Some(description.as_str()) {
            Err(ExecutorError::new(format!("injected failure at {description}")))
        } else {
            Ok(())
        };
        self.calls.push(description);
        result
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut TableState, ExecutorError> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| ExecutorError::new(format!("table {name} does not exist")))
    }

    /// First constraint (table.column) referencing `table`, optionally a single column of it.
    fn referencing(&self, table: &str, column: Option<&str>) -> Option<String> {
        self.tables.iter().find_map(|(owner, state)| {
            state.foreign_keys.iter().find_map(|(fk_column, fk)| {
                let hits = fk.references_table == table
                    && column.is_none_or(|c| c == fk.references_column)
                    && !(owner == table && column.is_none());
                hits.then(|| format!("{owner}.{fk_column}"))
            })
        })
    }
}

fn foreign_key_of(relation: &Relation) -> Option<ForeignKeyState> {
    let schema = relation.schema.as_ref()?;
    Some(ForeignKeyState {
        references_table: relation.related_collection.clone()?,
        references_column: schema.foreign_key_column.clone(),
        on_delete: schema.on_delete,
    })
}

impl SchemaExecutor for MemoryExecutor {
    fn supports_transactions(&self) -> bool {
        self.transactional
    }

    async fn begin(&mut self) -> Result<(), ExecutorError> {
        if self.transactional {
            self.saved = Some(self.tables.clone());
        }
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), ExecutorError> {
        self.saved = None;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), ExecutorError> {
        if let Some(saved) = self.saved.take() {
            self.tables = saved;
        }
        Ok(())
    }

    async fn create_table(&mut self, collection: &Collection) -> Result<(), ExecutorError> {
        self.step(format!("create_table {}", collection.collection)).await?;
        if self.tables.contains_key(&collection.collection) {
            return Err(ExecutorError::new(format!("table {} already exists", collection.collection)));
        }
        self.tables.insert(collection.collection.clone(), TableState::default());
        Ok(())
    }

    async fn drop_table(&mut self, collection: &Collection) -> Result<(), ExecutorError> {
        self.step(format!("drop_table {}", collection.collection)).await?;
        if let Some(constraint) = self.referencing(&collection.collection, None) {
            return Err(ExecutorError::new(format!(
                "table {} is still referenced by {constraint}",
                collection.collection
            )));
        }
        self.tables
            .remove(&collection.collection)
            .map(|_| ())
            .ok_or_else(|| ExecutorError::new(format!("table {} does not exist", collection.collection)))
    }

    async fn alter_table(&mut self, before: &Collection, after: &Collection) -> Result<(), ExecutorError> {
        self.step(format!("alter_table {}", after.collection)).await?;
        self.table_mut(&before.collection)?;
        Ok(())
    }

    async fn add_column(&mut self, field: &Field) -> Result<(), ExecutorError> {
        self.step(format!("add_column {}", field.path())).await?;
        let table = self.table_mut(&field.collection)?;
        if table.columns.contains_key(&field.field) {
            return Err(ExecutorError::new(format!("column {} already exists", field.path())));
        }
        table.columns.insert(field.field.clone(), ColumnState::of(field));
        Ok(())
    }

    async fn drop_column(&mut self, field: &Field) -> Result<(), ExecutorError> {
        self.step(format!("drop_column {}", field.path())).await?;
        if let Some(constraint) = self.referencing(&field.collection, Some(&field.field)) {
            return Err(ExecutorError::new(format!(
                "column {} is still referenced by {constraint}",
                field.path()
            )));
        }
        let table = self.table_mut(&field.collection)?;
        if table.foreign_keys.contains_key(&field.field) {
            return Err(ExecutorError::new(format!(
                "column {} still carries a foreign key",
                field.path()
            )));
        }
        table
            .columns
            .remove(&field.field)
            .map(|_| ())
            .ok_or_else(|| ExecutorError::new(format!("column {} does not exist", field.path())))
    }

    async fn alter_column(&mut self, before: &Field, after: &Field) -> Result<(), ExecutorError> {
        self.step(format!("alter_column {}", after.path())).await?;
        let table = self.table_mut(&before.collection)?;
        let Some(column) = table.columns.get_mut(&before.field) else {
            return Err(ExecutorError::new(format!("column {} does not exist", before.path())));
        };
        *column = ColumnState::of(after);
        Ok(())
    }

    async fn add_foreign_key(&mut self, relation: &Relation) -> Result<(), ExecutorError> {
        self.step(format!("add_foreign_key {}", relation.path())).await?;
        let foreign_key = foreign_key_of(relation).ok_or_else(|| {
            ExecutorError::new(format!("relation {} has no constraint target", relation.path()))
        })?;

        let target_exists = self
            .tables
            .get(&foreign_key.references_table)
            .is_some_and(|t| t.columns.contains_key(&foreign_key.references_column));
        if !target_exists {
            return Err(ExecutorError::new(format!(
                "referenced column {}.{} does not exist",
                foreign_key.references_table, foreign_key.references_column
            )));
        }

        let table = self.table_mut(&relation.collection)?;
        if !table.columns.contains_key(&relation.field) {
            return Err(ExecutorError::new(format!("column {} does not exist", relation.path())));
        }
        if table.foreign_keys.contains_key(&relation.field) {
            return Err(ExecutorError::new(format!(
                "column {} already has a foreign key",
                relation.path()
            )));
        }
        table.foreign_keys.insert(relation.field.clone(), foreign_key);
        Ok(())
    }

    async fn drop_foreign_key(&mut self, relation: &Relation) -> Result<(), ExecutorError> {
        self.step(format!("drop_foreign_key {}", relation.path())).await?;
        let table = self.table_mut(&relation.collection)?;
        table
            .foreign_keys
            .remove(&relation.field)
            .map(|_| ())
            .ok_or_else(|| ExecutorError::new(format!("no foreign key on {}", relation.path())))
    }
}

/// On-disk development store: metadata plus the physical catalog it describes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreFile {
    #[serde(default)]
    pub metadata: MemoryRepository,
    #[serde(default)]
    pub catalog: MemoryExecutor,
}

impl StoreFile {
    /// A store whose metadata and catalog both hold `snapshot`.
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        Self {
            metadata: MemoryRepository::from_snapshot(snapshot),
            catalog: MemoryExecutor::from_snapshot(snapshot),
        }
    }
}
