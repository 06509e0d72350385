//! Seams to the live system: the metadata store and the DDL executor.

use crate::errors::{ExecutorError, RepositoryError};
use crate::types::{Collection, Field, Relation};

/// A metadata record change recorded after its DDL succeeded.
#[derive(Debug, Clone, Copy)]
pub enum MetadataWrite<'a, T> {
    /// Insert or replace the record with this identity
    Upsert(&'a T),
    /// Remove the record with this identity
    Delete(&'a T),
}

impl<T> MetadataWrite<'_, T> {
    pub fn entity(&self) -> &T {
        match self {
            MetadataWrite::Upsert(entity) | MetadataWrite::Delete(entity) => entity,
        }
    }
}

/// Source of live collection, field and relation definitions, and the sink
/// for metadata records of applied changes.
///
/// `filter` restricts reads to a single collection (by many side for relations).
#[allow(async_fn_in_trait)]
pub trait MetadataRepository {
    async fn list_collections(&self, filter: Option<&str>) -> Result<Vec<Collection>, RepositoryError>;

    async fn list_fields(&self, filter: Option<&str>) -> Result<Vec<Field>, RepositoryError>;

    async fn list_relations(&self, filter: Option<&str>) -> Result<Vec<Relation>, RepositoryError>;

    async fn write_collection(&mut self, write: MetadataWrite<'_, Collection>) -> Result<(), RepositoryError>;

    async fn write_field(&mut self, write: MetadataWrite<'_, Field>) -> Result<(), RepositoryError>;

    async fn write_relation(&mut self, write: MetadataWrite<'_, Relation>) -> Result<(), RepositoryError>;

    async fn begin(&mut self) -> Result<(), RepositoryError> {
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), RepositoryError> {
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

/// Vendor-specific DDL. One implementation per database dialect.
#[allow(async_fn_in_trait)]
pub trait SchemaExecutor {
    /// Whether DDL can run inside a transaction that is rolled back as a whole.
    fn supports_transactions(&self) -> bool;

    async fn begin(&mut self) -> Result<(), ExecutorError> {
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), ExecutorError> {
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), ExecutorError> {
        Ok(())
    }

    async fn create_table(&mut self, collection: &Collection) -> Result<(), ExecutorError>;

    async fn drop_table(&mut self, collection: &Collection) -> Result<(), ExecutorError>;

    async fn alter_table(&mut self, before: &Collection, after: &Collection) -> Result<(), ExecutorError>;

    async fn add_column(&mut self, field: &Field) -> Result<(), ExecutorError>;

    async fn drop_column(&mut self, field: &Field) -> Result<(), ExecutorError>;

    async fn alter_column(&mut self, before: &Field, after: &Field) -> Result<(), ExecutorError>;

    async fn add_foreign_key(&mut self, relation: &Relation) -> Result<(), ExecutorError>;

    async fn drop_foreign_key(&mut self, relation: &Relation) -> Result<(), ExecutorError>;
}
