use surrealdb::Surreal;
use surrealdb::engine::any::{self, Any};
use thiserror::Error;
use uuid::Uuid;

use crate::repository::error::StoreError;
use crate::repository::schema::define_schema;
use crate::repository::surreal_store::SurrealStore;

#[derive(Error, Debug)]
pub enum TestUtilsError {
    #[error("Database connection failed: {0}")]
    DatabaseConnection(#[from] surrealdb::Error),

    #[error("Schema initialization failed: {0}")]
    SchemaInitialization(#[from] StoreError),
}

/// Isolated in-memory database with the study room schema applied
pub struct TestDatabase {
    pub db: Surreal<Any>,
    pub namespace: String,
    pub database_name: String,
}

impl TestDatabase {
    pub async fn new() -> Result<Self, TestUtilsError> {
        // unique namespace and database so tests never observe each other's rows
        let namespace = format!("test_ns_{}", Uuid::new_v4().simple());
        let database_name = format!("test_db_{}", Uuid::new_v4().simple());

        let db = any::connect("memory").await?;
        db.use_ns(namespace.as_str()).use_db(database_name.as_str()).await?;
        define_schema(&db).await?;

        Ok(Self { db, namespace, database_name })
    }

    /// Gateway over this database
    pub fn store(&self) -> SurrealStore {
        SurrealStore::from_db(self.db.clone(), 16)
    }
}

/// Shorthand for a fresh gateway over an isolated in-memory database
pub async fn memory_store() -> Result<SurrealStore, TestUtilsError> {
    Ok(TestDatabase::new().await?.store())
}
