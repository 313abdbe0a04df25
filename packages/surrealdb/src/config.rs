use serde::{Deserialize, Serialize};

use crate::repository::error::StoreError;

/// Storage engine for SurrealDB
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageEngine {
    /// Embedded in-memory store, lost on exit
    #[default]
    Memory,
    /// SurrealKV storage (for local file-based databases)
    SurrealKv,
    /// Remote SurrealDB server over WebSocket
    Remote,
}

/// Store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Storage engine to use
    pub engine: StorageEngine,

    /// Path to the database file (SurrealKV only)
    pub path: Option<String>,

    /// Server URL, e.g. `ws://localhost:8000` (remote only)
    pub url: Option<String>,

    /// Namespace to use
    pub namespace: String,

    /// Database to use
    pub database: String,

    /// Username for root authentication (remote only)
    pub username: Option<String>,

    /// Password for root authentication (remote only)
    pub password: Option<String>,

    /// Buffered change events per subscription
    pub subscription_buffer: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            engine: StorageEngine::default(),
            path: None,
            url: None,
            namespace: "studyroom".to_string(),
            database: "rooms".to_string(),
            username: None,
            password: None,
            subscription_buffer: 64,
        }
    }
}

impl StoreConfig {
    /// Embedded in-memory configuration
    pub fn memory() -> Self {
        Self::default()
    }

    /// SurrealKV file-backed configuration
    pub fn surrealkv(path: impl Into<String>) -> Self {
        Self { engine: StorageEngine::SurrealKv, path: Some(path.into()), ..Self::default() }
    }

    /// Remote server configuration
    pub fn remote(url: impl Into<String>) -> Self {
        Self { engine: StorageEngine::Remote, url: Some(url.into()), ..Self::default() }
    }

    /// Connection endpoint understood by `surrealdb::engine::any::connect`
    pub fn endpoint(&self) -> Result<String, StoreError> {
        match self.engine {
            StorageEngine::Memory => Ok("memory".to_string()),
            StorageEngine::SurrealKv => {
                let path = self.path.as_deref().ok_or_else(|| StoreError::Configuration {
                    field: "store.path".to_string(),
                    message: "required for the surrealkv engine".to_string(),
                })?;
                Ok(format!("surrealkv://{path}"))
            },
            StorageEngine::Remote => {
                let url = self.url.as_deref().ok_or_else(|| StoreError::Configuration {
                    field: "store.url".to_string(),
                    message: "required for the remote engine".to_string(),
                })?;
                Ok(url.to_string())
            },
        }
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        self.endpoint()?;

        if self.namespace.trim().is_empty() {
            return Err(StoreError::Configuration {
                field: "store.namespace".to_string(),
                message: "cannot be empty".to_string(),
            });
        }
        if self.database.trim().is_empty() {
            return Err(StoreError::Configuration {
                field: "store.database".to_string(),
                message: "cannot be empty".to_string(),
            });
        }
        if self.subscription_buffer == 0 {
            return Err(StoreError::Configuration {
                field: "store.subscription_buffer".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.username.is_some() != self.password.is_some() {
            return Err(StoreError::Configuration {
                field: "store.username".to_string(),
                message: "username and password must be set together".to_string(),
            });
        }

        Ok(())
    }
}
