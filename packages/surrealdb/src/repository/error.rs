use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] surrealdb::Error),

    #[error("Fetch failed: {message}")]
    Fetch { message: String },

    #[error("Uniqueness violation on {table}: {message}")]
    UniqueViolation { table: String, message: String },

    #[error("Constraint violation on {table}: {message}")]
    Constraint { table: String, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    #[error("Invalid field name: {field}")]
    InvalidField { field: String },

    #[error("Configuration error for {field}: {message}")]
    Configuration { field: String, message: String },
}

impl StoreError {
    pub fn fetch(message: impl Into<String>) -> Self {
        Self::Fetch { message: message.into() }
    }

    /// The store rejected a row because it duplicates a unique key
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation { .. })
    }

    /// The store rejected the row itself, as opposed to failing to respond
    pub fn is_constraint(&self) -> bool {
        matches!(self, Self::UniqueViolation { .. } | Self::Constraint { .. })
    }
}
