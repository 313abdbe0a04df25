pub mod error;
pub mod schema;
pub mod surreal_store;

pub use error::StoreError;
pub use schema::define_schema;
pub use surreal_store::SurrealStore;
