//! Storage plumbing for Warrant
//!
//! Owns the SeaORM connection wrapper, the per-scope table descriptors and
//! the SQL schema for roles, permissions and their join tables. Query logic
//! lives with the authorization engine in `warrant-rbac`.

pub mod connection;
pub mod error;
pub mod schema;

pub use connection::DatabaseConnection;
pub use error::{StorageError, StorageResult};
pub use schema::{columns, create_schema, TableNames};

pub use sea_orm;
