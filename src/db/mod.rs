//! Database plumbing
//!
//! - [`mongo`] - MongoDB client and typed collections (achievement content)
//! - [`schemas`] - MongoDB document schemas
//! - [`sqlite`] - Diesel/SQLite pool, schema, and rows (lifecycle references)

pub mod mongo;
pub mod schemas;
pub mod sqlite;

pub use mongo::{MongoClient, MongoCollection};
pub use sqlite::{open_in_memory_pool, open_pool, DbPool};
