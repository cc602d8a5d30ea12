//! askdb sandbox crate - read-only access to the analytical database.
//!
//! Provides the execution sandbox that runs gate-approved SQL under a row
//! cap and a wall-clock limit, the schema introspection used to prompt the
//! SQL generator, and a seeded demo database.

pub mod error;
pub mod executor;
pub mod sample;
pub mod schema;

pub use error::ExecutionError;
pub use executor::{QueryExecutor, SqlSandbox};
pub use sample::{seed_sample_database, SampleSummary};
pub use schema::{ColumnInfo, SchemaInspector, SchemaProvider, TableInfo};
