//! Soft-delete overlay for a SQLite record store.
//! Entity types marked paranoid keep their rows on delete; reads and
//! aggregates exclude tombstoned rows unless a caller opts in.

pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod schema;
pub mod scope;
pub mod service;

pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use logging::{init_logging, logging_status};
pub use model::record::{Record, RecordError, RecordResult};
pub use repo::record_repo::{
    Aggregate, FindKind, FindOptions, RecordRepository, RepoError, RepoResult,
};
pub use schema::{
    AssociationKind, ColumnDef, ColumnType, EntityDef, SchemaError, SchemaManifest,
    SchemaRegistry, SoftDeleteOptions, DEFAULT_DELETED_ATTRIBUTE,
};
pub use scope::{IncludeSpec, QueryScope, ScopeError, SqlCondition};
pub use service::lifecycle::{DestroyHooks, LifecycleController, NoHooks};

/// Attribute value type shared with the underlying store.
pub use rusqlite::types::Value;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
