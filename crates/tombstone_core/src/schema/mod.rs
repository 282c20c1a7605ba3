//! Entity metadata, capability registry, and declarative manifests.
//!
//! # Responsibility
//! - Describe entity types (tables, columns, associations) as data.
//! - Track soft-delete capability per entity type.
//!
//! # Invariants
//! - All schema identifiers are validated before they can reach SQL.
//! - Soft-delete enablement is idempotent; re-enabling never disturbs an
//!   existing registration.

pub mod entity;
pub mod manifest;
pub mod registry;

pub use entity::{
    AssociationDef, AssociationKind, ColumnDef, ColumnType, EntityDef, SchemaError,
    DEFAULT_DELETED_ATTRIBUTE,
};
pub use manifest::{EntityManifest, SchemaManifest, SoftDeleteManifest};
pub use registry::{SchemaRegistry, SchemaResult, SoftDeleteOptions};
