//! Declarative schema manifests.
//!
//! # Responsibility
//! - Define the serde document shape for declaring entities, columns,
//!   associations, and soft-delete enablement in one JSON value.
//! - Convert a parsed manifest into registry registrations.
//!
//! # Invariants
//! - A manifest never bypasses registry validation: every entity goes
//!   through `SchemaRegistry::register` and `enable_soft_delete`.
//! - Parsing stays with the caller (`serde_json` or any serde format);
//!   this module only declares the document types.

use crate::schema::entity::{AssociationDef, ColumnDef, EntityDef};
use crate::schema::registry::{SchemaRegistry, SchemaResult, SoftDeleteOptions};
use serde::{Deserialize, Serialize};

/// Top-level schema manifest document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaManifest {
    pub entities: Vec<EntityManifest>,
}

/// One declared entity inside a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityManifest {
    pub name: String,
    pub table: String,
    pub primary_key: String,
    pub columns: Vec<ColumnDef>,
    #[serde(default)]
    pub associations: Vec<AssociationDef>,
    /// Presence enables soft delete for the entity.
    #[serde(default)]
    pub soft_delete: Option<SoftDeleteManifest>,
}

/// Soft-delete enablement block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftDeleteManifest {
    /// Deletion-timestamp column; omitted means the default name.
    #[serde(default)]
    pub with: Option<String>,
}

impl SchemaManifest {
    /// Registers every declared entity, then applies soft-delete
    /// enablement.
    ///
    /// Entities register before any capability is enabled so manifest
    /// order cannot matter for association targets.
    pub fn register_into(self, registry: &mut SchemaRegistry) -> SchemaResult<()> {
        let mut enable = Vec::new();
        for declared in self.entities {
            let entity = EntityDef {
                name: declared.name.clone(),
                table: declared.table,
                primary_key: declared.primary_key,
                columns: declared.columns,
                associations: declared.associations,
                deleted_attribute: None,
            };
            registry.register(entity)?;
            if let Some(soft_delete) = declared.soft_delete {
                enable.push((declared.name, soft_delete.with));
            }
        }
        for (name, with) in enable {
            registry.enable_soft_delete(&name, SoftDeleteOptions { with })?;
        }
        Ok(())
    }
}
