//! Entity registry and soft-delete capability tracking.
//!
//! # Responsibility
//! - Hold every registered entity definition, keyed by entity name.
//! - Resolve association targets by direct lookup.
//! - Track which entity types are paranoid and which column carries the
//!   deletion timestamp.
//! - Install `CREATE TABLE` DDL for registered entities.
//!
//! # Invariants
//! - Enabling soft delete twice is a silent no-op; the first registration
//!   (including its attribute name) always wins.
//! - Registration order is free: association targets are resolved when a
//!   scope is composed, not when the association is declared.

use crate::db::DbResult;
use crate::schema::entity::{
    AssociationDef, EntityDef, SchemaError, DEFAULT_DELETED_ATTRIBUTE,
};
use log::info;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::collections::BTreeMap;

pub type SchemaResult<T> = Result<T, SchemaError>;

/// Configuration surface for enabling soft delete on one entity type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SoftDeleteOptions {
    /// Deletion-timestamp column name; defaults to `deleted_at`.
    pub with: Option<String>,
}

impl SoftDeleteOptions {
    /// Uses a non-default deletion attribute name.
    pub fn with_attribute(name: impl Into<String>) -> Self {
        Self {
            with: Some(name.into()),
        }
    }
}

/// Registry of entity definitions and their soft-delete capability.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    entities: BTreeMap<String, EntityDef>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one entity definition after validating it.
    pub fn register(&mut self, entity: EntityDef) -> SchemaResult<()> {
        entity.validate()?;
        if self.entities.contains_key(&entity.name) {
            return Err(SchemaError::DuplicateEntity(entity.name));
        }
        self.entities.insert(entity.name.clone(), entity);
        Ok(())
    }

    /// Returns the definition for `name`, if registered.
    pub fn get(&self, name: &str) -> Option<&EntityDef> {
        self.entities.get(name)
    }

    /// Returns the definition for `name` or an unknown-entity error.
    pub fn require(&self, name: &str) -> SchemaResult<&EntityDef> {
        self.get(name)
            .ok_or_else(|| SchemaError::UnknownEntity(name.to_string()))
    }

    /// Resolves one association of `entity` to its definition and target
    /// entity type.
    pub fn association_target<'a>(
        &'a self,
        entity: &'a EntityDef,
        association: &str,
    ) -> SchemaResult<(&'a AssociationDef, &'a EntityDef)> {
        let declared =
            entity
                .association(association)
                .ok_or_else(|| SchemaError::UnknownAssociation {
                    entity: entity.name.clone(),
                    association: association.to_string(),
                })?;
        let target = self.require(&declared.target)?;
        Ok((declared, target))
    }

    /// Marks `name` paranoid with the configured deletion attribute.
    ///
    /// Returns immediately when the entity is already paranoid: the
    /// original registration is never re-wrapped or renamed, whatever
    /// options the second call carries.
    pub fn enable_soft_delete(
        &mut self,
        name: &str,
        options: SoftDeleteOptions,
    ) -> SchemaResult<()> {
        let entity = self
            .entities
            .get_mut(name)
            .ok_or_else(|| SchemaError::UnknownEntity(name.to_string()))?;
        if entity.deleted_attribute.is_some() {
            return Ok(());
        }
        let attribute = options
            .with
            .unwrap_or_else(|| DEFAULT_DELETED_ATTRIBUTE.to_string());
        entity.deleted_attribute = Some(attribute);
        Ok(())
    }

    /// Returns whether `name` is registered and paranoid.
    pub fn is_paranoid(&self, name: &str) -> bool {
        self.get(name).is_some_and(EntityDef::is_paranoid)
    }

    /// Iterates registered definitions in name order.
    pub fn entities(&self) -> impl Iterator<Item = &EntityDef> {
        self.entities.values()
    }

    /// Creates backing tables for every registered entity in one
    /// transaction.
    ///
    /// Uses `CREATE TABLE IF NOT EXISTS`, so installing over an existing
    /// schema is safe.
    pub fn install_schema(&self, conn: &Connection) -> DbResult<()> {
        let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
        for entity in self.entities() {
            tx.execute_batch(&create_table_sql(entity))?;
        }
        tx.commit()?;
        info!(
            "event=schema_install module=schema status=ok entities={}",
            self.entities.len()
        );
        Ok(())
    }
}

fn create_table_sql(entity: &EntityDef) -> String {
    let columns = entity
        .columns
        .iter()
        .map(|column| {
            let constraint = if column.name == entity.primary_key {
                " PRIMARY KEY"
            } else {
                ""
            };
            format!("\"{}\" {}{constraint}", column.name, column.ty.sql_type())
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!("CREATE TABLE IF NOT EXISTS \"{}\" ({columns});", entity.table)
}
