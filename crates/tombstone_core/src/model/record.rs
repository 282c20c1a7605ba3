//! Metadata-driven record instances.
//!
//! # Responsibility
//! - Hold one row's attribute values for an entity type known only at
//!   runtime.
//! - Enforce the frozen-after-soft-delete write barrier.
//!
//! # Invariants
//! - Deletion attribute null ⇔ record is active.
//! - A frozen record rejects every attribute write until reloaded from
//!   the store.

use crate::schema::entity::EntityDef;
use rusqlite::types::Value;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type RecordResult<T> = Result<T, RecordError>;

/// Write errors on in-memory records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// The record was soft-deleted in memory and is immutable until
    /// reloaded.
    Frozen { entity: String },
}

impl Display for RecordError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Frozen { entity } => {
                write!(f, "record of entity `{entity}` is frozen after deletion")
            }
        }
    }
}

impl Error for RecordError {}

/// One in-memory row of a registered entity type.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    entity: String,
    values: BTreeMap<String, Value>,
    frozen: bool,
}

impl Record {
    /// Creates an empty record with every declared column set to null.
    pub fn new(entity: &EntityDef) -> Self {
        let values = entity
            .columns
            .iter()
            .map(|column| (column.name.clone(), Value::Null))
            .collect();
        Self {
            entity: entity.name.clone(),
            values,
            frozen: false,
        }
    }

    /// Creates an empty record with a generated uuid primary key.
    ///
    /// Intended for text primary keys; the generated id is the canonical
    /// hyphenated uuid v4 form.
    pub fn with_generated_id(entity: &EntityDef) -> Self {
        let mut record = Self::new(entity);
        record.values.insert(
            entity.primary_key.clone(),
            Value::Text(Uuid::new_v4().to_string()),
        );
        record
    }

    /// Rebuilds a record from already-loaded attribute values.
    pub fn from_values(entity: &EntityDef, values: BTreeMap<String, Value>) -> Self {
        Self {
            entity: entity.name.clone(),
            values,
            frozen: false,
        }
    }

    /// Entity type name this record belongs to.
    pub fn entity_name(&self) -> &str {
        &self.entity
    }

    /// Returns one attribute value; absent attributes read as null.
    pub fn get(&self, attribute: &str) -> &Value {
        self.values.get(attribute).unwrap_or(&Value::Null)
    }

    /// All attribute values in column-name order.
    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    /// Writes one attribute value.
    pub fn set(&mut self, attribute: impl Into<String>, value: Value) -> RecordResult<()> {
        if self.frozen {
            return Err(RecordError::Frozen {
                entity: self.entity.clone(),
            });
        }
        self.values.insert(attribute.into(), value);
        Ok(())
    }

    /// Primary-key value under the entity's declared key column.
    pub fn id(&self, entity: &EntityDef) -> &Value {
        self.get(&entity.primary_key)
    }

    /// Returns whether the deletion attribute is currently non-null.
    ///
    /// Non-paranoid entities never read as deleted.
    pub fn is_deleted(&self, entity: &EntityDef) -> bool {
        entity
            .deleted_attribute
            .as_deref()
            .is_some_and(|attribute| !matches!(self.get(attribute), Value::Null))
    }

    /// Marks the record immutable.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Lifts the write barrier. Reserved for the recovery transition; all
    /// other paths obtain fresh records by reloading.
    pub(crate) fn thaw(&mut self) {
        self.frozen = false;
    }

    /// Clears the deletion attribute without the frozen check.
    ///
    /// Only the recovery transition may call this.
    pub(crate) fn clear_deletion(&mut self, attribute: &str) {
        self.values.insert(attribute.to_string(), Value::Null);
    }
}
