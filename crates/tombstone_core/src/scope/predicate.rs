//! Deletion-predicate construction.
//!
//! # Responsibility
//! - Produce the table-qualified filter excluding soft-deleted rows.
//!
//! # Invariants
//! - The predicate shape is exactly `col IS NULL OR col > ?`: rows whose
//!   deletion timestamp lies after the call's reference instant stay
//!   visible to that call.

use crate::schema::entity::EntityDef;
use crate::scope::{ScopeError, ScopeResult};
use rusqlite::types::Value;

/// One SQL filter fragment with its bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlCondition {
    pub sql: String,
    pub params: Vec<Value>,
}

impl SqlCondition {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

/// Builds the deletion predicate for one paranoid entity.
///
/// The condition is qualified by table name so it stays correct when the
/// entity is joined with others. `reference_ms` must be the single
/// timestamp captured at the start of the enclosing call.
///
/// # Errors
/// - `SoftDeleteDisabled` when the entity is not paranoid.
/// - `MissingDeletionColumn` when the configured attribute is not a
///   declared column (the lazily-surfaced configuration error).
pub fn deletion_predicate(entity: &EntityDef, reference_ms: i64) -> ScopeResult<SqlCondition> {
    let attribute = entity
        .deleted_attribute
        .as_deref()
        .ok_or_else(|| ScopeError::SoftDeleteDisabled(entity.name.clone()))?;
    if entity.column(attribute).is_none() {
        return Err(ScopeError::MissingDeletionColumn {
            entity: entity.name.clone(),
            attribute: attribute.to_string(),
        });
    }
    let qualified = format!("\"{}\".\"{attribute}\"", entity.table);
    Ok(SqlCondition::new(
        format!("({qualified} IS NULL OR {qualified} > ?)"),
        vec![Value::Integer(reference_ms)],
    ))
}
