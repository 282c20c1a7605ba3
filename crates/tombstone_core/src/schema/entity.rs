//! Entity-type metadata.
//!
//! # Responsibility
//! - Describe one stored entity type: table, columns, associations, and
//!   the optional soft-delete attribute.
//! - Validate declaration-level invariants before registration.
//!
//! # Invariants
//! - Every identifier (entity, table, column, association, foreign key)
//!   matches `^[A-Za-z_][A-Za-z0-9_]*$`; the SQL layer interpolates these
//!   names and must never receive anything else.
//! - The primary key is one of the declared columns.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Default soft-delete timestamp attribute name.
pub const DEFAULT_DELETED_ATTRIBUTE: &str = "deleted_at";

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

/// Returns whether `value` is usable as a SQL identifier in this crate.
pub fn is_valid_identifier(value: &str) -> bool {
    IDENTIFIER_RE.is_match(value)
}

/// Storage type of one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    /// 64-bit integer.
    Integer,
    /// 64-bit float.
    Real,
    /// UTF-8 text (also used for uuid primary keys).
    Text,
    /// Unix epoch milliseconds stored as integer.
    Timestamp,
}

impl ColumnType {
    /// SQLite column type keyword for DDL generation.
    pub fn sql_type(self) -> &'static str {
        match self {
            Self::Integer | Self::Timestamp => "INTEGER",
            Self::Real => "REAL",
            Self::Text => "TEXT",
        }
    }
}

/// One declared column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ColumnType,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Join direction of one association.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationKind {
    /// The foreign key lives on this entity and points at the target's
    /// primary key.
    BelongsTo,
    /// The foreign key lives on the target and points back at this
    /// entity's primary key.
    HasMany,
}

/// One named association to another entity type.
///
/// Targets are referenced by entity name and resolved by direct registry
/// lookup when a scope is composed; nothing is evaluated at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationDef {
    pub name: String,
    pub target: String,
    pub kind: AssociationKind,
    pub foreign_key: String,
}

/// Schema description of one entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDef {
    /// Entity name used for registry lookup and association targets.
    pub name: String,
    /// Backing table name, used to qualify every generated condition.
    pub table: String,
    /// Primary-key column name.
    pub primary_key: String,
    pub columns: Vec<ColumnDef>,
    #[serde(default)]
    pub associations: Vec<AssociationDef>,
    /// Soft-delete timestamp column; `None` means the entity is not
    /// paranoid and deletes are physical.
    #[serde(default)]
    pub deleted_attribute: Option<String>,
}

impl EntityDef {
    /// Creates a minimal definition with no associations and soft delete
    /// disabled.
    pub fn new(
        name: impl Into<String>,
        table: impl Into<String>,
        primary_key: impl Into<String>,
        columns: Vec<ColumnDef>,
    ) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            primary_key: primary_key.into(),
            columns,
            associations: Vec::new(),
            deleted_attribute: None,
        }
    }

    /// Adds one association (builder style).
    pub fn with_association(
        mut self,
        name: impl Into<String>,
        target: impl Into<String>,
        kind: AssociationKind,
        foreign_key: impl Into<String>,
    ) -> Self {
        self.associations.push(AssociationDef {
            name: name.into(),
            target: target.into(),
            kind,
            foreign_key: foreign_key.into(),
        });
        self
    }

    /// Returns the column definition for `name`, if declared.
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|column| column.name == name)
    }

    /// Returns the association definition for `name`, if declared.
    pub fn association(&self, name: &str) -> Option<&AssociationDef> {
        self.associations
            .iter()
            .find(|association| association.name == name)
    }

    /// Returns whether soft delete is enabled for this entity type.
    pub fn is_paranoid(&self) -> bool {
        self.deleted_attribute.is_some()
    }

    /// Validates declaration-level invariants.
    ///
    /// The deletion attribute is intentionally NOT checked against the
    /// column list here; an unresolvable name surfaces on first predicate
    /// construction instead.
    pub fn validate(&self) -> Result<(), SchemaError> {
        for identifier in [&self.name, &self.table, &self.primary_key] {
            require_identifier(identifier)?;
        }

        let mut seen_columns = Vec::with_capacity(self.columns.len());
        for column in &self.columns {
            require_identifier(&column.name)?;
            if seen_columns.contains(&column.name.as_str()) {
                return Err(SchemaError::DuplicateColumn {
                    entity: self.name.clone(),
                    column: column.name.clone(),
                });
            }
            seen_columns.push(column.name.as_str());
        }

        if self.column(&self.primary_key).is_none() {
            return Err(SchemaError::PrimaryKeyNotDeclared {
                entity: self.name.clone(),
                column: self.primary_key.clone(),
            });
        }

        let mut seen_associations = Vec::with_capacity(self.associations.len());
        for association in &self.associations {
            require_identifier(&association.name)?;
            require_identifier(&association.target)?;
            require_identifier(&association.foreign_key)?;
            if seen_associations.contains(&association.name.as_str()) {
                return Err(SchemaError::DuplicateAssociation {
                    entity: self.name.clone(),
                    association: association.name.clone(),
                });
            }
            seen_associations.push(association.name.as_str());
        }

        if let Some(attribute) = &self.deleted_attribute {
            require_identifier(attribute)?;
        }

        Ok(())
    }
}

fn require_identifier(value: &str) -> Result<(), SchemaError> {
    if is_valid_identifier(value) {
        Ok(())
    } else {
        Err(SchemaError::InvalidIdentifier(value.to_string()))
    }
}

/// Declaration and lookup errors for schema metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// Identifier is empty or contains characters unsafe for SQL
    /// interpolation.
    InvalidIdentifier(String),
    /// Column declared twice on one entity.
    DuplicateColumn { entity: String, column: String },
    /// Association declared twice on one entity.
    DuplicateAssociation { entity: String, association: String },
    /// Primary key does not appear in the column list.
    PrimaryKeyNotDeclared { entity: String, column: String },
    /// Entity registered twice.
    DuplicateEntity(String),
    /// Lookup of an unregistered entity name.
    UnknownEntity(String),
    /// Lookup of an undeclared association name.
    UnknownAssociation { entity: String, association: String },
}

impl Display for SchemaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidIdentifier(value) => {
                write!(f, "invalid schema identifier: `{value}`")
            }
            Self::DuplicateColumn { entity, column } => {
                write!(f, "duplicate column `{column}` on entity `{entity}`")
            }
            Self::DuplicateAssociation {
                entity,
                association,
            } => write!(
                f,
                "duplicate association `{association}` on entity `{entity}`"
            ),
            Self::PrimaryKeyNotDeclared { entity, column } => write!(
                f,
                "primary key `{column}` of entity `{entity}` is not a declared column"
            ),
            Self::DuplicateEntity(name) => write!(f, "entity already registered: `{name}`"),
            Self::UnknownEntity(name) => write!(f, "unknown entity: `{name}`"),
            Self::UnknownAssociation {
                entity,
                association,
            } => write!(
                f,
                "unknown association `{association}` on entity `{entity}`"
            ),
        }
    }
}

impl Error for SchemaError {}
