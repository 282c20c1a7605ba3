//! Query-scope composition engine.
//!
//! # Responsibility
//! - Build table-qualified deletion predicates.
//! - Thread an explicit per-call scope value through read/aggregate calls.
//! - Fold eager-load association specs into one combined scoped call.
//!
//! # Invariants
//! - Scope state is a local value passed as a parameter; no process-wide
//!   filter stack exists.
//! - Every frame pushed by `QueryScope::enter` is popped on every exit
//!   path of the wrapped call.
//! - One reference timestamp per logical call; all frames composed within
//!   it agree on "now".

pub mod include;
pub mod predicate;
pub mod query_scope;

pub use include::{collect_include_joins, compose_include_scope, IncludeSpec, JoinClause, ScopedQuery};
pub use predicate::{deletion_predicate, SqlCondition};
pub use query_scope::{QueryScope, ScopeFrame};

use crate::schema::entity::SchemaError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ScopeResult<T> = Result<T, ScopeError>;

/// Errors raised while composing a scope, before any store call runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeError {
    /// Association or entity lookup failed.
    Schema(SchemaError),
    /// Soft delete was enabled with an attribute name that is not a
    /// column of the entity. Surfaces on first use, not at registration.
    MissingDeletionColumn { entity: String, attribute: String },
    /// A deletion predicate was requested for an entity that is not
    /// paranoid.
    SoftDeleteDisabled(String),
}

impl Display for ScopeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Schema(err) => write!(f, "{err}"),
            Self::MissingDeletionColumn { entity, attribute } => write!(
                f,
                "deletion attribute `{attribute}` of entity `{entity}` is not a declared column"
            ),
            Self::SoftDeleteDisabled(entity) => {
                write!(f, "soft delete is not enabled for entity `{entity}`")
            }
        }
    }
}

impl Error for ScopeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Schema(err) => Some(err),
            _ => None,
        }
    }
}

impl From<SchemaError> for ScopeError {
    fn from(value: SchemaError) -> Self {
        Self::Schema(value)
    }
}
