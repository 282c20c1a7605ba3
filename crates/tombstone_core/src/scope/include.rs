//! Eager-load association specs and scope composition.
//!
//! # Responsibility
//! - Model the three spec shapes (single name, sequence, keyed tree).
//! - Fold a spec into one combined scoped call that stacks a frame per
//!   named association.
//! - Emit the join chain the SELECT needs so table-qualified predicates
//!   are valid SQL.
//!
//! # Invariants
//! - Association resolution happens during composition, before the store
//!   call runs.
//! - Recursion is bounded by the literal depth of the spec; association
//!   metadata is never traversed beyond what the spec names, so cyclic
//!   schemas cannot cause non-termination here.
//! - Fold order over sequences is immaterial: frames conjoin.

use crate::schema::entity::{AssociationDef, AssociationKind, EntityDef};
use crate::schema::registry::SchemaRegistry;
use crate::scope::query_scope::{QueryScope, ScopeFrame};
use crate::scope::ScopeResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Eager-load specification tree.
///
/// Deserializes from the three natural JSON shapes: `"name"`, `[...]`,
/// and `{"name": <spec>}` (an empty array terminates a branch).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IncludeSpec {
    Name(String),
    Seq(Vec<IncludeSpec>),
    Nested(BTreeMap<String, IncludeSpec>),
}

impl IncludeSpec {
    pub fn name(value: impl Into<String>) -> Self {
        Self::Name(value.into())
    }

    pub fn seq(items: impl IntoIterator<Item = IncludeSpec>) -> Self {
        Self::Seq(items.into_iter().collect())
    }

    pub fn nested(entries: impl IntoIterator<Item = (String, IncludeSpec)>) -> Self {
        Self::Nested(entries.into_iter().collect())
    }
}

/// A store call waiting for its scope: a function from the per-call
/// scope value to the call's result.
pub type ScopedQuery<'a, T, E> = Box<dyn FnOnce(&mut QueryScope) -> Result<T, E> + 'a>;

/// Folds `spec` around `inner`, producing one scoped call.
///
/// Each named association contributes one frame: a deletion predicate
/// when its target is paranoid, a pass-through otherwise. Sequences fold
/// left-to-right, each step wrapping the previous result; keyed entries
/// compose the nested spec (target as new root) first, then the key
/// itself as a leaf around it. `reference_ms` must be the enclosing
/// call's single captured timestamp.
pub fn compose_include_scope<'a, T: 'a, E: 'a>(
    registry: &SchemaRegistry,
    root: &EntityDef,
    spec: &IncludeSpec,
    reference_ms: i64,
    inner: ScopedQuery<'a, T, E>,
) -> ScopeResult<ScopedQuery<'a, T, E>> {
    match spec {
        IncludeSpec::Name(name) => compose_leaf(registry, root, name, reference_ms, inner),
        IncludeSpec::Seq(items) => {
            let folded = items.iter().try_fold(inner, |wrapped, item| {
                compose_include_scope(registry, root, item, reference_ms, wrapped)
            })?;
            Ok(group(folded))
        }
        IncludeSpec::Nested(entries) => {
            let folded = entries.iter().try_fold(inner, |wrapped, (key, value)| {
                let (_, target) = registry.association_target(root, key)?;
                let nested =
                    compose_include_scope(registry, target, value, reference_ms, wrapped)?;
                compose_leaf(registry, root, key, reference_ms, nested)
            })?;
            Ok(group(folded))
        }
    }
}

fn compose_leaf<'a, T: 'a, E: 'a>(
    registry: &SchemaRegistry,
    root: &EntityDef,
    association: &str,
    reference_ms: i64,
    inner: ScopedQuery<'a, T, E>,
) -> ScopeResult<ScopedQuery<'a, T, E>> {
    let (_, target) = registry.association_target(root, association)?;
    let frame = if target.is_paranoid() {
        ScopeFrame::exclude_deleted(target, reference_ms)?
    } else {
        ScopeFrame::pass_through()
    };
    Ok(Box::new(move |scope| scope.enter(frame, inner)))
}

fn group<'a, T: 'a, E: 'a>(inner: ScopedQuery<'a, T, E>) -> ScopedQuery<'a, T, E> {
    Box::new(move |scope| scope.enter(ScopeFrame::pass_through(), inner))
}

/// One LEFT JOIN needed by an eager-load spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinClause {
    pub table: String,
    pub sql: String,
}

/// Walks `spec` and returns the deduplicated join chain, root outward.
///
/// This is the structural counterpart of `compose_include_scope`: the
/// predicates it stacks reference joined tables, and this walk makes
/// those tables part of the statement.
pub fn collect_include_joins(
    registry: &SchemaRegistry,
    root: &EntityDef,
    spec: &IncludeSpec,
) -> ScopeResult<Vec<JoinClause>> {
    let mut joins = Vec::new();
    walk_joins(registry, root, spec, &mut joins)?;
    Ok(joins)
}

fn walk_joins(
    registry: &SchemaRegistry,
    root: &EntityDef,
    spec: &IncludeSpec,
    joins: &mut Vec<JoinClause>,
) -> ScopeResult<()> {
    match spec {
        IncludeSpec::Name(name) => {
            push_join(registry, root, name, joins)?;
        }
        IncludeSpec::Seq(items) => {
            for item in items {
                walk_joins(registry, root, item, joins)?;
            }
        }
        IncludeSpec::Nested(entries) => {
            for (key, value) in entries {
                let (_, target) = push_join(registry, root, key, joins)?;
                walk_joins(registry, target, value, joins)?;
            }
        }
    }
    Ok(())
}

fn push_join<'a>(
    registry: &'a SchemaRegistry,
    root: &'a EntityDef,
    association: &str,
    joins: &mut Vec<JoinClause>,
) -> ScopeResult<(&'a AssociationDef, &'a EntityDef)> {
    let (declared, target) = registry.association_target(root, association)?;
    if !joins.iter().any(|join| join.table == target.table) {
        let sql = match declared.kind {
            AssociationKind::BelongsTo => format!(
                "LEFT JOIN \"{target_table}\" ON \"{target_table}\".\"{target_pk}\" = \"{root_table}\".\"{fk}\"",
                target_table = target.table,
                target_pk = target.primary_key,
                root_table = root.table,
                fk = declared.foreign_key,
            ),
            AssociationKind::HasMany => format!(
                "LEFT JOIN \"{target_table}\" ON \"{target_table}\".\"{fk}\" = \"{root_table}\".\"{root_pk}\"",
                target_table = target.table,
                fk = declared.foreign_key,
                root_table = root.table,
                root_pk = root.primary_key,
            ),
        };
        joins.push(JoinClause {
            table: target.table.clone(),
            sql,
        });
    }
    Ok((declared, target))
}
