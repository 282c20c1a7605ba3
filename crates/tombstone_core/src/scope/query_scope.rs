//! Per-call scope value.
//!
//! # Responsibility
//! - Carry the stack of active filter frames for exactly one logical
//!   read/aggregate call.
//!
//! # Invariants
//! - `enter` pops its frame on every exit path; a frame can never leak
//!   past the dynamic extent of the wrapped call.
//! - A scope is a plain local value; concurrent calls each own their own
//!   and cannot observe each other's frames.

use crate::schema::entity::EntityDef;
use crate::scope::predicate::{deletion_predicate, SqlCondition};
use crate::scope::ScopeResult;

/// One stack entry of an active scope.
#[derive(Debug, Clone, PartialEq)]
pub enum ScopeFrame {
    /// A filter merged (AND) into the wrapped call.
    Condition(SqlCondition),
    /// No condition; keeps an eager-loaded association grouped with the
    /// caller's scope.
    PassThrough,
}

impl ScopeFrame {
    /// Deletion-predicate frame for one paranoid entity.
    pub fn exclude_deleted(entity: &EntityDef, reference_ms: i64) -> ScopeResult<Self> {
        Ok(Self::Condition(deletion_predicate(entity, reference_ms)?))
    }

    /// Frame that filters nothing.
    pub fn pass_through() -> Self {
        Self::PassThrough
    }
}

/// The filter context threaded through one logical call.
#[derive(Debug, Default)]
pub struct QueryScope {
    frames: Vec<ScopeFrame>,
}

impl QueryScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `call` with `frame` active, removing it on return.
    ///
    /// The frame is popped whether `call` succeeds or fails; scoped
    /// filters never outlive the call they were composed for.
    pub fn enter<T>(&mut self, frame: ScopeFrame, call: impl FnOnce(&mut Self) -> T) -> T {
        self.frames.push(frame);
        let outcome = call(self);
        self.frames.pop();
        outcome
    }

    /// Conditions of all active frames, outermost first.
    pub fn conditions(&self) -> impl Iterator<Item = &SqlCondition> {
        self.frames.iter().filter_map(|frame| match frame {
            ScopeFrame::Condition(condition) => Some(condition),
            ScopeFrame::PassThrough => None,
        })
    }

    /// Number of active frames, pass-through included.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}
