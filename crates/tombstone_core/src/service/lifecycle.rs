//! Instance lifecycle: soft destroy, hard destroy, recovery.
//!
//! # Responsibility
//! - Drive the Active → SoftDeleted → Active and → Purged transitions.
//! - Run destroy hooks and keep hard destroys transactional.
//!
//! # Invariants
//! - Soft destroy never runs hooks; it is a direct timestamp update.
//! - Hard destroy wraps removal and both hooks in one transaction; an
//!   abort or failure leaves the store untouched.
//! - A soft-destroyed in-memory record is frozen; recovery is the only
//!   transition that lifts the barrier without a reload.

use crate::db::now_epoch_ms;
use crate::model::record::Record;
use crate::repo::record_repo::{RecordRepository, RepoResult};
use crate::scope::ScopeError;
use log::info;
use rusqlite::types::Value;
use rusqlite::{params, Transaction, TransactionBehavior};

/// Destroy lifecycle hooks.
///
/// `before_destroy` returning false aborts the operation; `after_destroy`
/// returning false unwinds it. Both default to proceeding.
pub trait DestroyHooks {
    fn before_destroy(&self, record: &Record) -> bool {
        let _ = record;
        true
    }

    fn after_destroy(&self, record: &Record) -> bool {
        let _ = record;
        true
    }
}

/// Hook implementation that always proceeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl DestroyHooks for NoHooks {}

/// Per-instance lifecycle operations over one entity's repository.
pub struct LifecycleController<'a, H = NoHooks> {
    repo: &'a RecordRepository<'a>,
    hooks: H,
}

impl<'a> LifecycleController<'a, NoHooks> {
    pub fn new(repo: &'a RecordRepository<'a>) -> Self {
        Self {
            repo,
            hooks: NoHooks,
        }
    }
}

impl<'a, H: DestroyHooks> LifecycleController<'a, H> {
    pub fn with_hooks(repo: &'a RecordRepository<'a>, hooks: H) -> Self {
        Self { repo, hooks }
    }

    /// Destroys one record.
    ///
    /// Paranoid entity: stamps the deletion attribute with a direct
    /// update (no hooks) and freezes the in-memory record. Non-paranoid
    /// entity: delegates to `destroy_hard`.
    pub fn destroy(&self, record: &mut Record) -> RepoResult<bool> {
        let entity = self.repo.entity();
        let Some(attribute) = entity.deleted_attribute.as_deref() else {
            return self.destroy_hard(record);
        };
        if entity.column(attribute).is_none() {
            return Err(ScopeError::MissingDeletionColumn {
                entity: entity.name.clone(),
                attribute: attribute.to_string(),
            }
            .into());
        }

        let deleted_ms = now_epoch_ms();
        let id = record.id(entity).clone();
        if !matches!(id, Value::Null) {
            self.repo.connection().execute(
                &format!(
                    "UPDATE \"{}\" SET \"{attribute}\" = ?1 WHERE \"{}\" = ?2;",
                    entity.table, entity.primary_key
                ),
                params![Value::Integer(deleted_ms), id],
            )?;
        }
        record.set(attribute, Value::Integer(deleted_ms))?;
        record.freeze();
        Ok(true)
    }

    /// Physically removes one record, hooks and removal in one
    /// transaction.
    ///
    /// Returns Ok(false) when a hook declined: the before hook aborts
    /// with nothing mutated; a false after hook unwinds the removal.
    pub fn destroy_hard(&self, record: &mut Record) -> RepoResult<bool> {
        let entity = self.repo.entity();
        let tx = Transaction::new_unchecked(
            self.repo.connection(),
            TransactionBehavior::Immediate,
        )?;

        if !self.hooks.before_destroy(record) {
            info!(
                "event=hard_destroy module=service status=aborted entity={}",
                entity.name
            );
            return Ok(false);
        }

        let id = record.id(entity).clone();
        if !matches!(id, Value::Null) {
            tx.execute(
                &format!(
                    "DELETE FROM \"{}\" WHERE \"{}\" = ?1;",
                    entity.table, entity.primary_key
                ),
                params![id],
            )?;
        }

        if !self.hooks.after_destroy(record) {
            drop(tx);
            info!(
                "event=hard_destroy module=service status=unwound entity={}",
                entity.name
            );
            return Ok(false);
        }

        tx.commit()?;
        record.freeze();
        Ok(true)
    }

    /// Clears the deletion attribute and persists the full record.
    ///
    /// Store-level failures (missing row, constraint violations)
    /// propagate unchanged.
    pub fn recover(&self, record: &mut Record) -> RepoResult<()> {
        let entity = self.repo.entity();
        let attribute = entity
            .deleted_attribute
            .as_deref()
            .ok_or_else(|| ScopeError::SoftDeleteDisabled(entity.name.clone()))?;
        record.thaw();
        record.clear_deletion(attribute);
        self.repo.update(record)
    }

    /// Returns whether the record's deletion attribute is non-null.
    pub fn is_deleted(&self, record: &Record) -> bool {
        record.is_deleted(self.repo.entity())
    }
}
