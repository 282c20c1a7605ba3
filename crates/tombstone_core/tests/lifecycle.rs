use rusqlite::types::Value;
use rusqlite::Connection;
use std::cell::RefCell;
use std::rc::Rc;
use tombstone_core::{
    open_db_in_memory, ColumnDef, ColumnType, DestroyHooks, EntityDef, FindKind, FindOptions,
    LifecycleController, Record, RecordError, RecordRepository, RepoError, SchemaRegistry,
    ScopeError, SoftDeleteOptions,
};

type HookLog = Rc<RefCell<Vec<&'static str>>>;

struct RecordingHooks {
    proceed_before: bool,
    proceed_after: bool,
    calls: HookLog,
}

impl RecordingHooks {
    fn new(proceed_before: bool, proceed_after: bool) -> (Self, HookLog) {
        let calls: HookLog = Rc::new(RefCell::new(Vec::new()));
        (
            Self {
                proceed_before,
                proceed_after,
                calls: Rc::clone(&calls),
            },
            calls,
        )
    }
}

impl DestroyHooks for RecordingHooks {
    fn before_destroy(&self, _record: &Record) -> bool {
        self.calls.borrow_mut().push("before");
        self.proceed_before
    }

    fn after_destroy(&self, _record: &Record) -> bool {
        self.calls.borrow_mut().push("after");
        self.proceed_after
    }
}

fn paranoid_registry() -> SchemaRegistry {
    let mut registry = SchemaRegistry::new();
    registry
        .register(EntityDef::new(
            "widget",
            "widgets",
            "id",
            vec![
                ColumnDef::new("id", ColumnType::Integer),
                ColumnDef::new("title", ColumnType::Text),
                ColumnDef::new("deleted_at", ColumnType::Timestamp),
            ],
        ))
        .unwrap();
    registry
        .enable_soft_delete("widget", SoftDeleteOptions::default())
        .unwrap();
    registry
}

fn plain_registry() -> SchemaRegistry {
    let mut registry = SchemaRegistry::new();
    registry
        .register(EntityDef::new(
            "gadget",
            "gadgets",
            "id",
            vec![
                ColumnDef::new("id", ColumnType::Integer),
                ColumnDef::new("label", ColumnType::Text),
            ],
        ))
        .unwrap();
    registry
}

fn open_installed(registry: &SchemaRegistry) -> Connection {
    let conn = open_db_in_memory().unwrap();
    registry.install_schema(&conn).unwrap();
    conn
}

fn text_value(value: &str) -> Value {
    Value::Text(value.to_string())
}

fn insert_one(repo: &RecordRepository<'_>, id: i64, text_column: &str, text: &str) -> Record {
    let mut record = Record::new(repo.entity());
    record.set("id", Value::Integer(id)).unwrap();
    record.set(text_column, text_value(text)).unwrap();
    repo.insert(&record).unwrap();
    record
}

fn physical_count(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table};"), [], |row| {
        row.get(0)
    })
    .unwrap()
}

#[test]
fn soft_destroy_skips_hooks_and_freezes_the_record() {
    let registry = paranoid_registry();
    let conn = open_installed(&registry);
    let repo = RecordRepository::try_new(&conn, &registry, "widget").unwrap();
    let (hooks, calls) = RecordingHooks::new(true, true);
    let lifecycle = LifecycleController::with_hooks(&repo, hooks);

    let mut record = insert_one(&repo, 1, "title", "doomed");
    assert!(lifecycle.destroy(&mut record).unwrap());

    assert!(calls.borrow().is_empty(), "soft destroy must not run hooks");
    assert!(lifecycle.is_deleted(&record));
    assert!(record.is_frozen());
    assert_eq!(physical_count(&conn, "widgets"), 1);

    let err = record.set("title", text_value("too late")).unwrap_err();
    assert!(matches!(err, RecordError::Frozen { .. }));
}

#[test]
fn hard_destroy_removes_the_row_and_runs_hooks_in_order() {
    let registry = paranoid_registry();
    let conn = open_installed(&registry);
    let repo = RecordRepository::try_new(&conn, &registry, "widget").unwrap();
    let (hooks, calls) = RecordingHooks::new(true, true);
    let lifecycle = LifecycleController::with_hooks(&repo, hooks);

    let mut record = insert_one(&repo, 1, "title", "purged");
    assert!(lifecycle.destroy_hard(&mut record).unwrap());

    assert_eq!(*calls.borrow(), vec!["before", "after"]);
    assert!(record.is_frozen());
    assert_eq!(physical_count(&conn, "widgets"), 0);
}

#[test]
fn hard_destroy_works_directly_from_soft_deleted() {
    let registry = paranoid_registry();
    let conn = open_installed(&registry);
    let repo = RecordRepository::try_new(&conn, &registry, "widget").unwrap();
    let lifecycle = LifecycleController::new(&repo);

    let mut record = insert_one(&repo, 1, "title", "twice dead");
    lifecycle.destroy(&mut record).unwrap();
    assert_eq!(physical_count(&conn, "widgets"), 1);

    assert!(lifecycle.destroy_hard(&mut record).unwrap());
    assert_eq!(physical_count(&conn, "widgets"), 0);
}

#[test]
fn before_hook_abort_leaves_everything_untouched() {
    let registry = paranoid_registry();
    let conn = open_installed(&registry);
    let repo = RecordRepository::try_new(&conn, &registry, "widget").unwrap();
    let (hooks, calls) = RecordingHooks::new(false, true);
    let lifecycle = LifecycleController::with_hooks(&repo, hooks);

    let mut record = insert_one(&repo, 1, "title", "spared");
    assert!(!lifecycle.destroy_hard(&mut record).unwrap());

    assert_eq!(*calls.borrow(), vec!["before"]);
    assert!(!record.is_frozen());
    assert_eq!(physical_count(&conn, "widgets"), 1);
    // Gracefully declined, not an error: the record still accepts writes.
    record.set("title", text_value("still editable")).unwrap();
}

#[test]
fn failing_after_hook_unwinds_the_removal() {
    let registry = paranoid_registry();
    let conn = open_installed(&registry);
    let repo = RecordRepository::try_new(&conn, &registry, "widget").unwrap();
    let (hooks, calls) = RecordingHooks::new(true, false);
    let lifecycle = LifecycleController::with_hooks(&repo, hooks);

    let mut record = insert_one(&repo, 1, "title", "resilient");
    assert!(!lifecycle.destroy_hard(&mut record).unwrap());

    assert_eq!(*calls.borrow(), vec!["before", "after"]);
    assert!(!record.is_frozen());
    assert_eq!(physical_count(&conn, "widgets"), 1);
}

#[test]
fn destroy_on_plain_entity_delegates_to_hard_destroy() {
    let registry = plain_registry();
    let conn = open_installed(&registry);
    let repo = RecordRepository::try_new(&conn, &registry, "gadget").unwrap();
    let (hooks, calls) = RecordingHooks::new(true, true);
    let lifecycle = LifecycleController::with_hooks(&repo, hooks);

    let mut record = insert_one(&repo, 1, "label", "ephemeral");
    assert!(lifecycle.destroy(&mut record).unwrap());

    assert_eq!(*calls.borrow(), vec!["before", "after"]);
    assert_eq!(physical_count(&conn, "gadgets"), 0);
}

#[test]
fn recover_restores_visibility_and_write_access() {
    let registry = paranoid_registry();
    let conn = open_installed(&registry);
    let repo = RecordRepository::try_new(&conn, &registry, "widget").unwrap();
    let lifecycle = LifecycleController::new(&repo);

    let mut record = insert_one(&repo, 1, "title", "phoenix");
    lifecycle.destroy(&mut record).unwrap();
    assert!(record.is_frozen());

    lifecycle.recover(&mut record).unwrap();
    assert!(!lifecycle.is_deleted(&record));
    assert!(!record.is_frozen());
    record.set("title", text_value("risen")).unwrap();

    let visible = repo.find(&FindKind::All, &FindOptions::default()).unwrap();
    assert_eq!(visible.len(), 1);
}

#[test]
fn recover_fails_when_the_row_is_gone() {
    let registry = paranoid_registry();
    let conn = open_installed(&registry);
    let repo = RecordRepository::try_new(&conn, &registry, "widget").unwrap();
    let lifecycle = LifecycleController::new(&repo);

    let mut record = insert_one(&repo, 1, "title", "unlucky");
    lifecycle.destroy(&mut record).unwrap();
    conn.execute("DELETE FROM widgets WHERE id = 1;", []).unwrap();

    let err = lifecycle.recover(&mut record).unwrap_err();
    assert!(matches!(err, RepoError::NotFound { .. }));
}

#[test]
fn recover_requires_soft_delete_capability() {
    let registry = plain_registry();
    let conn = open_installed(&registry);
    let repo = RecordRepository::try_new(&conn, &registry, "gadget").unwrap();
    let lifecycle = LifecycleController::new(&repo);

    let mut record = insert_one(&repo, 1, "label", "plain");
    let err = lifecycle.recover(&mut record).unwrap_err();
    assert!(matches!(
        err,
        RepoError::Scope(ScopeError::SoftDeleteDisabled(entity)) if entity == "gadget"
    ));
}

#[test]
fn destroying_an_unsaved_record_only_freezes_it() {
    let registry = paranoid_registry();
    let conn = open_installed(&registry);
    let repo = RecordRepository::try_new(&conn, &registry, "widget").unwrap();
    let lifecycle = LifecycleController::new(&repo);

    let mut record = Record::new(repo.entity());
    record.set("title", text_value("never saved")).unwrap();
    assert!(lifecycle.destroy(&mut record).unwrap());

    assert!(record.is_frozen());
    assert!(lifecycle.is_deleted(&record));
    assert_eq!(physical_count(&conn, "widgets"), 0);
}
