//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `tombstone_core` linkage.
//! - Keep output deterministic for quick local sanity checks.

use tombstone_core::{
    open_db_in_memory, ColumnDef, ColumnType, EntityDef, FindKind, FindOptions,
    LifecycleController, Record, RecordRepository, SchemaRegistry, SoftDeleteOptions, Value,
};

fn main() {
    println!("tombstone_core version={}", tombstone_core::core_version());

    let mut registry = SchemaRegistry::new();
    registry
        .register(EntityDef::new(
            "widget",
            "widgets",
            "id",
            vec![
                ColumnDef::new("id", ColumnType::Text),
                ColumnDef::new("title", ColumnType::Text),
                ColumnDef::new("deleted_at", ColumnType::Timestamp),
            ],
        ))
        .expect("widget registers");
    registry
        .enable_soft_delete("widget", SoftDeleteOptions::default())
        .expect("soft delete enables");

    let conn = open_db_in_memory().expect("in-memory db opens");
    registry.install_schema(&conn).expect("schema installs");

    let repo = RecordRepository::try_new(&conn, &registry, "widget").expect("repository opens");
    let lifecycle = LifecycleController::new(&repo);

    let entity = repo.entity().clone();
    let mut kept = Record::with_generated_id(&entity);
    kept.set("title", Value::Text("kept".to_string())).expect("title set");
    repo.insert(&kept).expect("kept inserts");

    let mut dropped = Record::with_generated_id(&entity);
    dropped.set("title", Value::Text("dropped".to_string())).expect("title set");
    repo.insert(&dropped).expect("dropped inserts");

    lifecycle.destroy(&mut dropped).expect("soft delete");

    let visible = repo
        .find(&FindKind::All, &FindOptions::default())
        .expect("filtered find");
    let total = repo
        .count_with_deleted(&FindOptions::default())
        .expect("unfiltered count");
    println!("tombstone_core visible={} total={total}", visible.len());
}
