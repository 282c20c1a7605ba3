use rusqlite::types::Value;
use rusqlite::Connection;
use tombstone_core::{
    open_db_in_memory, AssociationKind, ColumnDef, ColumnType, EntityDef, FindKind, FindOptions,
    IncludeSpec, LifecycleController, Record, RecordRepository, SchemaRegistry, SoftDeleteOptions,
};

/// author (paranoid) --books--> book (plain) --reviews--> review (paranoid)
fn library_registry() -> SchemaRegistry {
    let mut registry = SchemaRegistry::new();
    registry
        .register(
            EntityDef::new(
                "author",
                "authors",
                "id",
                vec![
                    ColumnDef::new("id", ColumnType::Integer),
                    ColumnDef::new("name", ColumnType::Text),
                    ColumnDef::new("deleted_at", ColumnType::Timestamp),
                ],
            )
            .with_association("books", "book", AssociationKind::HasMany, "author_id"),
        )
        .unwrap();
    registry
        .register(
            EntityDef::new(
                "book",
                "books",
                "id",
                vec![
                    ColumnDef::new("id", ColumnType::Integer),
                    ColumnDef::new("author_id", ColumnType::Integer),
                    ColumnDef::new("title", ColumnType::Text),
                ],
            )
            .with_association("reviews", "review", AssociationKind::HasMany, "book_id")
            .with_association("author", "author", AssociationKind::BelongsTo, "author_id"),
        )
        .unwrap();
    registry
        .register(
            EntityDef::new(
                "review",
                "reviews",
                "id",
                vec![
                    ColumnDef::new("id", ColumnType::Integer),
                    ColumnDef::new("book_id", ColumnType::Integer),
                    ColumnDef::new("body", ColumnType::Text),
                    ColumnDef::new("deleted_at", ColumnType::Timestamp),
                ],
            )
            .with_association("book", "book", AssociationKind::BelongsTo, "book_id"),
        )
        .unwrap();
    registry
        .enable_soft_delete("author", SoftDeleteOptions::default())
        .unwrap();
    registry
        .enable_soft_delete("review", SoftDeleteOptions::default())
        .unwrap();
    registry
}

fn text(value: &str) -> Value {
    Value::Text(value.to_string())
}

fn insert_row(repo: &RecordRepository<'_>, values: &[(&str, Value)]) {
    let mut record = Record::new(repo.entity());
    for (column, value) in values {
        record.set(*column, value.clone()).unwrap();
    }
    repo.insert(&record).unwrap();
}

/// Three authors, three books, three reviews:
/// - author 1 / book 1: reviews 1 (kept) and 2 (soft-deleted)
/// - author 2 / book 2: review 3 (soft-deleted) and nothing else
/// - author 3 / book 3: no reviews
fn seed_library(conn: &Connection, registry: &SchemaRegistry) {
    registry.install_schema(conn).unwrap();
    let authors = RecordRepository::try_new(conn, registry, "author").unwrap();
    let books = RecordRepository::try_new(conn, registry, "book").unwrap();
    let reviews = RecordRepository::try_new(conn, registry, "review").unwrap();

    for (id, name) in [(1, "alice"), (2, "bob"), (3, "carol")] {
        insert_row(
            &authors,
            &[("id", Value::Integer(id)), ("name", text(name))],
        );
    }
    for (id, author_id, title) in [(1, 1, "first"), (2, 2, "second"), (3, 3, "third")] {
        insert_row(
            &books,
            &[
                ("id", Value::Integer(id)),
                ("author_id", Value::Integer(author_id)),
                ("title", text(title)),
            ],
        );
    }
    for (id, book_id, body) in [(1, 1, "fine"), (2, 1, "meh"), (3, 2, "stale")] {
        insert_row(
            &reviews,
            &[
                ("id", Value::Integer(id)),
                ("book_id", Value::Integer(book_id)),
                ("body", text(body)),
            ],
        );
    }

    let lifecycle = LifecycleController::new(&reviews);
    for review_id in [2, 3] {
        let mut record = reviews
            .find(
                &FindKind::Ids(vec![Value::Integer(review_id)]),
                &FindOptions::default(),
            )
            .unwrap()
            .remove(0);
        lifecycle.destroy(&mut record).unwrap();
    }
}

fn ids(repo: &RecordRepository<'_>, options: &FindOptions) -> Vec<i64> {
    repo.find(&FindKind::All, options)
        .unwrap()
        .iter()
        .map(|record| match record.id(repo.entity()) {
            Value::Integer(id) => *id,
            other => panic!("expected integer id, got {other:?}"),
        })
        .collect()
}

#[test]
fn including_a_paranoid_association_filters_joined_rows() {
    let registry = library_registry();
    let conn = open_db_in_memory().unwrap();
    seed_library(&conn, &registry);
    let books = RecordRepository::try_new(&conn, &registry, "book").unwrap();

    // Book 2's only review is soft-deleted; book 3 has none at all and
    // stays visible through the left join.
    let options = FindOptions::including(IncludeSpec::name("reviews"));
    assert_eq!(ids(&books, &options), vec![1, 3]);
}

#[test]
fn including_a_plain_association_adds_no_filter() {
    let registry = library_registry();
    let conn = open_db_in_memory().unwrap();
    seed_library(&conn, &registry);
    let authors = RecordRepository::try_new(&conn, &registry, "author").unwrap();

    let options = FindOptions::including(IncludeSpec::name("books"));
    assert_eq!(ids(&authors, &options), vec![1, 2, 3]);

    // The root's own predicate still applies alongside the include.
    let lifecycle = LifecycleController::new(&authors);
    let mut bob = authors
        .find(&FindKind::Ids(vec![Value::Integer(2)]), &FindOptions::default())
        .unwrap()
        .remove(0);
    lifecycle.destroy(&mut bob).unwrap();
    assert_eq!(ids(&authors, &options), vec![1, 3]);
}

#[test]
fn nested_spec_filters_each_paranoid_level() {
    let registry = library_registry();
    let conn = open_db_in_memory().unwrap();
    seed_library(&conn, &registry);
    let authors = RecordRepository::try_new(&conn, &registry, "author").unwrap();

    // {books: reviews}: books pass through, reviews are filtered. Author 2
    // only reaches a soft-deleted review; author 3 reaches no review rows.
    let spec = IncludeSpec::nested([("books".to_string(), IncludeSpec::name("reviews"))]);
    assert_eq!(ids(&authors, &FindOptions::including(spec)), vec![1, 3]);
}

#[test]
fn sequence_permutations_return_identical_sets() {
    let registry = library_registry();
    let conn = open_db_in_memory().unwrap();
    seed_library(&conn, &registry);
    let books = RecordRepository::try_new(&conn, &registry, "book").unwrap();

    let permutations = [
        ["reviews", "author"],
        ["author", "reviews"],
    ];
    let mut results = Vec::new();
    for permutation in permutations {
        let spec = IncludeSpec::seq(permutation.map(IncludeSpec::name));
        results.push(ids(&books, &FindOptions::including(spec)));
    }
    assert_eq!(results[0], results[1]);
    assert_eq!(results[0], vec![1, 3]);
}

#[test]
fn count_with_include_matches_find_cardinality() {
    let registry = library_registry();
    let conn = open_db_in_memory().unwrap();
    seed_library(&conn, &registry);
    let books = RecordRepository::try_new(&conn, &registry, "book").unwrap();

    let options = FindOptions::including(IncludeSpec::name("reviews"));
    let found = books.find(&FindKind::All, &options).unwrap();
    let counted = books.count(&options).unwrap();
    assert_eq!(found.len() as i64, counted);

    // Bypassing the filter restores every book.
    let mut bypass = FindOptions::including(IncludeSpec::name("reviews"));
    bypass.with_deleted = true;
    assert_eq!(books.count(&bypass).unwrap(), 3);
}

#[test]
fn exists_with_include_sees_only_scoped_rows() {
    let registry = library_registry();
    let conn = open_db_in_memory().unwrap();
    seed_library(&conn, &registry);
    let books = RecordRepository::try_new(&conn, &registry, "book").unwrap();

    let mut options = FindOptions::including(IncludeSpec::name("reviews"));
    options.conditions = Some(tombstone_core::SqlCondition::new(
        "\"books\".\"id\" = ?",
        vec![Value::Integer(2)],
    ));
    assert!(!books.exists(&options).unwrap());
    assert!(books.exists_with_deleted(&options).unwrap());
}
