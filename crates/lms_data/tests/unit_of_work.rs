mod common;

use common::{empty_library, fresh_books, seeded_library, titles, Book, Category, MIGRATIONS};
use lms_data::db::{open_db_in_memory, ConnectionOptions};
use lms_data::{
    ChangeKind, ConflictError, Query, RepoError, RepoResult, Session, SqliteSessionFactory,
    StoreConfig, UnitOfWorkFactory, UnitOfWorkState, WriteMode,
};
use std::rc::Rc;

#[test]
fn repository_is_cached_per_entity_type() {
    let library = seeded_library();
    let uow = library.begin();

    let first = uow.repository::<Book>().unwrap();
    let second = uow.repository::<Book>().unwrap();
    assert!(Rc::ptr_eq(&first, &second));

    let categories = uow.repository::<Category>().unwrap();
    let categories_again = uow.repository::<Category>().unwrap();
    assert!(Rc::ptr_eq(&categories, &categories_again));
}

#[test]
fn repositories_of_one_unit_share_a_single_commit() {
    let library = empty_library();
    let uow = library.begin();

    uow.repository::<Category>()
        .unwrap()
        .add(&Category::new(1, "poetry"))
        .unwrap();
    uow.repository::<Book>()
        .unwrap()
        .add(&Book::new(1, "Leaves of Grass", "Walt Whitman", 1))
        .unwrap();

    assert_eq!(uow.save().unwrap(), 2);
    assert_eq!(titles(&fresh_books(&library).unwrap()), vec!["Leaves of Grass"]);
}

#[test]
fn staged_writes_are_not_durable_until_save() {
    let library = seeded_library();
    let uow = library.begin();
    let books = uow.repository::<Book>().unwrap();

    let mut solaris = books.get_by_id(&4).unwrap().unwrap();
    solaris.available_copies = 1;
    books.add(&Book::new(5, "Hyperion", "Dan Simmons", 1)).unwrap();
    books.update(&solaris, WriteMode::Deferred).unwrap();
    assert!(uow.has_changes().unwrap());

    let before = fresh_books(&library).unwrap();
    assert_eq!(before.len(), 4);
    assert_eq!(before[3].available_copies, 3);

    uow.save().unwrap();
    assert!(!uow.has_changes().unwrap());

    let after = fresh_books(&library).unwrap();
    assert_eq!(
        titles(&after),
        vec!["Dune", "Neuromancer", "Emma", "Solaris", "Hyperion"]
    );
    assert_eq!(after[3].available_copies, 1);
}

#[test]
fn staged_deletes_are_not_durable_until_save() {
    let library = seeded_library();
    let uow = library.begin();
    let books = uow.repository::<Book>().unwrap();

    let dune = books.get_by_id(&1).unwrap().unwrap();
    let others = vec![
        books.get_by_id(&2).unwrap().unwrap(),
        books.get_by_id(&4).unwrap().unwrap(),
    ];
    books.delete(&dune, WriteMode::Deferred).unwrap();
    books.delete_range(&others).unwrap();
    assert_eq!(uow.pending_changes().unwrap().len(), 3);

    assert_eq!(
        titles(&fresh_books(&library).unwrap()),
        vec!["Dune", "Neuromancer", "Emma", "Solaris"]
    );

    assert_eq!(uow.save().unwrap(), 3);
    assert_eq!(titles(&fresh_books(&library).unwrap()), vec!["Emma"]);
}

#[test]
fn save_accepts_children_staged_before_their_parent() {
    let library = empty_library();
    let uow = library.begin();

    uow.repository::<Book>()
        .unwrap()
        .add(&Book::new(1, "Leaves of Grass", "Walt Whitman", 1))
        .unwrap();
    uow.repository::<Category>()
        .unwrap()
        .add(&Category::new(1, "poetry"))
        .unwrap();

    assert_eq!(uow.save().unwrap(), 2);
    assert_eq!(titles(&fresh_books(&library).unwrap()), vec!["Leaves of Grass"]);
}

#[test]
fn save_rejects_orphans_at_commit_and_keeps_nothing() {
    let library = empty_library();
    let uow = library.begin();

    uow.repository::<Category>()
        .unwrap()
        .add(&Category::new(1, "poetry"))
        .unwrap();
    uow.repository::<Book>()
        .unwrap()
        .add(&Book::new(1, "Orphan", "Nobody", 7))
        .unwrap();

    let err = uow.save().unwrap_err();
    assert!(matches!(
        err,
        RepoError::Conflict(ConflictError::Constraint { .. })
    ));
    assert!(fresh_books(&library).unwrap().is_empty());
    assert!(uow.has_changes().unwrap());
}

#[test]
fn add_add_delete_then_single_save() {
    let library = seeded_library();
    let uow = library.begin();
    let books = uow.repository::<Book>().unwrap();

    let book_a = Book::new(5, "Foundation", "Isaac Asimov", 1);
    let book_b = Book::new(6, "Persuasion", "Jane Austen", 2);
    let book_c = books.get_by_id(&2).unwrap().unwrap();
    books.add(&book_a).unwrap();
    books.add(&book_b).unwrap();
    books.delete(&book_c, WriteMode::Deferred).unwrap();

    let pending = uow.pending_changes().unwrap();
    let kinds: Vec<ChangeKind> = pending.iter().map(|change| change.kind).collect();
    assert_eq!(
        kinds,
        vec![ChangeKind::Insert, ChangeKind::Insert, ChangeKind::Delete]
    );
    assert_eq!(pending[2].key, "2");

    assert_eq!(uow.save().unwrap(), 3);

    let all = books.get_all(&Query::all()).unwrap();
    assert!(all.contains(&book_a));
    assert!(all.contains(&book_b));
    assert!(all.iter().all(|book| book.id != book_c.id));
    assert_eq!(fresh_books(&library).unwrap(), all);
}

#[test]
fn delete_range_removes_every_element_on_save() {
    let library = seeded_library();
    let uow = library.begin();
    let books = uow.repository::<Book>().unwrap();

    let science_fiction = books
        .get_all(&Query::matching(lms_data::Filter::eq("category_id", 1)))
        .unwrap();
    books.delete_range(&science_fiction).unwrap();
    uow.save().unwrap();

    assert_eq!(titles(&fresh_books(&library).unwrap()), vec!["Emma"]);
}

#[test]
fn save_is_atomic_when_a_constraint_fails() {
    let library = seeded_library();
    let uow = library.begin();
    let books = uow.repository::<Book>().unwrap();

    let valid = Book::new(5, "Kindred", "Octavia Butler", 1);
    let mut duplicate_isbn = Book::new(6, "Copy", "Someone", 1);
    duplicate_isbn.isbn = Book::new(1, "", "", 1).isbn;
    books.add(&valid).unwrap();
    books.add(&duplicate_isbn).unwrap();

    let err = uow.save().unwrap_err();
    assert!(err.is_conflict());
    assert!(matches!(
        err,
        RepoError::Conflict(ConflictError::Constraint { table: "books", .. })
    ));
    if let RepoError::Conflict(conflict) = &err {
        assert_eq!(conflict.table(), "books");
    }

    let durable = fresh_books(&library).unwrap();
    assert_eq!(durable.len(), 4);
    assert!(!durable.contains(&valid));
    assert!(uow.has_changes().unwrap(), "failed batch stays staged");
}

#[test]
fn save_is_atomic_when_a_row_vanished_concurrently() {
    let library = seeded_library();
    let stale = library.begin();
    let stale_books = stale.repository::<Book>().unwrap();
    let emma = stale_books.get_by_id(&3).unwrap().unwrap();

    {
        let other = library.begin();
        let other_books = other.repository::<Book>().unwrap();
        other_books.delete(&emma, WriteMode::Immediate).unwrap();
    }

    let mut edited = emma.clone();
    edited.title = "Emma (annotated)".to_string();
    stale_books
        .add(&Book::new(7, "Middlemarch", "George Eliot", 2))
        .unwrap();
    stale_books.update(&edited, WriteMode::Deferred).unwrap();

    let err = stale.save().unwrap_err();
    match err {
        RepoError::Conflict(ConflictError::RowMissing { table, key }) => {
            assert_eq!(table, "books");
            assert_eq!(key, "3");
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(
        titles(&fresh_books(&library).unwrap()),
        vec!["Dune", "Neuromancer", "Solaris"]
    );
}

#[test]
fn discard_changes_after_failed_save_allows_retry() {
    let library = seeded_library();
    let uow = library.begin();
    let books = uow.repository::<Book>().unwrap();

    books.add(&Book::new(1, "Duplicate key", "Nobody", 1)).unwrap();
    assert!(uow.save().is_err());

    uow.discard_changes().unwrap();
    assert!(!uow.has_changes().unwrap());
    assert_eq!(uow.save().unwrap(), 0);

    books.add(&Book::new(8, "Beloved", "Toni Morrison", 2)).unwrap();
    assert_eq!(uow.save().unwrap(), 1);
    assert_eq!(fresh_books(&library).unwrap().len(), 5);
}

#[test]
fn immediate_update_is_visible_to_a_new_session_without_save() {
    let library = seeded_library();
    let uow = library.begin();
    let books = uow.repository::<Book>().unwrap();

    let mut dune = books.get_by_id(&1).unwrap().unwrap();
    dune.title = "Dune: Deluxe Edition".to_string();
    books.update(&dune, WriteMode::Immediate).unwrap();

    let reader = library.begin();
    let fresh = reader.repository::<Book>().unwrap().get_by_id(&1).unwrap();
    assert_eq!(fresh.unwrap().title, "Dune: Deluxe Edition");
    assert!(!uow.has_changes().unwrap());
}

#[test]
fn immediate_write_flushes_everything_staged_before_it() {
    let library = seeded_library();
    let uow = library.begin();
    let books = uow.repository::<Book>().unwrap();

    books.add(&Book::new(9, "Ubik", "Philip K. Dick", 1)).unwrap();
    let emma = books.get_by_id(&3).unwrap().unwrap();
    books.delete(&emma, WriteMode::Immediate).unwrap();

    assert_eq!(
        titles(&fresh_books(&library).unwrap()),
        vec!["Dune", "Neuromancer", "Solaris", "Ubik"]
    );
}

#[test]
fn deferred_update_is_not_visible_to_a_new_session() {
    let library = seeded_library();
    let uow = library.begin();
    let books = uow.repository::<Book>().unwrap();

    let mut dune = books.get_by_id(&1).unwrap().unwrap();
    dune.title = "Dune (draft)".to_string();
    books.update(&dune, WriteMode::Deferred).unwrap();

    assert_eq!(fresh_books(&library).unwrap()[0].title, "Dune");
}

#[test]
fn disposal_makes_repositories_unavailable_and_is_idempotent() {
    let library = seeded_library();
    let mut uow = library.begin();
    let books = uow.repository::<Book>().unwrap();
    books.add(&Book::new(5, "Unsaved", "Nobody", 1)).unwrap();
    assert_eq!(uow.state(), UnitOfWorkState::Active);

    uow.dispose();
    uow.dispose();
    assert_eq!(uow.state(), UnitOfWorkState::Disposed);

    assert!(books.get_all(&Query::all()).unwrap_err().is_session_unavailable());
    assert!(books.get_by_id(&1).unwrap_err().is_session_unavailable());
    assert!(books.exists(None).unwrap_err().is_session_unavailable());
    assert!(books
        .add(&Book::new(6, "Late", "Nobody", 1))
        .unwrap_err()
        .is_session_unavailable());
    assert!(uow.save().unwrap_err().is_session_unavailable());
    assert!(matches!(
        uow.repository::<Category>(),
        Err(RepoError::SessionUnavailable)
    ));

    assert_eq!(fresh_books(&library).unwrap().len(), 4);
}

#[test]
fn dropping_the_unit_of_work_releases_its_session() {
    let library = seeded_library();
    let books = {
        let uow = library.begin();
        uow.repository::<Book>().unwrap()
    };

    let err = books.get_one(&Query::all()).unwrap_err();
    assert!(matches!(err, RepoError::SessionUnavailable));
}

#[test]
fn factory_accepts_any_session_source() {
    let factory = UnitOfWorkFactory::new(|| -> RepoResult<Session> {
        let options = ConnectionOptions::default().with_migrations(MIGRATIONS);
        Ok(Session::new(open_db_in_memory(&options)?))
    });

    let uow = factory.begin().unwrap();
    let categories = uow.repository::<Category>().unwrap();
    categories.add(&Category::new(1, "drama")).unwrap();
    uow.save().unwrap();
    assert_eq!(categories.count(None).unwrap(), 1);

    let other = factory.begin().unwrap();
    assert_eq!(other.repository::<Category>().unwrap().count(None).unwrap(), 0);
}

#[test]
fn failing_session_source_surfaces_at_begin() {
    let factory =
        UnitOfWorkFactory::new(|| -> RepoResult<Session> { Err(RepoError::SessionUnavailable) });
    assert!(matches!(factory.begin(), Err(RepoError::SessionUnavailable)));
}

#[test]
fn invalid_store_config_fails_at_construction() {
    let err = SqliteSessionFactory::new(StoreConfig::file(""), MIGRATIONS).unwrap_err();
    assert!(matches!(err, RepoError::InvalidConfig(message) if message.contains("empty")));
}
