#![allow(dead_code)]

use lms_data::{
    Entity, Migration, RepoResult, SqliteSessionFactory, StoreConfig, UnitOfWork,
    UnitOfWorkFactory,
};
use rusqlite::types::Value;
use rusqlite::Row;
use tempfile::TempDir;

pub const MIGRATIONS: &[Migration] = &[
    Migration::new(
        1,
        "CREATE TABLE categories (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE
        );
        CREATE TABLE books (
            id INTEGER PRIMARY KEY,
            title TEXT NOT NULL,
            author TEXT NOT NULL,
            publisher TEXT NOT NULL,
            publication_date INTEGER NOT NULL,
            isbn TEXT NOT NULL UNIQUE,
            category_id INTEGER NOT NULL REFERENCES categories(id),
            total_copies INTEGER NOT NULL,
            available_copies INTEGER NOT NULL,
            CHECK (available_copies <= total_copies)
        );",
    ),
    Migration::new(
        2,
        "CREATE INDEX idx_books_category ON books(category_id);",
    ),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

impl Category {
    pub fn new(id: i64, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
        }
    }
}

impl Entity for Category {
    type Key = i64;
    const TABLE: &'static str = "categories";
    const KEY_COLUMN: &'static str = "id";
    const COLUMNS: &'static [&'static str] = &["name"];

    fn key(&self) -> i64 {
        self.id
    }

    fn to_values(&self) -> Vec<Value> {
        vec![Value::Text(self.name.clone())]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub publisher: String,
    /// Unix epoch milliseconds.
    pub publication_date: i64,
    pub isbn: String,
    pub category_id: i64,
    /// Populated only by include hooks.
    pub category: Option<Category>,
    pub total_copies: i64,
    pub available_copies: i64,
}

impl Book {
    pub fn new(id: i64, title: &str, author: &str, category_id: i64) -> Self {
        Self {
            id,
            title: title.to_string(),
            author: author.to_string(),
            publisher: "Ace".to_string(),
            publication_date: 1_000 * id,
            isbn: format!("978-0-00-{id:06}"),
            category_id,
            category: None,
            total_copies: 3,
            available_copies: 3,
        }
    }
}

impl Entity for Book {
    type Key = i64;
    const TABLE: &'static str = "books";
    const KEY_COLUMN: &'static str = "id";
    const COLUMNS: &'static [&'static str] = &[
        "title",
        "author",
        "publisher",
        "publication_date",
        "isbn",
        "category_id",
        "total_copies",
        "available_copies",
    ];

    fn key(&self) -> i64 {
        self.id
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.title.clone()),
            Value::Text(self.author.clone()),
            Value::Text(self.publisher.clone()),
            Value::Integer(self.publication_date),
            Value::Text(self.isbn.clone()),
            Value::Integer(self.category_id),
            Value::Integer(self.total_copies),
            Value::Integer(self.available_copies),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            author: row.get(2)?,
            publisher: row.get(3)?,
            publication_date: row.get(4)?,
            isbn: row.get(5)?,
            category_id: row.get(6)?,
            category: None,
            total_copies: row.get(7)?,
            available_copies: row.get(8)?,
        })
    }
}

/// File-backed store so separate units of work see each other's commits.
pub struct Library {
    _dir: TempDir,
    pub factory: UnitOfWorkFactory<SqliteSessionFactory>,
}

impl Library {
    pub fn begin(&self) -> UnitOfWork {
        self.factory.begin().unwrap()
    }
}

pub fn empty_library() -> Library {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig::file(dir.path().join("lms.sqlite3"));
    let sessions = SqliteSessionFactory::new(config, MIGRATIONS).unwrap();
    Library {
        _dir: dir,
        factory: UnitOfWorkFactory::new(sessions),
    }
}

/// Two categories and four books:
/// 1 Dune (sf), 2 Neuromancer (sf), 3 Emma (classics), 4 Solaris (sf).
pub fn seeded_library() -> Library {
    let library = empty_library();
    let uow = library.begin();
    let categories = uow.repository::<Category>().unwrap();
    categories
        .add_range(&[Category::new(1, "science fiction"), Category::new(2, "classics")])
        .unwrap();
    let books = uow.repository::<Book>().unwrap();
    books
        .add_range(&[
            Book::new(1, "Dune", "Frank Herbert", 1),
            Book::new(2, "Neuromancer", "William Gibson", 1),
            Book::new(3, "Emma", "Jane Austen", 2),
            Book::new(4, "Solaris", "Stanislaw Lem", 1),
        ])
        .unwrap();
    uow.save().unwrap();
    library
}

/// Reads every book through a brand-new unit of work.
pub fn fresh_books(library: &Library) -> RepoResult<Vec<Book>> {
    let uow = library.begin();
    let books = uow.repository::<Book>()?;
    books.get_all(&lms_data::Query::all())
}

pub fn titles(books: &[Book]) -> Vec<&str> {
    books.iter().map(|book| book.title.as_str()).collect()
}
