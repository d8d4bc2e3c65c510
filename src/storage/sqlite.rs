use rusqlite::{Connection, Row, params};
#[cfg(test)]
use rusqlite::OpenFlags;
use serde::Serialize;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::info;

/// Storage failure. The display text is what API clients see.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("failed to create database directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("database connection lock poisoned")]
    LockPoisoned,
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// A stored review
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Review {
    pub id: i64,
    pub name: Option<String>,
    pub message: Option<String>,
    pub created_at: String,
}

impl Review {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            message: row.get(2)?,
            created_at: row.get(3)?,
        })
    }
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS reviews (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        name        TEXT,
        message     TEXT,
        created_at  TIMESTAMP DEFAULT CURRENT_TIMESTAMP
    );
";

/// Append-only review table in a single SQLite file
pub struct ReviewStore {
    conn: Mutex<Connection>,
}

impl ReviewStore {
    /// Open (or create) the database file and make sure the table exists.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;

        info!(path = %path.display(), "Opened review database");

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.initialize()?;
        Ok(store)
    }

    /// Create the reviews table if missing. Idempotent.
    pub fn initialize(&self) -> Result<()> {
        self.conn()?.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Persist a review and return it with its generated id and timestamp.
    pub fn insert(&self, name: Option<&str>, message: Option<&str>) -> Result<Review> {
        let review = self.conn()?.query_row(
            "INSERT INTO reviews (name, message) VALUES (?1, ?2)
             RETURNING id, name, message, created_at",
            params![name, message],
            Review::from_row,
        )?;
        Ok(review)
    }

    /// All reviews in insertion order.
    pub fn list_all(&self) -> Result<Vec<Review>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT id, name, message, created_at FROM reviews ORDER BY id ASC")?;
        let reviews = stmt
            .query_map([], Review::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(reviews)
    }

    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM reviews", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    /// Create the table in a fresh file, then reopen that file read-only.
    #[cfg(test)]
    pub(crate) fn open_read_only(path: &Path) -> Result<Self> {
        Connection::open(path)?.execute_batch(SCHEMA)?;
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Drop the table so every read fails.
    #[cfg(test)]
    pub(crate) fn drop_table(&self) {
        self.conn().unwrap().execute_batch("DROP TABLE reviews").unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_store_lists_nothing() {
        let store = ReviewStore::open_in_memory().unwrap();
        assert!(store.list_all().unwrap().is_empty());
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let store = ReviewStore::open_in_memory().unwrap();
        store.insert(Some("Alice"), Some("Great service")).unwrap();
        store.initialize().unwrap();
        store.initialize().unwrap();
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_insert_returns_generated_fields() {
        let store = ReviewStore::open_in_memory().unwrap();
        let review = store.insert(Some("Alice"), Some("Great service")).unwrap();

        assert_eq!(review.id, 1);
        assert_eq!(review.name.as_deref(), Some("Alice"));
        assert_eq!(review.message.as_deref(), Some("Great service"));
        assert!(!review.created_at.is_empty());

        assert_eq!(store.list_all().unwrap(), vec![review]);
    }

    #[test]
    fn test_ids_increase_in_insertion_order() {
        let store = ReviewStore::open_in_memory().unwrap();
        let first = store.insert(Some("a"), Some("one")).unwrap();
        let second = store.insert(Some("b"), Some("two")).unwrap();
        let third = store.insert(Some(""), Some("")).unwrap();

        assert!(first.id < second.id && second.id < third.id);

        let ids: Vec<i64> = store.list_all().unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![first.id, second.id, third.id]);
    }

    #[test]
    fn test_missing_fields_stored_as_null() {
        let store = ReviewStore::open_in_memory().unwrap();
        let review = store.insert(None, Some("anonymous")).unwrap();
        assert_eq!(review.name, None);

        let listed = store.list_all().unwrap();
        assert_eq!(listed[0].name, None);
        assert_eq!(listed[0].message.as_deref(), Some("anonymous"));
    }

    #[test]
    fn test_failed_write_persists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReviewStore::open_read_only(&dir.path().join("reviews.db")).unwrap();

        let err = store.insert(Some("Alice"), Some("hi")).unwrap_err();
        assert!(matches!(err, StorageError::Sqlite(_)));
        assert!(!err.to_string().is_empty());
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_failed_read_is_an_error() {
        let store = ReviewStore::open_in_memory().unwrap();
        store.insert(Some("Alice"), Some("hi")).unwrap();
        store.drop_table();

        let err = store.list_all().unwrap_err();
        assert!(err.to_string().contains("no such table"));
    }

    #[test]
    fn test_reviews_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("reviews.db");

        {
            let store = ReviewStore::open(&path).unwrap();
            store.insert(Some("Alice"), Some("Great service")).unwrap();
            store.insert(Some("Bob"), Some("Slow delivery")).unwrap();
        }

        let store = ReviewStore::open(&path).unwrap();
        let reviews = store.list_all().unwrap();
        assert_eq!(reviews.len(), 2);
        assert_eq!(reviews[0].name.as_deref(), Some("Alice"));
        assert_eq!(reviews[1].name.as_deref(), Some("Bob"));

        let next = store.insert(Some("Carol"), None).unwrap();
        assert_eq!(next.id, 3);
    }
}
