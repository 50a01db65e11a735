use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::{Result, StoreError};

/// How many recently viewed books are kept unless told otherwise
pub const DEFAULT_RECENT_CAPACITY: usize = 10;

/// A record the store knows how to key.
///
/// The full record is persisted as a JSON snapshot, so anything serde can
/// round-trip comes back field-for-field.
pub trait StoredRecord: Serialize + DeserializeOwned {
    fn isbn(&self) -> &str;

    /// Kept in its own column so the tables stay readable from the sqlite shell
    fn title(&self) -> &str {
        ""
    }
}

/// A recently viewed record together with the time it was last opened
#[derive(Debug, Clone, PartialEq)]
pub struct RecentView<T> {
    pub record: T,
    pub viewed_at: DateTime<Utc>,
}

/// Local store for bookmarks and the recently viewed list
///
/// One connection behind a mutex: every read and write is serialized, and
/// multi-statement writes run inside a transaction. Share it as
/// `Arc<BookStore>` for the lifetime of the process.
pub struct BookStore {
    conn: Mutex<Connection>,
    recent_capacity: usize,
}

impl BookStore {
    /// Open (or create) the database file at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_capacity(path, DEFAULT_RECENT_CAPACITY)
    }

    /// Open with a custom bound on the recently viewed list
    pub fn open_with_capacity(path: impl AsRef<Path>, recent_capacity: usize) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        debug!("Opened book store at {}", path.display());
        Self::from_connection(conn, recent_capacity)
    }

    /// Throwaway store, nothing touches disk
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, DEFAULT_RECENT_CAPACITY)
    }

    fn from_connection(conn: Connection, recent_capacity: usize) -> Result<Self> {
        if recent_capacity == 0 {
            return Err(StoreError::InvalidRecord(
                "recently viewed capacity must be at least 1".into(),
            ));
        }

        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            recent_capacity,
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS bookmarks (
                isbn TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                data TEXT NOT NULL,
                saved_at INTEGER NOT NULL
            )",
            [],
        )?;

        // seq breaks ties between views recorded in the same millisecond
        conn.execute(
            "CREATE TABLE IF NOT EXISTS recent_views (
                isbn TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                data TEXT NOT NULL,
                viewed_at INTEGER NOT NULL,
                seq INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_recent_views_order
             ON recent_views (viewed_at DESC, seq DESC)",
            [],
        )?;

        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    pub fn recent_capacity(&self) -> usize {
        self.recent_capacity
    }

    // Bookmarks

    /// Insert a bookmark, or overwrite the stored copy if the ISBN is already saved.
    /// An overwritten bookmark keeps its original position.
    pub fn save_bookmark<T: StoredRecord>(&self, record: &T) -> Result<()> {
        let isbn = checked_isbn(record.isbn())?;
        let data = serde_json::to_string(record)?;

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO bookmarks (isbn, title, data, saved_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(isbn) DO UPDATE SET
                title = excluded.title,
                data = excluded.data",
            params![isbn, record.title(), data, Utc::now().timestamp_millis()],
        )?;

        debug!("Saved bookmark {}", isbn);
        Ok(())
    }

    /// All bookmarks in the order they were first saved
    pub fn fetch_bookmarks<T: StoredRecord>(&self) -> Result<Vec<T>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT isbn, data FROM bookmarks ORDER BY rowid")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows
            .into_iter()
            .filter_map(|(isbn, data)| decode_snapshot(&isbn, &data))
            .collect())
    }

    pub fn get_bookmark<T: StoredRecord>(&self, isbn: &str) -> Result<Option<T>> {
        let isbn = isbn.trim();
        let conn = self.conn()?;
        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM bookmarks WHERE isbn = ?1",
                params![isbn],
                |row| row.get(0),
            )
            .optional()?;

        Ok(data.and_then(|data| decode_snapshot(isbn, &data)))
    }

    pub fn is_bookmarked(&self, isbn: &str) -> Result<bool> {
        let isbn = isbn.trim();
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM bookmarks WHERE isbn = ?1",
            params![isbn],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn bookmark_count(&self) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM bookmarks", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Remove a bookmark. Returns whether anything was deleted; a missing ISBN is not an error.
    pub fn delete_bookmark(&self, isbn: &str) -> Result<bool> {
        let isbn = isbn.trim();
        let conn = self.conn()?;
        let removed = conn.execute("DELETE FROM bookmarks WHERE isbn = ?1", params![isbn])?;

        if removed > 0 {
            debug!("Deleted bookmark {}", isbn);
        } else {
            debug!("No bookmark to delete for {}", isbn);
        }
        Ok(removed > 0)
    }

    // Recently viewed

    /// Record that a book was opened just now
    pub fn record_recent_view<T: StoredRecord>(&self, record: &T) -> Result<()> {
        self.record_recent_view_at(record, Utc::now())
    }

    /// Record a view at an explicit time.
    ///
    /// Re-viewing a book moves it to the front instead of adding a second
    /// entry. A view older than the stored one never moves it backwards.
    pub fn record_recent_view_at<T: StoredRecord>(
        &self,
        record: &T,
        viewed_at: DateTime<Utc>,
    ) -> Result<()> {
        let isbn = checked_isbn(record.isbn())?;
        let data = serde_json::to_string(record)?;

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO recent_views (isbn, title, data, viewed_at, seq)
             VALUES (?1, ?2, ?3, ?4, (SELECT COALESCE(MAX(seq), 0) + 1 FROM recent_views))
             ON CONFLICT(isbn) DO UPDATE SET
                title = excluded.title,
                data = excluded.data,
                viewed_at = MAX(recent_views.viewed_at, excluded.viewed_at),
                seq = excluded.seq",
            params![isbn, record.title(), data, viewed_at.timestamp_millis()],
        )?;

        let pruned = prune_recents(&tx, self.recent_capacity)?;
        tx.commit()?;

        if pruned > 0 {
            debug!("Pruned {} recently viewed entries", pruned);
        }
        Ok(())
    }

    /// Recently viewed records, most recent first
    pub fn fetch_recent_views<T: StoredRecord>(&self) -> Result<Vec<T>> {
        Ok(self
            .fetch_recent_entries()?
            .into_iter()
            .map(|entry| entry.record)
            .collect())
    }

    /// Like [`fetch_recent_views`](Self::fetch_recent_views), with view times
    pub fn fetch_recent_entries<T: StoredRecord>(&self) -> Result<Vec<RecentView<T>>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT isbn, data, viewed_at FROM recent_views
             ORDER BY viewed_at DESC, seq DESC
             LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![self.recent_capacity as i64], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows
            .into_iter()
            .filter_map(|(isbn, data, millis)| {
                let record = decode_snapshot(&isbn, &data)?;
                let viewed_at = DateTime::<Utc>::from_timestamp_millis(millis)?;
                Some(RecentView { record, viewed_at })
            })
            .collect())
    }

    pub fn get_recent_view<T: StoredRecord>(&self, isbn: &str) -> Result<Option<RecentView<T>>> {
        let isbn = isbn.trim();
        let conn = self.conn()?;
        let row: Option<(String, i64)> = conn
            .query_row(
                "SELECT data, viewed_at FROM recent_views WHERE isbn = ?1",
                params![isbn],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        Ok(row.and_then(|(data, millis)| {
            Some(RecentView {
                record: decode_snapshot(isbn, &data)?,
                viewed_at: DateTime::<Utc>::from_timestamp_millis(millis)?,
            })
        }))
    }

    pub fn clear_recent_views(&self) -> Result<usize> {
        let conn = self.conn()?;
        let removed = conn.execute("DELETE FROM recent_views", [])?;
        debug!("Cleared {} recently viewed entries", removed);
        Ok(removed)
    }
}

/// Drop everything beyond the `capacity` most recent views
fn prune_recents(conn: &Connection, capacity: usize) -> Result<usize> {
    let removed = conn.execute(
        "DELETE FROM recent_views WHERE isbn NOT IN (
            SELECT isbn FROM recent_views
            ORDER BY viewed_at DESC, seq DESC
            LIMIT ?1
        )",
        params![capacity as i64],
    )?;
    Ok(removed)
}

/// Rows are keyed by the trimmed ISBN; lookups trim the same way
fn checked_isbn(isbn: &str) -> Result<&str> {
    let isbn = isbn.trim();
    if isbn.is_empty() {
        return Err(StoreError::InvalidRecord("record has no ISBN".into()));
    }
    Ok(isbn)
}

/// A row that no longer decodes is skipped rather than failing the whole read
fn decode_snapshot<T: DeserializeOwned>(isbn: &str, data: &str) -> Option<T> {
    match serde_json::from_str(data) {
        Ok(record) => Some(record),
        Err(e) => {
            warn!("Skipping unreadable stored record {}: {}", isbn, e);
            None
        }
    }
}
