//! SQLite persistence for analysis archives and reports.
//!
//! Two tables of identical shape, one per [`RecordKind`]:
//!
//! ```sql
//! CREATE TABLE analyses (
//!     id INTEGER PRIMARY KEY AUTOINCREMENT,
//!     owner_id INTEGER NOT NULL,
//!     name TEXT NOT NULL,
//!     date TEXT NOT NULL,
//!     blob BLOB NOT NULL
//! );
//! ```
//!
//! Blobs are stored as given and come back byte for byte. Dates are stored as
//! `YYYY-MM-DD HH:MM:SS`, which sorts chronologically as text.

use chrono::NaiveDateTime;
use rusqlite::{Connection, OptionalExtension as _, params};
use serde::Serialize;
use std::fmt;
use std::path::Path;

use crate::error::{GurneyError, Result, ResultExt as _};

pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RecordKind {
    Analysis,
    Report,
}

impl RecordKind {
    fn table(self) -> &'static str {
        match self {
            Self::Analysis => "analyses",
            Self::Report => "reports",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Analysis => f.write_str("analysis"),
            Self::Report => f.write_str("report"),
        }
    }
}

/// A stored row without its blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordSummary {
    pub id: i64,
    pub owner_id: i64,
    pub name: String,
    pub date: String,
    pub size_bytes: u64,
}

/// A stored row with its blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    pub id: i64,
    pub owner_id: i64,
    pub name: String,
    pub date: String,
    pub blob: Vec<u8>,
}

pub struct RecordStore {
    conn: Connection,
}

impl fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordStore")
            .field("path", &self.conn.path())
            .finish()
    }
}

impl RecordStore {
    /// Opens (or creates) the database at `path` and ensures the schema.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database {}", path.display()))?;
        let store = Self { conn };
        store.init_schema()?;
        tracing::debug!(path = %path.display(), "Record store opened");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to create in-memory database")?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        for kind in [RecordKind::Analysis, RecordKind::Report] {
            let table = kind.table();
            self.conn
                .execute_batch(&format!(
                    "CREATE TABLE IF NOT EXISTS {table} (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        owner_id INTEGER NOT NULL,
                        name TEXT NOT NULL,
                        date TEXT NOT NULL,
                        blob BLOB NOT NULL
                    );
                    CREATE INDEX IF NOT EXISTS idx_{table}_owner ON {table}(owner_id);"
                ))
                .with_context(|| format!("Failed to create table {table}"))?;
        }
        Ok(())
    }

    /// Inserts a record and returns its id.
    pub fn store(
        &mut self,
        kind: RecordKind,
        owner_id: i64,
        name: &str,
        timestamp: NaiveDateTime,
        blob: &[u8],
    ) -> Result<i64> {
        let table = kind.table();
        let date = timestamp.format(DATE_FORMAT).to_string();

        let tx = self.conn.transaction()?;
        tx.execute(
            &format!("INSERT INTO {table} (owner_id, name, date, blob) VALUES (?1, ?2, ?3, ?4)"),
            params![owner_id, name, date, blob],
        )
        .with_context(|| format!("Failed to store {kind} '{name}'"))?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        tracing::info!(kind = %kind, id, owner_id, name, bytes = blob.len(), "Record stored");
        Ok(id)
    }

    /// Loads the blob of record `id`.
    ///
    /// # Errors
    ///
    /// [`GurneyError::NotFound`] when no such record exists.
    pub fn fetch(&self, kind: RecordKind, id: i64) -> Result<Vec<u8>> {
        Ok(self.fetch_record(kind, id)?.blob)
    }

    pub fn fetch_record(&self, kind: RecordKind, id: i64) -> Result<StoredRecord> {
        let table = kind.table();
        self.conn
            .query_row(
                &format!("SELECT id, owner_id, name, date, blob FROM {table} WHERE id = ?1"),
                params![id],
                |row| {
                    Ok(StoredRecord {
                        id: row.get(0)?,
                        owner_id: row.get(1)?,
                        name: row.get(2)?,
                        date: row.get(3)?,
                        blob: row.get(4)?,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| GurneyError::NotFound {
                kind: kind.to_string(),
                id,
            })
    }

    /// Records of `owner_id`, newest first.
    pub fn list_for_owner(&self, kind: RecordKind, owner_id: i64) -> Result<Vec<RecordSummary>> {
        let table = kind.table();
        let mut stmt = self.conn.prepare(&format!(
            "SELECT id, owner_id, name, date, length(blob) FROM {table}
             WHERE owner_id = ?1 ORDER BY date DESC, id DESC"
        ))?;
        let rows = stmt.query_map(params![owner_id], |row| {
            let size: i64 = row.get(4)?;
            Ok(RecordSummary {
                id: row.get(0)?,
                owner_id: row.get(1)?,
                name: row.get(2)?,
                date: row.get(3)?,
                size_bytes: u64::try_from(size).unwrap_or_default(),
            })
        })?;
        let records = rows.collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Removes record `id`.
    ///
    /// # Errors
    ///
    /// [`GurneyError::NotFound`] when no row was deleted.
    pub fn delete(&mut self, kind: RecordKind, id: i64) -> Result<()> {
        let table = kind.table();
        let deleted = self
            .conn
            .execute(&format!("DELETE FROM {table} WHERE id = ?1"), params![id])?;
        if deleted == 0 {
            return Err(GurneyError::NotFound {
                kind: kind.to_string(),
                id,
            });
        }
        tracing::info!(kind = %kind, id, "Record deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, day)
            .and_then(|d| d.and_hms_opt(10, 30, 0))
            .expect("valid timestamp")
    }

    #[test]
    fn test_store_and_fetch() -> anyhow::Result<()> {
        let mut store = RecordStore::open_in_memory()?;
        let id = store.store(RecordKind::Analysis, 7, "egresos.csv", at(1), b"PK\x03\x04")?;
        assert_eq!(store.fetch(RecordKind::Analysis, id)?, b"PK\x03\x04");

        let record = store.fetch_record(RecordKind::Analysis, id)?;
        assert_eq!(record.date, "2024-05-01 10:30:00");
        assert_eq!(record.owner_id, 7);
        Ok(())
    }

    #[test]
    fn test_kinds_are_separate_tables() -> anyhow::Result<()> {
        let mut store = RecordStore::open_in_memory()?;
        let id = store.store(RecordKind::Analysis, 1, "a", at(1), b"x")?;
        assert!(matches!(
            store.fetch(RecordKind::Report, id),
            Err(GurneyError::NotFound { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_list_newest_first_per_owner() -> anyhow::Result<()> {
        let mut store = RecordStore::open_in_memory()?;
        store.store(RecordKind::Analysis, 1, "old", at(1), b"1")?;
        store.store(RecordKind::Analysis, 1, "new", at(9), b"22")?;
        store.store(RecordKind::Analysis, 2, "other", at(5), b"333")?;

        let listed = store.list_for_owner(RecordKind::Analysis, 1)?;
        let names: Vec<&str> = listed.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["new", "old"]);
        assert_eq!(listed[0].size_bytes, 2);
        assert!(store.list_for_owner(RecordKind::Report, 1)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_delete_missing_is_not_found() -> anyhow::Result<()> {
        let mut store = RecordStore::open_in_memory()?;
        let id = store.store(RecordKind::Report, 3, "informe.pdf", at(2), b"%PDF")?;
        store.delete(RecordKind::Report, id)?;
        assert!(matches!(
            store.delete(RecordKind::Report, id),
            Err(GurneyError::NotFound { id: missing, .. }) if missing == id
        ));
        Ok(())
    }

    #[test]
    fn test_reopen_keeps_records() -> anyhow::Result<()> {
        let dir = tempfile::TempDir::new()?;
        let path = dir.path().join("nested").join("gurney.db");
        let id = {
            let mut store = RecordStore::open(&path)?;
            store.store(RecordKind::Analysis, 1, "a", at(3), &[0u8; 16])?
        };
        let store = RecordStore::open(&path)?;
        assert_eq!(store.fetch(RecordKind::Analysis, id)?.len(), 16);
        Ok(())
    }
}
