//! SQLite storage implementation.
//!
//! One connection guarded by a mutex; every write goes through an
//! IMMEDIATE transaction so concurrent tracker workers serialize on the
//! write lock instead of failing mid-unit.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, Row, Transaction, TransactionBehavior, params};
use serde_json::Value;

use super::schema::apply_schema;
use super::store::{Collection, Store, StoreTx, StoredRecord};
use crate::error::{Error, Result};

/// SQLite-based storage backend.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open a database at the given path.
    ///
    /// Creates the database and applies schema if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, None)
    }

    /// Open a database with an optional busy timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open_with_timeout(path: &Path, timeout_ms: Option<u64>) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        let timeout = timeout_ms.map_or(Duration::from_secs(5), Duration::from_millis);
        conn.busy_timeout(timeout)?;

        apply_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the lock cannot leave SQLite half-written:
        // the open transaction rolls back when dropped.
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Store for SqliteStore {
    fn transaction<R, F>(&self, op: &str, f: F) -> Result<R>
    where
        F: FnOnce(&mut dyn StoreTx) -> Result<R>,
    {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut unit = SqliteTx { tx: &tx };
        match f(&mut unit) {
            Ok(result) => {
                tx.commit()?;
                Ok(result)
            }
            Err(err) => {
                tracing::debug!(op, error = %err, "Rolling back unit of work");
                tx.rollback()?;
                Err(err)
            }
        }
    }

    fn read<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&dyn StoreTx) -> Result<R>,
    {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
        let result = f(&SqliteTx { tx: &tx });
        tx.rollback()?;
        result
    }
}

/// A unit of work bound to one SQLite transaction.
struct SqliteTx<'a> {
    tx: &'a Transaction<'a>,
}

const COLUMNS: &str = "id, key, parent_id, body, created_at, updated_at";

fn map_record(row: &Row<'_>) -> rusqlite::Result<(i64, String, Option<i64>, String, i64, i64)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn into_record(
    (id, key, parent_id, body, created_at, updated_at): (i64, String, Option<i64>, String, i64, i64),
) -> Result<StoredRecord> {
    Ok(StoredRecord {
        id,
        key,
        parent_id,
        body: serde_json::from_str(&body)?,
        created_at,
        updated_at,
    })
}

impl StoreTx for SqliteTx<'_> {
    fn find_by_key(&self, collection: Collection, key: &str) -> Result<Option<StoredRecord>> {
        let sql = format!("SELECT {COLUMNS} FROM {} WHERE key = ?1", collection.table());
        self.tx
            .query_row(&sql, [key], map_record)
            .optional()?
            .map(into_record)
            .transpose()
    }

    fn get(&self, collection: Collection, id: i64) -> Result<Option<StoredRecord>> {
        let sql = format!("SELECT {COLUMNS} FROM {} WHERE id = ?1", collection.table());
        self.tx
            .query_row(&sql, [id], map_record)
            .optional()?
            .map(into_record)
            .transpose()
    }

    fn insert(
        &mut self,
        collection: Collection,
        key: &str,
        parent_id: Option<i64>,
        body: &Value,
    ) -> Result<i64> {
        let now = chrono::Utc::now().timestamp_millis();
        let sql = format!(
            "INSERT INTO {} (key, parent_id, body, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?4)",
            collection.table()
        );
        self.tx
            .execute(&sql, params![key, parent_id, body.to_string(), now])?;
        Ok(self.tx.last_insert_rowid())
    }

    fn update(&mut self, collection: Collection, id: i64, body: &Value) -> Result<()> {
        let now = chrono::Utc::now().timestamp_millis();
        let sql = format!(
            "UPDATE {} SET body = ?1, updated_at = ?2 WHERE id = ?3",
            collection.table()
        );
        let rows = self.tx.execute(&sql, params![body.to_string(), now, id])?;
        if rows == 0 {
            return Err(Error::Other(format!(
                "no {} record with id {id}",
                collection.table()
            )));
        }
        Ok(())
    }

    fn list(&self, collection: Collection, parent_id: Option<i64>) -> Result<Vec<StoredRecord>> {
        let table = collection.table();
        let rows = match parent_id {
            Some(parent) => {
                let mut stmt = self.tx.prepare(&format!(
                    "SELECT {COLUMNS} FROM {table} WHERE parent_id = ?1 ORDER BY id"
                ))?;
                stmt.query_map([parent], map_record)?
                    .collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => {
                let mut stmt = self
                    .tx
                    .prepare(&format!("SELECT {COLUMNS} FROM {table} ORDER BY id"))?;
                stmt.query_map([], map_record)?
                    .collect::<rusqlite::Result<Vec<_>>>()?
            }
        };
        rows.into_iter().map(into_record).collect()
    }

    fn count(&self, collection: Collection, parent_id: Option<i64>) -> Result<usize> {
        let table = collection.table();
        let count: i64 = match parent_id {
            Some(parent) => self.tx.query_row(
                &format!("SELECT COUNT(*) FROM {table} WHERE parent_id = ?1"),
                [parent],
                |row| row.get(0),
            )?,
            None => self
                .tx
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?,
        };
        Ok(usize::try_from(count).unwrap_or_default())
    }
}
