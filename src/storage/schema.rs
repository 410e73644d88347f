//! Database schema definitions.
//!
//! Every collection gets the same table shape: an integer id, a unique
//! dedup key, an optional parent id and a JSON body.

use rusqlite::{Connection, Result};

use super::store::Collection;

/// Current schema version for migration tracking.
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

const VERSION_TABLE: &str = "
CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at INTEGER NOT NULL
);
";

/// DDL for one collection table.
fn table_sql(collection: Collection) -> String {
    let table = collection.table();
    let parent = match collection.parent() {
        Some(p) => format!(
            "    parent_id INTEGER REFERENCES {}(id) ON DELETE CASCADE,\n",
            p.table()
        ),
        None => "    parent_id INTEGER,\n".to_string(),
    };

    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    key TEXT NOT NULL UNIQUE,
{parent}    body TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_{table}_parent ON {table}(parent_id);
"
    )
}

/// The complete schema, parents before children.
#[must_use]
pub fn schema_sql() -> String {
    let mut sql = VERSION_TABLE.to_string();
    for collection in Collection::ALL {
        sql.push_str(&table_sql(collection));
    }
    sql
}

/// Apply pragmas and the schema to a connection.
///
/// # Errors
///
/// Returns an error if a pragma or DDL statement fails.
pub fn apply_schema(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;

    conn.execute_batch(&schema_sql())?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
        rusqlite::params![
            format!("v{CURRENT_SCHEMA_VERSION}"),
            chrono::Utc::now().timestamp_millis()
        ],
    )?;

    Ok(())
}
