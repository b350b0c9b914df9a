//! Schema creation and migration of stores written by older versions.
//!
//! Older stores declared `files` without any uniqueness on `name` and may hold
//! several rows per name. Opening such a store collapses each name to its
//! newest row and adds the unique index the upsert relies on. The table itself
//! keeps its shape, so older readers can still use the file.

use rusqlite::{Connection, TransactionBehavior};
use tracing::info;

pub(crate) const FILES_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS files (
  name TEXT NOT NULL,
  data BLOB,
  lastModified INTEGER
);
"#;

pub(crate) const UNIQUE_NAME_INDEX: &str =
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_files_name ON files(name)";

const DELETE_SHADOWED_ROWS: &str = r#"
DELETE FROM files
WHERE rowid NOT IN (SELECT MAX(rowid) FROM files GROUP BY name)
"#;

/// Create the `files` table if absent and make `name` unique.
pub(crate) fn init_schema_impl(conn: &mut Connection) -> rusqlite::Result<()> {
    // IMMEDIATE takes the write lock up front so two processes opening the
    // same legacy store don't both try to migrate it.
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    tx.execute_batch(FILES_SCHEMA)?;

    if !has_unique_name_index_impl(&tx)? {
        let removed = tx.execute(DELETE_SHADOWED_ROWS, [])?;
        tx.execute(UNIQUE_NAME_INDEX, [])?;
        if removed > 0 {
            info!(removed, "collapsed duplicate cache rows from legacy store");
        }
    }

    tx.commit()
}

/// Whether some full (non-partial) unique index on `files` covers exactly the
/// `name` column. Only such an index can serve `ON CONFLICT(name)`.
pub(crate) fn has_unique_name_index_impl(conn: &Connection) -> rusqlite::Result<bool> {
    let mut stmt = conn.prepare("PRAGMA index_list(files)")?;
    let indexes = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(1)?,
            row.get::<_, bool>(2)?,
            row.get::<_, bool>(4)?,
        ))
    })?;

    for index in indexes {
        let (index_name, unique, partial) = index?;
        if !unique || partial {
            continue;
        }
        if get_index_columns_impl(conn, &index_name)? == [Some("name".to_string())] {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Column names of `index` in key order. Expression terms have no name.
pub(crate) fn get_index_columns_impl(
    conn: &Connection,
    index: &str,
) -> rusqlite::Result<Vec<Option<String>>> {
    let mut stmt = conn.prepare(&format!(
        "PRAGMA index_info(\"{}\")",
        index.replace('"', "\"\"")
    ))?;
    let cols = stmt.query_map([], |row| row.get::<_, Option<String>>(2))?;
    cols.collect()
}
