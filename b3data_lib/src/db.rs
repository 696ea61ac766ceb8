//! SQLite storage behind the [`Persister`] port.
//!
//! Each `(filepath, table)` pair is a table in a SQLite file. Tables are
//! schemaless from our side: the column set of a save is the union of the row
//! keys, and every save replaces the previous contents.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params_from_iter, Connection, OptionalExtension};

use crate::ports::{Persister, StoreError};
use crate::record::{Record, Scalar};

/// File-backed table store.
///
/// Connections are opened per call, so one store can serve any number of
/// database files. Writes from different threads are serialized by the store;
/// reads are not and see the last committed save.
pub struct SqliteStore {
    /// Serializes writers; readers open their own connections.
    write_lock: Mutex<()>,
}

impl Default for SqliteStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SqliteStore {
    /// Create a store. No file is touched until the first load or save.
    pub fn new() -> Self {
        Self {
            write_lock: Mutex::new(()),
        }
    }

    /// Open (creating if needed) the database at `path` in WAL mode.
    fn open(path: &Path) -> Result<Connection, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
        Ok(conn)
    }

    /// Append `rows` to the table (load + extend + replace) under the write lock.
    ///
    /// The table is rewritten as a whole, so rows with new columns widen the
    /// schema and earlier rows read those columns as null.
    pub fn append(&self, filepath: &Path, table: &str, rows: &[Record]) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut all = self.load(filepath, table)?;
        all.extend(rows.iter().cloned());
        replace_table(filepath, table, &all)
    }

    /// Row count of a table. Zero when it does not exist.
    pub fn count(&self, filepath: &Path, table: &str) -> Result<i64, StoreError> {
        let conn = Self::open(filepath)?;
        if !table_exists(&conn, table)? {
            return Ok(0);
        }
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
        Ok(conn.query_row(&sql, [], |row| row.get(0))?)
    }
}

impl Persister for SqliteStore {
    /// Read every row of `table`, in storage order, with the cells typed as
    /// SQLite stored them. A missing table reads as empty.
    fn load(&self, filepath: &Path, table: &str) -> Result<Vec<Record>, StoreError> {
        let conn = Self::open(filepath)?;
        if !table_exists(&conn, table)? {
            return Ok(Vec::new());
        }
        let sql = format!("SELECT * FROM {}", quote_ident(table));
        let mut stmt = conn.prepare(&sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let rows = stmt.query_map([], |row| {
            let mut record = Record::new();
            for (i, name) in columns.iter().enumerate() {
                record.insert(name.clone(), row.get::<_, Scalar>(i)?);
            }
            Ok(record)
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Replace the contents of `table` with `rows` in a single transaction.
    ///
    /// The column set is the union of the row keys; a row lacking a column
    /// stores null there. Saving no rows leaves no table behind.
    fn save(&self, filepath: &Path, table: &str, rows: &[Record]) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        replace_table(filepath, table, rows)
    }
}

/// Drop, recreate and fill `table` inside one transaction.
///
/// Columns are declared without a type, so every cell keeps the storage class
/// it was written with.
fn replace_table(filepath: &Path, table: &str, rows: &[Record]) -> Result<(), StoreError> {
    let mut conn = SqliteStore::open(filepath)?;
    let tx = conn.transaction()?;
    tx.execute(&format!("DROP TABLE IF EXISTS {}", quote_ident(table)), [])?;

    let columns: BTreeSet<&str> = rows
        .iter()
        .flat_map(|row| row.keys().map(String::as_str))
        .collect();
    if !columns.is_empty() {
        let column_list = columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        tx.execute(
            &format!("CREATE TABLE {} ({})", quote_ident(table), column_list),
            [],
        )?;

        let placeholders = (1..=columns.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let mut stmt = tx.prepare(&format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(table),
            column_list,
            placeholders
        ))?;
        for row in rows {
            stmt.execute(params_from_iter(
                columns.iter().map(|c| row.get(*c).unwrap_or(&Scalar::Null)),
            ))?;
        }
    }

    tx.commit()?;
    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool, StoreError> {
    let found: Option<String> = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [table],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Quote an identifier for interpolation into SQL.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, Scalar)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn missing_table_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        let store = SqliteStore::new();
        assert!(store.load(&path, "statements").unwrap().is_empty());
        assert_eq!(store.count(&path, "statements").unwrap(), 0);
    }

    #[test]
    fn save_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        let store = SqliteStore::new();

        let first = vec![
            row(&[("a", Scalar::Integer(1)), ("b", "x".into())]),
            row(&[("a", Scalar::Integer(2)), ("b", "y".into())]),
        ];
        store.save(&path, "t", &first).unwrap();
        assert_eq!(store.load(&path, "t").unwrap(), first);

        let second = vec![row(&[("c", Scalar::Real(1.5))])];
        store.save(&path, "t", &second).unwrap();
        assert_eq!(store.load(&path, "t").unwrap(), second);
    }

    #[test]
    fn heterogeneous_rows_fill_missing_with_null() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        let store = SqliteStore::new();

        let rows = vec![
            row(&[("a", Scalar::Integer(1))]),
            row(&[("b", "only b".into())]),
        ];
        store.save(&path, "t", &rows).unwrap();
        let loaded = store.load(&path, "t").unwrap();
        assert_eq!(loaded[0]["b"], Scalar::Null);
        assert_eq!(loaded[1]["a"], Scalar::Null);
        assert_eq!(loaded[1]["b"], Scalar::Text("only b".into()));
    }

    #[test]
    fn append_extends_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        let store = SqliteStore::new();

        store
            .append(&path, "t", &[row(&[("a", Scalar::Integer(1))])])
            .unwrap();
        store
            .append(&path, "t", &[row(&[("a", Scalar::Integer(2))])])
            .unwrap();
        assert_eq!(store.count(&path, "t").unwrap(), 2);
    }

    #[test]
    fn saving_no_rows_drops_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        let store = SqliteStore::new();
        store
            .save(&path, "t", &[row(&[("a", Scalar::Integer(1))])])
            .unwrap();
        store.save(&path, "t", &[]).unwrap();
        assert!(store.load(&path, "t").unwrap().is_empty());
    }

    #[test]
    fn odd_identifiers_are_quoted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        let store = SqliteStore::new();
        let rows = vec![row(&[("weird \"col\"", "v".into())])];
        store.save(&path, "my table", &rows).unwrap();
        assert_eq!(store.load(&path, "my table").unwrap(), rows);
    }
}
