//! SQLite database for meshgate records

use crate::store::{Collection, Precondition, RecordStore};
use crate::Result;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Database wrapper for record persistence
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;

        // Enable WAL mode for better concurrency
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.init_schema()?;

        info!("Opened database at {:?}", path.as_ref());
        Ok(db)
    }

    /// Open in-memory database (for testing)
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.init_schema()?;
        Ok(db)
    }

    /// Initialize database schema
    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        let mut ddl = String::new();
        for collection in Collection::ALL {
            ddl.push_str(&format!(
                r#"
                CREATE TABLE IF NOT EXISTS {table} (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    id TEXT NOT NULL UNIQUE,
                    body TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL
                );
                "#,
                table = collection.table()
            ));
        }
        conn.execute_batch(&ddl)?;

        debug!("Database schema initialized");
        Ok(())
    }

    fn upsert(conn: &Connection, collection: Collection, id: &str, body: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        conn.execute(
            &format!(
                "INSERT INTO {} (id, body, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)
                 ON CONFLICT(id) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at",
                collection.table()
            ),
            params![id, body, now],
        )?;
        Ok(())
    }

    fn read(conn: &Connection, collection: Collection, id: &str) -> Result<Option<String>> {
        let body = conn
            .query_row(
                &format!("SELECT body FROM {} WHERE id = ?1", collection.table()),
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(body)
    }
}

impl RecordStore for Database {
    fn get_raw(&self, collection: Collection, id: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();
        Self::read(&conn, collection, id)
    }

    fn put_raw(&self, collection: Collection, id: &str, body: &str) -> Result<()> {
        let conn = self.conn.lock();
        Self::upsert(&conn, collection, id, body)?;
        debug!("Stored {} record {}", collection, id);
        Ok(())
    }

    fn put_batch_if(
        &self,
        expected: &[Precondition],
        records: &[(Collection, String, String)],
    ) -> Result<bool> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for check in expected {
            if Self::read(&tx, check.collection, &check.id)? != check.body {
                debug!("Precondition on {} record {} no longer holds", check.collection, check.id);
                return Ok(false);
            }
        }
        for (collection, id, body) in records {
            Self::upsert(&tx, *collection, id, body)?;
        }
        tx.commit()?;
        debug!("Stored {} records in one transaction", records.len());
        Ok(true)
    }

    fn delete_raw(&self, collection: Collection, id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn.execute(
            &format!("DELETE FROM {} WHERE id = ?1", collection.table()),
            params![id],
        )?;

        if rows > 0 {
            debug!("Deleted {} record {}", collection, id);
        }

        Ok(rows > 0)
    }

    fn list_raw(&self, collection: Collection) -> Result<Vec<(String, String)>> {
        let conn = self.conn.lock();

        let mut stmt = conn.prepare(&format!(
            "SELECT id, body FROM {} ORDER BY seq ASC",
            collection.table()
        ))?;

        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Collection;

    #[test]
    fn test_crud() {
        let db = Database::open_memory().unwrap();

        db.put_raw(Collection::Users, "alice", r#"{"v":1}"#).unwrap();
        db.put_raw(Collection::Users, "bob", r#"{"v":2}"#).unwrap();

        // Upsert keeps the original insertion slot
        db.put_raw(Collection::Users, "alice", r#"{"v":3}"#).unwrap();
        assert_eq!(
            db.get_raw(Collection::Users, "alice").unwrap().as_deref(),
            Some(r#"{"v":3}"#)
        );

        let rows = db.list_raw(Collection::Users).unwrap();
        let ids: Vec<_> = rows.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["alice", "bob"]);

        // Collections are isolated
        assert!(db.get_raw(Collection::Hosts, "alice").unwrap().is_none());

        assert!(db.delete_raw(Collection::Users, "alice").unwrap());
        assert!(!db.delete_raw(Collection::Users, "alice").unwrap());
    }

    #[test]
    fn test_batch_is_atomic() {
        let db = Database::open_memory().unwrap();
        db.put_batch(&[
            (Collection::Users, "a".into(), "{}".into()),
            (Collection::System, "k".into(), "\"v\"".into()),
        ])
        .unwrap();
        assert!(db.get_raw(Collection::Users, "a").unwrap().is_some());
        assert!(db.get_raw(Collection::System, "k").unwrap().is_some());
    }

    #[test]
    fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");
        {
            let db = Database::open(&path).unwrap();
            db.put_raw(Collection::Nodes, "n1", "{}").unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert!(db.get_raw(Collection::Nodes, "n1").unwrap().is_some());
    }
}
