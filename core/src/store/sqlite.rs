use super::{DocumentStore, SaveSummary};
use crate::error::{PersistError, PersistResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// Saves kept as rows of a SQLite database.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> PersistResult<Self> {
        let conn = Connection::open(path)?;
        // WAL mode only matters for real files; :memory: ignores it.
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> PersistResult<Self> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.migrate()?;
        Ok(store)
    }

    /// Apply all schema migrations in order. Idempotent.
    pub fn migrate(&self) -> PersistResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_documents.sql"))?;
        Ok(())
    }
}

impl DocumentStore for SqliteStore {
    fn write(&self, name: &str, body: &str) -> PersistResult<()> {
        self.conn.execute(
            "INSERT INTO save_document (name, body, bytes, saved_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(name) DO UPDATE SET
                body = excluded.body,
                bytes = excluded.bytes,
                saved_at = excluded.saved_at",
            params![name, body, body.len() as i64, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn read(&self, name: &str) -> PersistResult<Option<String>> {
        let body = self
            .conn
            .query_row(
                "SELECT body FROM save_document WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(body)
    }

    fn list(&self) -> PersistResult<Vec<SaveSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT name, bytes, saved_at FROM save_document
             ORDER BY saved_at DESC, name ASC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?, row.get::<_, String>(2)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(name, bytes, saved_at)| {
                let saved_at = DateTime::parse_from_rfc3339(&saved_at)
                    .map_err(|e| PersistError::Other(anyhow::anyhow!("bad timestamp for save '{name}': {e}")))?
                    .with_timezone(&Utc);
                Ok(SaveSummary {
                    name,
                    saved_at,
                    bytes: bytes as usize,
                })
            })
            .collect()
    }

    fn delete(&self, name: &str) -> PersistResult<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM save_document WHERE name = ?1", params![name])?;
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_overwrites_by_name() {
        let store = SqliteStore::in_memory().unwrap();
        store.write("slot", "one").unwrap();
        store.write("slot", "two!").unwrap();

        assert_eq!(store.read("slot").unwrap().as_deref(), Some("two!"));
        let list = store.list().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].bytes, 4);
    }

    #[test]
    fn migrate_twice_is_harmless() {
        let store = SqliteStore::in_memory().unwrap();
        store.migrate().unwrap();
        assert!(store.list().unwrap().is_empty());
    }
}
