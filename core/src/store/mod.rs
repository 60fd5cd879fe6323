//! Save-document storage.
//!
//! RULE: only the store modules touch the database or the save folder.
//! The engine hands them finished document text and gets text back.

mod file;
mod sqlite;

pub use file::FileStore;
pub use sqlite::SqliteStore;

use crate::error::PersistResult;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// One stored save, as listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaveSummary {
    pub name:     String,
    pub saved_at: DateTime<Utc>,
    pub bytes:    usize,
}

pub trait DocumentStore {
    /// Write (or overwrite) the document stored under `name`.
    fn write(&self, name: &str, body: &str) -> PersistResult<()>;

    /// `None` when nothing is stored under `name`.
    fn read(&self, name: &str) -> PersistResult<Option<String>>;

    /// Every stored save, newest first.
    fn list(&self) -> PersistResult<Vec<SaveSummary>>;

    /// Returns whether anything was deleted.
    fn delete(&self, name: &str) -> PersistResult<bool>;
}
