use super::{DocumentStore, SaveSummary};
use crate::{config::PersistConfig, error::PersistResult};
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Saves kept as one file per save under a folder, named by
/// `PersistConfig::save_file_name`.
pub struct FileStore {
    dir:    PathBuf,
    config: PersistConfig,
}

impl FileStore {
    /// The folder is created on first write.
    pub fn new(dir: impl Into<PathBuf>, config: PersistConfig) -> Self {
        Self {
            dir: dir.into(),
            config,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(self.config.save_file_name(name))
    }
}

impl DocumentStore for FileStore {
    fn write(&self, name: &str, body: &str) -> PersistResult<()> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(self.path_for(name), body)?;
        Ok(())
    }

    fn read(&self, name: &str) -> PersistResult<Option<String>> {
        match std::fs::read_to_string(self.path_for(name)) {
            Ok(body) => Ok(Some(body)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self) -> PersistResult<Vec<SaveSummary>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut saves = Vec::new();
        for entry in entries {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str().and_then(|f| self.config.save_name_of(f)) else {
                continue;
            };
            let meta = entry.metadata()?;
            if !meta.is_file() {
                continue;
            }
            saves.push(SaveSummary {
                name,
                saved_at: DateTime::<Utc>::from(meta.modified()?),
                bytes: meta.len() as usize,
            });
        }
        saves.sort_by(|a, b| b.saved_at.cmp(&a.saved_at).then_with(|| a.name.cmp(&b.name)));
        Ok(saves)
    }

    fn delete(&self, name: &str) -> PersistResult<bool> {
        match std::fs::remove_file(self.path_for(name)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
