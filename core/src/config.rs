//! Persistence settings: file naming, codegen output layout, document
//! formatting, identity token seeding.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistConfig {
    /// Appended to a save name to form its file stem.
    pub save_suffix:           String,
    pub save_extension:        String,
    /// Root folder for rendered mirror and preset source.
    pub generated_code_dir:    String,
    /// Put each type's rendered source in its own subfolder.
    pub type_subfolders:       bool,
    pub type_subfolder_suffix: String,
    pub data_suffix:           String,
    pub preset_suffix:         String,
    pub pretty_documents:      bool,
    /// Seed for reproducible identity tokens. `None` uses uuid v4.
    pub id_seed:               Option<u64>,
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            save_suffix:           "_graph".to_string(),
            save_extension:        "json".to_string(),
            generated_code_dir:    "generated".to_string(),
            type_subfolders:       true,
            type_subfolder_suffix: "_generated".to_string(),
            data_suffix:           "Data".to_string(),
            preset_suffix:         "Preset".to_string(),
            pretty_documents:      true,
            id_seed:               None,
        }
    }
}

impl PersistConfig {
    /// Load from a JSON file. Missing keys fall back to defaults.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: PersistConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Default settings with a fixed identity seed (tests, demo runs).
    pub fn seeded(seed: u64) -> Self {
        Self {
            id_seed: Some(seed),
            ..Self::default()
        }
    }

    /// File name for a save: `<name><save_suffix>.<save_extension>`.
    pub fn save_file_name(&self, name: &str) -> String {
        format!("{name}{}.{}", self.save_suffix, self.save_extension)
    }

    /// Inverse of `save_file_name`; `None` for unrelated files.
    pub fn save_name_of(&self, file_name: &str) -> Option<String> {
        let stem = file_name.strip_suffix(&format!(".{}", self.save_extension))?;
        stem.strip_suffix(&self.save_suffix).map(str::to_string)
    }

    /// Folder rendered source for `type_name` is written to, under `root`.
    pub fn generated_dir_for(&self, root: &Path, type_name: &str) -> PathBuf {
        let base = root.join(&self.generated_code_dir);
        if self.type_subfolders {
            base.join(format!("{}{}", snake_case(type_name), self.type_subfolder_suffix))
        } else {
            base
        }
    }

    pub fn data_type_name(&self, type_name: &str) -> String {
        format!("{type_name}{}", self.data_suffix)
    }

    pub fn preset_type_name(&self, type_name: &str) -> String {
        format!("{type_name}{}", self.preset_suffix)
    }
}

/// `EnemyUnit` -> `enemy_unit`.
pub fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for c in name.chars() {
        if c.is_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.extend(c.to_lowercase());
            prev_lower = false;
        } else {
            out.push(c);
            prev_lower = c.is_lowercase() || c.is_ascii_digit();
        }
    }
    out
}
