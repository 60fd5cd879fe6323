//! Save documents: the full live graph to and from text.
//!
//! A document is an ordered list of type sections. Every record inside a
//! section is a mirror serialized on its own, so one corrupt record can be
//! skipped without losing its siblings.

use crate::{
    error::PersistResult,
    schema::mirror::DataMirror,
    types::{TypeName, DOCUMENT_VERSION},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeSection {
    pub type_name: TypeName,
    /// One independently encoded mirror per instance.
    pub records:   Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveDocument {
    pub version:  u32,
    pub sections: Vec<TypeSection>,
}

impl SaveDocument {
    pub fn new() -> Self {
        Self {
            version:  DOCUMENT_VERSION,
            sections: Vec::new(),
        }
    }

    pub fn record_count(&self) -> usize {
        self.sections.iter().map(|s| s.records.len()).sum()
    }

    pub fn section(&self, type_name: &str) -> Option<&TypeSection> {
        self.sections.iter().find(|s| s.type_name == type_name)
    }
}

impl Default for SaveDocument {
    fn default() -> Self {
        Self::new()
    }
}

/// Text <-> document. Replaceable.
pub trait DocumentCodec {
    fn encode(&self, document: &SaveDocument) -> PersistResult<String>;

    fn decode(&self, text: &str) -> PersistResult<SaveDocument>;
}

/// JSON codec, outer document optionally pretty-printed. Records are
/// always compact JSON strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec {
    pub pretty: bool,
}

impl JsonCodec {
    pub fn pretty() -> Self {
        Self { pretty: true }
    }
}

impl DocumentCodec for JsonCodec {
    fn encode(&self, document: &SaveDocument) -> PersistResult<String> {
        Ok(if self.pretty {
            serde_json::to_string_pretty(document)?
        } else {
            serde_json::to_string(document)?
        })
    }

    fn decode(&self, text: &str) -> PersistResult<SaveDocument> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Encode one record.
pub fn encode_record(mirror: &DataMirror) -> PersistResult<String> {
    Ok(serde_json::to_string(mirror)?)
}

/// Decode one record.
pub fn decode_record(record: &str) -> PersistResult<DataMirror> {
    Ok(serde_json::from_str(record)?)
}
