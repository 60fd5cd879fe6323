//! Schema generation.
//!
//! For each persistable type the generator validates its descriptor,
//! classifies every field into exactly one representation, and produces a
//! `GeneratedSchema`: the Data Mirror shape, the Preset shape, and the copy
//! routines that run over them (see `mirror.rs` and `preset.rs`).
//! `render.rs` emits the same shapes as Rust source.
//!
//! RULE: generation is a pure function of the descriptor, the set of
//! persistable type names, and the converter bindings in effect.
//! Field order is declaration order; nothing else influences the output.

pub mod mirror;
pub mod preset;
pub mod render;

use crate::{
    adaptor::AdaptorRegistry,
    descriptor::{FieldDescriptor, FieldType, ScalarKind, TypeDescriptor},
    error::SchemaError,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

/// How one field is carried in the Data Mirror.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "repr", rename_all = "snake_case")]
pub enum Representation {
    /// Copied verbatim.
    Direct { kind: ScalarKind },
    /// Another persistable instance, carried as its identity.
    Reference { target: String },
    /// Carried as the bound converter's record.
    Converted { converter: String },
    DirectList { kind: ScalarKind },
    ReferenceList { target: String },
    ConvertedList { converter: String },
}

impl Representation {
    pub fn is_direct(&self) -> bool {
        matches!(self, Self::Direct { .. } | Self::DirectList { .. })
    }
}

/// One field of a Data Mirror.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MirrorField {
    /// Field name on the runtime instance.
    pub source: String,
    /// Key under which the value is stored in the mirror.
    pub key:    String,
    pub repr:   Representation,
    /// Accessor path on the runtime struct, for rendered source.
    pub path:   String,
}

/// Everything generated for one persistable type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GeneratedSchema {
    pub type_name:      String,
    pub identity_field: String,
    pub identity_path:  String,
    pub prefix:         String,
    pub hierarchical:   bool,
    pub template:       Option<String>,
    /// Types this one extends, nearest first.
    pub bases:          Vec<String>,
    pub generated_folder: Option<String>,
    /// Node adaptors, in declaration order.
    pub node_adaptors:  Vec<String>,
    /// Mirror fields, identity excluded (the mirror carries it separately).
    pub fields:         Vec<MirrorField>,
}

impl GeneratedSchema {
    /// Fields a Preset may carry: direct values only.
    pub fn preset_fields(&self) -> impl Iterator<Item = &MirrorField> {
        self.fields.iter().filter(|f| f.repr.is_direct())
    }

    pub fn field(&self, source: &str) -> Option<&MirrorField> {
        self.fields.iter().find(|f| f.source == source)
    }
}

/// Validate and generate the schema for one type.
///
/// `persistable` is the set of type names that are persistable types; a
/// field naming one of them becomes a reference.
pub fn generate(
    desc: &TypeDescriptor,
    persistable: &BTreeSet<String>,
    adaptors: &AdaptorRegistry,
) -> Result<GeneratedSchema, SchemaError> {
    let identity = validate(desc)?;

    let mut fields = Vec::with_capacity(desc.fields.len());
    for field in desc.fields.iter().filter(|f| !f.identity) {
        let repr = classify(desc, field, persistable, adaptors)?;
        let key = match repr {
            Representation::Reference { .. } => format!("{}_id", field.name),
            Representation::ReferenceList { .. } => format!("{}_ids", field.name),
            _ => field.name.clone(),
        };
        fields.push(MirrorField {
            source: field.name.clone(),
            key,
            repr,
            path: field.access_path().to_string(),
        });
    }

    if let Some(missing) = desc.node_adaptors.iter().find(|a| !adaptors.contains_node(a)) {
        return Err(SchemaError::UnknownNodeAdaptor {
            type_name: desc.name.clone(),
            adaptor:   missing.clone(),
        });
    }

    Ok(GeneratedSchema {
        type_name:      desc.name.clone(),
        identity_field: identity.name.clone(),
        identity_path:  identity.access_path().to_string(),
        prefix:         desc.prefix().to_string(),
        hierarchical:   desc.hierarchical,
        template:       desc.template.clone(),
        bases:          desc.bases.clone(),
        generated_folder: desc.generated_folder.clone(),
        node_adaptors:  desc.node_adaptors.clone(),
        fields,
    })
}

/// Exactly one string identity field, no repeated names, at least one field.
fn validate(desc: &TypeDescriptor) -> Result<&FieldDescriptor, SchemaError> {
    if desc.fields.is_empty() {
        return Err(SchemaError::NoFields {
            type_name: desc.name.clone(),
        });
    }

    let mut names = HashSet::new();
    for field in &desc.fields {
        if !names.insert(field.name.as_str()) {
            return Err(SchemaError::DuplicateField {
                type_name: desc.name.clone(),
                field:     field.name.clone(),
            });
        }
    }

    let ids: Vec<_> = desc.identity_fields().collect();
    let identity = match ids.as_slice() {
        [] => {
            return Err(SchemaError::MissingIdentity {
                type_name: desc.name.clone(),
            })
        }
        [one] => *one,
        many => {
            return Err(SchemaError::MultipleIdentities {
                type_name: desc.name.clone(),
                count:     many.len(),
            })
        }
    };
    if identity.field_type != FieldType::text() {
        return Err(SchemaError::NonStringIdentity {
            type_name: desc.name.clone(),
            field:     identity.name.clone(),
        });
    }
    Ok(identity)
}

fn classify(
    owner: &TypeDescriptor,
    field: &FieldDescriptor,
    persistable: &BTreeSet<String>,
    adaptors: &AdaptorRegistry,
) -> Result<Representation, SchemaError> {
    let (element, is_list) = match &field.field_type {
        FieldType::List(inner) => (inner.as_ref(), true),
        other => (other, false),
    };

    let converter = match element {
        FieldType::Scalar(kind) => {
            // Scalars only take a converter when the field asks for one.
            match field.converter.as_deref() {
                Some(name) => Some(name),
                None => {
                    return Ok(if is_list {
                        Representation::DirectList { kind: *kind }
                    } else {
                        Representation::Direct { kind: *kind }
                    })
                }
            }
        }
        FieldType::Named(name) => {
            if field.converter.is_none() && persistable.contains(name) {
                let target = name.clone();
                return Ok(if is_list {
                    Representation::ReferenceList { target }
                } else {
                    Representation::Reference { target }
                });
            }
            adaptors.resolve(owner, field, name)
        }
        FieldType::List(_) => None,
    };

    let Some(converter) = converter else {
        return Err(SchemaError::UnresolvableField {
            type_name:  owner.name.clone(),
            field:      field.name.clone(),
            value_type: field.field_type.value_type(),
        });
    };
    if !adaptors.contains(converter) {
        return Err(SchemaError::UnknownConverter {
            type_name: owner.name.clone(),
            field:     field.name.clone(),
            converter: converter.to_string(),
        });
    }

    let converter = converter.to_string();
    Ok(if is_list {
        Representation::ConvertedList { converter }
    } else {
        Representation::Converted { converter }
    })
}
