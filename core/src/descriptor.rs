//! Schema descriptors: the declarative description of which types and
//! fields participate in persistence.
//!
//! Descriptors are plain values built once per type (see
//! `PersistableType::descriptor`) and handed to the catalog. Nothing is
//! discovered at runtime.

use serde::{Deserialize, Serialize};

/// Scalar kinds copied verbatim into mirrors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarKind {
    Bool,
    Int,
    Float,
    Text,
}

impl ScalarKind {
    /// Value-type name used for converter lookup and in rendered source.
    pub fn rust_name(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "i64",
            Self::Float => "f64",
            Self::Text => "String",
        }
    }
}

/// The declared type of a persistable field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Scalar(ScalarKind),
    /// Another type by name. A reference if that type is persistable,
    /// otherwise it needs a converter.
    Named(String),
    List(Box<FieldType>),
}

impl FieldType {
    pub fn bool() -> Self {
        Self::Scalar(ScalarKind::Bool)
    }

    pub fn int() -> Self {
        Self::Scalar(ScalarKind::Int)
    }

    pub fn float() -> Self {
        Self::Scalar(ScalarKind::Float)
    }

    pub fn text() -> Self {
        Self::Scalar(ScalarKind::Text)
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    pub fn list(element: FieldType) -> Self {
        Self::List(Box::new(element))
    }

    /// The runtime value-type name converters are indexed by.
    pub fn value_type(&self) -> String {
        match self {
            Self::Scalar(kind) => kind.rust_name().to_string(),
            Self::Named(name) => name.clone(),
            Self::List(inner) => format!("Vec<{}>", inner.value_type()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name:       String,
    pub field_type: FieldType,
    pub identity:   bool,
    /// Explicit converter bound to this field, by converter name.
    pub converter:  Option<String>,
    /// Where the field lives on the runtime struct, when it is not a
    /// direct member (`base.name` for a field inherited by composition).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path:       Option<String>,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            identity: false,
            converter: None,
            path: None,
        }
    }

    /// Accessor path on the runtime struct. Defaults to the field name.
    pub fn access_path(&self) -> &str {
        self.path.as_deref().unwrap_or(&self.name)
    }

    pub fn with_converter(mut self, converter: impl Into<String>) -> Self {
        self.converter = Some(converter.into());
        self
    }
}

/// One persistable type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDescriptor {
    pub name:          String,
    /// Fields in declaration order, inherited fields first.
    pub fields:        Vec<FieldDescriptor>,
    /// Identity prefix override. Defaults to the type name.
    pub id_prefix:     Option<String>,
    /// Type-level converter bindings: value type -> converter name.
    pub converters:    Vec<(String, String)>,
    /// Instances take part in parent/child placement.
    pub hierarchical:  bool,
    /// Named template to instantiate through when loading.
    pub template:      Option<String>,
    /// Skip this type during generation.
    pub ignored:       bool,
    /// Every type this one extends, nearest first. A reference declared
    /// against any of them accepts an instance of this type.
    #[serde(default)]
    pub bases:         Vec<String>,
    /// Output folder for rendered source, relative to the generated-code
    /// root. Overrides the configured folder and subfolder rules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_folder: Option<String>,
    /// Node adaptors recording host-side state of the whole instance.
    #[serde(default)]
    pub node_adaptors: Vec<String>,
}

impl TypeDescriptor {
    pub fn builder(name: impl Into<String>) -> TypeDescriptorBuilder {
        TypeDescriptorBuilder {
            desc: TypeDescriptor {
                name:         name.into(),
                fields:       Vec::new(),
                id_prefix:    None,
                converters:   Vec::new(),
                hierarchical: false,
                template:     None,
                ignored:      false,
                bases:        Vec::new(),
                generated_folder: None,
                node_adaptors: Vec::new(),
            },
        }
    }

    pub fn prefix(&self) -> &str {
        self.id_prefix.as_deref().unwrap_or(&self.name)
    }

    pub fn identity_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| f.identity)
    }

    /// Converter bound at the type level for a value type, if any.
    pub fn type_converter(&self, value_type: &str) -> Option<&str> {
        self.converters
            .iter()
            .find(|(vt, _)| vt == value_type)
            .map(|(_, conv)| conv.as_str())
    }
}

pub struct TypeDescriptorBuilder {
    desc: TypeDescriptor,
}

impl TypeDescriptorBuilder {
    /// Pull in a base type's fields and type-level bindings. Base fields
    /// keep their order and come before anything declared afterwards.
    pub fn extends(self, base: &TypeDescriptor) -> Self {
        self.inherit(base, None)
    }

    /// Like `extends`, for a runtime type that embeds its base as the
    /// member `path`. Inherited fields are reached through that member.
    pub fn extends_at(self, base: &TypeDescriptor, path: &str) -> Self {
        self.inherit(base, Some(path))
    }

    fn inherit(mut self, base: &TypeDescriptor, path: Option<&str>) -> Self {
        let mut fields = base.fields.clone();
        if let Some(path) = path {
            for field in &mut fields {
                field.path = Some(format!("{path}.{}", field.access_path()));
            }
        }
        fields.append(&mut self.desc.fields);
        self.desc.fields = fields;
        for binding in &base.converters {
            if self.desc.type_converter(&binding.0).is_none() {
                self.desc.converters.push(binding.clone());
            }
        }
        self.desc.hierarchical |= base.hierarchical;
        if self.desc.id_prefix.is_none() {
            self.desc.id_prefix = base.id_prefix.clone();
        }
        self.desc.bases.push(base.name.clone());
        self.desc.bases.extend(base.bases.iter().cloned());
        for adaptor in &base.node_adaptors {
            if !self.desc.node_adaptors.contains(adaptor) {
                self.desc.node_adaptors.push(adaptor.clone());
            }
        }
        self
    }

    pub fn identity(mut self, name: impl Into<String>) -> Self {
        self.desc.fields.push(FieldDescriptor {
            name:       name.into(),
            field_type: FieldType::text(),
            identity:   true,
            converter:  None,
            path:       None,
        });
        self
    }

    /// Declare an identity field with an arbitrary type. Only used to
    /// describe malformed types; generation rejects non-string identities.
    pub fn identity_typed(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.desc.fields.push(FieldDescriptor {
            name: name.into(),
            field_type,
            identity: true,
            converter: None,
            path: None,
        });
        self
    }

    pub fn field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.desc.fields.push(FieldDescriptor::new(name, field_type));
        self
    }

    pub fn field_with(mut self, field: FieldDescriptor) -> Self {
        self.desc.fields.push(field);
        self
    }

    pub fn id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.desc.id_prefix = Some(prefix.into());
        self
    }

    pub fn converter_for(mut self, value_type: impl Into<String>, converter: impl Into<String>) -> Self {
        let value_type = value_type.into();
        self.desc.converters.retain(|(vt, _)| *vt != value_type);
        self.desc.converters.push((value_type, converter.into()));
        self
    }

    pub fn hierarchical(mut self) -> Self {
        self.desc.hierarchical = true;
        self
    }

    pub fn template(mut self, template: impl Into<String>) -> Self {
        self.desc.template = Some(template.into());
        self
    }

    pub fn generated_folder(mut self, folder: impl Into<String>) -> Self {
        self.desc.generated_folder = Some(folder.into());
        self
    }

    /// Attach a node adaptor by name. Its record is captured on save and
    /// applied on load once the instance is placed.
    pub fn node_adaptor(mut self, adaptor: impl Into<String>) -> Self {
        let adaptor = adaptor.into();
        if !self.desc.node_adaptors.contains(&adaptor) {
            self.desc.node_adaptors.push(adaptor);
        }
        self
    }

    pub fn ignored(mut self) -> Self {
        self.desc.ignored = true;
        self
    }

    pub fn build(self) -> TypeDescriptor {
        self.desc
    }
}
