//! Rust source emission for generated schemas.
//!
//! Rendered files assume they live in a child module of the runtime type
//! (`use super::<Type>`) and that bound converters are unit structs.
//! Fields are reached through their access paths, so a type that embeds
//! its base (`extends_at`) renders `unit.base.name`.
//! Output is byte-deterministic for a given schema and binding set.

use super::{GeneratedSchema, MirrorField, Representation};
use crate::{adaptor::AdaptorRegistry, config::{snake_case, PersistConfig}};
use std::fmt::Write;
use std::path::{Path, PathBuf};

const HEADER: &str = "\
// @generated by persistor. DO NOT EDIT.
// Any change is lost when the file is regenerated.
";

/// One rendered file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFile {
    pub path:     PathBuf,
    pub contents: String,
}

/// Render the Data Mirror and Preset source for a schema. Paths are
/// relative to the project root chosen by the caller. A type's own
/// generated folder replaces the configured folder and subfolder rules.
pub fn render(
    schema: &GeneratedSchema,
    config: &PersistConfig,
    adaptors: &AdaptorRegistry,
) -> Vec<RenderedFile> {
    let dir = match schema.generated_folder.as_deref().filter(|f| !f.is_empty()) {
        Some(folder) => PathBuf::from(folder),
        None => config.generated_dir_for(Path::new(""), &schema.type_name),
    };
    let stem = snake_case(&schema.type_name);
    vec![
        RenderedFile {
            path:     dir.join(format!("{stem}_{}.rs", snake_case(&config.data_suffix))),
            contents: render_mirror(schema, config, adaptors),
        },
        RenderedFile {
            path:     dir.join(format!("{stem}_{}.rs", snake_case(&config.preset_suffix))),
            contents: render_preset(schema, config),
        },
    ]
}

pub fn render_mirror(schema: &GeneratedSchema, config: &PersistConfig, adaptors: &AdaptorRegistry) -> String {
    let unit = &schema.type_name;
    let data = config.data_type_name(unit);
    let id = &schema.identity_field;
    let id_path = &schema.identity_path;
    let mut out = String::new();

    out.push_str(HEADER);
    let _ = writeln!(out);
    let _ = writeln!(out, "use super::{unit};");
    let _ = writeln!(out, "use persistor_core::adaptor::Converter;");
    let _ = writeln!(out, "use persistor_core::instance::Link;");
    let _ = writeln!(out, "use persistor_core::registry::InstanceRegistry;");
    let _ = writeln!(out, "use serde::{{Deserialize, Serialize}};");
    let _ = writeln!(out);
    let _ = writeln!(out, "/// Data mirror for `{unit}`.");
    let _ = writeln!(out, "#[derive(Debug, Clone, Default, Serialize, Deserialize)]");
    let _ = writeln!(out, "pub struct {data} {{");
    let _ = writeln!(out, "    pub {id}: String,");
    for field in &schema.fields {
        let _ = writeln!(out, "    pub {}: {},", field.key, mirror_type(field, adaptors));
    }
    if !schema.node_adaptors.is_empty() {
        let _ = writeln!(out, "    /// Filled from the host by node adaptors: {}.", schema.node_adaptors.join(", "));
        let _ = writeln!(out, "    #[serde(default)]");
        let _ = writeln!(out, "    pub node: std::collections::BTreeMap<String, serde_json::Value>,");
    }
    let _ = writeln!(out, "}}");
    let _ = writeln!(out);

    let _ = writeln!(out, "impl {data} {{");
    let _ = writeln!(out, "    pub fn copy_to_data(unit: &{unit}) -> Self {{");
    let _ = writeln!(out, "        Self {{");
    let _ = writeln!(out, "            {id}: unit.{id_path}.clone(),");
    for field in &schema.fields {
        let _ = writeln!(out, "            {}: {},", field.key, to_data_expr(field, adaptors));
    }
    if !schema.node_adaptors.is_empty() {
        let _ = writeln!(out, "            node: Default::default(),");
    }
    let _ = writeln!(out, "        }}");
    let _ = writeln!(out, "    }}");
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "    pub fn copy_from_data(&self, unit: &mut {unit}, registry: &InstanceRegistry) {{"
    );
    for field in &schema.fields {
        let _ = writeln!(out, "        unit.{} = {};", field.path, from_data_expr(field, adaptors));
    }
    if schema.fields.iter().all(|f| !needs_registry(&f.repr)) {
        let _ = writeln!(out, "        let _ = registry;");
    }
    let _ = writeln!(out, "    }}");
    let _ = writeln!(out, "}}");
    out
}

pub fn render_preset(schema: &GeneratedSchema, config: &PersistConfig) -> String {
    let unit = &schema.type_name;
    let preset = config.preset_type_name(unit);
    let mut out = String::new();

    out.push_str(HEADER);
    let _ = writeln!(out);
    let _ = writeln!(out, "use super::{unit};");
    let _ = writeln!(out, "use serde::{{Deserialize, Serialize}};");
    let _ = writeln!(out);
    let _ = writeln!(out, "/// Default-value preset for `{unit}`. Direct fields only.");
    let _ = writeln!(out, "#[derive(Debug, Clone, Default, Serialize, Deserialize)]");
    let _ = writeln!(out, "pub struct {preset} {{");
    for field in schema.preset_fields() {
        let _ = writeln!(out, "    pub {}: {},", field.source, direct_type(&field.repr));
    }
    let _ = writeln!(out, "}}");
    let _ = writeln!(out);
    let _ = writeln!(out, "impl {preset} {{");
    let _ = writeln!(out, "    pub fn copy_from_preset(&self, unit: &mut {unit}) {{");
    for field in schema.preset_fields() {
        let _ = writeln!(
            out,
            "        unit.{} = self.{}{};",
            field.path,
            field.source,
            clone_suffix(&field.repr)
        );
    }
    let _ = writeln!(out, "    }}");
    let _ = writeln!(out, "}}");
    out
}

fn needs_registry(repr: &Representation) -> bool {
    matches!(repr, Representation::Reference { .. } | Representation::ReferenceList { .. })
}

fn record_type(adaptors: &AdaptorRegistry, converter: &str) -> String {
    adaptors
        .get(converter)
        .map(|c| c.record_type().to_string())
        .unwrap_or_else(|| "serde_json::Value".to_string())
}

fn converter_path(adaptors: &AdaptorRegistry, converter: &str) -> String {
    adaptors
        .get(converter)
        .map(|c| c.converter_type().to_string())
        .unwrap_or_else(|| converter.to_string())
}

fn direct_type(repr: &Representation) -> String {
    match repr {
        Representation::Direct { kind } => kind.rust_name().to_string(),
        Representation::DirectList { kind } => format!("Vec<{}>", kind.rust_name()),
        _ => String::new(),
    }
}

fn clone_suffix(repr: &Representation) -> &'static str {
    match repr {
        Representation::Direct { kind } if kind.rust_name() != "String" => "",
        _ => ".clone()",
    }
}

fn mirror_type(field: &MirrorField, adaptors: &AdaptorRegistry) -> String {
    match &field.repr {
        Representation::Direct { .. } | Representation::DirectList { .. } => direct_type(&field.repr),
        Representation::Reference { .. } => "Option<String>".to_string(),
        Representation::ReferenceList { .. } => "Vec<Option<String>>".to_string(),
        Representation::Converted { converter } => record_type(adaptors, converter),
        Representation::ConvertedList { converter } => format!("Vec<{}>", record_type(adaptors, converter)),
    }
}

fn to_data_expr(field: &MirrorField, adaptors: &AdaptorRegistry) -> String {
    let src = &field.path;
    match &field.repr {
        Representation::Direct { .. } | Representation::DirectList { .. } => {
            format!("unit.{src}{}", clone_suffix(&field.repr))
        }
        Representation::Reference { .. } => format!("unit.{src}.identity()"),
        Representation::ReferenceList { .. } => format!("unit.{src}.iter().map(Link::identity).collect()"),
        Representation::Converted { converter } => {
            format!("{}.to_data(&unit.{src})", converter_path(adaptors, converter))
        }
        Representation::ConvertedList { converter } => format!(
            "unit.{src}.iter().map(|v| {}.to_data(v)).collect()",
            converter_path(adaptors, converter)
        ),
    }
}

fn from_data_expr(field: &MirrorField, adaptors: &AdaptorRegistry) -> String {
    let key = &field.key;
    let resolve = |target: &str| {
        format!(
            "id.as_deref().and_then(|id| registry.resolve_named(id, \"{target}\")).map(|h| Link::to(&h)).unwrap_or_default()"
        )
    };
    match &field.repr {
        Representation::Direct { .. } | Representation::DirectList { .. } => {
            format!("self.{key}{}", clone_suffix(&field.repr))
        }
        Representation::Reference { target } => format!("{{ let id = &self.{key}; {} }}", resolve(target)),
        Representation::ReferenceList { target } => {
            format!("self.{key}.iter().map(|id| {}).collect()", resolve(target))
        }
        Representation::Converted { converter } => {
            format!("{}.from_data(self.{key}.clone())", converter_path(adaptors, converter))
        }
        Representation::ConvertedList { converter } => format!(
            "self.{key}.iter().cloned().map(|r| {}.from_data(r)).collect()",
            converter_path(adaptors, converter)
        ),
    }
}
