//! Data Mirrors and the copy routines between mirrors and live instances.

use super::{GeneratedSchema, MirrorField, Representation};
use crate::{
    adaptor::{AdaptorRegistry, DynConverter},
    descriptor::ScalarKind,
    error::{PersistError, PersistResult},
    instance::{FieldCtx, FieldValue, Link, Persistable},
    registry::InstanceRegistry,
    types::Identity,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// The serializable shape of one instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataMirror {
    pub id:        Identity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hierarchy: Option<HierarchyRecord>,
    #[serde(default)]
    pub fields:    BTreeMap<String, Value>,
    /// Node adaptor records, by adaptor name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node:      BTreeMap<String, Value>,
}

/// Placement of a hierarchy-capable instance. At most one of `anchor`
/// and `parent` is set; neither means the instance is a root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor:        Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent:        Option<Identity>,
    #[serde(default)]
    pub sibling_index: usize,
}

/// A reference whose target identity was not found while loading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DanglingReference {
    pub owner:  Identity,
    pub field:  String,
    pub target: Identity,
}

impl GeneratedSchema {
    /// Snapshot an instance into its mirror. Hierarchy and node records
    /// are left unset; the engine fills them from the host.
    pub fn copy_to_data(
        &self,
        instance: &dyn Persistable,
        adaptors: &AdaptorRegistry,
    ) -> PersistResult<DataMirror> {
        let mut fields = BTreeMap::new();
        for field in &self.fields {
            let ctx = FieldCtx::new(&self.type_name, &field.source);
            let value = instance.read_field(&field.source).ok_or_else(|| ctx.unknown())?;
            fields.insert(field.key.clone(), encode(field, value, ctx, adaptors)?);
        }
        Ok(DataMirror {
            id: instance.identity().to_string(),
            hierarchy: None,
            fields,
            node: BTreeMap::new(),
        })
    }

    /// Apply a mirror to an instance. References resolve through
    /// `registry`; a missing target yields an absent link and is reported,
    /// never raised. Keys missing from the mirror leave the field as is.
    pub fn copy_from_data(
        &self,
        mirror: &DataMirror,
        instance: &mut dyn Persistable,
        registry: &InstanceRegistry,
        adaptors: &AdaptorRegistry,
    ) -> PersistResult<Vec<DanglingReference>> {
        let mut dangling = Vec::new();
        for field in &self.fields {
            let Some(json) = mirror.fields.get(&field.key) else {
                log::debug!("{}: mirror of '{}' has no '{}'", self.type_name, mirror.id, field.key);
                continue;
            };
            let ctx = FieldCtx::new(&self.type_name, &field.source);
            let mut resolve = |id: &str, target: &str| -> Link {
                match registry.resolve_named(id, target) {
                    Some(handle) => Link::to(&handle),
                    None => {
                        dangling.push(DanglingReference {
                            owner:  mirror.id.clone(),
                            field:  field.source.clone(),
                            target: id.to_string(),
                        });
                        Link::absent()
                    }
                }
            };
            let value = decode(field, json.clone(), ctx, adaptors, &mut resolve)?;
            instance.write_field(&field.source, value)?;
        }
        Ok(dangling)
    }
}

// ── Runtime -> mirror ─────────────────────────────────────────────

fn encode(
    field: &MirrorField,
    value: FieldValue,
    ctx: FieldCtx<'_>,
    adaptors: &AdaptorRegistry,
) -> PersistResult<Value> {
    match &field.repr {
        Representation::Direct { kind } => scalar_to_json(*kind, value, ctx),
        Representation::Reference { .. } => link_to_json(value, ctx),
        Representation::Converted { converter } => {
            convert_to(converter_for(adaptors, converter)?, value, ctx)
        }
        Representation::DirectList { kind } => value
            .into_vec(ctx, |v, ctx| scalar_to_json(*kind, v, ctx))
            .map(Value::Array),
        Representation::ReferenceList { .. } => value.into_vec(ctx, link_to_json).map(Value::Array),
        Representation::ConvertedList { converter } => {
            let conv = converter_for(adaptors, converter)?;
            value.into_vec(ctx, |v, ctx| convert_to(conv, v, ctx)).map(Value::Array)
        }
    }
}

fn scalar_to_json(kind: ScalarKind, value: FieldValue, ctx: FieldCtx<'_>) -> PersistResult<Value> {
    Ok(match kind {
        ScalarKind::Bool => Value::Bool(value.into_bool(ctx)?),
        ScalarKind::Int => Value::from(value.into_int(ctx)?),
        ScalarKind::Float => {
            let f = value.into_float(ctx)?;
            serde_json::Number::from_f64(f)
                .map(Value::Number)
                .ok_or_else(|| ctx.mismatch("finite float"))?
        }
        ScalarKind::Text => Value::String(value.into_text(ctx)?),
    })
}

fn link_to_json(value: FieldValue, ctx: FieldCtx<'_>) -> PersistResult<Value> {
    Ok(value.into_link(ctx)?.identity().map(Value::String).unwrap_or(Value::Null))
}

fn convert_to(conv: &dyn DynConverter, value: FieldValue, ctx: FieldCtx<'_>) -> PersistResult<Value> {
    match value {
        FieldValue::Custom(boxed) => conv.to_record(&*boxed),
        FieldValue::Bool(v) => conv.to_record(&v),
        FieldValue::Int(v) => conv.to_record(&v),
        FieldValue::Float(v) => conv.to_record(&v),
        FieldValue::Text(v) => conv.to_record(&v),
        FieldValue::Link(_) | FieldValue::List(_) => Err(ctx.mismatch(conv.value_type())),
    }
}

fn converter_for<'a>(adaptors: &'a AdaptorRegistry, name: &str) -> PersistResult<&'a dyn DynConverter> {
    adaptors.get(name).ok_or_else(|| PersistError::Converter {
        converter: name.to_string(),
        reason:    "not registered".to_string(),
    })
}

// ── Mirror -> runtime ─────────────────────────────────────────────

fn decode(
    field: &MirrorField,
    json: Value,
    ctx: FieldCtx<'_>,
    adaptors: &AdaptorRegistry,
    resolve: &mut dyn FnMut(&str, &str) -> Link,
) -> PersistResult<FieldValue> {
    match &field.repr {
        Representation::Direct { kind } => json_to_scalar(*kind, json, ctx),
        Representation::Reference { target } => json_to_link(json, target, ctx, resolve),
        Representation::Converted { converter } => {
            Ok(FieldValue::Custom(converter_for(adaptors, converter)?.from_record(json)?))
        }
        Representation::DirectList { kind } => json_items(json, ctx)?
            .into_iter()
            .map(|item| json_to_scalar(*kind, item, ctx))
            .collect::<PersistResult<_>>()
            .map(FieldValue::List),
        Representation::ReferenceList { target } => json_items(json, ctx)?
            .into_iter()
            .map(|item| json_to_link(item, target, ctx, resolve))
            .collect::<PersistResult<_>>()
            .map(FieldValue::List),
        Representation::ConvertedList { converter } => {
            let conv = converter_for(adaptors, converter)?;
            json_items(json, ctx)?
                .into_iter()
                .map(|item| conv.from_record(item).map(FieldValue::Custom))
                .collect::<PersistResult<_>>()
                .map(FieldValue::List)
        }
    }
}

pub(crate) fn json_to_scalar(kind: ScalarKind, json: Value, ctx: FieldCtx<'_>) -> PersistResult<FieldValue> {
    match (kind, json) {
        (ScalarKind::Bool, Value::Bool(b)) => Ok(FieldValue::Bool(b)),
        (ScalarKind::Int, Value::Number(n)) => n.as_i64().map(FieldValue::Int).ok_or_else(|| ctx.mismatch("int")),
        (ScalarKind::Float, Value::Number(n)) => {
            n.as_f64().map(FieldValue::Float).ok_or_else(|| ctx.mismatch("float"))
        }
        (ScalarKind::Text, Value::String(s)) => Ok(FieldValue::Text(s)),
        (kind, _) => Err(ctx.mismatch(kind.rust_name())),
    }
}

fn json_to_link(
    json: Value,
    target: &str,
    ctx: FieldCtx<'_>,
    resolve: &mut dyn FnMut(&str, &str) -> Link,
) -> PersistResult<FieldValue> {
    match json {
        Value::Null => Ok(FieldValue::Link(Link::absent())),
        Value::String(id) if id.is_empty() => Ok(FieldValue::Link(Link::absent())),
        Value::String(id) => Ok(FieldValue::Link(resolve(&id, target))),
        _ => Err(ctx.mismatch("identity string")),
    }
}

pub(crate) fn json_items(json: Value, ctx: FieldCtx<'_>) -> PersistResult<Vec<Value>> {
    match json {
        Value::Array(items) => Ok(items),
        _ => Err(ctx.mismatch("list")),
    }
}
