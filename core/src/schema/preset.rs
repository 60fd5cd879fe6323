//! Presets: default-value templates carrying direct fields only.
//! Never references, converter records, or identity.

use super::{mirror::{json_items, json_to_scalar}, GeneratedSchema, Representation};
use crate::{
    error::{PersistError, PersistResult},
    instance::{FieldCtx, FieldValue, Persistable},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    pub type_name: String,
    #[serde(default)]
    pub values:    BTreeMap<String, Value>,
}

impl Preset {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            values:    BTreeMap::new(),
        }
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(field.into(), value.into());
        self
    }

    pub fn from_json(text: &str) -> PersistResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &std::path::Path) -> PersistResult<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }
}

impl GeneratedSchema {
    /// Apply a preset's values to an instance. Fails on a preset for
    /// another type or on any key that is not a direct field.
    pub fn copy_from_preset(&self, preset: &Preset, instance: &mut dyn Persistable) -> PersistResult<()> {
        if preset.type_name != self.type_name {
            return Err(PersistError::Instantiation {
                type_name: self.type_name.clone(),
                reason:    format!("preset is for '{}'", preset.type_name),
            });
        }

        for (name, json) in &preset.values {
            let ctx = FieldCtx::new(&self.type_name, name);
            let field = self
                .preset_fields()
                .find(|f| f.source == *name)
                .ok_or_else(|| ctx.unknown())?;
            let value = match &field.repr {
                Representation::Direct { kind } => json_to_scalar(*kind, json.clone(), ctx)?,
                Representation::DirectList { kind } => FieldValue::List(
                    json_items(json.clone(), ctx)?
                        .into_iter()
                        .map(|item| json_to_scalar(*kind, item, ctx))
                        .collect::<PersistResult<_>>()?,
                ),
                _ => return Err(ctx.unknown()),
            };
            instance.write_field(name, value)?;
        }
        Ok(())
    }

    /// Capture an instance's direct fields as a preset.
    pub fn capture_preset(&self, instance: &dyn Persistable) -> PersistResult<Preset> {
        let mut preset = Preset::new(&self.type_name);
        for field in self.preset_fields() {
            let ctx = FieldCtx::new(&self.type_name, &field.source);
            let value = instance.read_field(&field.source).ok_or_else(|| ctx.unknown())?;
            let json = match (&field.repr, value) {
                (Representation::Direct { .. }, v) => direct_json(v, ctx)?,
                (Representation::DirectList { .. }, v) => {
                    Value::Array(v.into_vec(ctx, direct_json)?)
                }
                _ => continue,
            };
            preset.values.insert(field.source.clone(), json);
        }
        Ok(preset)
    }
}

fn direct_json(value: FieldValue, ctx: FieldCtx<'_>) -> PersistResult<Value> {
    match value {
        FieldValue::Bool(b) => Ok(Value::Bool(b)),
        FieldValue::Int(i) => Ok(Value::from(i)),
        FieldValue::Float(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .ok_or_else(|| ctx.mismatch("finite float")),
        FieldValue::Text(s) => Ok(Value::String(s)),
        _ => Err(ctx.mismatch("direct value")),
    }
}
