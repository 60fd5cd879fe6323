//! Sample persistable types used by the `persistor` demo and the tests.
//!
//! `Enemy` carries every representation: direct scalars, a reference, a
//! reference list, a direct list, and a converter-backed `Vec3`. `Boss`
//! extends it and rebinds `Vec3` at the type level. `Squad` groups enemies
//! in the hierarchy. `Effect` is declared but ignored, so it never saves.
//! Enemies and squads keep their scene node name through `node_name`.

use crate::{
    adaptor::{AdaptorRegistry, Converter, NodeAdaptor, NodeNameAdaptor},
    catalog::SchemaCatalog,
    descriptor::{FieldType, TypeDescriptor},
    error::PersistResult,
    instance::{FieldCtx, FieldValue, Handle, Link, Persistable, PersistableType},
    scene::MemoryScene,
    types::Identity,
};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::rc::Rc;

// ── Vec3 + converters ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec3Record {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Global converter for every `Vec3` field.
pub struct Vec3Converter;

impl Converter for Vec3Converter {
    type Value = Vec3;
    type Record = Vec3Record;
    const NAME: &'static str = "vec3";
    const VALUE_TYPE: &'static str = "Vec3";

    fn to_data(&self, value: &Vec3) -> Vec3Record {
        Vec3Record {
            x: value.x,
            y: value.y,
            z: value.z,
        }
    }

    fn from_data(&self, record: Vec3Record) -> Vec3 {
        Vec3::new(record.x, record.y, record.z)
    }
}

/// Compact `[x, y, z]` form, bound by name only.
pub struct Vec3ArrayConverter;

impl Converter for Vec3ArrayConverter {
    type Value = Vec3;
    type Record = [f64; 3];
    const NAME: &'static str = "vec3_array";
    const VALUE_TYPE: &'static str = "Vec3";

    fn to_data(&self, value: &Vec3) -> [f64; 3] {
        [value.x, value.y, value.z]
    }

    fn from_data(&self, record: [f64; 3]) -> Vec3 {
        Vec3::new(record[0], record[1], record[2])
    }
}

// ── Enemy ─────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct Enemy {
    pub id:       Identity,
    pub name:     String,
    pub health:   i64,
    pub speed:    f64,
    pub alert:    bool,
    pub target:   Link,
    pub position: Vec3,
    pub patrol:   Vec<Link>,
    pub tags:     Vec<String>,
}

impl PersistableType for Enemy {
    const TYPE_NAME: &'static str = "Enemy";

    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::builder(Self::TYPE_NAME)
            .identity("id")
            .field("name", FieldType::text())
            .field("health", FieldType::int())
            .field("speed", FieldType::float())
            .field("alert", FieldType::bool())
            .field("target", FieldType::named("Enemy"))
            .field("position", FieldType::named("Vec3"))
            .field("patrol", FieldType::list(FieldType::named("Enemy")))
            .field("tags", FieldType::list(FieldType::text()))
            .node_adaptor(NodeNameAdaptor::NAME)
            .hierarchical()
            .template("enemy")
            .build()
    }
}

impl Enemy {
    fn read(&self, field: &str) -> Option<FieldValue> {
        Some(match field {
            "id" => FieldValue::Text(self.id.clone()),
            "name" => FieldValue::Text(self.name.clone()),
            "health" => FieldValue::Int(self.health),
            "speed" => FieldValue::Float(self.speed),
            "alert" => FieldValue::Bool(self.alert),
            "target" => FieldValue::Link(self.target.clone()),
            "position" => FieldValue::custom(self.position),
            "patrol" => FieldValue::List(self.patrol.iter().cloned().map(FieldValue::Link).collect()),
            "tags" => FieldValue::List(self.tags.iter().cloned().map(FieldValue::Text).collect()),
            _ => return None,
        })
    }

    fn write(&mut self, ctx: FieldCtx<'_>, value: FieldValue) -> PersistResult<()> {
        match ctx.field {
            "id" => self.id = value.into_text(ctx)?,
            "name" => self.name = value.into_text(ctx)?,
            "health" => self.health = value.into_int(ctx)?,
            "speed" => self.speed = value.into_float(ctx)?,
            "alert" => self.alert = value.into_bool(ctx)?,
            "target" => self.target = value.into_link(ctx)?,
            "position" => self.position = value.into_custom(ctx)?,
            "patrol" => self.patrol = value.into_vec(ctx, FieldValue::into_link)?,
            "tags" => self.tags = value.into_vec(ctx, FieldValue::into_text)?,
            _ => return Err(ctx.unknown()),
        }
        Ok(())
    }
}

impl Persistable for Enemy {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn identity(&self) -> &str {
        &self.id
    }

    fn set_identity(&mut self, id: Identity) {
        self.id = id;
    }

    fn read_field(&self, field: &str) -> Option<FieldValue> {
        self.read(field)
    }

    fn write_field(&mut self, field: &str, value: FieldValue) -> PersistResult<()> {
        self.write(FieldCtx::new(Self::TYPE_NAME, field), value)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ── Boss ──────────────────────────────────────────────────────────

/// An enemy with phases and a rally point. Inherits every `Enemy` field.
#[derive(Debug, Default)]
pub struct Boss {
    pub base:        Enemy,
    pub phase:       i64,
    pub rally_point: Vec3,
}

impl PersistableType for Boss {
    const TYPE_NAME: &'static str = "Boss";

    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::builder(Self::TYPE_NAME)
            .extends_at(&Enemy::descriptor(), "base")
            .field("phase", FieldType::int())
            .field("rally_point", FieldType::named("Vec3"))
            .converter_for("Vec3", Vec3ArrayConverter::NAME)
            .template("boss")
            .build()
    }
}

impl Persistable for Boss {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn identity(&self) -> &str {
        &self.base.id
    }

    fn set_identity(&mut self, id: Identity) {
        self.base.id = id;
    }

    fn read_field(&self, field: &str) -> Option<FieldValue> {
        match field {
            "phase" => Some(FieldValue::Int(self.phase)),
            "rally_point" => Some(FieldValue::custom(self.rally_point)),
            _ => self.base.read(field),
        }
    }

    fn write_field(&mut self, field: &str, value: FieldValue) -> PersistResult<()> {
        let ctx = FieldCtx::new(Self::TYPE_NAME, field);
        match field {
            "phase" => self.phase = value.into_int(ctx)?,
            "rally_point" => self.rally_point = value.into_custom(ctx)?,
            _ => return self.base.write(ctx, value),
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ── Squad ─────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct Squad {
    pub id:       Identity,
    pub callsign: String,
    pub morale:   f64,
    pub leader:   Link,
    pub members:  Vec<Link>,
}

impl PersistableType for Squad {
    const TYPE_NAME: &'static str = "Squad";

    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::builder(Self::TYPE_NAME)
            .identity("id")
            .field("callsign", FieldType::text())
            .field("morale", FieldType::float())
            .field("leader", FieldType::named("Enemy"))
            .field("members", FieldType::list(FieldType::named("Enemy")))
            .id_prefix("SQ")
            .node_adaptor(NodeNameAdaptor::NAME)
            .hierarchical()
            .build()
    }
}

impl Persistable for Squad {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn identity(&self) -> &str {
        &self.id
    }

    fn set_identity(&mut self, id: Identity) {
        self.id = id;
    }

    fn read_field(&self, field: &str) -> Option<FieldValue> {
        Some(match field {
            "id" => FieldValue::Text(self.id.clone()),
            "callsign" => FieldValue::Text(self.callsign.clone()),
            "morale" => FieldValue::Float(self.morale),
            "leader" => FieldValue::Link(self.leader.clone()),
            "members" => FieldValue::List(self.members.iter().cloned().map(FieldValue::Link).collect()),
            _ => return None,
        })
    }

    fn write_field(&mut self, field: &str, value: FieldValue) -> PersistResult<()> {
        let ctx = FieldCtx::new(Self::TYPE_NAME, field);
        match field {
            "id" => self.id = value.into_text(ctx)?,
            "callsign" => self.callsign = value.into_text(ctx)?,
            "morale" => self.morale = value.into_float(ctx)?,
            "leader" => self.leader = value.into_link(ctx)?,
            "members" => self.members = value.into_vec(ctx, FieldValue::into_link)?,
            _ => return Err(ctx.unknown()),
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ── Effect (ignored) ──────────────────────────────────────────────

/// Short-lived visual effect. Registered like anything else but never
/// persisted.
#[derive(Debug, Default)]
pub struct Effect {
    pub id:  Identity,
    pub ttl: f64,
}

impl PersistableType for Effect {
    const TYPE_NAME: &'static str = "Effect";

    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::builder(Self::TYPE_NAME)
            .identity("id")
            .field("ttl", FieldType::float())
            .ignored()
            .build()
    }
}

impl Persistable for Effect {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn identity(&self) -> &str {
        &self.id
    }

    fn set_identity(&mut self, id: Identity) {
        self.id = id;
    }

    fn read_field(&self, field: &str) -> Option<FieldValue> {
        match field {
            "id" => Some(FieldValue::Text(self.id.clone())),
            "ttl" => Some(FieldValue::Float(self.ttl)),
            _ => None,
        }
    }

    fn write_field(&mut self, field: &str, value: FieldValue) -> PersistResult<()> {
        let ctx = FieldCtx::new(Self::TYPE_NAME, field);
        match field {
            "id" => self.id = value.into_text(ctx)?,
            "ttl" => self.ttl = value.into_float(ctx)?,
            _ => return Err(ctx.unknown()),
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ── Wiring ────────────────────────────────────────────────────────

pub fn adaptors() -> AdaptorRegistry {
    let mut adaptors = AdaptorRegistry::new();
    adaptors.register_global(Vec3Converter);
    adaptors.register(Vec3ArrayConverter);
    adaptors.register_node(NodeNameAdaptor);
    adaptors
}

pub fn catalog() -> SchemaCatalog {
    let mut catalog = SchemaCatalog::new();
    catalog
        .declare::<Enemy>()
        .declare::<Boss>()
        .declare::<Squad>()
        .declare::<Effect>();
    catalog
}

/// A scene with the `enemy` and `boss` templates installed. Templates
/// build with stock values; the bare factories build zeroed instances.
pub fn scene() -> MemoryScene {
    let mut scene = MemoryScene::new();
    scene.add_template(
        "enemy",
        Enemy::TYPE_NAME,
        Rc::new(|node| {
            Handle::new(
                node,
                Enemy {
                    name: "Grunt".to_string(),
                    health: 100,
                    speed: 3.5,
                    ..Enemy::default()
                },
            )
        }),
    );
    scene.add_template(
        "boss",
        Boss::TYPE_NAME,
        Rc::new(|node| {
            Handle::new(
                node,
                Boss {
                    base: Enemy {
                        name: "Warlord".to_string(),
                        health: 1000,
                        speed: 1.5,
                        ..Enemy::default()
                    },
                    phase: 1,
                    ..Boss::default()
                },
            )
        }),
    );
    scene
}
