//! Converters and the adaptor registry.
//!
//! A converter is a two-way transform between a runtime value and a
//! serializable record. Converters are registered by name; a converter
//! registered as global is also indexed by the value type it converts.
//!
//! Resolution order for a field:
//!   1. converter bound explicitly on the field
//!   2. converter bound on the owning type for the field's value type
//!   3. global converter for the field's value type
//!
//! A node adaptor works on the whole instance instead of one field: it
//! records host-side state (the node name, say) on save and re-applies it
//! on load, after the instance has been placed.

use crate::{
    descriptor::{FieldDescriptor, TypeDescriptor},
    error::{PersistError, PersistResult},
    host::HierarchyHost,
    types::NodeId,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::any::Any;
use std::collections::BTreeMap;

/// A typed two-way converter.
pub trait Converter: 'static {
    type Value: 'static;
    type Record: Serialize + DeserializeOwned;

    /// Unique converter name used in bindings.
    const NAME: &'static str;

    /// Value-type name this converter handles, as written in descriptors.
    const VALUE_TYPE: &'static str;

    fn to_data(&self, value: &Self::Value) -> Self::Record;

    fn from_data(&self, record: Self::Record) -> Self::Value;
}

/// Type-erased converter, as stored in the registry.
pub trait DynConverter {
    fn name(&self) -> &'static str;

    fn value_type(&self) -> &'static str;

    /// Rust path of the converter itself, for rendered copy routines.
    fn converter_type(&self) -> &'static str;

    /// Rust path of the record type, for rendered mirror source.
    fn record_type(&self) -> &'static str;

    fn to_record(&self, value: &dyn Any) -> PersistResult<Value>;

    fn from_record(&self, record: Value) -> PersistResult<Box<dyn Any>>;
}

struct Erased<C>(C);

impl<C: Converter> DynConverter for Erased<C> {
    fn name(&self) -> &'static str {
        C::NAME
    }

    fn value_type(&self) -> &'static str {
        C::VALUE_TYPE
    }

    fn converter_type(&self) -> &'static str {
        std::any::type_name::<C>()
    }

    fn record_type(&self) -> &'static str {
        std::any::type_name::<C::Record>()
    }

    fn to_record(&self, value: &dyn Any) -> PersistResult<Value> {
        let value = value.downcast_ref::<C::Value>().ok_or_else(|| PersistError::Converter {
            converter: C::NAME.to_string(),
            reason:    format!("expected a {} value", std::any::type_name::<C::Value>()),
        })?;
        Ok(serde_json::to_value(self.0.to_data(value))?)
    }

    fn from_record(&self, record: Value) -> PersistResult<Box<dyn Any>> {
        let record: C::Record = serde_json::from_value(record).map_err(|e| PersistError::Converter {
            converter: C::NAME.to_string(),
            reason:    e.to_string(),
        })?;
        Ok(Box::new(self.0.from_data(record)))
    }
}

/// A typed adaptor over the host node an instance lives on.
pub trait NodeAdaptor: 'static {
    type Record: Serialize + DeserializeOwned;

    const NAME: &'static str;

    /// `None` when the host has nothing to record for this node.
    fn capture(&self, host: &dyn HierarchyHost, node: NodeId) -> Option<Self::Record>;

    fn apply(&self, host: &mut dyn HierarchyHost, node: NodeId, record: Self::Record) -> PersistResult<()>;
}

pub trait DynNodeAdaptor {
    fn name(&self) -> &'static str;

    fn capture(&self, host: &dyn HierarchyHost, node: NodeId) -> PersistResult<Option<Value>>;

    fn apply(&self, host: &mut dyn HierarchyHost, node: NodeId, record: Value) -> PersistResult<()>;
}

struct ErasedNode<A>(A);

impl<A: NodeAdaptor> DynNodeAdaptor for ErasedNode<A> {
    fn name(&self) -> &'static str {
        A::NAME
    }

    fn capture(&self, host: &dyn HierarchyHost, node: NodeId) -> PersistResult<Option<Value>> {
        match self.0.capture(host, node) {
            Some(record) => Ok(Some(serde_json::to_value(record)?)),
            None => Ok(None),
        }
    }

    fn apply(&self, host: &mut dyn HierarchyHost, node: NodeId, record: Value) -> PersistResult<()> {
        let record: A::Record = serde_json::from_value(record).map_err(|e| PersistError::Converter {
            converter: A::NAME.to_string(),
            reason:    e.to_string(),
        })?;
        self.0.apply(host, node, record)
    }
}

/// Keeps the host node's name across a save and load.
pub struct NodeNameAdaptor;

impl NodeAdaptor for NodeNameAdaptor {
    type Record = String;
    const NAME: &'static str = "node_name";

    fn capture(&self, host: &dyn HierarchyHost, node: NodeId) -> Option<String> {
        host.node_name(node)
    }

    fn apply(&self, host: &mut dyn HierarchyHost, node: NodeId, record: String) -> PersistResult<()> {
        host.rename_node(node, &record)
    }
}

#[derive(Default)]
pub struct AdaptorRegistry {
    converters: BTreeMap<&'static str, Box<dyn DynConverter>>,
    /// value type -> converter name, for converters registered as global.
    global:     BTreeMap<&'static str, &'static str>,
    nodes:      BTreeMap<&'static str, Box<dyn DynNodeAdaptor>>,
}

impl AdaptorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a converter that applies only where a field or type binds
    /// it by name.
    pub fn register<C: Converter>(&mut self, converter: C) {
        if self.converters.insert(C::NAME, Box::new(Erased(converter))).is_some() {
            log::warn!("Converter '{}' registered twice; keeping the latest", C::NAME);
        }
    }

    /// Register a converter and index it by its value type, so every field
    /// of that type uses it unless bound otherwise.
    pub fn register_global<C: Converter>(&mut self, converter: C) {
        self.register(converter);
        if let Some(previous) = self.global.insert(C::VALUE_TYPE, C::NAME) {
            if previous != C::NAME {
                log::warn!(
                    "Global converter for '{}' replaced: '{}' -> '{}'",
                    C::VALUE_TYPE,
                    previous,
                    C::NAME
                );
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&dyn DynConverter> {
        self.converters.get(name).map(|c| c.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.converters.contains_key(name)
    }

    /// Resolve the converter name for a field whose value type is
    /// `value_type` (the element type, for lists).
    pub fn resolve<'a>(
        &'a self,
        owner: &'a TypeDescriptor,
        field: &'a FieldDescriptor,
        value_type: &str,
    ) -> Option<&'a str> {
        if let Some(explicit) = field.converter.as_deref() {
            return Some(explicit);
        }
        if let Some(type_level) = owner.type_converter(value_type) {
            return Some(type_level);
        }
        self.global.get(value_type).copied()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.converters.keys().copied()
    }

    pub fn register_node<A: NodeAdaptor>(&mut self, adaptor: A) {
        if self.nodes.insert(A::NAME, Box::new(ErasedNode(adaptor))).is_some() {
            log::warn!("Node adaptor '{}' registered twice; keeping the latest", A::NAME);
        }
    }

    pub fn node(&self, name: &str) -> Option<&dyn DynNodeAdaptor> {
        self.nodes.get(name).map(|a| a.as_ref())
    }

    pub fn contains_node(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }
}
