//! Core-to-environment boundary.
//!
//! The core never creates, destroys, or places instances itself. It asks
//! a host through these traits. `scene::MemoryScene` is the in-process
//! implementation used by the CLI and tests.

use crate::{
    error::PersistResult,
    instance::{Handle, InstanceFactory},
    types::NodeId,
};

/// What to instantiate.
#[derive(Clone)]
pub struct CreateRequest<'a> {
    pub type_name: &'a str,
    /// Named template to instantiate from.
    pub template:  Option<&'a str>,
    /// Node name. Hosts default it to the type name.
    pub name:      Option<&'a str>,
    /// Bare factory used when no template is given.
    pub factory:   Option<InstanceFactory>,
}

impl<'a> CreateRequest<'a> {
    pub fn new(type_name: &'a str) -> Self {
        Self {
            type_name,
            template: None,
            name: None,
            factory: None,
        }
    }

    pub fn template(mut self, template: Option<&'a str>) -> Self {
        self.template = template;
        self
    }

    pub fn name(mut self, name: Option<&'a str>) -> Self {
        self.name = name;
        self
    }

    pub fn factory(mut self, factory: Option<InstanceFactory>) -> Self {
        self.factory = factory;
        self
    }
}

pub trait InstantiationHost {
    /// Create an instance synchronously, from a template or a factory.
    fn create(&mut self, request: CreateRequest<'_>) -> PersistResult<Handle>;

    /// Destroy an instance and everything placed under it. Destroying an
    /// instance the host no longer holds is a no-op.
    fn destroy(&mut self, handle: &Handle);
}

pub trait HierarchyHost {
    fn parent_of(&self, node: NodeId) -> Option<NodeId>;

    /// Move `node` under `parent` (`None` = root) at `sibling_index`,
    /// clamped to the destination's child count.
    fn set_parent(&mut self, node: NodeId, parent: Option<NodeId>, sibling_index: usize) -> PersistResult<()>;

    /// Children under `parent`, or roots for `None`.
    fn sibling_count(&self, parent: Option<NodeId>) -> usize;

    fn sibling_index(&self, node: NodeId) -> Option<usize>;

    /// Look up a named anchor: an external fixed attachment point.
    fn anchor(&self, name: &str) -> Option<NodeId>;

    fn anchor_name(&self, node: NodeId) -> Option<String>;

    /// The instance living on a node, if any.
    fn instance_at(&self, node: NodeId) -> Option<Handle>;

    fn node_name(&self, node: NodeId) -> Option<String>;

    fn rename_node(&mut self, node: NodeId, name: &str) -> PersistResult<()>;
}

/// Everything the engine needs from its environment.
pub trait SceneHost: InstantiationHost + HierarchyHost {}

impl<T: InstantiationHost + HierarchyHost + ?Sized> SceneHost for T {}
