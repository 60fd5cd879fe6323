//! In-memory scene host: owns instances, keeps an ordered node tree,
//! named anchors, and named templates.

use crate::{
    error::{PersistError, PersistResult},
    host::{CreateRequest, HierarchyHost, InstantiationHost},
    instance::{Handle, InstanceFactory},
    types::NodeId,
};
use std::collections::{BTreeMap, HashMap};

struct SceneNode {
    name:     String,
    instance: Option<Handle>,
    parent:   Option<NodeId>,
    children: Vec<NodeId>,
}

/// A named instance factory for one type.
#[derive(Clone)]
pub struct Template {
    pub type_name: String,
    pub factory:   InstanceFactory,
}

#[derive(Default)]
pub struct MemoryScene {
    next_node: NodeId,
    nodes:     BTreeMap<NodeId, SceneNode>,
    roots:     Vec<NodeId>,
    anchors:   HashMap<String, NodeId>,
    templates: HashMap<String, Template>,
}

impl MemoryScene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an anchor node under `parent` (or as a root). Anchors carry no
    /// instance and are never destroyed by a load.
    pub fn add_anchor(&mut self, name: &str, parent: Option<NodeId>) -> PersistResult<NodeId> {
        if self.anchors.contains_key(name) {
            return Err(PersistError::Hierarchy {
                reason: format!("anchor '{name}' already exists"),
            });
        }
        let node = self.insert_root(name.to_string(), None);
        if parent.is_some() {
            let end = self.sibling_count(parent);
            self.set_parent(node, parent, end)?;
        }
        self.anchors.insert(name.to_string(), node);
        Ok(node)
    }

    pub fn add_template(&mut self, name: &str, type_name: &str, factory: InstanceFactory) {
        self.templates.insert(
            name.to_string(),
            Template {
                type_name: type_name.to_string(),
                factory,
            },
        );
    }

    /// Ordered children of `parent`, or the roots for `None`.
    pub fn children(&self, parent: Option<NodeId>) -> Vec<NodeId> {
        match parent {
            None => self.roots.clone(),
            Some(p) => self.nodes.get(&p).map(|n| n.children.clone()).unwrap_or_default(),
        }
    }

    pub fn name_of(&self, node: NodeId) -> Option<&str> {
        self.nodes.get(&node).map(|n| n.name.as_str())
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains_key(&node)
    }

    /// Every hosted instance, in node creation order.
    pub fn instances(&self) -> Vec<Handle> {
        self.nodes.values().filter_map(|n| n.instance.clone()).collect()
    }

    pub fn instance_count(&self) -> usize {
        self.nodes.values().filter(|n| n.instance.is_some()).count()
    }

    fn insert_root(&mut self, name: String, instance: Option<Handle>) -> NodeId {
        let node = self.alloc();
        self.nodes.insert(
            node,
            SceneNode {
                name,
                instance,
                parent: None,
                children: Vec::new(),
            },
        );
        self.roots.push(node);
        node
    }

    fn alloc(&mut self) -> NodeId {
        self.next_node += 1;
        self.next_node
    }

    fn siblings_mut(&mut self, parent: Option<NodeId>) -> Option<&mut Vec<NodeId>> {
        match parent {
            None => Some(&mut self.roots),
            Some(p) => self.nodes.get_mut(&p).map(|n| &mut n.children),
        }
    }

    fn detach(&mut self, node: NodeId) {
        let parent = self.nodes.get(&node).and_then(|n| n.parent);
        if let Some(list) = self.siblings_mut(parent) {
            list.retain(|&n| n != node);
        }
    }

    fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(n) = current {
            if n == ancestor {
                return true;
            }
            current = self.nodes.get(&n).and_then(|n| n.parent);
        }
        false
    }
}

impl InstantiationHost for MemoryScene {
    fn create(&mut self, request: CreateRequest<'_>) -> PersistResult<Handle> {
        let type_name = request.type_name;
        let factory = match request.template {
            Some(name) => {
                let template = self.templates.get(name).ok_or_else(|| PersistError::Instantiation {
                    type_name: type_name.to_string(),
                    reason:    format!("unknown template '{name}'"),
                })?;
                if template.type_name != type_name {
                    return Err(PersistError::Instantiation {
                        type_name: type_name.to_string(),
                        reason:    format!("template '{name}' builds '{}'", template.type_name),
                    });
                }
                template.factory.clone()
            }
            None => request.factory.ok_or_else(|| PersistError::Instantiation {
                type_name: type_name.to_string(),
                reason:    "no template or factory available".to_string(),
            })?,
        };

        let node = self.next_node + 1;
        let handle = factory(node);
        if handle.node() != node || handle.type_name() != type_name {
            return Err(PersistError::Instantiation {
                type_name: type_name.to_string(),
                reason:    format!("factory built {handle:?}"),
            });
        }
        let name = request.name.unwrap_or(type_name).to_string();
        let allocated = self.insert_root(name, Some(handle.clone()));
        debug_assert_eq!(allocated, node);
        Ok(handle)
    }

    fn destroy(&mut self, handle: &Handle) {
        let root = handle.node();
        let owns = self
            .nodes
            .get(&root)
            .and_then(|n| n.instance.as_ref())
            .is_some_and(|h| h.ptr_eq(handle));
        if !owns {
            return;
        }

        self.detach(root);
        let mut pending = vec![root];
        while let Some(node) = pending.pop() {
            if let Some(removed) = self.nodes.remove(&node) {
                pending.extend(removed.children);
                self.anchors.retain(|_, n| *n != node);
            }
        }
    }
}

impl HierarchyHost for MemoryScene {
    fn parent_of(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(&node).and_then(|n| n.parent)
    }

    fn set_parent(&mut self, node: NodeId, parent: Option<NodeId>, sibling_index: usize) -> PersistResult<()> {
        if !self.nodes.contains_key(&node) {
            return Err(PersistError::Hierarchy {
                reason: format!("node {node} does not exist"),
            });
        }
        if let Some(p) = parent {
            if !self.nodes.contains_key(&p) {
                return Err(PersistError::Hierarchy {
                    reason: format!("parent node {p} does not exist"),
                });
            }
            if self.is_ancestor(node, p) {
                return Err(PersistError::Hierarchy {
                    reason: format!("node {node} cannot be placed under its own descendant {p}"),
                });
            }
        }

        self.detach(node);
        if let Some(n) = self.nodes.get_mut(&node) {
            n.parent = parent;
        }
        if let Some(list) = self.siblings_mut(parent) {
            let at = sibling_index.min(list.len());
            list.insert(at, node);
        }
        Ok(())
    }

    fn sibling_count(&self, parent: Option<NodeId>) -> usize {
        match parent {
            None => self.roots.len(),
            Some(p) => self.nodes.get(&p).map_or(0, |n| n.children.len()),
        }
    }

    fn sibling_index(&self, node: NodeId) -> Option<usize> {
        let parent = self.nodes.get(&node)?.parent;
        let list = match parent {
            None => &self.roots,
            Some(p) => &self.nodes.get(&p)?.children,
        };
        list.iter().position(|&n| n == node)
    }

    fn anchor(&self, name: &str) -> Option<NodeId> {
        self.anchors.get(name).copied()
    }

    fn anchor_name(&self, node: NodeId) -> Option<String> {
        self.anchors
            .iter()
            .find(|(_, &n)| n == node)
            .map(|(name, _)| name.clone())
    }

    fn instance_at(&self, node: NodeId) -> Option<Handle> {
        self.nodes.get(&node).and_then(|n| n.instance.clone())
    }

    fn node_name(&self, node: NodeId) -> Option<String> {
        self.name_of(node).map(str::to_string)
    }

    fn rename_node(&mut self, node: NodeId, name: &str) -> PersistResult<()> {
        if self.anchors.values().any(|&n| n == node) {
            return Err(PersistError::Hierarchy {
                reason: format!("anchor node {node} cannot be renamed"),
            });
        }
        let entry = self.nodes.get_mut(&node).ok_or_else(|| PersistError::Hierarchy {
            reason: format!("node {node} does not exist"),
        })?;
        entry.name = name.to_string();
        Ok(())
    }
}
