//! Identity & instance registry.
//!
//! RULE: the registry is a lookup table, never an owner. It holds weak
//! back-references only; an instance the host destroys simply stops
//! resolving.
//!
//! Two structures are kept:
//!   - `index`:   identity -> instance (each key maps to at most one)
//!   - `members`: every activated instance, in activation order
//! They normally agree. They diverge only when two instances end up
//! claiming the same identity; `snapshot()` then keeps the first.
//!
//! `members` is slotted: `slots` maps an instance's address to its slot
//! and unregistering leaves a hole. Holes and dead members are compacted
//! whenever the table doubles since the last compaction.

use crate::{
    instance::{Handle, PersistableType, WeakHandle},
    rng::TokenSource,
    types::Identity,
};
use std::collections::{HashMap, HashSet};

const MIN_COMPACT: usize = 64;

#[derive(Debug, Default)]
pub struct InstanceRegistry {
    index:    HashMap<Identity, WeakHandle>,
    members:  Vec<Option<WeakHandle>>,
    slots:    HashMap<usize, usize>,
    prefixes: HashMap<String, String>,
    /// type name -> every type it extends
    bases:    HashMap<String, Vec<String>>,
    tokens:   TokenSource,
    /// Member count that triggers the next compaction.
    compact_at: usize,
}

/// Result of deduplicating the live instance set for a save.
#[derive(Debug, Default)]
pub struct RegistrySnapshot {
    pub instances:  Vec<Handle>,
    /// Identities claimed by more than one live instance.
    pub duplicates: Vec<Identity>,
}

impl InstanceRegistry {
    pub fn new(tokens: TokenSource) -> Self {
        Self {
            tokens,
            ..Self::default()
        }
    }

    /// Identity prefix for a type. Unset types use their own name.
    pub fn set_prefix(&mut self, type_name: impl Into<String>, prefix: impl Into<String>) {
        self.prefixes.insert(type_name.into(), prefix.into());
    }

    pub fn prefix_for<'a>(&'a self, type_name: &'a str) -> &'a str {
        self.prefixes.get(type_name).map(String::as_str).unwrap_or(type_name)
    }

    /// Record the types `type_name` extends.
    pub fn set_bases(&mut self, type_name: impl Into<String>, bases: Vec<String>) {
        self.bases.insert(type_name.into(), bases);
    }

    /// True when an instance of `type_name` may stand where `expected` is
    /// declared: the same type or one that extends it.
    pub fn is_compatible(&self, type_name: &str, expected: &str) -> bool {
        type_name == expected
            || self
                .bases
                .get(type_name)
                .is_some_and(|bases| bases.iter().any(|b| b == expected))
    }

    /// Mint a fresh identity for a type without registering anything.
    pub fn mint(&mut self, type_name: &str) -> Identity {
        let token = self.tokens.next_token();
        format!("{}_{}", self.prefix_for(type_name), token)
    }

    /// Activate an instance. An empty identity is synthesized first
    /// (mutating the instance). If another live instance already holds
    /// the identity, that first holder keeps the index entry and a
    /// warning is logged; the newcomer is still tracked as a member.
    pub fn register(&mut self, handle: &Handle) -> Identity {
        let (type_name, current) = {
            let inner = handle.borrow();
            (inner.type_name(), inner.identity().to_string())
        };
        let id = if current.is_empty() {
            let id = self.mint(type_name);
            handle.borrow_mut().set_identity(id.clone());
            id
        } else {
            current
        };

        self.track(handle);

        match self.index.get(&id).and_then(WeakHandle::upgrade) {
            Some(holder) if !holder.ptr_eq(handle) => {
                log::warn!(
                    "Duplicate identity '{id}': {type_name}#{} collides with {}#{}; keeping the first",
                    handle.node(),
                    holder.type_name(),
                    holder.node()
                );
            }
            _ => {
                self.index.insert(id.clone(), handle.downgrade());
            }
        }
        id
    }

    /// Deactivate an instance: drop its index entry (if it holds one) and
    /// its membership.
    pub fn unregister(&mut self, handle: &Handle) {
        let id = handle.identity();
        if self.index.get(&id).is_some_and(|w| w.points_to(handle)) {
            self.index.remove(&id);
        }
        if let Some(slot) = self.slots.remove(&handle.addr()) {
            self.members[slot] = None;
        }
    }

    /// Look up a live instance by identity.
    pub fn get(&self, id: &str) -> Option<Handle> {
        if id.is_empty() {
            return None;
        }
        self.index.get(id).and_then(WeakHandle::upgrade)
    }

    /// Look up a live instance by identity that is a `T` or extends it.
    /// Absent or mismatched yields `None`, never an error.
    pub fn resolve<T: PersistableType>(&self, id: &str) -> Option<Handle> {
        self.resolve_named(id, T::TYPE_NAME)
    }

    /// Same as `resolve`, with the type given by name.
    pub fn resolve_named(&self, id: &str, type_name: &str) -> Option<Handle> {
        self.get(id).filter(|h| self.is_compatible(h.type_name(), type_name))
    }

    /// Force an instance onto a specific identity: remove its old key,
    /// assign the new one, install it.
    pub fn update_identity(&mut self, handle: &Handle, new_id: Identity) {
        let old = handle.identity();
        if !old.is_empty() && self.index.get(&old).is_some_and(|w| w.points_to(handle)) {
            self.index.remove(&old);
        }
        handle.borrow_mut().set_identity(new_id);
        self.register(handle);
    }

    /// Empty the table. Prefixes and the token source survive.
    pub fn clear(&mut self) {
        self.index.clear();
        self.members.clear();
        self.slots.clear();
    }

    /// Move every entry of `other` into this registry.
    pub fn absorb(&mut self, other: InstanceRegistry) {
        for handle in other.live() {
            self.register(&handle);
        }
    }

    /// An empty registry sharing this one's prefixes and type lineage,
    /// with a forked token source. Used to stage a load off to the side.
    pub fn detached(&mut self) -> InstanceRegistry {
        InstanceRegistry {
            index:    HashMap::new(),
            members:  Vec::new(),
            slots:    HashMap::new(),
            prefixes: self.prefixes.clone(),
            bases:    self.bases.clone(),
            tokens:   self.tokens.fork(),
            compact_at: 0,
        }
    }

    /// Every live member, in activation order.
    pub fn live(&self) -> Vec<Handle> {
        self.members.iter().flatten().filter_map(WeakHandle::upgrade).collect()
    }

    /// Live members deduplicated by current identity. Exactly one
    /// representative (the first activated) survives per identity.
    pub fn snapshot(&self) -> RegistrySnapshot {
        let mut seen: HashSet<Identity> = HashSet::new();
        let mut reported: HashSet<Identity> = HashSet::new();
        let mut snapshot = RegistrySnapshot::default();

        for handle in self.live() {
            let id = handle.identity();
            if seen.insert(id.clone()) {
                snapshot.instances.push(handle);
            } else if reported.insert(id.clone()) {
                log::warn!("Identity '{id}' is held by more than one live instance; saving one");
                snapshot.duplicates.push(id);
            }
        }
        snapshot
    }

    /// Drop members whose instances no longer exist.
    pub fn prune(&mut self) {
        self.members.retain(|m| m.as_ref().is_some_and(WeakHandle::is_live));
        self.slots = self
            .members
            .iter()
            .enumerate()
            .filter_map(|(slot, m)| m.as_ref().and_then(WeakHandle::upgrade).map(|h| (h.addr(), slot)))
            .collect();
        self.index.retain(|_, w| w.is_live());
        self.compact_at = (2 * self.members.len()).max(MIN_COMPACT);
    }

    pub fn len(&self) -> usize {
        self.index.values().filter(|w| w.is_live()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Member slots held, live or not. `register` compacts as it goes, so
    /// this stays within twice the peak live count (or a small floor).
    pub fn member_slots(&self) -> usize {
        self.members.len()
    }

    fn track(&mut self, handle: &Handle) {
        let addr = handle.addr();
        // A tracked weak keeps the allocation alive, so the address cannot
        // have been reused by another instance.
        if self.slots.contains_key(&addr) {
            return;
        }
        if self.members.len() >= self.compact_at.max(MIN_COMPACT) {
            self.prune();
        }
        self.slots.insert(addr, self.members.len());
        self.members.push(Some(handle.downgrade()));
    }
}
