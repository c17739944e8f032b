//! Scope storage — every scope node lives in one arena slot, addressed by a
//! generational index so pointers never hold a live reference to a scope.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use tracing::{trace, warn};

use super::pointer::Pointer;
use crate::value::Value;

/// Stable address of a scope node. The generation changes whenever a slot is
/// reused, so an id held past its scope's lifetime resolves to nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId {
    index: u32,
    generation: u32,
}

impl ScopeId {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

/// What a name is bound to inside a container.
#[derive(Clone)]
pub enum Binding {
    Value(Value),
    Pointer(Pointer),
}

pub(crate) type Container = BTreeMap<String, Binding>;

pub(crate) struct ScopeNode {
    /// Keeps the parent slot alive for as long as this node exists.
    pub parent: Option<Rc<ScopeGuard>>,
    pub opaque: bool,
    pub containers: BTreeMap<String, Container>,
}

impl ScopeNode {
    pub fn parent_id(&self) -> Option<ScopeId> {
        self.parent.as_ref().map(|guard| guard.id)
    }

    pub fn get(&self, container: &str, name: &str) -> Option<&Binding> {
        self.containers.get(container)?.get(name)
    }

    /// Bind `name`, returning the previous binding so the caller can drop it
    /// once the arena is no longer borrowed.
    pub fn bind(&mut self, container: &str, name: &str, binding: Binding) -> Option<Binding> {
        self.containers
            .entry(container.to_string())
            .or_default()
            .insert(name.to_string(), binding)
    }
}

struct Slot {
    generation: u32,
    node: Option<ScopeNode>,
}

#[derive(Default)]
pub(crate) struct ScopeArena {
    slots: Vec<Slot>,
    free: Vec<usize>,
}

impl ScopeArena {
    pub fn insert(&mut self, node: ScopeNode) -> ScopeId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index];
            slot.node = Some(node);
            return ScopeId {
                index: index as u32,
                generation: slot.generation,
            };
        }
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        ScopeId {
            index: (self.slots.len() - 1) as u32,
            generation: 0,
        }
    }

    pub fn node(&self, id: ScopeId) -> Option<&ScopeNode> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_ref()
    }

    pub fn node_mut(&mut self, id: ScopeId) -> Option<&mut ScopeNode> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_mut()
    }

    /// Empty a slot and bump its generation. The node is handed back so its
    /// bindings (and its parent guard) are dropped outside the arena borrow.
    pub fn release(&mut self, id: ScopeId) -> Option<ScopeNode> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let node = slot.node.take();
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index as usize);
        node
    }

    pub fn live(&self) -> usize {
        self.slots.iter().filter(|s| s.node.is_some()).count()
    }
}

/// Ownership token for one arena slot. The slot is released when the last
/// `Rc<ScopeGuard>` goes away (handles and child nodes both hold one).
pub(crate) struct ScopeGuard {
    pub arena: Weak<RefCell<ScopeArena>>,
    pub id: ScopeId,
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        let Some(arena) = self.arena.upgrade() else {
            return;
        };
        let released = match arena.try_borrow_mut() {
            Ok(mut arena) => arena.release(self.id),
            Err(_) => {
                warn!(scope = self.id.index, "scope released while the arena is borrowed; slot leaked");
                None
            }
        };
        if released.is_some() {
            trace!(scope = self.id.index, "scope released");
        }
        drop(released);
    }
}
