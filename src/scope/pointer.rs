//! Pointers and references — indirection into a scope's bindings.
//!
//! A [`Pointer`] is only an address: the id of the scope that owns the
//! binding plus the key inside it. It is resolved on every access, so a
//! rebinding in the owning scope is always observed.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::arena::{Binding, ScopeArena, ScopeId};
use crate::error::{Error, Result};
use crate::value::Value;

/// Longest pointer chain followed before it is treated as a cycle.
const MAX_POINTER_CHAIN: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pointer {
    scope: ScopeId,
    container: String,
    name: String,
}

impl Pointer {
    pub(crate) fn new(scope: ScopeId, container: &str, name: &str) -> Self {
        Self {
            scope,
            container: container.to_string(),
            name: name.to_string(),
        }
    }

    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn stale(&self) -> Error {
        Error::StalePointer {
            name: self.name.clone(),
        }
    }
}

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.container.is_empty() {
            write!(f, "&{}@{}", self.name, self.scope.index())
        } else {
            write!(f, "&{}:{}@{}", self.container, self.name, self.scope.index())
        }
    }
}

/// Follow a pointer chain to the address that actually holds (or will hold)
/// the binding.
pub(crate) fn resolve_target(arena: &ScopeArena, pointer: &Pointer) -> Result<Pointer> {
    let mut current = pointer.clone();
    for _ in 0..MAX_POINTER_CHAIN {
        let node = arena.node(current.scope).ok_or_else(|| current.stale())?;
        match node.get(&current.container, &current.name) {
            Some(Binding::Pointer(next)) => current = next.clone(),
            _ => return Ok(current),
        }
    }
    Err(Error::invariant(format!(
        "pointer chain for '{}' does not terminate",
        pointer.name
    )))
}

/// The value at the end of a pointer chain, `None` when nothing is bound there yet.
pub(crate) fn resolve_value(arena: &ScopeArena, pointer: &Pointer) -> Result<Option<Value>> {
    let target = resolve_target(arena, pointer)?;
    let node = arena.node(target.scope).ok_or_else(|| target.stale())?;
    Ok(match node.get(&target.container, &target.name) {
        Some(Binding::Value(value)) => Some(value.clone()),
        _ => None,
    })
}

/// Store `value` at the end of a pointer chain.
pub(crate) fn write_through(
    arena: &RefCell<ScopeArena>,
    pointer: &Pointer,
    value: Value,
) -> Result<()> {
    let previous = {
        let mut arena = arena.borrow_mut();
        let target = resolve_target(&arena, pointer)?;
        let node = arena
            .node_mut(target.scope)
            .ok_or_else(|| target.stale())?;
        node.bind(&target.container, &target.name, Binding::Value(value))
    };
    drop(previous);
    Ok(())
}

/// A user-facing handle over a [`Pointer`], readable and writable.
#[derive(Clone)]
pub struct Ref {
    arena: Rc<RefCell<ScopeArena>>,
    pointer: Pointer,
}

impl Ref {
    pub(crate) fn new(arena: Rc<RefCell<ScopeArena>>, pointer: Pointer) -> Self {
        Self { arena, pointer }
    }

    pub fn pointer(&self) -> &Pointer {
        &self.pointer
    }

    pub fn name(&self) -> &str {
        self.pointer.name()
    }

    /// Current value behind the reference.
    pub fn get(&self) -> Result<Value> {
        let value = resolve_value(&self.arena.borrow(), &self.pointer)?;
        value.ok_or_else(|| Error::lookup(self.pointer.name(), self.pointer.container()))
    }

    /// Rebind the name in the scope the pointer chain ends at.
    pub fn set(&self, value: Value) -> Result<()> {
        write_through(&self.arena, &self.pointer, value)
    }
}

impl fmt::Debug for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Ref").field(&self.pointer).finish()
    }
}

impl PartialEq for Ref {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.arena, &other.arena) && self.pointer == other.pointer
    }
}
