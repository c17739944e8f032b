//! Symbol scopes — the hierarchical variable environment of an evaluation.
//!
//! Every scope has named containers (the default `""`, [`INSTRUMENTS`],
//! [`INTERNAL`]) mapping identifiers to values or pointers. An *opaque* scope
//! shadows on assignment; a *transparent* one writes through to the nearest
//! enclosing binding of the same name.
//!
//! Scope nodes live in a shared arena. A [`SymbolsScope`] handle keeps its
//! node alive, each node keeps its parent alive, and the slot is reclaimed
//! once the last handle and the last child are gone.

mod arena;
mod enumerate;
mod pointer;

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::value::Value;

pub use arena::{Binding, ScopeId};
pub use enumerate::{Enumerate, EnumerateOptions};
pub use pointer::{Pointer, Ref};

use arena::{ScopeArena, ScopeGuard, ScopeNode};

/// The default container.
pub const DEFAULT: &str = "";
/// Container holding instrument definitions.
pub const INSTRUMENTS: &str = "instruments";
/// Container for interpreter bookkeeping not visible to scripts.
pub const INTERNAL: &str = "internal";

/// How a lookup walks the scope tree.
#[derive(Debug, Clone)]
pub struct LookupOptions {
    pub container: String,
    /// Continue into parent scopes when the name is not bound locally.
    pub recursive: bool,
    /// Resolve pointer bindings to their target value. When false a pointer
    /// binding comes back as a [`Value::Ref`].
    pub follow_pointers: bool,
    /// Stop before searching this scope.
    pub stop_on: Option<ScopeId>,
}

impl Default for LookupOptions {
    fn default() -> Self {
        Self {
            container: DEFAULT.to_string(),
            recursive: true,
            follow_pointers: true,
            stop_on: None,
        }
    }
}

impl LookupOptions {
    pub fn in_container(container: &str) -> Self {
        Self {
            container: container.to_string(),
            ..Self::default()
        }
    }

    pub fn local() -> Self {
        Self {
            recursive: false,
            ..Self::default()
        }
    }
}

/// What `using` should alias.
#[derive(Debug, Clone)]
pub enum UsingTarget {
    /// A name searched for in the enclosing scopes.
    Name(String),
    /// An already resolved address.
    Pointer(Pointer),
}

impl From<&str> for UsingTarget {
    fn from(name: &str) -> Self {
        UsingTarget::Name(name.to_string())
    }
}

impl From<Pointer> for UsingTarget {
    fn from(pointer: Pointer) -> Self {
        UsingTarget::Pointer(pointer)
    }
}

/// A handle to one scope node.
#[derive(Clone)]
pub struct SymbolsScope {
    arena: Rc<RefCell<ScopeArena>>,
    guard: Rc<ScopeGuard>,
}

impl SymbolsScope {
    /// A fresh, opaque root scope with its own arena.
    pub fn new_root() -> Self {
        let arena = Rc::new(RefCell::new(ScopeArena::default()));
        let id = arena.borrow_mut().insert(ScopeNode {
            parent: None,
            opaque: true,
            containers: BTreeMap::new(),
        });
        let guard = Rc::new(ScopeGuard {
            arena: Rc::downgrade(&arena),
            id,
        });
        Self { arena, guard }
    }

    /// A child scope of this one.
    pub fn fork(&self, opaque: bool) -> Self {
        let id = self.arena.borrow_mut().insert(ScopeNode {
            parent: Some(Rc::clone(&self.guard)),
            opaque,
            containers: BTreeMap::new(),
        });
        trace!(scope = id.index(), parent = self.id().index(), opaque, "scope forked");
        Self {
            arena: Rc::clone(&self.arena),
            guard: Rc::new(ScopeGuard {
                arena: Rc::downgrade(&self.arena),
                id,
            }),
        }
    }

    pub fn id(&self) -> ScopeId {
        self.guard.id
    }

    pub fn is_opaque(&self) -> bool {
        self.arena
            .borrow()
            .node(self.id())
            .map(|node| node.opaque)
            .unwrap_or(true)
    }

    pub fn parent(&self) -> Option<SymbolsScope> {
        let guard = {
            let arena = self.arena.borrow();
            arena.node(self.id())?.parent.clone()
        }?;
        Some(Self {
            arena: Rc::clone(&self.arena),
            guard,
        })
    }

    /// Number of scope nodes currently alive in this scope's arena.
    pub fn live_scopes(&self) -> usize {
        self.arena.borrow().live()
    }

    /// Look up `name`, `Ok(None)` when it is not bound anywhere searched.
    pub fn try_lookup(&self, name: &str, options: &LookupOptions) -> Result<Option<Value>> {
        let arena = self.arena.borrow();
        let mut current = Some(self.id());
        while let Some(id) = current {
            if options.stop_on == Some(id) {
                break;
            }
            let node = arena.node(id).ok_or_else(|| Error::StalePointer {
                name: name.to_string(),
            })?;
            match node.get(&options.container, name) {
                Some(Binding::Value(value)) => return Ok(Some(value.clone())),
                Some(Binding::Pointer(pointer)) if options.follow_pointers => {
                    return pointer::resolve_value(&arena, pointer);
                }
                Some(Binding::Pointer(pointer)) => {
                    return Ok(Some(Value::Ref(Ref::new(
                        Rc::clone(&self.arena),
                        pointer.clone(),
                    ))));
                }
                None if options.recursive => current = node.parent_id(),
                None => break,
            }
        }
        Ok(None)
    }

    /// Look up `name`, failing with a lookup error when it is not bound.
    pub fn lookup(&self, name: &str, options: &LookupOptions) -> Result<Value> {
        self.try_lookup(name, options)?
            .ok_or_else(|| Error::lookup(name, options.container.as_str()))
    }

    /// Look up `name`, falling back to `default` when it is not bound.
    pub fn lookup_or(&self, name: &str, options: &LookupOptions, default: Value) -> Result<Value> {
        Ok(self.try_lookup(name, options)?.unwrap_or(default))
    }

    /// Shorthand for a recursive lookup in the default container.
    pub fn get(&self, name: &str) -> Result<Value> {
        self.lookup(name, &LookupOptions::default())
    }

    /// The binding stored in this very scope, without following anything.
    pub fn lookup_raw(&self, name: &str, container: &str) -> Option<Binding> {
        let arena = self.arena.borrow();
        arena.node(self.id())?.get(container, name).cloned()
    }

    /// Assign `value` to `name`.
    ///
    /// In a transparent scope a non-local assignment to a name that is not
    /// bound here first aliases the nearest enclosing binding (stopping at the
    /// first opaque ancestor), so the write lands in that ancestor. A local
    /// pointer binding always redirects the write to the pointer's target.
    pub fn assign(&self, name: &str, value: Value, container: &str, local: bool) -> Result<()> {
        if !local && !self.is_opaque() && self.lookup_raw(name, container).is_none() {
            self.using(UsingTarget::Name(name.to_string()), None, container, true, true)?;
        }

        if let Some(Binding::Pointer(pointer)) = self.lookup_raw(name, container) {
            trace!(name, target = %pointer, "assignment redirected through pointer");
            return pointer::write_through(&self.arena, &pointer, value);
        }

        let previous = {
            let mut arena = self.arena.borrow_mut();
            let node = arena.node_mut(self.id()).ok_or_else(|| Error::StalePointer {
                name: name.to_string(),
            })?;
            node.bind(container, name, Binding::Value(value))
        };
        drop(previous);
        Ok(())
    }

    /// Shorthand for a non-local assignment in the default container.
    pub fn set(&self, name: &str, value: Value) -> Result<()> {
        self.assign(name, value, DEFAULT, false)
    }

    /// Address of the nearest binding of `name`, starting at this scope.
    ///
    /// With `shallow` the search stops after the first opaque scope. A
    /// pointer binding found along the way is followed to its final target.
    pub fn pointer(&self, name: &str, container: &str, shallow: bool) -> Result<Option<Pointer>> {
        let arena = self.arena.borrow();
        let mut current = Some(self.id());
        while let Some(id) = current {
            let node = arena.node(id).ok_or_else(|| Error::StalePointer {
                name: name.to_string(),
            })?;
            match node.get(container, name) {
                Some(Binding::Pointer(pointer)) => {
                    return pointer::resolve_target(&arena, pointer).map(Some);
                }
                Some(Binding::Value(_)) => return Ok(Some(Pointer::new(id, container, name))),
                None if shallow && node.opaque => break,
                None => current = node.parent_id(),
            }
        }
        Ok(None)
    }

    /// Bind `alias` (default: the target's name) locally to a pointer into an
    /// enclosing scope.
    ///
    /// Names are resolved starting from the parent scope. Fails with a lookup
    /// error when nothing is found, unless `soft`, in which case `Ok(None)` is
    /// returned and nothing is bound.
    pub fn using(
        &self,
        target: UsingTarget,
        alias: Option<&str>,
        container: &str,
        shallow: bool,
        soft: bool,
    ) -> Result<Option<Pointer>> {
        let (pointer, name) = match target {
            UsingTarget::Name(name) => {
                let pointer = match self.parent() {
                    Some(parent) => parent.pointer(&name, container, shallow)?,
                    None => None,
                };
                (pointer, name)
            }
            UsingTarget::Pointer(pointer) => {
                let name = pointer.name().to_string();
                (Some(pointer), name)
            }
        };

        let Some(pointer) = pointer else {
            if soft {
                return Ok(None);
            }
            return Err(Error::lookup(name, container));
        };

        let alias = alias.unwrap_or(&name);
        debug!(alias, target = %pointer, scope = self.id().index(), "using");
        let previous = {
            let mut arena = self.arena.borrow_mut();
            let node = arena.node_mut(self.id()).ok_or_else(|| Error::StalePointer {
                name: alias.to_string(),
            })?;
            node.bind(container, alias, Binding::Pointer(pointer.clone()))
        };
        drop(previous);
        Ok(Some(pointer))
    }

    /// A [`Ref`] to `name`: to its nearest binding when there is one,
    /// otherwise to a new local binding in this scope.
    pub fn reference(&self, name: &str, container: &str) -> Result<Ref> {
        let pointer = match self.pointer(name, container, false)? {
            Some(pointer) => pointer,
            None => Pointer::new(self.id(), container, name),
        };
        Ok(self.make_ref(pointer))
    }

    /// Wrap a pointer from this scope's arena as a [`Ref`].
    pub fn make_ref(&self, pointer: Pointer) -> Ref {
        Ref::new(Rc::clone(&self.arena), pointer)
    }

    /// Lazily list the visible bindings, nearest scope first, each name once.
    pub fn enumerate(&self, options: EnumerateOptions) -> Enumerate {
        Enumerate::new(self.clone(), options)
    }

    /// Snapshot of one container of this scope, for enumeration.
    fn bindings(&self, container: &str) -> Vec<(String, Binding)> {
        let arena = self.arena.borrow();
        arena
            .node(self.id())
            .and_then(|node| node.containers.get(container))
            .map(|bindings| {
                bindings
                    .iter()
                    .map(|(name, binding)| (name.clone(), binding.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn resolve(&self, pointer: &Pointer) -> Result<Option<Value>> {
        pointer::resolve_value(&self.arena.borrow(), pointer)
    }
}

impl fmt::Debug for SymbolsScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymbolsScope")
            .field("id", &self.id())
            .finish()
    }
}

impl PartialEq for SymbolsScope {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.arena, &other.arena) && self.id() == other.id()
    }
}
