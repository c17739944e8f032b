//! Evaluation context — the symbol scope, time cursor and voice threaded
//! through every evaluation step and every lazy expansion.
//!
//! A [`Context`] is a cheap handle: clones share the same cursor and voice.
//! Independent sub-evaluations get their own state through [`Context::fork`]
//! and merge their progress back with [`Context::join`].

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::error::Result;
use crate::event::Tick;
use crate::scope::{LookupOptions, SymbolsScope};
use crate::syntax::Node;
use crate::value::Value;
use crate::voice::Voice;

struct ContextState {
    symbols: SymbolsScope,
    cursor: Cell<Tick>,
    voice: RefCell<Rc<Voice>>,
}

/// Overrides applied by [`Context::fork_with`].
#[derive(Debug, Clone)]
pub struct ForkOptions {
    /// Whether the child scope shadows on assignment.
    pub opaque: bool,
    /// Start cursor; the parent's current cursor when `None`.
    pub cursor: Option<Tick>,
    /// Voice; the parent's current voice when `None`.
    pub voice: Option<Rc<Voice>>,
    /// Scope to fork the child scope from; the parent's scope when `None`.
    pub symbols: Option<SymbolsScope>,
}

impl Default for ForkOptions {
    fn default() -> Self {
        Self {
            opaque: true,
            cursor: None,
            voice: None,
            symbols: None,
        }
    }
}

#[derive(Clone)]
pub struct Context {
    state: Rc<ContextState>,
}

impl Context {
    /// A root context: empty root scope, cursor at zero, default voice.
    pub fn new() -> Self {
        Self::with_voice(Voice::default())
    }

    pub fn with_voice(voice: Voice) -> Self {
        Self::from_parts(SymbolsScope::new_root(), 0, Rc::new(voice))
    }

    fn from_parts(symbols: SymbolsScope, cursor: Tick, voice: Rc<Voice>) -> Self {
        Self {
            state: Rc::new(ContextState {
                symbols,
                cursor: Cell::new(cursor),
                voice: RefCell::new(voice),
            }),
        }
    }

    /// A child context with an opaque child scope and its own copy of the cursor.
    pub fn fork(&self) -> Context {
        self.fork_with(ForkOptions::default())
    }

    /// A child context whose scope writes through to this one.
    pub fn fork_transparent(&self) -> Context {
        self.fork_with(ForkOptions {
            opaque: false,
            ..ForkOptions::default()
        })
    }

    /// A child context positioned at `cursor`.
    pub fn fork_at(&self, cursor: Tick) -> Context {
        self.fork_with(ForkOptions {
            cursor: Some(cursor),
            ..ForkOptions::default()
        })
    }

    pub fn fork_with(&self, options: ForkOptions) -> Context {
        let parent_scope = options.symbols.as_ref().unwrap_or(&self.state.symbols);
        Self::from_parts(
            parent_scope.fork(options.opaque),
            options.cursor.unwrap_or_else(|| self.cursor()),
            options.voice.unwrap_or_else(|| self.voice()),
        )
    }

    /// Move the cursor forward to `timestamp`; never moves it backward.
    pub fn join(&self, timestamp: Tick) {
        if timestamp > self.state.cursor.get() {
            self.state.cursor.set(timestamp);
        }
    }

    /// Merge a forked child's progress back into this context.
    pub fn join_context(&self, child: &Context) {
        self.join(child.cursor());
    }

    pub fn cursor(&self) -> Tick {
        self.state.cursor.get()
    }

    /// Place the cursor anywhere, including backwards.
    pub fn set_cursor(&self, cursor: Tick) {
        self.state.cursor.set(cursor);
    }

    pub fn voice(&self) -> Rc<Voice> {
        Rc::clone(&self.state.voice.borrow())
    }

    pub fn set_voice(&self, voice: Rc<Voice>) {
        let previous = self.state.voice.replace(voice);
        drop(previous);
    }

    pub fn symbols(&self) -> &SymbolsScope {
        &self.state.symbols
    }

    /// Recursive lookup of `name` in the default container.
    pub fn lookup(&self, name: &str) -> Result<Value> {
        self.state.symbols.lookup(name, &LookupOptions::default())
    }

    /// Non-local assignment of `name` in the default container.
    pub fn assign(&self, name: &str, value: Value) -> Result<()> {
        self.state.symbols.set(name, value)
    }

    /// Evaluate a syntax node against this context.
    pub fn eval(&self, node: &dyn Node) -> Result<Value> {
        node.eval(self)
    }

    /// Whether two handles share the same state.
    pub fn same(&self, other: &Context) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("scope", &self.state.symbols.id())
            .field("cursor", &self.cursor())
            .field("voice", &self.voice().name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_only_moves_forward() {
        let ctx = Context::new();
        ctx.join(100);
        assert_eq!(ctx.cursor(), 100);
        ctx.join(40);
        assert_eq!(ctx.cursor(), 100);
        ctx.set_cursor(40);
        assert_eq!(ctx.cursor(), 40);
    }

    #[test]
    fn fork_has_independent_cursor() {
        let ctx = Context::new();
        ctx.join(10);
        let child = ctx.fork();
        assert_eq!(child.cursor(), 10);
        child.join(500);
        assert_eq!(ctx.cursor(), 10);
        ctx.join_context(&child);
        assert_eq!(ctx.cursor(), 500);
    }

    #[test]
    fn clones_alias_state() {
        let ctx = Context::new();
        let alias = ctx.clone();
        alias.join(7);
        assert_eq!(ctx.cursor(), 7);
        assert!(ctx.same(&alias));
        assert!(!ctx.same(&ctx.fork()));
    }

    #[test]
    fn fork_inherits_voice_unless_overridden() {
        let ctx = Context::with_voice(Voice::new("piano"));
        assert_eq!(ctx.fork().voice().name, "piano");

        let other = ctx.fork_with(ForkOptions {
            voice: Some(Rc::new(Voice::new("bass"))),
            cursor: Some(960),
            ..ForkOptions::default()
        });
        assert_eq!(other.voice().name, "bass");
        assert_eq!(other.cursor(), 960);
        assert_eq!(ctx.voice().name, "piano");
    }

    #[test]
    fn opaque_fork_shadows_transparent_fork_writes_through() {
        let ctx = Context::new();
        ctx.assign("x", Value::Int(1)).unwrap();

        ctx.fork().assign("x", Value::Int(2)).unwrap();
        assert!(matches!(ctx.lookup("x").unwrap(), Value::Int(1)));

        ctx.fork_transparent().assign("x", Value::Int(3)).unwrap();
        assert!(matches!(ctx.lookup("x").unwrap(), Value::Int(3)));
    }

    #[test]
    fn fork_from_foreign_scope() {
        let definition = Context::new();
        definition.assign("y", Value::Int(4)).unwrap();
        let caller = Context::new();
        caller.join(300);

        let call = caller.fork_with(ForkOptions {
            symbols: Some(definition.symbols().clone()),
            ..ForkOptions::default()
        });
        assert_eq!(call.cursor(), 300);
        assert!(matches!(call.lookup("y").unwrap(), Value::Int(4)));
    }
}
