//! Lazy listing of visible bindings.

use std::collections::HashSet;

use super::arena::Binding;
use super::{SymbolsScope, DEFAULT};
use crate::value::Value;

/// Filters for [`SymbolsScope::enumerate`].
#[derive(Debug, Clone)]
pub struct EnumerateOptions {
    /// Only names starting with this prefix.
    pub prefix: Option<String>,
    /// Stop after this many entries.
    pub limit: Option<usize>,
    /// Names never yielded. Every yielded name is added, so a name shadowed
    /// further up the tree is reported once, from the nearest scope.
    pub ignore: HashSet<String>,
    pub container: String,
    /// Only this scope, not its ancestors.
    pub local: bool,
}

impl Default for EnumerateOptions {
    fn default() -> Self {
        Self {
            prefix: None,
            limit: None,
            ignore: HashSet::new(),
            container: DEFAULT.to_string(),
            local: false,
        }
    }
}

/// Iterator over `(name, value)` pairs, walking one scope at a time.
///
/// Pointer bindings are resolved to the value they address; pointers whose
/// target is gone or unbound are skipped.
pub struct Enumerate {
    scope: Option<SymbolsScope>,
    pending: std::vec::IntoIter<(String, Binding)>,
    options: EnumerateOptions,
    yielded: usize,
}

impl Enumerate {
    pub(super) fn new(scope: SymbolsScope, options: EnumerateOptions) -> Self {
        let pending = scope.bindings(&options.container).into_iter();
        Self {
            scope: Some(scope),
            pending,
            options,
            yielded: 0,
        }
    }

    fn advance_scope(&mut self) -> bool {
        if self.options.local {
            self.scope = None;
            return false;
        }
        self.scope = self.scope.as_ref().and_then(SymbolsScope::parent);
        match &self.scope {
            Some(scope) => {
                self.pending = scope.bindings(&self.options.container).into_iter();
                true
            }
            None => false,
        }
    }
}

impl Iterator for Enumerate {
    type Item = (String, Value);

    fn next(&mut self) -> Option<Self::Item> {
        if self.options.limit.is_some_and(|limit| self.yielded >= limit) {
            return None;
        }
        loop {
            let Some((name, binding)) = self.pending.next() else {
                if self.advance_scope() {
                    continue;
                }
                return None;
            };
            if self.options.ignore.contains(&name) {
                continue;
            }
            if let Some(prefix) = &self.options.prefix {
                if !name.starts_with(prefix.as_str()) {
                    continue;
                }
            }
            // Shadows outer bindings even when its own target is gone.
            self.options.ignore.insert(name.clone());
            let value = match binding {
                Binding::Value(value) => value,
                Binding::Pointer(pointer) => {
                    let resolved = self
                        .scope
                        .as_ref()
                        .and_then(|scope| scope.resolve(&pointer).ok().flatten());
                    match resolved {
                        Some(value) => value,
                        None => continue,
                    }
                }
            };
            self.yielded += 1;
            return Some((name, value));
        }
    }
}
