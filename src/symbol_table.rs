//! Name → (scope, index) resolution, nested per compilation scope, with closure conversion
//! (spec §4.5).

use std::collections::HashMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SymbolScope {
    Global,
    Local,
    Builtin,
    Free,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub scope: SymbolScope,
    pub index: usize,
}

pub struct SymbolTable {
    outer: Option<Box<SymbolTable>>,
    store: HashMap<String, Symbol>,
    num_definitions: usize,
    pub free_symbols: Vec<Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            outer: None,
            store: HashMap::new(),
            num_definitions: 0,
            free_symbols: Vec::new(),
        }
    }

    pub fn enclosed(outer: SymbolTable) -> Self {
        SymbolTable {
            outer: Some(Box::new(outer)),
            store: HashMap::new(),
            num_definitions: 0,
            free_symbols: Vec::new(),
        }
    }

    /// Consumes this (inner) table and returns the outer one it was built from, for when the
    /// compiler leaves a scope.
    pub fn into_outer(self) -> Option<SymbolTable> {
        self.outer.map(|outer| *outer)
    }

    pub fn num_definitions(&self) -> usize {
        self.num_definitions
    }

    pub fn define(&mut self, name: impl Into<String>) -> Symbol {
        let name = name.into();
        let scope = if self.outer.is_none() {
            SymbolScope::Global
        } else {
            SymbolScope::Local
        };
        let symbol = Symbol {
            name: name.clone(),
            scope,
            index: self.num_definitions,
        };
        self.num_definitions += 1;
        self.store.insert(name, symbol.clone());
        symbol
    }

    pub fn define_builtin(&mut self, index: usize, name: impl Into<String>) -> Symbol {
        let name = name.into();
        let symbol = Symbol {
            name: name.clone(),
            scope: SymbolScope::Builtin,
            index,
        };
        self.store.insert(name, symbol.clone());
        symbol
    }

    fn define_free(&mut self, original: Symbol) -> Symbol {
        self.free_symbols.push(original.clone());
        let symbol = Symbol {
            name: original.name.clone(),
            scope: SymbolScope::Free,
            index: self.free_symbols.len() - 1,
        };
        self.store.insert(original.name, symbol.clone());
        symbol
    }

    /// Resolves `name`, promoting it to FREE on the path back down from an outer scope when
    /// that symbol isn't GLOBAL or BUILTIN (spec §4.5).
    pub fn resolve(&mut self, name: &str) -> Option<Symbol> {
        if let Some(symbol) = self.store.get(name) {
            return Some(symbol.clone());
        }

        let outer = self.outer.as_mut()?;
        let resolved = outer.resolve(name)?;

        if matches!(resolved.scope, SymbolScope::Global | SymbolScope::Builtin) {
            return Some(resolved);
        }

        Some(self.define_free(resolved))
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        SymbolTable::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn globals_resolve_without_free_promotion() {
        let mut global = SymbolTable::new();
        global.define("a");
        global.define("b");

        let a = global.resolve("a").unwrap();
        assert_eq!(a.scope, SymbolScope::Global);
        assert_eq!(a.index, 0);
    }

    #[test]
    fn nested_scope_promotes_to_free_only_when_accessed_from_inner_scope() {
        let mut global = SymbolTable::new();
        global.define("a");
        global.define("b");

        let mut first_local = SymbolTable::enclosed(global);
        first_local.define("c");
        first_local.define("d");

        // resolving from the middle scope itself: c, d are LOCAL, not FREE
        let c = first_local.resolve("c").unwrap();
        assert_eq!(c.scope, SymbolScope::Local);

        let mut second_local = SymbolTable::enclosed(first_local);
        second_local.define("e");
        second_local.define("f");

        let c_from_inner = second_local.resolve("c").unwrap();
        assert_eq!(c_from_inner.scope, SymbolScope::Free);
        assert_eq!(second_local.free_symbols.len(), 1);

        let a_from_inner = second_local.resolve("a").unwrap();
        assert_eq!(a_from_inner.scope, SymbolScope::Global);
    }

    #[test]
    fn builtins_are_shared_verbatim_not_promoted_to_free() {
        let mut global = SymbolTable::new();
        global.define_builtin(0, "len");
        let mut local = SymbolTable::enclosed(global);
        let resolved = local.resolve("len").unwrap();
        assert_eq!(resolved.scope, SymbolScope::Builtin);
        assert!(local.free_symbols.is_empty());
    }

    #[test]
    fn missing_name_resolves_to_none() {
        let mut global = SymbolTable::new();
        assert_eq!(global.resolve("nope"), None);
    }
}
