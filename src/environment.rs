//! Lexically nested name → value bindings used by the tree-walking evaluator.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::object::Object;

/// A single scope in the environment chain. Reference-counted so that closures can capture the
/// environment they were defined in without the evaluator needing to track explicit lifetimes
/// (spec §9: "store environments as reference-counted handles linked by `outer`").
#[derive(Debug)]
pub struct Environment {
    store: HashMap<String, Object>,
    outer: Option<Rc<RefCell<Environment>>>,
}

impl Environment {
    pub fn new() -> Rc<RefCell<Environment>> {
        Rc::new(RefCell::new(Environment {
            store: HashMap::new(),
            outer: None,
        }))
    }

    pub fn enclosed(outer: Rc<RefCell<Environment>>) -> Rc<RefCell<Environment>> {
        Rc::new(RefCell::new(Environment {
            store: HashMap::new(),
            outer: Some(outer),
        }))
    }

    /// Walks the chain outward until `name` is found.
    pub fn get(&self, name: &str) -> Option<Object> {
        match self.store.get(name) {
            Some(value) => Some(value.clone()),
            None => self
                .outer
                .as_ref()
                .and_then(|outer| outer.borrow().get(name)),
        }
    }

    pub fn set(&mut self, name: impl Into<String>, value: Object) {
        self.store.insert(name.into(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_walks_outer_chain() {
        let outer = Environment::new();
        outer.borrow_mut().set("x", Object::Integer(1));
        let inner = Environment::enclosed(outer);
        assert_eq!(inner.borrow().get("x"), Some(Object::Integer(1)));
    }

    #[test]
    fn inner_binding_shadows_outer() {
        let outer = Environment::new();
        outer.borrow_mut().set("x", Object::Integer(1));
        let inner = Environment::enclosed(outer.clone());
        inner.borrow_mut().set("x", Object::Integer(2));
        assert_eq!(inner.borrow().get("x"), Some(Object::Integer(2)));
        assert_eq!(outer.borrow().get("x"), Some(Object::Integer(1)));
    }

    #[test]
    fn missing_name_returns_none() {
        let env = Environment::new();
        assert_eq!(env.borrow().get("missing"), None);
    }
}
