//! Runtime values shared by the evaluator and, where applicable, the VM.
//!
//! [Object] is a single closed enum rather than a trait object: the evaluator and the VM's
//! builtin dispatch both match on it directly, matching the "closed tagged enum, one match per
//! handler" approach spec §9 prescribes.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::ast::BlockStatement;
use crate::code::Instructions;
use crate::environment::Environment;

/// The key used to address a value inside a [Object::Hash]. Only integers, booleans, and strings
/// are hashable (spec §3); equal content within a type hashes equal, different types never
/// collide.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum HashKey {
    Integer(i64),
    Boolean(bool),
    String(String),
}

#[derive(Clone)]
pub struct CompiledFunction {
    pub instructions: Instructions,
    pub num_locals: usize,
    pub num_parameters: usize,
}

impl fmt::Debug for CompiledFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CompiledFunction(locals={}, params={}, {} bytes)",
            self.num_locals,
            self.num_parameters,
            self.instructions.len()
        )
    }
}

#[derive(Clone)]
pub struct Closure {
    pub function: Rc<CompiledFunction>,
    pub free: Vec<Object>,
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Closure({:p})", Rc::as_ptr(&self.function))
    }
}

pub type BuiltinFn = fn(&[Object]) -> Object;

#[derive(Clone)]
pub struct Builtin {
    pub name: &'static str,
    pub func: BuiltinFn,
}

impl fmt::Debug for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Builtin({})", self.name)
    }
}

/// Every kind of value either backend can produce. `Function` is evaluator-only; `CompiledFunction`
/// and `Closure` are VM-only; everything else is shared.
#[derive(Clone, Debug)]
pub enum Object {
    Null,
    Integer(i64),
    Boolean(bool),
    String(Rc<str>),
    Array(Rc<RefCell<Vec<Object>>>),
    Hash(Rc<RefCell<HashMap<HashKey, (Object, Object)>>>),
    ReturnValue(Box<Object>),
    Error(String),
    Function {
        parameters: Vec<String>,
        body: BlockStatement,
        env: Rc<RefCell<Environment>>,
    },
    CompiledFunction(Rc<CompiledFunction>),
    Closure(Rc<Closure>),
    Builtin(Builtin),
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Object::Null, Object::Null) => true,
            (Object::Integer(a), Object::Integer(b)) => a == b,
            (Object::Boolean(a), Object::Boolean(b)) => a == b,
            (Object::String(a), Object::String(b)) => a == b,
            (Object::Error(a), Object::Error(b)) => a == b,
            // Arrays and hashes compare by container identity, not structurally (spec §3).
            (Object::Array(a), Object::Array(b)) => Rc::ptr_eq(a, b),
            (Object::Hash(a), Object::Hash(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Object {
    pub fn type_name(&self) -> &'static str {
        match self {
            Object::Null => "NULL",
            Object::Integer(_) => "INTEGER",
            Object::Boolean(_) => "BOOLEAN",
            Object::String(_) => "STRING",
            Object::Array(_) => "ARRAY",
            Object::Hash(_) => "HASH",
            Object::ReturnValue(_) => "RETURN_VALUE",
            Object::Error(_) => "ERROR",
            Object::Function { .. } => "FUNCTION",
            Object::CompiledFunction(_) => "COMPILED_FUNCTION_OBJ",
            Object::Closure(_) => "CLOSURE",
            Object::Builtin(_) => "BUILTIN",
        }
    }

    pub fn is_truthy(&self) -> bool {
        !matches!(self, Object::Null | Object::Boolean(false))
    }

    /// The hash key for this value, or `None` if it isn't hashable (spec §3).
    pub fn hash_key(&self) -> Option<HashKey> {
        match self {
            Object::Integer(i) => Some(HashKey::Integer(*i)),
            Object::Boolean(b) => Some(HashKey::Boolean(*b)),
            Object::String(s) => Some(HashKey::String(s.to_string())),
            _ => None,
        }
    }

    pub fn inspect(&self) -> String {
        match self {
            Object::Null => "null".to_string(),
            Object::Integer(i) => i.to_string(),
            Object::Boolean(b) => b.to_string(),
            Object::String(s) => s.to_string(),
            Object::Array(items) => {
                let rendered: Vec<String> =
                    items.borrow().iter().map(|i| i.inspect()).collect();
                format!("[{}]", rendered.join(", "))
            }
            Object::Hash(pairs) => {
                let rendered: Vec<String> = pairs
                    .borrow()
                    .values()
                    .map(|(k, v)| format!("{}: {}", k.inspect(), v.inspect()))
                    .collect();
                format!("{{{}}}", rendered.join(", "))
            }
            Object::ReturnValue(inner) => inner.inspect(),
            Object::Error(message) => format!("ERROR: {message}"),
            Object::Function { parameters, .. } => {
                format!("fn({}) {{ ... }}", parameters.join(", "))
            }
            Object::CompiledFunction(_) => "CompiledFunction[...]".to_string(),
            Object::Closure(_) => "Closure[...]".to_string(),
            Object::Builtin(builtin) => format!("builtin function: {}", builtin.name),
        }
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inspect())
    }
}

pub fn new_string(s: impl Into<String>) -> Object {
    Object::String(Rc::from(s.into().into_boxed_str()))
}

pub fn new_error(message: impl Into<String>) -> Object {
    Object::Error(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_hash_keys_with_equal_content_are_equal() {
        let a = new_string("hello");
        let b = new_string("hello");
        assert_eq!(a.hash_key(), b.hash_key());
    }

    #[test]
    fn different_types_never_collide() {
        assert_ne!(
            Object::Integer(1).hash_key(),
            Object::Boolean(true).hash_key()
        );
    }

    #[test]
    fn arrays_compare_by_identity() {
        let a = Object::Array(Rc::new(RefCell::new(vec![Object::Integer(1)])));
        let b = Object::Array(Rc::new(RefCell::new(vec![Object::Integer(1)])));
        assert_ne!(a, b);
        let c = a.clone();
        assert_eq!(a, c);
    }

    #[test]
    fn truthiness() {
        assert!(!Object::Null.is_truthy());
        assert!(!Object::Boolean(false).is_truthy());
        assert!(Object::Boolean(true).is_truthy());
        assert!(Object::Integer(0).is_truthy());
    }
}
