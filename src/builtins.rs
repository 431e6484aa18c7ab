//! The built-in function table, shared by the evaluator (name lookup on identifier miss) and the
//! compiler/VM (`GET_BUILTIN idx` addresses this same table by position, spec §4.6).

use crate::object::{new_error, new_string, Builtin, Object};

/// Ordered by index: the compiler pre-defines these on the root symbol table in this order, and
/// `GET_BUILTIN idx` indexes into this slice at VM time (spec §4.6).
pub const BUILTINS: &[Builtin] = &[
    Builtin {
        name: "len",
        func: builtin_len,
    },
    Builtin {
        name: "first",
        func: builtin_first,
    },
    Builtin {
        name: "last",
        func: builtin_last,
    },
    Builtin {
        name: "rest",
        func: builtin_rest,
    },
    Builtin {
        name: "push",
        func: builtin_push,
    },
    Builtin {
        name: "puts",
        func: builtin_puts,
    },
];

pub fn lookup(name: &str) -> Option<(usize, &'static Builtin)> {
    BUILTINS.iter().enumerate().find(|(_, b)| b.name == name)
}

fn arity_error(got: usize, want: usize) -> Object {
    new_error(format!("wrong number of arguments, got {got}, want {want}"))
}

fn builtin_len(args: &[Object]) -> Object {
    if args.len() != 1 {
        return arity_error(args.len(), 1);
    }
    match &args[0] {
        Object::String(s) => Object::Integer(s.chars().count() as i64),
        Object::Array(items) => Object::Integer(items.borrow().len() as i64),
        other => new_error(format!(
            "argument to `len` not supported, got {}",
            other.type_name()
        )),
    }
}

fn builtin_first(args: &[Object]) -> Object {
    if args.len() != 1 {
        return arity_error(args.len(), 1);
    }
    match &args[0] {
        Object::Array(items) => items.borrow().first().cloned().unwrap_or(Object::Null),
        other => new_error(format!(
            "argument to `first` must be ARRAY, got {}",
            other.type_name()
        )),
    }
}

fn builtin_last(args: &[Object]) -> Object {
    if args.len() != 1 {
        return arity_error(args.len(), 1);
    }
    match &args[0] {
        Object::Array(items) => items.borrow().last().cloned().unwrap_or(Object::Null),
        other => new_error(format!(
            "argument to `last` must be ARRAY, got {}",
            other.type_name()
        )),
    }
}

fn builtin_rest(args: &[Object]) -> Object {
    if args.len() != 1 {
        return arity_error(args.len(), 1);
    }
    match &args[0] {
        Object::Array(items) => {
            let items = items.borrow();
            if items.is_empty() {
                Object::Array(std::rc::Rc::new(std::cell::RefCell::new(Vec::new())))
            } else {
                let rest = items[1..].to_vec();
                Object::Array(std::rc::Rc::new(std::cell::RefCell::new(rest)))
            }
        }
        other => new_error(format!(
            "argument to `rest` must be ARRAY, got {}",
            other.type_name()
        )),
    }
}

fn builtin_push(args: &[Object]) -> Object {
    if args.len() != 2 {
        return arity_error(args.len(), 2);
    }
    match &args[0] {
        Object::Array(items) => {
            let mut new_items = items.borrow().clone();
            new_items.push(args[1].clone());
            Object::Array(std::rc::Rc::new(std::cell::RefCell::new(new_items)))
        }
        other => new_error(format!(
            "argument to `push` must be ARRAY, got {}",
            other.type_name()
        )),
    }
}

fn builtin_puts(args: &[Object]) -> Object {
    for arg in args {
        println!("{}", arg.inspect());
    }
    Object::Null
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn array(items: Vec<Object>) -> Object {
        Object::Array(Rc::new(RefCell::new(items)))
    }

    #[test]
    fn len_on_string_and_array() {
        assert_eq!(
            builtin_len(&[new_string("hello")]),
            Object::Integer(5)
        );
        assert_eq!(
            builtin_len(&[array(vec![Object::Integer(1), Object::Integer(2)])]),
            Object::Integer(2)
        );
    }

    #[test]
    fn len_rejects_unsupported_type() {
        match builtin_len(&[Object::Integer(1)]) {
            Object::Error(msg) => assert!(msg.contains("not supported")),
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn push_does_not_mutate_original() {
        let original = Rc::new(RefCell::new(vec![Object::Integer(1)]));
        let result = builtin_push(&[Object::Array(original.clone()), Object::Integer(2)]);
        assert_eq!(original.borrow().len(), 1);
        match result {
            Object::Array(items) => assert_eq!(items.borrow().len(), 2),
            other => panic!("expected array, got {other:?}"),
        }
    }

    #[test]
    fn rest_of_empty_array_is_empty_array() {
        let result = builtin_rest(&[array(vec![])]);
        match result {
            Object::Array(items) => assert!(items.borrow().is_empty()),
            other => panic!("expected array, got {other:?}"),
        }
    }

    #[test]
    fn lookup_finds_builtins_by_name_and_index() {
        let (idx, builtin) = lookup("first").expect("first should be registered");
        assert_eq!(builtin.name, "first");
        assert_eq!(BUILTINS[idx].name, "first");
    }
}
