//! Tree-walking evaluator: `(node, env) -> Object`, dispatched recursively over the AST (spec
//! §4.3). Every sub-evaluation checks for an [Object::Error] or [Object::ReturnValue] and
//! propagates it rather than continuing, which is the evaluator's only control-flow mechanism.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::{BlockStatement, Expression, Program, Statement};
use crate::builtins;
use crate::environment::Environment;
use crate::object::{new_error, new_string, Object};

pub fn eval_program(program: &Program, env: &Rc<RefCell<Environment>>) -> Object {
    let mut result = Object::Null;
    for statement in &program.statements {
        result = eval_statement(statement, env);
        match result {
            Object::ReturnValue(value) => return *value,
            Object::Error(_) => return result,
            _ => {}
        }
    }
    result
}

fn eval_block(block: &BlockStatement, env: &Rc<RefCell<Environment>>) -> Object {
    let mut result = Object::Null;
    for statement in block {
        result = eval_statement(statement, env);
        // The wrapper itself propagates here (unlike at Program level) so an outer Call can
        // unwrap it after this block returns.
        if matches!(result, Object::ReturnValue(_) | Object::Error(_)) {
            return result;
        }
    }
    result
}

fn eval_statement(statement: &Statement, env: &Rc<RefCell<Environment>>) -> Object {
    match statement {
        Statement::Let { name, value } => {
            let value = eval_expression(value, env);
            if is_error(&value) {
                return value;
            }
            env.borrow_mut().set(name.clone(), value);
            Object::Null
        }
        Statement::Return { value } => {
            let value = eval_expression(value, env);
            if is_error(&value) {
                return value;
            }
            Object::ReturnValue(Box::new(value))
        }
        Statement::Expression(expr) => eval_expression(expr, env),
    }
}

fn is_error(obj: &Object) -> bool {
    matches!(obj, Object::Error(_))
}

fn eval_expression(expr: &Expression, env: &Rc<RefCell<Environment>>) -> Object {
    match expr {
        Expression::IntegerLiteral(value) => Object::Integer(*value),
        Expression::BooleanLiteral(value) => Object::Boolean(*value),
        Expression::StringLiteral(value) => new_string(value.clone()),
        Expression::Identifier(name) => eval_identifier(name, env),
        Expression::Prefix { operator, right } => {
            let right = eval_expression(right, env);
            if is_error(&right) {
                return right;
            }
            eval_prefix_expression(operator, &right)
        }
        Expression::Infix { operator, left, right } => {
            let left = eval_expression(left, env);
            if is_error(&left) {
                return left;
            }
            let right = eval_expression(right, env);
            if is_error(&right) {
                return right;
            }
            eval_infix_expression(operator, &left, &right)
        }
        Expression::If {
            condition,
            consequence,
            alternative,
        } => eval_if_expression(condition, consequence, alternative.as_ref(), env),
        Expression::FunctionLiteral { parameters, body } => Object::Function {
            parameters: parameters.clone(),
            body: body.clone(),
            env: env.clone(),
        },
        Expression::Call { function, arguments } => {
            let function = eval_expression(function, env);
            if is_error(&function) {
                return function;
            }
            let args = match eval_expressions(arguments, env) {
                Ok(args) => args,
                Err(err) => return err,
            };
            apply_function(&function, &args)
        }
        Expression::ArrayLiteral(items) => match eval_expressions(items, env) {
            Ok(items) => Object::Array(Rc::new(RefCell::new(items))),
            Err(err) => err,
        },
        Expression::HashLiteral(pairs) => eval_hash_literal(pairs, env),
        Expression::Index { left, index } => {
            let left = eval_expression(left, env);
            if is_error(&left) {
                return left;
            }
            let index = eval_expression(index, env);
            if is_error(&index) {
                return index;
            }
            eval_index_expression(&left, &index)
        }
    }
}

fn eval_identifier(name: &str, env: &Rc<RefCell<Environment>>) -> Object {
    if let Some(value) = env.borrow().get(name) {
        return value;
    }
    if let Some((_, builtin)) = builtins::lookup(name) {
        return Object::Builtin(builtin.clone());
    }
    new_error(format!("missing identifier: {name}"))
}

fn eval_expressions(
    exprs: &[Expression],
    env: &Rc<RefCell<Environment>>,
) -> Result<Vec<Object>, Object> {
    let mut values = Vec::with_capacity(exprs.len());
    for expr in exprs {
        let value = eval_expression(expr, env);
        if is_error(&value) {
            return Err(value);
        }
        values.push(value);
    }
    Ok(values)
}

fn eval_prefix_expression(operator: &str, right: &Object) -> Object {
    match operator {
        "!" => Object::Boolean(!right.is_truthy()),
        "-" => match right {
            Object::Integer(value) => Object::Integer(-value),
            other => new_error(format!("unknown operator: -{}", other.type_name())),
        },
        other => new_error(format!("unknown operator: {other}{}", right.type_name())),
    }
}

fn eval_infix_expression(operator: &str, left: &Object, right: &Object) -> Object {
    match (left, right) {
        (Object::Integer(l), Object::Integer(r)) => eval_integer_infix(operator, *l, *r),
        (Object::String(l), Object::String(r)) => eval_string_infix(operator, l, r),
        (Object::Boolean(l), Object::Boolean(r)) => match operator {
            "==" => Object::Boolean(l == r),
            "!=" => Object::Boolean(l != r),
            _ => new_error(format!(
                "unknown operator: {} {operator} {}",
                left.type_name(),
                right.type_name()
            )),
        },
        _ if left.type_name() != right.type_name() => new_error(format!(
            "type mismatch: {} {operator} {}",
            left.type_name(),
            right.type_name()
        )),
        _ => new_error(format!(
            "unknown operator: {} {operator} {}",
            left.type_name(),
            right.type_name()
        )),
    }
}

/// Truncating (round-toward-zero) division, matching Rust's native `/` on `i64`. Chosen per
/// spec §9's open question on division semantics; documented in DESIGN.md.
fn eval_integer_infix(operator: &str, left: i64, right: i64) -> Object {
    match operator {
        "+" => Object::Integer(left + right),
        "-" => Object::Integer(left - right),
        "*" => Object::Integer(left * right),
        "/" => Object::Integer(left / right),
        "<" => Object::Boolean(left < right),
        ">" => Object::Boolean(left > right),
        "==" => Object::Boolean(left == right),
        "!=" => Object::Boolean(left != right),
        other => new_error(format!("unknown operator: INTEGER {other} INTEGER")),
    }
}

fn eval_string_infix(operator: &str, left: &str, right: &str) -> Object {
    match operator {
        "+" => new_string(format!("{left}{right}")),
        other => new_error(format!("unknown operator: STRING {other} STRING")),
    }
}

fn eval_if_expression(
    condition: &Expression,
    consequence: &BlockStatement,
    alternative: Option<&BlockStatement>,
    env: &Rc<RefCell<Environment>>,
) -> Object {
    let condition = eval_expression(condition, env);
    if is_error(&condition) {
        return condition;
    }
    if condition.is_truthy() {
        eval_block(consequence, env)
    } else if let Some(alternative) = alternative {
        eval_block(alternative, env)
    } else {
        Object::Null
    }
}

fn eval_hash_literal(
    pairs: &[(Expression, Expression)],
    env: &Rc<RefCell<Environment>>,
) -> Object {
    let mut map = HashMap::new();
    for (key_expr, value_expr) in pairs {
        let key = eval_expression(key_expr, env);
        if is_error(&key) {
            return key;
        }
        let value = eval_expression(value_expr, env);
        if is_error(&value) {
            return value;
        }
        let hash_key = match key.hash_key() {
            Some(hk) => hk,
            None => return new_error(format!("unusable as hash key: {}", key.type_name())),
        };
        // Last write wins on duplicate keys (spec §4.3).
        map.insert(hash_key, (key, value));
    }
    Object::Hash(Rc::new(RefCell::new(map)))
}

fn eval_index_expression(left: &Object, index: &Object) -> Object {
    match (left, index) {
        (Object::Array(items), Object::Integer(i)) => {
            let items = items.borrow();
            if *i < 0 || *i as usize >= items.len() {
                return new_error(format!(
                    "invalid index: index must be between 0 and {} inclusive",
                    items.len().saturating_sub(1)
                ));
            }
            items[*i as usize].clone()
        }
        (Object::Hash(map), key) => {
            let hash_key = match key.hash_key() {
                Some(hk) => hk,
                None => {
                    return new_error(format!(
                        "invalid index: can't index HASH with {}",
                        key.type_name()
                    ))
                }
            };
            match map.borrow().get(&hash_key) {
                Some((_, value)) => value.clone(),
                None => new_error(format!("key error: no value with key \"{}\"", key.inspect())),
            }
        }
        _ => new_error(format!(
            "invalid index: can't index {} with {}",
            left.type_name(),
            index.type_name()
        )),
    }
}

fn apply_function(function: &Object, args: &[Object]) -> Object {
    match function {
        Object::Function {
            parameters,
            body,
            env,
        } => {
            // Extra or missing arguments are an explicit error (spec §9's open question,
            // resolved here rather than overreading the parameter list).
            if args.len() != parameters.len() {
                return new_error(format!(
                    "wrong number of arguments: got {}, want {}",
                    args.len(),
                    parameters.len()
                ));
            }
            let call_env = Environment::enclosed(env.clone());
            for (param, arg) in parameters.iter().zip(args) {
                call_env.borrow_mut().set(param.clone(), arg.clone());
            }
            let result = eval_block(body, &call_env);
            match result {
                Object::ReturnValue(value) => *value,
                other => other,
            }
        }
        Object::Builtin(builtin) => (builtin.func)(args),
        other => new_error(format!("not a function: {}", other.type_name())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn eval(source: &str) -> Object {
        let mut parser = Parser::from_source(source);
        let program = parser.parse_program();
        assert!(parser.errors().is_empty(), "{:?}", parser.errors());
        let env = Environment::new();
        eval_program(&program, &env)
    }

    #[test]
    fn integer_arithmetic() {
        assert_eq!(eval("5 + 5 * 2 - 10 / 2"), Object::Integer(10));
    }

    #[test]
    fn string_concatenation() {
        assert_eq!(eval(r#""foo" + "bar""#), new_string("foobar"));
    }

    #[test]
    fn boolean_identity_equality() {
        assert_eq!(eval("true == true"), Object::Boolean(true));
        assert_eq!(eval("(1 < 2) == true"), Object::Boolean(true));
    }

    #[test]
    fn if_else_truthiness() {
        assert_eq!(eval("if (1 > 2) { 10 } else { 20 }"), Object::Integer(20));
        assert_eq!(eval("if (false) { 10 }"), Object::Null);
    }

    #[test]
    fn nested_return_short_circuits_outer_block() {
        let source = "if (10 > 1) { if (10 > 1) { return 10; } return 1; }";
        assert_eq!(eval(source), Object::Integer(10));
    }

    #[test]
    fn closures_capture_environment() {
        let source = "let newAdder = fn(x) { fn(y) { x + y }; }; let addTwo = newAdder(2); addTwo(2);";
        assert_eq!(eval(source), Object::Integer(4));
    }

    #[test]
    fn error_messages() {
        match eval("-true") {
            Object::Error(msg) => assert_eq!(msg, "unknown operator: -BOOLEAN"),
            other => panic!("expected error, got {other:?}"),
        }
        match eval("foobar") {
            Object::Error(msg) => assert_eq!(msg, "missing identifier: foobar"),
            other => panic!("expected error, got {other:?}"),
        }
        match eval("5 + true") {
            Object::Error(msg) => assert_eq!(msg, "type mismatch: INTEGER + BOOLEAN"),
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn array_index_out_of_bounds() {
        match eval("[1, 2, 3][3]") {
            Object::Error(msg) => {
                assert_eq!(msg, "invalid index: index must be between 0 and 2 inclusive")
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn hash_literal_and_index() {
        let source = r#"let m = {"one": 1, "two": 2}; m["one"] + m["two"]"#;
        assert_eq!(eval(source), Object::Integer(3));
    }

    #[test]
    fn builtins_len_first_last_rest_push() {
        assert_eq!(eval(r#"len("hello")"#), Object::Integer(5));
        assert_eq!(eval("first([1, 2, 3])"), Object::Integer(1));
        assert_eq!(eval("last([1, 2, 3])"), Object::Integer(3));
        assert_eq!(eval("len(rest([1, 2, 3]))"), Object::Integer(2));
        assert_eq!(eval("len(push([1, 2], 3))"), Object::Integer(3));
    }

    #[test]
    fn builtins_len_plus_array_len_end_to_end() {
        assert_eq!(eval(r#"len("hello") + len([1,2,3])"#), Object::Integer(8));
    }

    #[test]
    fn wrong_arity_user_function_is_an_error() {
        match eval("let f = fn(a, b) { a + b; }; f(1);") {
            Object::Error(_) => {}
            other => panic!("expected error, got {other:?}"),
        }
    }
}
