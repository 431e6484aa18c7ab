//! Cross-cutting scenarios spanning the lexer through both backends (spec §8).

use monkey::config::Config;
use monkey::driver::{run, Mode, ReplState};

fn eval_both(source: &str) -> (String, String) {
    let config = Config::default();
    let mut interp_state = ReplState::new(Mode::Interpreter, config);
    let interp = run(source, config, &mut interp_state).expect("interpreter run failed");

    let mut vm_state = ReplState::new(Mode::Vm, config);
    let vm = run(source, config, &mut vm_state).expect("vm run failed");

    (interp, vm)
}

#[test]
fn scenario_simple_function_call() {
    let source = "let five = 5; let ten = 10; let add = fn(x, y) { x + y; }; add(five, ten);";
    let (interp, vm) = eval_both(source);
    assert_eq!(interp, "15");
    assert_eq!(vm, "15");
}

#[test]
fn scenario_nested_closures() {
    let source = "let newAdder = fn(x) { fn(y) { x + y }; }; let addTwo = newAdder(2); addTwo(2);";
    let (interp, vm) = eval_both(source);
    assert_eq!(interp, "4");
    assert_eq!(vm, "4");
}

#[test]
fn scenario_nested_if_return() {
    let source = "if (10 > 1) { if (10 > 1) { return 10; } return 1; }";
    let (interp, vm) = eval_both(source);
    assert_eq!(interp, "10");
    assert_eq!(vm, "10");
}

#[test]
fn scenario_builtin_len_plus_array_len() {
    let source = r#"len("hello") + len([1,2,3])"#;
    let (interp, vm) = eval_both(source);
    assert_eq!(interp, "8");
    assert_eq!(vm, "8");
}

#[test]
fn scenario_hash_index_sum() {
    let source = r#"let m = {"one": 1, "two": 2}; m["one"] + m["two"]"#;
    let (interp, vm) = eval_both(source);
    assert_eq!(interp, "3");
    assert_eq!(vm, "3");
}

#[test]
fn scenario_call_frame_and_globals_restoration() {
    let source = "let f = fn(a, b) { a + b; }; f(1, 2) + f(3, 4);";
    let (interp, vm) = eval_both(source);
    assert_eq!(interp, "10");
    assert_eq!(vm, "10");
}

#[test]
fn boundary_array_index_out_of_range_evaluator_returns_error_value() {
    let config = Config::default();
    let mut state = ReplState::new(Mode::Interpreter, config);
    let result = run("[1,2,3][3]", config, &mut state).unwrap();
    assert_eq!(
        result,
        "ERROR: invalid index: index must be between 0 and 2 inclusive"
    );
}

#[test]
fn boundary_array_index_out_of_range_vm_traps() {
    let config = Config::default();
    let mut state = ReplState::new(Mode::Vm, config);
    let result = run("[1,2,3][3]", config, &mut state);
    assert!(result.is_err());
}

#[test]
fn boundary_missing_hash_key_vm_traps() {
    let config = Config::default();
    let mut state = ReplState::new(Mode::Vm, config);
    let result = run(r#"{"one": 1}["two"]"#, config, &mut state);
    assert!(result.is_err());
}

#[test]
fn boundary_negating_a_boolean_is_an_error() {
    let config = Config::default();
    let mut state = ReplState::new(Mode::Interpreter, config);
    let result = run("-true", config, &mut state).unwrap();
    assert_eq!(result, "ERROR: unknown operator: -BOOLEAN");
}

#[test]
fn boundary_unbound_identifier_is_an_error() {
    let config = Config::default();
    let mut state = ReplState::new(Mode::Interpreter, config);
    let result = run("foobar", config, &mut state).unwrap();
    assert_eq!(result, "ERROR: missing identifier: foobar");
}

#[test]
fn lexer_round_trip_on_punctuation_only_source() {
    use monkey::lexer::Lexer;
    use monkey::token::TokenKind;

    let source = "=+(){},;";
    let mut lexer = Lexer::new(source);
    let mut rebuilt = String::new();
    loop {
        let token = lexer.next_token();
        if token.kind == TokenKind::Eof {
            break;
        }
        rebuilt.push_str(&token.literal);
    }
    assert_eq!(rebuilt, source);
}

#[test]
fn parser_precedence_canonical_form() {
    use monkey::parser::Parser;

    let mut parser = Parser::from_source("a + b * c");
    let program = parser.parse_program();
    assert!(parser.errors().is_empty());
    assert_eq!(program.to_string(), "(a + (b * c))");
}

#[test]
fn symbol_table_promotes_free_variables_only_from_innermost_scope() {
    use monkey::symbol_table::{SymbolScope, SymbolTable};

    let mut global = SymbolTable::new();
    global.define("a");
    global.define("b");

    let mut first = SymbolTable::enclosed(global);
    first.define("c");
    first.define("d");
    assert_eq!(first.resolve("c").unwrap().scope, SymbolScope::Local);

    let mut second = SymbolTable::enclosed(first);
    second.define("e");
    second.define("f");

    assert_eq!(second.resolve("a").unwrap().scope, SymbolScope::Global);
    assert_eq!(second.resolve("c").unwrap().scope, SymbolScope::Free);
}
