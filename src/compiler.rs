//! Lowers an AST into bytecode (spec §4.6): a stack of [CompilationScope]s with jump patching and
//! a nested [SymbolTable] per function scope for closure conversion.

use std::rc::Rc;

use crate::ast::{BlockStatement, Expression, Program, Statement};
use crate::code::{self, Instructions, Opcode};
use crate::error::CompileError;
use crate::object::{new_string, CompiledFunction, Object};
use crate::symbol_table::{SymbolScope, SymbolTable};

#[derive(Clone, Copy)]
struct EmittedInstruction {
    opcode: Opcode,
    position: usize,
}

struct CompilationScope {
    instructions: Instructions,
    last_instruction: Option<EmittedInstruction>,
    previous_instruction: Option<EmittedInstruction>,
}

impl CompilationScope {
    fn new() -> Self {
        CompilationScope {
            instructions: Vec::new(),
            last_instruction: None,
            previous_instruction: None,
        }
    }
}

pub struct Bytecode {
    pub instructions: Instructions,
    pub constants: Vec<Object>,
}

pub struct Compiler {
    constants: Vec<Object>,
    symbol_table: SymbolTable,
    scopes: Vec<CompilationScope>,
    scope_index: usize,
}

impl Compiler {
    pub fn new() -> Self {
        let mut symbol_table = SymbolTable::new();
        for (index, builtin) in crate::builtins::BUILTINS.iter().enumerate() {
            symbol_table.define_builtin(index, builtin.name);
        }
        Compiler {
            constants: Vec::new(),
            symbol_table,
            scopes: vec![CompilationScope::new()],
            scope_index: 0,
        }
    }

    /// Resumes compilation with a prior symbol table and constant pool, so REPL lines can extend
    /// earlier definitions (spec §9's "globals persistence across REPL turns").
    pub fn with_state(symbol_table: SymbolTable, constants: Vec<Object>) -> Self {
        Compiler {
            constants,
            symbol_table,
            scopes: vec![CompilationScope::new()],
            scope_index: 0,
        }
    }

    pub fn bytecode(self) -> Bytecode {
        Bytecode {
            instructions: self.scopes[self.scope_index].instructions.clone(),
            constants: self.constants,
        }
    }

    /// Like [Compiler::bytecode], but also hands back the symbol table so a REPL can persist
    /// definitions across turns (spec §9).
    pub fn finish(self) -> (Bytecode, SymbolTable) {
        let instructions = self.scopes[self.scope_index].instructions.clone();
        (
            Bytecode {
                instructions,
                constants: self.constants,
            },
            self.symbol_table,
        )
    }

    pub fn compile_program(&mut self, program: &Program) -> Result<(), CompileError> {
        for statement in &program.statements {
            self.compile_statement(statement)?;
        }
        Ok(())
    }

    fn compile_statement(&mut self, statement: &Statement) -> Result<(), CompileError> {
        match statement {
            Statement::Let { name, value } => {
                self.compile_expression(value)?;
                let symbol = self.symbol_table.define(name.clone());
                match symbol.scope {
                    SymbolScope::Global => self.emit(Opcode::SetGlobal, &[symbol.index]),
                    _ => self.emit(Opcode::SetLocal, &[symbol.index]),
                };
                Ok(())
            }
            Statement::Return { value } => {
                self.compile_expression(value)?;
                self.emit(Opcode::ReturnValue, &[]);
                Ok(())
            }
            Statement::Expression(expr) => {
                self.compile_expression(expr)?;
                self.emit(Opcode::Pop, &[]);
                Ok(())
            }
        }
    }

    fn compile_expression(&mut self, expr: &Expression) -> Result<(), CompileError> {
        match expr {
            Expression::IntegerLiteral(value) => {
                let index = self.add_constant(Object::Integer(*value));
                self.emit(Opcode::Constant, &[index]);
            }
            Expression::StringLiteral(value) => {
                let index = self.add_constant(new_string(value.clone()));
                self.emit(Opcode::Constant, &[index]);
            }
            Expression::BooleanLiteral(true) => {
                self.emit(Opcode::True, &[]);
            }
            Expression::BooleanLiteral(false) => {
                self.emit(Opcode::False, &[]);
            }
            Expression::Identifier(name) => {
                let symbol = self
                    .symbol_table
                    .resolve(name)
                    .ok_or_else(|| CompileError::UnresolvedSymbol(name.clone()))?;
                self.load_symbol(&symbol);
            }
            Expression::Prefix { operator, right } => {
                self.compile_expression(right)?;
                match operator.as_str() {
                    "!" => self.emit(Opcode::Bang, &[]),
                    "-" => self.emit(Opcode::Minus, &[]),
                    other => return Err(CompileError::UnknownPrefixOperator(other.to_string())),
                };
            }
            Expression::Infix {
                operator,
                left,
                right,
            } => {
                if operator == "<" {
                    self.compile_expression(right)?;
                    self.compile_expression(left)?;
                    self.emit(Opcode::GreaterThan, &[]);
                    return Ok(());
                }

                self.compile_expression(left)?;
                self.compile_expression(right)?;

                match operator.as_str() {
                    "+" => self.emit(Opcode::Add, &[]),
                    "-" => self.emit(Opcode::Sub, &[]),
                    "*" => self.emit(Opcode::Mul, &[]),
                    "/" => self.emit(Opcode::Div, &[]),
                    ">" => self.emit(Opcode::GreaterThan, &[]),
                    "==" => self.emit(Opcode::Equal, &[]),
                    "!=" => self.emit(Opcode::NotEqual, &[]),
                    other => return Err(CompileError::UnknownInfixOperator(other.to_string())),
                };
            }
            Expression::If {
                condition,
                consequence,
                alternative,
            } => self.compile_if_expression(condition, consequence, alternative.as_ref())?,
            Expression::ArrayLiteral(items) => {
                for item in items {
                    self.compile_expression(item)?;
                }
                self.emit(Opcode::Array, &[items.len()]);
            }
            Expression::HashLiteral(pairs) => {
                let mut sorted: Vec<&(Expression, Expression)> = pairs.iter().collect();
                // Deterministic ordering for reproducible bytecode in tests (spec §4.6); does not
                // affect runtime hash semantics, which are unordered.
                sorted.sort_by_key(|(key, _)| key.to_string());
                for (key, value) in sorted {
                    self.compile_expression(key)?;
                    self.compile_expression(value)?;
                }
                self.emit(Opcode::Hash, &[pairs.len() * 2]);
            }
            Expression::Index { left, index } => {
                self.compile_expression(left)?;
                self.compile_expression(index)?;
                self.emit(Opcode::Index, &[]);
            }
            Expression::FunctionLiteral { parameters, body } => {
                self.compile_function_literal(parameters, body)?;
            }
            Expression::Call { function, arguments } => {
                self.compile_expression(function)?;
                for argument in arguments {
                    self.compile_expression(argument)?;
                }
                self.emit(Opcode::Call, &[arguments.len()]);
            }
        }
        Ok(())
    }

    fn compile_if_expression(
        &mut self,
        condition: &Expression,
        consequence: &BlockStatement,
        alternative: Option<&BlockStatement>,
    ) -> Result<(), CompileError> {
        self.compile_expression(condition)?;
        let jump_not_truthy_pos = self.emit(Opcode::JumpNotTruthy, &[9999]);

        self.compile_block(consequence)?;
        if self.last_instruction_is(Opcode::Pop) {
            self.remove_last_pop();
        }

        let jump_pos = self.emit(Opcode::Jump, &[9999]);
        let after_consequence = self.current_instructions().len();
        self.change_operand(jump_not_truthy_pos, after_consequence);

        match alternative {
            None => {
                self.emit(Opcode::Null, &[]);
            }
            Some(alternative) => {
                self.compile_block(alternative)?;
                if self.last_instruction_is(Opcode::Pop) {
                    self.remove_last_pop();
                }
            }
        }

        let after_alternative = self.current_instructions().len();
        self.change_operand(jump_pos, after_alternative);

        Ok(())
    }

    fn compile_block(&mut self, block: &BlockStatement) -> Result<(), CompileError> {
        for statement in block {
            self.compile_statement(statement)?;
        }
        Ok(())
    }

    fn compile_function_literal(
        &mut self,
        parameters: &[String],
        body: &BlockStatement,
    ) -> Result<(), CompileError> {
        self.enter_scope();

        for parameter in parameters {
            self.symbol_table.define(parameter.clone());
        }

        self.compile_block(body)?;

        if self.last_instruction_is(Opcode::Pop) {
            self.replace_last_pop_with_return();
        }
        if !self.last_instruction_is(Opcode::ReturnValue) {
            self.emit(Opcode::Return, &[]);
        }

        let free_symbols = self.symbol_table.free_symbols.clone();
        let num_locals = self.symbol_table.num_definitions();
        let instructions = self.leave_scope();

        for free in &free_symbols {
            self.load_symbol(free);
        }

        let compiled = Object::CompiledFunction(Rc::new(CompiledFunction {
            instructions,
            num_locals,
            num_parameters: parameters.len(),
        }));
        let fn_index = self.add_constant(compiled);
        self.emit(Opcode::Closure, &[fn_index, free_symbols.len()]);

        Ok(())
    }

    fn load_symbol(&mut self, symbol: &crate::symbol_table::Symbol) {
        match symbol.scope {
            SymbolScope::Global => self.emit(Opcode::GetGlobal, &[symbol.index]),
            SymbolScope::Local => self.emit(Opcode::GetLocal, &[symbol.index]),
            SymbolScope::Builtin => self.emit(Opcode::GetBuiltin, &[symbol.index]),
            SymbolScope::Free => self.emit(Opcode::GetFree, &[symbol.index]),
        };
    }

    fn enter_scope(&mut self) {
        self.scopes.push(CompilationScope::new());
        self.scope_index += 1;
        let outer = std::mem::replace(&mut self.symbol_table, SymbolTable::new());
        self.symbol_table = SymbolTable::enclosed(outer);
    }

    fn leave_scope(&mut self) -> Instructions {
        let scope = self.scopes.pop().expect("scope stack underflow");
        self.scope_index -= 1;
        let outer = std::mem::replace(&mut self.symbol_table, SymbolTable::new())
            .into_outer()
            .expect("leaving the outermost scope");
        self.symbol_table = outer;
        scope.instructions
    }

    fn current_instructions(&self) -> &Instructions {
        &self.scopes[self.scope_index].instructions
    }

    fn add_constant(&mut self, obj: Object) -> usize {
        self.constants.push(obj);
        self.constants.len() - 1
    }

    fn emit(&mut self, op: Opcode, operands: &[usize]) -> usize {
        let instruction = code::make(op, operands);
        let position = self.add_instruction(instruction);
        self.set_last_instruction(op, position);
        position
    }

    fn add_instruction(&mut self, instruction: Instructions) -> usize {
        let scope = &mut self.scopes[self.scope_index];
        let position = scope.instructions.len();
        scope.instructions.extend_from_slice(&instruction);
        position
    }

    fn set_last_instruction(&mut self, op: Opcode, position: usize) {
        let scope = &mut self.scopes[self.scope_index];
        scope.previous_instruction = scope.last_instruction;
        scope.last_instruction = Some(EmittedInstruction {
            opcode: op,
            position,
        });
    }

    fn last_instruction_is(&self, op: Opcode) -> bool {
        match self.scopes[self.scope_index].last_instruction {
            Some(emitted) => emitted.opcode == op,
            None => false,
        }
    }

    fn remove_last_pop(&mut self) {
        let scope = &mut self.scopes[self.scope_index];
        let last = scope.last_instruction.expect("no last instruction to remove");
        scope.instructions.truncate(last.position);
        scope.last_instruction = scope.previous_instruction;
    }

    fn replace_instruction(&mut self, position: usize, new_instruction: &[u8]) {
        let scope = &mut self.scopes[self.scope_index];
        scope.instructions[position..position + new_instruction.len()]
            .copy_from_slice(new_instruction);
    }

    fn change_operand(&mut self, op_position: usize, operand: usize) {
        let op = Opcode::try_from(self.current_instructions()[op_position])
            .expect("invalid opcode byte during patching");
        let new_instruction = code::make(op, &[operand]);
        self.replace_instruction(op_position, &new_instruction);
    }

    fn replace_last_pop_with_return(&mut self) {
        let last = self.scopes[self.scope_index]
            .last_instruction
            .expect("no last instruction");
        let new_instruction = code::make(Opcode::ReturnValue, &[]);
        self.replace_instruction(last.position, &new_instruction);
        self.scopes[self.scope_index].last_instruction = Some(EmittedInstruction {
            opcode: Opcode::ReturnValue,
            position: last.position,
        });
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Compiler::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debug::disassemble;
    use crate::parser::Parser;

    fn compile(source: &str) -> Bytecode {
        let mut parser = Parser::from_source(source);
        let program = parser.parse_program();
        assert!(parser.errors().is_empty(), "{:?}", parser.errors());
        let mut compiler = Compiler::new();
        compiler.compile_program(&program).expect("compile error");
        compiler.bytecode()
    }

    #[test]
    fn simple_arithmetic_emits_infix_then_pop() {
        let bytecode = compile("1 + 2");
        let expected = [
            code::make(Opcode::Constant, &[0]),
            code::make(Opcode::Constant, &[1]),
            code::make(Opcode::Add, &[]),
            code::make(Opcode::Pop, &[]),
        ]
        .concat();
        assert_eq!(bytecode.instructions, expected);
    }

    #[test]
    fn less_than_is_compiled_as_swapped_greater_than() {
        let bytecode = compile("1 < 2");
        let expected = [
            code::make(Opcode::Constant, &[1]),
            code::make(Opcode::Constant, &[0]),
            code::make(Opcode::GreaterThan, &[]),
            code::make(Opcode::Pop, &[]),
        ]
        .concat();
        assert_eq!(bytecode.instructions, expected);
    }

    #[test]
    fn if_without_alternative_emits_null_branch() {
        let bytecode = compile("if (true) { 10 }; 3333;");
        let text = disassemble(&bytecode.instructions);
        assert!(text.contains("OpJumpNotTruthy"));
        assert!(text.contains("OpNull"));
    }

    #[test]
    fn global_let_uses_set_get_global() {
        let bytecode = compile("let one = 1; let two = 2;");
        assert!(bytecode.instructions.contains(&(Opcode::SetGlobal as u8)));
    }

    #[test]
    fn function_literal_with_no_free_variables() {
        let bytecode = compile("fn() { return 5 + 10 }");
        assert!(matches!(
            bytecode.constants.last(),
            Some(Object::CompiledFunction(_))
        ));
    }

    #[test]
    fn closures_emit_get_free_for_outer_locals() {
        let source = "fn(a) { fn(b) { a + b } }";
        let bytecode = compile(source);
        let outer_fn = bytecode
            .constants
            .iter()
            .find_map(|c| match c {
                Object::CompiledFunction(f) => Some(f.clone()),
                _ => None,
            })
            .expect("expected a compiled function constant");
        let text = disassemble(&outer_fn.instructions);
        assert!(text.contains("OpGetFree") || text.contains("OpGetLocal"));
    }

    #[test]
    fn hash_literal_keys_are_compiled_in_sorted_order() {
        let bytecode = compile(r#"{"b": 1, "a": 2}"#);
        assert!(bytecode
            .constants
            .iter()
            .any(|c| matches!(c, Object::String(s) if &**s == "a")));
    }

    #[test]
    fn unresolved_identifier_is_a_compile_error() {
        let mut parser = Parser::from_source("foobar;");
        let program = parser.parse_program();
        let mut compiler = Compiler::new();
        let result = compiler.compile_program(&program);
        assert!(matches!(result, Err(CompileError::UnresolvedSymbol(_))));
    }
}
