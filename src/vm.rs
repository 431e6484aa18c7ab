//! Stack-based bytecode virtual machine (spec §4.7): fetch-decode-dispatch over a frame stack,
//! with a fixed-capacity value stack and globals array sized by [Config].

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::builtins;
use crate::code::{self, Opcode};
use crate::compiler::Bytecode;
use crate::config::Config;
use crate::error::VmError;
use crate::frame::Frame;
use crate::object::{Closure, CompiledFunction, Object};

/// Used as the "current top" marker when tracing execution under the `trace_execution` feature.
macro_rules! trace_step {
    ($self:ident, $op:expr) => {
        if cfg!(feature = "trace_execution") {
            log::trace!("sp={} op={:?}", $self.sp, $op);
        }
    };
}

fn operator_symbol(op: Opcode) -> &'static str {
    match op {
        Opcode::Add => "+",
        Opcode::Sub => "-",
        Opcode::Mul => "*",
        Opcode::Div => "/",
        Opcode::Equal => "==",
        Opcode::NotEqual => "!=",
        Opcode::GreaterThan => ">",
        other => panic!("no operator symbol for {other:?}"),
    }
}

pub struct Vm {
    constants: Vec<Object>,
    stack: Vec<Object>,
    sp: usize,
    globals: Vec<Object>,
    frames: Vec<Frame>,
    config: Config,
}

impl Vm {
    pub fn new(bytecode: Bytecode, config: Config) -> Self {
        Vm::with_globals(bytecode, vec![Object::Null; config.globals_size], config)
    }

    /// Resumes with a prior globals vector, so REPL lines persist `let` bindings (spec §9).
    pub fn with_globals(bytecode: Bytecode, globals: Vec<Object>, config: Config) -> Self {
        let main_fn = Rc::new(CompiledFunction {
            instructions: bytecode.instructions,
            num_locals: 0,
            num_parameters: 0,
        });
        let main_closure = Rc::new(Closure {
            function: main_fn,
            free: Vec::new(),
        });
        let mut frames = Vec::with_capacity(config.max_frames);
        frames.push(Frame::new(main_closure, 0));

        Vm {
            constants: bytecode.constants,
            stack: vec![Object::Null; config.stack_size],
            sp: 0,
            globals,
            frames,
            config,
        }
    }

    pub fn into_globals(self) -> Vec<Object> {
        self.globals
    }

    /// The value left behind by the last `POP`: the final statement's value (spec §4.7).
    pub fn last_popped_stack_elem(&self) -> Object {
        self.stack[self.sp].clone()
    }

    pub fn run(&mut self) -> Result<(), VmError> {
        while self.current_frame().ip < self.current_frame().instructions().len() as isize - 1 {
            self.current_frame_mut().ip += 1;
            let ip = self.current_frame().ip as usize;
            let op_byte = self.current_frame().instructions()[ip];
            let op = Opcode::try_from(op_byte).map_err(|_| {
                VmError::Custom(format!("unknown opcode byte: {op_byte}"))
            })?;
            trace_step!(self, op);

            match op {
                Opcode::Constant => {
                    let idx = self.read_u16_operand();
                    let constant = self.constants[idx].clone();
                    self.push(constant)?;
                }
                Opcode::Pop => {
                    self.pop()?;
                }
                Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div => {
                    self.execute_binary_op(op)?;
                }
                Opcode::True => self.push(Object::Boolean(true))?,
                Opcode::False => self.push(Object::Boolean(false))?,
                Opcode::Equal | Opcode::NotEqual | Opcode::GreaterThan => {
                    self.execute_comparison(op)?;
                }
                Opcode::Minus => self.execute_minus()?,
                Opcode::Bang => self.execute_bang()?,
                Opcode::Jump => {
                    let target = self.read_u16_operand();
                    self.current_frame_mut().ip = target as isize - 1;
                }
                Opcode::JumpNotTruthy => {
                    let target = self.read_u16_operand();
                    let condition = self.pop()?;
                    if !condition.is_truthy() {
                        self.current_frame_mut().ip = target as isize - 1;
                    }
                }
                Opcode::Null => self.push(Object::Null)?,
                Opcode::SetGlobal => {
                    let idx = self.read_u16_operand();
                    let value = self.pop()?;
                    if idx >= self.globals.len() {
                        return Err(VmError::UnknownGlobal(idx));
                    }
                    self.globals[idx] = value;
                }
                Opcode::GetGlobal => {
                    let idx = self.read_u16_operand();
                    let value = self
                        .globals
                        .get(idx)
                        .cloned()
                        .ok_or(VmError::UnknownGlobal(idx))?;
                    self.push(value)?;
                }
                Opcode::SetLocal => {
                    let idx = self.read_u8_operand();
                    let base = self.current_frame().base_pointer;
                    let value = self.pop()?;
                    self.stack[base + idx] = value;
                }
                Opcode::GetLocal => {
                    let idx = self.read_u8_operand();
                    let base = self.current_frame().base_pointer;
                    let value = self.stack[base + idx].clone();
                    self.push(value)?;
                }
                Opcode::Array => {
                    let n = self.read_u16_operand();
                    let items = self.stack[self.sp - n..self.sp].to_vec();
                    self.sp -= n;
                    self.push(Object::Array(Rc::new(RefCell::new(items))))?;
                }
                Opcode::Hash => {
                    let n = self.read_u16_operand();
                    let slots = self.stack[self.sp - n..self.sp].to_vec();
                    self.sp -= n;
                    let mut map = HashMap::new();
                    for pair in slots.chunks(2) {
                        let key = pair[0].clone();
                        let value = pair[1].clone();
                        let hash_key = key
                            .hash_key()
                            .ok_or_else(|| VmError::UnhashableKey(key.type_name().to_string()))?;
                        map.insert(hash_key, (key, value));
                    }
                    self.push(Object::Hash(Rc::new(RefCell::new(map))))?;
                }
                Opcode::Index => {
                    let index = self.pop()?;
                    let target = self.pop()?;
                    let result = self.execute_index(&target, &index)?;
                    self.push(result)?;
                }
                Opcode::Call => {
                    let argc = self.read_u8_operand();
                    self.execute_call(argc)?;
                }
                Opcode::ReturnValue => {
                    let value = self.pop()?;
                    let frame = self.frames.pop().expect("frame stack underflow");
                    self.sp = frame.base_pointer - 1;
                    self.push(value)?;
                }
                Opcode::Return => {
                    let frame = self.frames.pop().expect("frame stack underflow");
                    self.sp = frame.base_pointer - 1;
                    self.push(Object::Null)?;
                }
                Opcode::GetBuiltin => {
                    let idx = self.read_u8_operand();
                    let builtin = builtins::BUILTINS[idx].clone();
                    self.push(Object::Builtin(builtin))?;
                }
                Opcode::Closure => {
                    let fn_idx = self.read_u16_operand();
                    let free_n = self.read_u8_operand();
                    let function = match &self.constants[fn_idx] {
                        Object::CompiledFunction(f) => f.clone(),
                        other => {
                            return Err(VmError::Custom(format!(
                                "not a function: {}",
                                other.type_name()
                            )))
                        }
                    };
                    let free = self.stack[self.sp - free_n..self.sp].to_vec();
                    self.sp -= free_n;
                    self.push(Object::Closure(Rc::new(Closure { function, free })))?;
                }
                Opcode::GetFree => {
                    let idx = self.read_u8_operand();
                    let value = self.current_frame().closure.free[idx].clone();
                    self.push(value)?;
                }
            }
        }

        Ok(())
    }

    fn current_frame(&self) -> &Frame {
        self.frames.last().expect("no active frame")
    }

    fn current_frame_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("no active frame")
    }

    fn read_u16_operand(&mut self) -> usize {
        let ip = self.current_frame().ip as usize;
        let value = code::read_u16(&self.current_frame().instructions()[ip + 1..]) as usize;
        self.current_frame_mut().ip += 2;
        value
    }

    fn read_u8_operand(&mut self) -> usize {
        let ip = self.current_frame().ip as usize;
        let value = self.current_frame().instructions()[ip + 1] as usize;
        self.current_frame_mut().ip += 1;
        value
    }

    fn push(&mut self, value: Object) -> Result<(), VmError> {
        if self.sp >= self.config.stack_size {
            return Err(VmError::StackOverflow);
        }
        self.stack[self.sp] = value;
        self.sp += 1;
        Ok(())
    }

    fn pop(&mut self) -> Result<Object, VmError> {
        if self.sp == 0 {
            return Err(VmError::StackUnderflow);
        }
        self.sp -= 1;
        Ok(self.stack[self.sp].clone())
    }

    fn execute_binary_op(&mut self, op: Opcode) -> Result<(), VmError> {
        let right = self.pop()?;
        let left = self.pop()?;
        match (&left, &right) {
            (Object::Integer(l), Object::Integer(r)) => {
                let result = match op {
                    Opcode::Add => l + r,
                    Opcode::Sub => l - r,
                    Opcode::Mul => l * r,
                    Opcode::Div => l / r,
                    _ => unreachable!(),
                };
                self.push(Object::Integer(result))
            }
            (Object::String(l), Object::String(r)) if op == Opcode::Add => {
                self.push(crate::object::new_string(format!("{l}{r}")))
            }
            _ => Err(VmError::TypeMismatch(
                left.type_name().to_string(),
                operator_symbol(op).to_string(),
                right.type_name().to_string(),
            )),
        }
    }

    fn execute_comparison(&mut self, op: Opcode) -> Result<(), VmError> {
        let right = self.pop()?;
        let left = self.pop()?;
        match (&left, &right) {
            (Object::Integer(l), Object::Integer(r)) => {
                let result = match op {
                    Opcode::Equal => l == r,
                    Opcode::NotEqual => l != r,
                    Opcode::GreaterThan => l > r,
                    _ => unreachable!(),
                };
                self.push(Object::Boolean(result))
            }
            (Object::Boolean(l), Object::Boolean(r)) => {
                let result = match op {
                    Opcode::Equal => l == r,
                    Opcode::NotEqual => l != r,
                    _ => {
                        return Err(VmError::UnknownOperator(
                            operator_symbol(op).to_string(),
                            "BOOLEAN".to_string(),
                        ))
                    }
                };
                self.push(Object::Boolean(result))
            }
            _ => Err(VmError::TypeMismatch(
                left.type_name().to_string(),
                operator_symbol(op).to_string(),
                right.type_name().to_string(),
            )),
        }
    }

    fn execute_minus(&mut self) -> Result<(), VmError> {
        let operand = self.pop()?;
        match operand {
            Object::Integer(value) => self.push(Object::Integer(-value)),
            other => Err(VmError::UnknownOperator(
                "-".to_string(),
                other.type_name().to_string(),
            )),
        }
    }

    fn execute_bang(&mut self) -> Result<(), VmError> {
        let operand = self.pop()?;
        self.push(Object::Boolean(!operand.is_truthy()))
    }

    fn execute_index(&self, target: &Object, index: &Object) -> Result<Object, VmError> {
        match (target, index) {
            (Object::Array(items), Object::Integer(i)) => {
                let items = items.borrow();
                if *i < 0 || *i as usize >= items.len() {
                    return Err(VmError::IndexOutOfBounds(*i));
                }
                Ok(items[*i as usize].clone())
            }
            (Object::Hash(map), key) => {
                let hash_key = key
                    .hash_key()
                    .ok_or_else(|| VmError::UnhashableKey(key.type_name().to_string()))?;
                match map.borrow().get(&hash_key) {
                    Some((_, value)) => Ok(value.clone()),
                    None => Err(VmError::KeyNotFound(key.inspect())),
                }
            }
            _ => Err(VmError::TypeMismatch(
                target.type_name().to_string(),
                "INDEX".to_string(),
                index.type_name().to_string(),
            )),
        }
    }

    fn execute_call(&mut self, argc: usize) -> Result<(), VmError> {
        let callee = self.stack[self.sp - 1 - argc].clone();
        match callee {
            Object::Closure(closure) => self.call_closure(closure, argc),
            Object::Builtin(builtin) => self.call_builtin(builtin, argc),
            _ => Err(VmError::NotCallable),
        }
    }

    fn call_closure(&mut self, closure: Rc<Closure>, argc: usize) -> Result<(), VmError> {
        if argc != closure.function.num_parameters {
            return Err(VmError::ArityMismatch {
                got: argc,
                want: closure.function.num_parameters,
            });
        }
        if self.frames.len() >= self.config.max_frames {
            return Err(VmError::FrameOverflow);
        }
        let base_pointer = self.sp - argc;
        let num_locals = closure.function.num_locals;
        self.frames.push(Frame::new(closure, base_pointer));
        self.sp = base_pointer + num_locals;
        Ok(())
    }

    fn call_builtin(&mut self, builtin: crate::object::Builtin, argc: usize) -> Result<(), VmError> {
        let args = self.stack[self.sp - argc..self.sp].to_vec();
        let result = (builtin.func)(&args);
        self.sp -= argc + 1;
        self.push(result)
    }
}
