//! Crate-wide error types.
//!
//! Parse errors are deliberately *not* part of [CompileError]: per the language's error policy,
//! they accumulate as plain strings on the parser and are returned to the driver as a joined
//! message, never as a typed error value (see `parser::Parser::errors`).

use thiserror::Error;

/// Failures that can occur while lowering an AST into bytecode.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("undefined variable: {0}")]
    UnresolvedSymbol(String),

    #[error("too many constants in one chunk")]
    TooManyConstants,

    #[error("too many local variables in one scope")]
    TooManyLocals,

    #[error("invalid infix operator: {0}")]
    UnknownInfixOperator(String),

    #[error("invalid prefix operator: {0}")]
    UnknownPrefixOperator(String),
}

/// Traps raised by the virtual machine while executing bytecode.
///
/// Unlike the evaluator's [crate::object::Object::Error] values, these terminate the run; the VM
/// does not synthesize error objects on these paths (spec §7).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VmError {
    #[error("stack overflow")]
    StackOverflow,

    #[error("stack underflow")]
    StackUnderflow,

    #[error("frame stack overflow")]
    FrameOverflow,

    #[error("global index out of range: {0}")]
    UnknownGlobal(usize),

    #[error("wrong number of arguments: got {got}, want {want}")]
    ArityMismatch { got: usize, want: usize },

    #[error("calling non-function and non-built-in")]
    NotCallable,

    #[error("index out of bounds: {0}")]
    IndexOutOfBounds(i64),

    #[error("unusable as hash key: {0}")]
    UnhashableKey(String),

    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("type mismatch: {0} {1} {2}")]
    TypeMismatch(String, String, String),

    #[error("unknown operator: {0} {1}")]
    UnknownOperator(String, String),

    #[error("unknown operator: {0} {1} {2}")]
    UnknownBinaryOperator(String, String, String),

    #[error("{0}")]
    Custom(String),
}

/// Top-level error returned by the driver, wrapping whichever subsystem failed.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("{0}")]
    Parse(String),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Vm(#[from] VmError),

    #[error("could not read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
