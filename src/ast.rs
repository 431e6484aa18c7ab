//! The abstract syntax graph produced by the [parser](crate::parser).
//!
//! Every node is an owned, tagged variant rather than a trait object: both backends (the
//! evaluator and the compiler) dispatch on these with a single `match`, which keeps each handler
//! in one place per node kind (spec §9).

use std::fmt;

/// A full parsed program: a flat list of top-level statements.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub statements: Vec<Statement>,
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for statement in &self.statements {
            write!(f, "{statement}")?;
        }
        Ok(())
    }
}

pub type BlockStatement = Vec<Statement>;

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Let { name: String, value: Expression },
    Return { value: Expression },
    Expression(Expression),
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Let { name, value } => write!(f, "let {name} = {value};"),
            Statement::Return { value } => write!(f, "return {value};"),
            Statement::Expression(expr) => write!(f, "{expr}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Identifier(String),
    IntegerLiteral(i64),
    BooleanLiteral(bool),
    StringLiteral(String),
    ArrayLiteral(Vec<Expression>),
    /// Insertion-ordered key/value pairs; duplicate keys are permitted by the parser and resolved
    /// downstream (last write wins, per spec §4.3/§4.6).
    HashLiteral(Vec<(Expression, Expression)>),
    Prefix {
        operator: String,
        right: Box<Expression>,
    },
    Infix {
        operator: String,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    If {
        condition: Box<Expression>,
        consequence: BlockStatement,
        alternative: Option<BlockStatement>,
    },
    FunctionLiteral {
        parameters: Vec<String>,
        body: BlockStatement,
    },
    Call {
        function: Box<Expression>,
        arguments: Vec<Expression>,
    },
    Index {
        left: Box<Expression>,
        index: Box<Expression>,
    },
}

fn fmt_block(block: &BlockStatement, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for statement in block {
        write!(f, "{statement}")?;
    }
    Ok(())
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Identifier(name) => write!(f, "{name}"),
            Expression::IntegerLiteral(value) => write!(f, "{value}"),
            Expression::BooleanLiteral(value) => write!(f, "{value}"),
            Expression::StringLiteral(value) => write!(f, "{value}"),
            Expression::ArrayLiteral(items) => {
                let rendered: Vec<String> = items.iter().map(|i| i.to_string()).collect();
                write!(f, "[{}]", rendered.join(", "))
            }
            Expression::HashLiteral(pairs) => {
                let rendered: Vec<String> =
                    pairs.iter().map(|(k, v)| format!("{k}:{v}")).collect();
                write!(f, "{{{}}}", rendered.join(", "))
            }
            Expression::Prefix { operator, right } => write!(f, "({operator}{right})"),
            Expression::Infix {
                operator,
                left,
                right,
            } => write!(f, "({left} {operator} {right})"),
            Expression::If {
                condition,
                consequence,
                alternative,
            } => {
                write!(f, "if{condition} ")?;
                fmt_block(consequence, f)?;
                if let Some(alt) = alternative {
                    write!(f, "else ")?;
                    fmt_block(alt, f)?;
                }
                Ok(())
            }
            Expression::FunctionLiteral { parameters, body } => {
                write!(f, "fn({}) ", parameters.join(", "))?;
                fmt_block(body, f)
            }
            Expression::Call { function, arguments } => {
                let rendered: Vec<String> = arguments.iter().map(|a| a.to_string()).collect();
                write!(f, "{function}({})", rendered.join(", "))
            }
            Expression::Index { left, index } => write!(f, "({left}[{index}])"),
        }
    }
}
