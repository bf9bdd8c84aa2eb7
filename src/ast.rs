//! Parsed abstract syntax tree.
//!
//! These are the shapes produced by the parser, before any name or type
//! resolution. The analyzer consumes this tree and produces the typed tree
//! in `analyzer`; nothing here carries resolution state.

use bigdecimal::BigDecimal;
use num_bigint::BigInt;

#[derive(Debug, PartialEq, Clone)]
pub struct Source {
    pub globals: Vec<Global>,
    pub functions: Vec<Function>,
}

/// A top-level `LIST`, `VAR`, or `VAL` declaration.
#[derive(Debug, PartialEq, Clone)]
pub struct Global {
    pub name: String,
    pub type_name: String,
    pub mutable: bool,
    pub value: Option<Expression>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Function {
    pub name: String,
    pub parameters: Vec<String>,
    pub parameter_type_names: Vec<String>,
    pub return_type_name: Option<String>,
    pub body: Vec<Statement>,
}

#[derive(Debug, PartialEq, Clone)]
pub enum Statement {
    /// A bare expression followed by `;`. Only calls survive analysis.
    Expression(Expression),
    Declaration {
        name: String,
        type_name: Option<String>,
        value: Option<Expression>,
    },
    Assignment {
        receiver: Expression,
        value: Expression,
    },
    If {
        condition: Expression,
        then_body: Vec<Statement>,
        else_body: Vec<Statement>,
    },
    Switch {
        condition: Expression,
        cases: Vec<Case>,
    },
    While {
        condition: Expression,
        body: Vec<Statement>,
    },
    Return(Expression),
}

/// One arm of a switch. `value` is `None` for the trailing default arm.
#[derive(Debug, PartialEq, Clone)]
pub struct Case {
    pub value: Option<Expression>,
    pub body: Vec<Statement>,
}

#[derive(Debug, PartialEq, Clone)]
pub enum Expression {
    Literal(Literal),
    Group(Box<Expression>),
    Binary {
        op: BinaryOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    /// A variable reference, optionally subscripted (`name` or `name[i]`).
    Access {
        name: String,
        offset: Option<Box<Expression>>,
    },
    Call {
        name: String,
        arguments: Vec<Expression>,
    },
    /// A bracketed value list; the grammar admits it only as a `LIST`
    /// global initializer.
    List(Vec<Expression>),
}

#[derive(Debug, PartialEq, Clone)]
pub enum Literal {
    Nil,
    Boolean(bool),
    Character(char),
    String(String),
    Integer(BigInt),
    Decimal(BigDecimal),
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum BinaryOp {
    And,
    Or,
    LessThan,
    GreaterThan,
    Equal,
    NotEqual,
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl BinaryOp {
    pub fn as_str(self) -> &'static str {
        match self {
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::LessThan => "<",
            BinaryOp::GreaterThan => ">",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Pow => "^",
        }
    }
}
