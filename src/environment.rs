//! Types, runtime values, and the variable/function records stored in
//! scopes and carried by the typed tree.

use std::cell::RefCell;
use std::rc::Rc;

use bigdecimal::BigDecimal;
use num_bigint::BigInt;

use crate::analyzer::TypedStatement;
use crate::builtins::Builtin;

/// The closed set of built-in types. `Any` and `Comparable` are abstract
/// assignability targets; no value ever has them as its declared type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Type {
    Any,
    Nil,
    Comparable,
    Boolean,
    Integer,
    Decimal,
    Character,
    String,
}

impl Type {
    /// The name used in source text.
    pub fn display_name(self) -> &'static str {
        match self {
            Type::Any => "Any",
            Type::Nil => "Nil",
            Type::Comparable => "Comparable",
            Type::Boolean => "Boolean",
            Type::Integer => "Integer",
            Type::Decimal => "Decimal",
            Type::Character => "Character",
            Type::String => "String",
        }
    }

    /// The name emitted by the generator.
    pub fn target_name(self) -> &'static str {
        match self {
            Type::Any => "Object",
            Type::Nil => "Void",
            Type::Comparable => "Comparable",
            Type::Boolean => "boolean",
            Type::Integer => "int",
            Type::Decimal => "double",
            Type::Character => "char",
            Type::String => "String",
        }
    }

    pub fn from_name(name: &str) -> Option<Type> {
        match name {
            "Any" => Some(Type::Any),
            "Nil" => Some(Type::Nil),
            "Comparable" => Some(Type::Comparable),
            "Boolean" => Some(Type::Boolean),
            "Integer" => Some(Type::Integer),
            "Decimal" => Some(Type::Decimal),
            "Character" => Some(Type::Character),
            "String" => Some(Type::String),
            _ => None,
        }
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// A runtime value. Lists are shared references, so updates through one
/// alias are observable through every other alias of the same list.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Boolean(bool),
    Character(char),
    Integer(BigInt),
    Decimal(BigDecimal),
    String(String),
    List(Rc<RefCell<Vec<Value>>>),
}

impl Value {
    pub fn list(values: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(values)))
    }

    /// Kind name used in runtime diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "Nil",
            Value::Boolean(_) => "Boolean",
            Value::Character(_) => "Character",
            Value::Integer(_) => "Integer",
            Value::Decimal(_) => "Decimal",
            Value::String(_) => "String",
            Value::List(_) => "List",
        }
    }

    /// Rendering used by `print` and by string concatenation.
    pub fn to_output(&self) -> String {
        match self {
            Value::Nil => "nil".to_string(),
            Value::Boolean(value) => value.to_string(),
            Value::Character(value) => value.to_string(),
            Value::Integer(value) => value.to_string(),
            Value::Decimal(value) => value.to_string(),
            Value::String(value) => value.clone(),
            Value::List(values) => {
                let rendered = values
                    .borrow()
                    .iter()
                    .map(Value::to_output)
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("[{rendered}]")
            }
        }
    }
}

/// A named storage cell: resolved during analysis, holding a live value at
/// run time.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub target_name: String,
    pub ty: Type,
    pub mutable: bool,
    pub value: Value,
}

impl Variable {
    pub fn new(name: &str, ty: Type, mutable: bool, value: Value) -> Self {
        Self {
            name: name.to_string(),
            target_name: name.to_string(),
            ty,
            mutable,
            value,
        }
    }
}

/// A callable: signature plus body. Scopes key these by (name, arity).
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub target_name: String,
    pub parameter_types: Vec<Type>,
    pub return_type: Type,
    pub body: FunctionBody,
}

impl Function {
    pub fn arity(&self) -> usize {
        self.parameter_types.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FunctionBody {
    /// Signature-only record; what the analyzer stores and resolves.
    Declared,
    Builtin(Builtin),
    User(Rc<UserFunction>),
}

/// The executable form of a source function, bound by the interpreter.
/// Defined at the top level only, so its captured scope is the root.
#[derive(Debug, PartialEq)]
pub struct UserFunction {
    pub parameters: Vec<String>,
    pub body: Vec<TypedStatement>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_names_round_trip() {
        for ty in [
            Type::Any,
            Type::Nil,
            Type::Comparable,
            Type::Boolean,
            Type::Integer,
            Type::Decimal,
            Type::Character,
            Type::String,
        ] {
            assert_eq!(Type::from_name(ty.display_name()), Some(ty));
        }
        assert_eq!(Type::from_name("integer"), None);
    }

    #[test]
    fn target_names_match_the_output_dialect() {
        assert_eq!(Type::Nil.target_name(), "Void");
        assert_eq!(Type::Any.target_name(), "Object");
        assert_eq!(Type::Integer.target_name(), "int");
        assert_eq!(Type::Decimal.target_name(), "double");
    }

    #[test]
    fn output_rendering() {
        assert_eq!(Value::Nil.to_output(), "nil");
        assert_eq!(Value::Boolean(true).to_output(), "true");
        assert_eq!(Value::Character('x').to_output(), "x");
        assert_eq!(Value::Integer(BigInt::from(42)).to_output(), "42");
        assert_eq!(Value::String("hi".to_string()).to_output(), "hi");
        assert_eq!(
            Value::list(vec![Value::Integer(BigInt::from(1)), Value::Nil]).to_output(),
            "[1, nil]"
        );
    }

    #[test]
    fn lists_compare_structurally_but_share_storage() {
        let shared = Value::list(vec![Value::Integer(BigInt::from(1))]);
        let alias = shared.clone();
        let detached = Value::list(vec![Value::Integer(BigInt::from(1))]);
        assert_eq!(shared, detached);

        if let Value::List(values) = &shared {
            values.borrow_mut().push(Value::Nil);
        }
        assert_eq!(alias.to_output(), "[1, nil]");
        assert_ne!(shared, detached);
    }
}
