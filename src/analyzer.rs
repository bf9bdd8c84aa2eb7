//! Semantic analysis.
//!
//! A single post-order walk over the parsed tree that resolves every name
//! against the scope chain, attaches a type to every expression, and
//! enforces the typing rules. The result is a typed tree; the parsed tree
//! is left untouched. Both back ends consume the typed tree.

use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use num_traits::ToPrimitive;
use thiserror::Error;

use crate::ast::{BinaryOp, Case, Expression, Function, Global, Literal, Source, Statement};
use crate::builtins::Builtin;
use crate::environment::{self, FunctionBody, Type, Value, Variable};
use crate::scope::{Scope, ScopeError};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("Unknown type '{name}'.")]
    UnknownType { name: String },
    #[error("The variable '{name}' is not defined.")]
    UndefinedVariable { name: String },
    #[error("The function '{name}/{arity}' is not defined.")]
    UndefinedFunction { name: String, arity: usize },
    #[error(transparent)]
    Scope(#[from] ScopeError),
    #[error("The source must define main/0 returning Integer.")]
    MissingMain,
    #[error("A value of type {found} is not assignable to {target}.")]
    NotAssignable { target: Type, found: Type },
    #[error("An expression statement must be a function call.")]
    InvalidExpressionStatement,
    #[error("The declaration of '{name}' needs a type or an initializer.")]
    IncompleteDeclaration { name: String },
    #[error("Only a variable access can be assigned to.")]
    InvalidAssignmentReceiver,
    #[error("The condition must be a Boolean, found {found}.")]
    ConditionNotBoolean { found: Type },
    #[error("An if statement needs a non-empty then block.")]
    EmptyThenBlock,
    #[error("Only the final switch case may omit its value.")]
    MisplacedDefault,
    #[error("The final switch case must be the default.")]
    MissingDefault,
    #[error("A return statement is only valid inside a function.")]
    ReturnOutsideFunction,
    #[error("The integer literal {value} is outside the 32-bit signed range.")]
    IntegerOutOfRange { value: BigInt },
    #[error("The decimal literal {value} does not fit a 64-bit float.")]
    DecimalOutOfRange { value: BigDecimal },
    #[error("A group must contain a binary expression.")]
    GroupNotBinary,
    #[error("Invalid operands {left} and {right} for '{op}'.")]
    InvalidOperands {
        op: &'static str,
        left: Type,
        right: Type,
    },
    #[error("Comparison operands must have the same type, found {left} and {right}.")]
    ComparisonMismatch { left: Type, right: Type },
    #[error("A list offset must be an Integer, found {found}.")]
    OffsetNotInteger { found: Type },
    #[error("A list literal is only valid as a LIST global initializer.")]
    ListOutsideGlobal,
}

pub type AnalysisResult<T> = Result<T, AnalysisError>;

/// The assignability relation: `target == found`, `Any` accepts every
/// type, and `Comparable` accepts the four ordered value types. Not
/// symmetric.
pub fn require_assignable(target: Type, found: Type) -> AnalysisResult<()> {
    let assignable = target == found
        || target == Type::Any
        || (target == Type::Comparable
            && matches!(
                found,
                Type::Integer | Type::Decimal | Type::Character | Type::String
            ));
    if assignable {
        Ok(())
    } else {
        Err(AnalysisError::NotAssignable { target, found })
    }
}

// Typed tree. Mirrors the parsed tree shape with every expression carrying
// its resolved type and every name replaced by its resolved record.

#[derive(Debug, Clone, PartialEq)]
pub struct TypedSource {
    pub globals: Vec<TypedGlobal>,
    pub functions: Vec<TypedFunction>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypedGlobal {
    pub variable: Variable,
    pub value: Option<TypedExpr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypedFunction {
    pub function: environment::Function,
    pub parameters: Vec<String>,
    pub body: Vec<TypedStatement>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypedStatement {
    Expression(TypedExpr),
    Declaration {
        variable: Variable,
        value: Option<TypedExpr>,
    },
    Assignment {
        receiver: TypedExpr,
        value: TypedExpr,
    },
    If {
        condition: TypedExpr,
        then_body: Vec<TypedStatement>,
        else_body: Vec<TypedStatement>,
    },
    Switch {
        condition: TypedExpr,
        cases: Vec<TypedCase>,
    },
    While {
        condition: TypedExpr,
        body: Vec<TypedStatement>,
    },
    Return(TypedExpr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypedCase {
    pub value: Option<TypedExpr>,
    pub body: Vec<TypedStatement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypedExpr {
    pub kind: TypedExprKind,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypedExprKind {
    Literal(Literal),
    Group(Box<TypedExpr>),
    Binary {
        op: BinaryOp,
        left: Box<TypedExpr>,
        right: Box<TypedExpr>,
    },
    Access {
        variable: Variable,
        offset: Option<Box<TypedExpr>>,
    },
    Call {
        function: environment::Function,
        arguments: Vec<TypedExpr>,
    },
    List(Vec<TypedExpr>),
}

pub struct Analyzer {
    scope: Scope,
    /// Enclosing functions, innermost last, for return checking.
    functions: Vec<environment::Function>,
    /// Declared element type while analyzing a LIST global initializer.
    global_type: Option<Type>,
}

impl Analyzer {
    pub fn new() -> Self {
        let mut scope = Scope::new();
        for builtin in Builtin::all() {
            scope
                .define_function(environment::Function {
                    name: builtin.name().to_string(),
                    target_name: builtin.target_name().to_string(),
                    parameter_types: builtin.parameter_types().to_vec(),
                    return_type: builtin.return_type(),
                    body: FunctionBody::Builtin(builtin),
                })
                .expect("builtins are distinct");
        }
        Self {
            scope,
            functions: Vec::new(),
            global_type: None,
        }
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn analyze(&mut self, source: &Source) -> AnalysisResult<TypedSource> {
        let mut globals = Vec::with_capacity(source.globals.len());
        for global in &source.globals {
            globals.push(self.analyze_global(global)?);
        }
        let mut functions = Vec::with_capacity(source.functions.len());
        for function in &source.functions {
            functions.push(self.analyze_function(function)?);
        }
        match self.scope.lookup_function("main", 0) {
            Some(main) if main.return_type == Type::Integer => {}
            _ => return Err(AnalysisError::MissingMain),
        }
        Ok(TypedSource { globals, functions })
    }

    fn analyze_global(&mut self, global: &Global) -> AnalysisResult<TypedGlobal> {
        let ty = type_from_name(&global.type_name)?;
        let value = match &global.value {
            Some(expression) => {
                self.global_type = Some(ty);
                let typed = self.analyze_expression(expression);
                self.global_type = None;
                let typed = typed?;
                require_assignable(ty, typed.ty)?;
                Some(typed)
            }
            None => None,
        };
        let variable = Variable::new(&global.name, ty, global.mutable, Value::Nil);
        self.scope.define_variable(variable.clone())?;
        Ok(TypedGlobal { variable, value })
    }

    fn analyze_function(&mut self, function: &Function) -> AnalysisResult<TypedFunction> {
        let mut parameter_types = Vec::with_capacity(function.parameter_type_names.len());
        for type_name in &function.parameter_type_names {
            parameter_types.push(type_from_name(type_name)?);
        }
        let return_type = match &function.return_type_name {
            Some(name) => type_from_name(name)?,
            None => Type::Nil,
        };
        let record = environment::Function {
            name: function.name.clone(),
            target_name: function.name.clone(),
            parameter_types: parameter_types.clone(),
            return_type,
            body: FunctionBody::Declared,
        };
        // Defined before the body is analyzed so the function can call
        // itself.
        self.scope.define_function(record.clone())?;

        self.functions.push(record.clone());
        let body = self.scoped(|analyzer| {
            for (parameter, ty) in function.parameters.iter().zip(&parameter_types) {
                analyzer
                    .scope
                    .define_variable(Variable::new(parameter, *ty, true, Value::Nil))?;
            }
            analyzer.analyze_block(&function.body)
        });
        self.functions.pop();

        Ok(TypedFunction {
            function: record,
            parameters: function.parameters.clone(),
            body: body?,
        })
    }

    fn analyze_block(&mut self, statements: &[Statement]) -> AnalysisResult<Vec<TypedStatement>> {
        statements
            .iter()
            .map(|statement| self.analyze_statement(statement))
            .collect()
    }

    fn analyze_statement(&mut self, statement: &Statement) -> AnalysisResult<TypedStatement> {
        match statement {
            Statement::Expression(expression) => {
                let typed = self.analyze_expression(expression)?;
                if !matches!(typed.kind, TypedExprKind::Call { .. }) {
                    return Err(AnalysisError::InvalidExpressionStatement);
                }
                Ok(TypedStatement::Expression(typed))
            }
            Statement::Declaration {
                name,
                type_name,
                value,
            } => {
                let declared = match type_name {
                    Some(type_name) => Some(type_from_name(type_name)?),
                    None => None,
                };
                let value = match value {
                    Some(expression) => Some(self.analyze_expression(expression)?),
                    None => None,
                };
                let ty = match (declared, &value) {
                    (Some(declared), Some(value)) => {
                        require_assignable(declared, value.ty)?;
                        declared
                    }
                    (Some(declared), None) => declared,
                    (None, Some(value)) => value.ty,
                    (None, None) => {
                        return Err(AnalysisError::IncompleteDeclaration {
                            name: name.clone(),
                        });
                    }
                };
                let variable = Variable::new(name, ty, true, Value::Nil);
                self.scope.define_variable(variable.clone())?;
                Ok(TypedStatement::Declaration { variable, value })
            }
            Statement::Assignment { receiver, value } => {
                if !matches!(receiver, Expression::Access { .. }) {
                    return Err(AnalysisError::InvalidAssignmentReceiver);
                }
                let receiver = self.analyze_expression(receiver)?;
                let value = self.analyze_expression(value)?;
                require_assignable(receiver.ty, value.ty)?;
                Ok(TypedStatement::Assignment { receiver, value })
            }
            Statement::If {
                condition,
                then_body,
                else_body,
            } => {
                let condition = self.analyze_expression(condition)?;
                if condition.ty != Type::Boolean {
                    return Err(AnalysisError::ConditionNotBoolean {
                        found: condition.ty,
                    });
                }
                if then_body.is_empty() {
                    return Err(AnalysisError::EmptyThenBlock);
                }
                let then_body = self.scoped(|analyzer| analyzer.analyze_block(then_body))?;
                let else_body = self.scoped(|analyzer| analyzer.analyze_block(else_body))?;
                Ok(TypedStatement::If {
                    condition,
                    then_body,
                    else_body,
                })
            }
            Statement::Switch { condition, cases } => {
                let condition = self.analyze_expression(condition)?;
                let mut typed_cases = Vec::with_capacity(cases.len());
                for (index, case) in cases.iter().enumerate() {
                    let last = index == cases.len() - 1;
                    typed_cases.push(self.analyze_case(case, &condition, last)?);
                }
                Ok(TypedStatement::Switch {
                    condition,
                    cases: typed_cases,
                })
            }
            Statement::While { condition, body } => {
                let condition = self.analyze_expression(condition)?;
                if condition.ty != Type::Boolean {
                    return Err(AnalysisError::ConditionNotBoolean {
                        found: condition.ty,
                    });
                }
                let body = self.scoped(|analyzer| analyzer.analyze_block(body))?;
                Ok(TypedStatement::While { condition, body })
            }
            Statement::Return(value) => {
                let function = self
                    .functions
                    .last()
                    .cloned()
                    .ok_or(AnalysisError::ReturnOutsideFunction)?;
                let value = self.analyze_expression(value)?;
                require_assignable(function.return_type, value.ty)?;
                Ok(TypedStatement::Return(value))
            }
        }
    }

    fn analyze_case(
        &mut self,
        case: &Case,
        condition: &TypedExpr,
        last: bool,
    ) -> AnalysisResult<TypedCase> {
        let value = match &case.value {
            Some(expression) => {
                if last {
                    return Err(AnalysisError::MissingDefault);
                }
                let typed = self.analyze_expression(expression)?;
                require_assignable(condition.ty, typed.ty)?;
                Some(typed)
            }
            None => {
                if !last {
                    return Err(AnalysisError::MisplacedDefault);
                }
                None
            }
        };
        let body = self.scoped(|analyzer| analyzer.analyze_block(&case.body))?;
        Ok(TypedCase { value, body })
    }

    fn analyze_expression(&mut self, expression: &Expression) -> AnalysisResult<TypedExpr> {
        match expression {
            Expression::Literal(literal) => {
                let ty = analyze_literal(literal)?;
                Ok(TypedExpr {
                    kind: TypedExprKind::Literal(literal.clone()),
                    ty,
                })
            }
            Expression::Group(inner) => {
                if !matches!(inner.as_ref(), Expression::Binary { .. }) {
                    return Err(AnalysisError::GroupNotBinary);
                }
                let inner = self.analyze_expression(inner)?;
                let ty = inner.ty;
                Ok(TypedExpr {
                    kind: TypedExprKind::Group(Box::new(inner)),
                    ty,
                })
            }
            Expression::Binary { op, left, right } => {
                let left = self.analyze_expression(left)?;
                let right = self.analyze_expression(right)?;
                let ty = binary_type(*op, left.ty, right.ty)?;
                Ok(TypedExpr {
                    kind: TypedExprKind::Binary {
                        op: *op,
                        left: Box::new(left),
                        right: Box::new(right),
                    },
                    ty,
                })
            }
            Expression::Access { name, offset } => {
                let offset = match offset {
                    Some(offset) => {
                        let typed = self.analyze_expression(offset)?;
                        if typed.ty != Type::Integer {
                            return Err(AnalysisError::OffsetNotInteger { found: typed.ty });
                        }
                        Some(Box::new(typed))
                    }
                    None => None,
                };
                let variable = self
                    .scope
                    .lookup_variable(name)
                    .cloned()
                    .ok_or_else(|| AnalysisError::UndefinedVariable { name: name.clone() })?;
                let ty = variable.ty;
                Ok(TypedExpr {
                    kind: TypedExprKind::Access { variable, offset },
                    ty,
                })
            }
            Expression::Call { name, arguments } => {
                let function = self
                    .scope
                    .lookup_function(name, arguments.len())
                    .cloned()
                    .ok_or_else(|| AnalysisError::UndefinedFunction {
                        name: name.clone(),
                        arity: arguments.len(),
                    })?;
                let mut typed_arguments = Vec::with_capacity(arguments.len());
                for (argument, parameter_type) in arguments.iter().zip(&function.parameter_types)
                {
                    let typed = self.analyze_expression(argument)?;
                    require_assignable(*parameter_type, typed.ty)?;
                    typed_arguments.push(typed);
                }
                let ty = function.return_type;
                Ok(TypedExpr {
                    kind: TypedExprKind::Call {
                        function,
                        arguments: typed_arguments,
                    },
                    ty,
                })
            }
            Expression::List(values) => {
                let ty = self.global_type.ok_or(AnalysisError::ListOutsideGlobal)?;
                let mut typed_values = Vec::with_capacity(values.len());
                for value in values {
                    let typed = self.analyze_expression(value)?;
                    require_assignable(ty, typed.ty)?;
                    typed_values.push(typed);
                }
                Ok(TypedExpr {
                    kind: TypedExprKind::List(typed_values),
                    ty,
                })
            }
        }
    }

    /// Runs `f` in a fresh nested scope, popping it on success and on
    /// error alike.
    fn scoped<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> AnalysisResult<T>,
    ) -> AnalysisResult<T> {
        self.scope.enter();
        let result = f(self);
        self.scope.exit();
        result
    }
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new()
    }
}

fn type_from_name(name: &str) -> AnalysisResult<Type> {
    Type::from_name(name).ok_or_else(|| AnalysisError::UnknownType {
        name: name.to_string(),
    })
}

fn analyze_literal(literal: &Literal) -> AnalysisResult<Type> {
    match literal {
        Literal::Nil => Ok(Type::Nil),
        Literal::Boolean(_) => Ok(Type::Boolean),
        Literal::Character(_) => Ok(Type::Character),
        Literal::String(_) => Ok(Type::String),
        Literal::Integer(value) => {
            if value.to_i32().is_none() {
                return Err(AnalysisError::IntegerOutOfRange {
                    value: value.clone(),
                });
            }
            Ok(Type::Integer)
        }
        Literal::Decimal(value) => {
            let approximate = value.to_f64().unwrap_or(f64::INFINITY);
            if approximate.is_infinite() {
                return Err(AnalysisError::DecimalOutOfRange {
                    value: value.clone(),
                });
            }
            Ok(Type::Decimal)
        }
    }
}

fn binary_type(op: BinaryOp, left: Type, right: Type) -> AnalysisResult<Type> {
    let invalid = || AnalysisError::InvalidOperands {
        op: op.as_str(),
        left,
        right,
    };
    match op {
        BinaryOp::And | BinaryOp::Or => {
            if left == Type::Boolean && right == Type::Boolean {
                Ok(Type::Boolean)
            } else {
                Err(invalid())
            }
        }
        BinaryOp::LessThan | BinaryOp::GreaterThan | BinaryOp::Equal | BinaryOp::NotEqual => {
            require_assignable(Type::Comparable, left)?;
            require_assignable(Type::Comparable, right)?;
            if left != right {
                return Err(AnalysisError::ComparisonMismatch { left, right });
            }
            Ok(Type::Boolean)
        }
        BinaryOp::Add => {
            if left == Type::String || right == Type::String {
                Ok(Type::String)
            } else if left == Type::Integer && right == Type::Integer {
                Ok(Type::Integer)
            } else if left == Type::Decimal && right == Type::Decimal {
                Ok(Type::Decimal)
            } else {
                Err(invalid())
            }
        }
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => {
            if left == Type::Integer && right == Type::Integer {
                Ok(Type::Integer)
            } else if left == Type::Decimal && right == Type::Decimal {
                Ok(Type::Decimal)
            } else {
                Err(invalid())
            }
        }
        BinaryOp::Pow => {
            if left == Type::Integer && right == Type::Integer {
                Ok(Type::Integer)
            } else {
                Err(invalid())
            }
        }
    }
}

/// Analyzes a parsed source with a fresh analyzer.
pub fn analyze(source: &Source) -> AnalysisResult<TypedSource> {
    Analyzer::new().analyze(source)
}
