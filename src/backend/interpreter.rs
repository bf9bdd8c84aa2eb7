//! Tree-walking interpreter.
//!
//! Evaluates the typed tree against a runtime scope stack that is distinct
//! from the analyzer's. Top-level execution binds globals, then functions,
//! then invokes `main/0` and yields its value. `RETURN` is an explicit
//! control-flow signal threaded through statement execution, not an
//! unwind.

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use bigdecimal::{BigDecimal, RoundingMode};
use num_bigint::{BigInt, Sign};
use num_traits::{FromPrimitive, One, Pow, ToPrimitive, Zero};
use thiserror::Error;

use crate::analyzer::{TypedExpr, TypedExprKind, TypedSource, TypedStatement};
use crate::ast::BinaryOp;
use crate::builtins::Builtin;
use crate::environment::{Function, FunctionBody, UserFunction, Value, Variable};
use crate::scope::{Scope, ScopeError};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("The variable '{name}' is not defined.")]
    UndefinedVariable { name: String },
    #[error("The function '{name}/{arity}' is not defined.")]
    UndefinedFunction { name: String, arity: usize },
    #[error(transparent)]
    Scope(#[from] ScopeError),
    #[error("Cannot assign to the immutable variable '{name}'.")]
    AssignmentToImmutable { name: String },
    #[error("Only a variable access can be assigned to.")]
    InvalidAssignmentReceiver,
    #[error("Expected a {expected} value, found {found}.")]
    UnexpectedType {
        expected: &'static str,
        found: &'static str,
    },
    #[error("Cannot apply '{op}' to {left} and {right}.")]
    InvalidOperands {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },
    #[error("Division by zero.")]
    DivisionByZero,
    #[error("A negative exponent is not defined for '^'.")]
    NegativeExponent,
    #[error("List index {index} is out of bounds for length {len}.")]
    IndexOutOfBounds { index: BigInt, len: usize },
    #[error("Cannot take the logarithm of {value}.")]
    LogarithmUndefined { value: String },
    #[error("The function '{name}/{arity}' has no invocable body.")]
    NotInvokable { name: String, arity: usize },
    #[error("Failed to write output: {message}")]
    Output { message: String },
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Control-flow marker for statement execution.
enum ExecResult {
    Continue,
    Return(Value),
}

pub struct Interpreter<W> {
    scope: Scope,
    output: W,
}

impl Interpreter<io::Stdout> {
    pub fn new() -> Self {
        Self::with_output(io::stdout())
    }
}

impl Default for Interpreter<io::Stdout> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write> Interpreter<W> {
    /// An interpreter whose `print` builtin writes to `output`.
    pub fn with_output(output: W) -> Self {
        let mut scope = Scope::new();
        for builtin in Builtin::all() {
            scope
                .define_function(Function {
                    name: builtin.name().to_string(),
                    target_name: builtin.target_name().to_string(),
                    parameter_types: builtin.parameter_types().to_vec(),
                    return_type: builtin.return_type(),
                    body: FunctionBody::Builtin(builtin),
                })
                .expect("builtins are distinct");
        }
        Self { scope, output }
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn into_output(self) -> W {
        self.output
    }

    /// Binds globals and functions in the root scope, then invokes `main`
    /// with no arguments and yields its result.
    pub fn run(&mut self, source: &TypedSource) -> RuntimeResult<Value> {
        for global in &source.globals {
            let value = match &global.value {
                Some(expression) => self.eval(expression)?,
                None => Value::Nil,
            };
            let variable = &global.variable;
            self.scope.define_variable(Variable::new(
                &variable.name,
                variable.ty,
                variable.mutable,
                value,
            ))?;
        }
        for function in &source.functions {
            self.scope.define_function(Function {
                body: FunctionBody::User(Rc::new(UserFunction {
                    parameters: function.parameters.clone(),
                    body: function.body.clone(),
                })),
                ..function.function.clone()
            })?;
        }
        let main = self
            .scope
            .lookup_function("main", 0)
            .cloned()
            .ok_or_else(|| RuntimeError::UndefinedFunction {
                name: "main".to_string(),
                arity: 0,
            })?;
        self.invoke(&main, Vec::new())
    }

    fn invoke(&mut self, function: &Function, arguments: Vec<Value>) -> RuntimeResult<Value> {
        match &function.body {
            FunctionBody::Builtin(builtin) => self.call_builtin(*builtin, arguments),
            FunctionBody::User(user) => {
                let user = Rc::clone(user);
                let parameter_types = function.parameter_types.clone();
                self.scoped_call(|interpreter| {
                    for ((parameter, ty), value) in
                        user.parameters.iter().zip(&parameter_types).zip(arguments)
                    {
                        interpreter
                            .scope
                            .define_variable(Variable::new(parameter, *ty, true, value))?;
                    }
                    match interpreter.exec_block(&user.body)? {
                        ExecResult::Continue => Ok(Value::Nil),
                        ExecResult::Return(value) => Ok(value),
                    }
                })
            }
            FunctionBody::Declared => Err(RuntimeError::NotInvokable {
                name: function.name.clone(),
                arity: function.arity(),
            }),
        }
    }

    fn exec_block(&mut self, body: &[TypedStatement]) -> RuntimeResult<ExecResult> {
        for statement in body {
            if let ExecResult::Return(value) = self.exec_statement(statement)? {
                return Ok(ExecResult::Return(value));
            }
        }
        Ok(ExecResult::Continue)
    }

    fn exec_statement(&mut self, statement: &TypedStatement) -> RuntimeResult<ExecResult> {
        match statement {
            TypedStatement::Expression(expression) => {
                self.eval(expression)?;
                Ok(ExecResult::Continue)
            }
            TypedStatement::Declaration { variable, value } => {
                let value = match value {
                    Some(expression) => self.eval(expression)?,
                    None => Value::Nil,
                };
                self.scope
                    .define_variable(Variable::new(&variable.name, variable.ty, true, value))?;
                Ok(ExecResult::Continue)
            }
            TypedStatement::Assignment { receiver, value } => {
                self.exec_assignment(receiver, value)?;
                Ok(ExecResult::Continue)
            }
            TypedStatement::If {
                condition,
                then_body,
                else_body,
            } => {
                let condition = require_boolean(&self.eval(condition)?)?;
                let body = if condition { then_body } else { else_body };
                self.scoped(|interpreter| interpreter.exec_block(body))
            }
            TypedStatement::Switch { condition, cases } => {
                let condition = self.eval(condition)?;
                for case in cases {
                    match &case.value {
                        Some(value) => {
                            // Value and body both evaluate inside the
                            // case's own scope.
                            let taken = self.scoped(|interpreter| {
                                let value = interpreter.eval(value)?;
                                if value == condition {
                                    interpreter.exec_block(&case.body).map(Some)
                                } else {
                                    Ok(None)
                                }
                            })?;
                            if let Some(result) = taken {
                                return Ok(result);
                            }
                        }
                        None => {
                            return self.scoped(|interpreter| interpreter.exec_block(&case.body));
                        }
                    }
                }
                Ok(ExecResult::Continue)
            }
            TypedStatement::While { condition, body } => {
                while require_boolean(&self.eval(condition)?)? {
                    if let ExecResult::Return(value) =
                        self.scoped(|interpreter| interpreter.exec_block(body))?
                    {
                        return Ok(ExecResult::Return(value));
                    }
                }
                Ok(ExecResult::Continue)
            }
            TypedStatement::Return(value) => Ok(ExecResult::Return(self.eval(value)?)),
        }
    }

    fn exec_assignment(&mut self, receiver: &TypedExpr, value: &TypedExpr) -> RuntimeResult<()> {
        let (name, offset) = match &receiver.kind {
            TypedExprKind::Access { variable, offset } => {
                (variable.name.clone(), offset.as_deref())
            }
            _ => return Err(RuntimeError::InvalidAssignmentReceiver),
        };
        let (mutable, stored) = {
            let variable = self
                .scope
                .lookup_variable(&name)
                .ok_or_else(|| RuntimeError::UndefinedVariable { name: name.clone() })?;
            (variable.mutable, variable.value.clone())
        };
        if !mutable {
            return Err(RuntimeError::AssignmentToImmutable { name });
        }
        match offset {
            Some(offset) => {
                let values = require_list(&stored)?;
                let index = self.eval(offset)?;
                let index = require_integer(&index)?.clone();
                let value = self.eval(value)?;
                let mut values = values.borrow_mut();
                let len = values.len();
                let slot = index
                    .to_usize()
                    .and_then(|index| values.get_mut(index))
                    .ok_or(RuntimeError::IndexOutOfBounds { index, len })?;
                *slot = value;
            }
            None => {
                let value = self.eval(value)?;
                let variable = self
                    .scope
                    .lookup_variable_mut(&name)
                    .ok_or(RuntimeError::UndefinedVariable { name })?;
                variable.value = value;
            }
        }
        Ok(())
    }

    fn eval(&mut self, expression: &TypedExpr) -> RuntimeResult<Value> {
        match &expression.kind {
            TypedExprKind::Literal(literal) => Ok(literal_value(literal)),
            TypedExprKind::Group(inner) => self.eval(inner),
            TypedExprKind::Binary { op, left, right } => self.eval_binary(*op, left, right),
            TypedExprKind::Access { variable, offset } => {
                let stored = self
                    .scope
                    .lookup_variable(&variable.name)
                    .map(|variable| variable.value.clone())
                    .ok_or_else(|| RuntimeError::UndefinedVariable {
                        name: variable.name.clone(),
                    })?;
                match offset {
                    Some(offset) => {
                        let values = require_list(&stored)?;
                        let index = self.eval(offset)?;
                        let index = require_integer(&index)?.clone();
                        let values = values.borrow();
                        values
                            .get(index.to_usize().unwrap_or(usize::MAX))
                            .cloned()
                            .ok_or(RuntimeError::IndexOutOfBounds {
                                index,
                                len: values.len(),
                            })
                    }
                    None => Ok(stored),
                }
            }
            TypedExprKind::Call {
                function,
                arguments,
            } => {
                let mut values = Vec::with_capacity(arguments.len());
                for argument in arguments {
                    values.push(self.eval(argument)?);
                }
                let function = self
                    .scope
                    .lookup_function(&function.name, function.arity())
                    .cloned()
                    .ok_or_else(|| RuntimeError::UndefinedFunction {
                        name: function.name.clone(),
                        arity: function.arity(),
                    })?;
                self.invoke(&function, values)
            }
            TypedExprKind::List(values) => {
                let mut evaluated = Vec::with_capacity(values.len());
                for value in values {
                    evaluated.push(self.eval(value)?);
                }
                Ok(Value::list(evaluated))
            }
        }
    }

    fn eval_binary(
        &mut self,
        op: BinaryOp,
        left: &TypedExpr,
        right: &TypedExpr,
    ) -> RuntimeResult<Value> {
        let left = self.eval(left)?;
        // && and || short-circuit: the right side is only evaluated when
        // the left side has not decided the result.
        match op {
            BinaryOp::And => {
                if !require_boolean(&left)? {
                    return Ok(Value::Boolean(false));
                }
                let right = self.eval(right)?;
                return Ok(Value::Boolean(require_boolean(&right)?));
            }
            BinaryOp::Or => {
                if require_boolean(&left)? {
                    return Ok(Value::Boolean(true));
                }
                let right = self.eval(right)?;
                return Ok(Value::Boolean(require_boolean(&right)?));
            }
            _ => {}
        }
        let right = self.eval(right)?;
        match op {
            BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
            BinaryOp::LessThan | BinaryOp::GreaterThan => compare(op, &left, &right),
            BinaryOp::Equal => Ok(Value::Boolean(left == right)),
            BinaryOp::NotEqual => Ok(Value::Boolean(left != right)),
            BinaryOp::Add => add(&left, &right),
            BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => arithmetic(op, &left, &right),
            BinaryOp::Pow => power(&left, &right),
        }
    }

    fn call_builtin(&mut self, builtin: Builtin, arguments: Vec<Value>) -> RuntimeResult<Value> {
        match builtin {
            Builtin::Print => {
                let rendered = arguments
                    .first()
                    .map(Value::to_output)
                    .unwrap_or_default();
                writeln!(self.output, "{rendered}").map_err(|error| RuntimeError::Output {
                    message: error.to_string(),
                })?;
                Ok(Value::Nil)
            }
            Builtin::Logarithm => {
                let argument = require_decimal(&arguments[0])?;
                let logarithm = argument.to_f64().unwrap_or(f64::NAN).ln();
                BigDecimal::from_f64(logarithm)
                    .map(Value::Decimal)
                    .ok_or_else(|| RuntimeError::LogarithmUndefined {
                        value: argument.to_string(),
                    })
            }
            Builtin::Converter => {
                let number = require_integer(&arguments[0])?;
                let base = require_integer(&arguments[1])?;
                if base.is_zero() {
                    return Err(RuntimeError::DivisionByZero);
                }
                // Repeated division; digits accumulate least-significant
                // first and are emitted in reverse.
                let mut quotient = number.clone();
                let mut digits = Vec::new();
                loop {
                    let next = &quotient / base;
                    digits.push(&quotient - &next * base);
                    quotient = next;
                    if quotient <= BigInt::zero() {
                        break;
                    }
                }
                let rendered = digits
                    .iter()
                    .rev()
                    .map(|digit| digit.to_string())
                    .collect::<String>();
                Ok(Value::String(rendered))
            }
        }
    }

    /// Runs `f` in a fresh nested scope, popping it on success and error
    /// alike.
    fn scoped<T>(&mut self, f: impl FnOnce(&mut Self) -> RuntimeResult<T>) -> RuntimeResult<T> {
        self.scope.enter();
        let result = f(self);
        self.scope.exit();
        result
    }

    /// Like `scoped`, but the new frame nests in the root scope: function
    /// bodies see globals and other functions, not the caller's locals.
    fn scoped_call<T>(&mut self, f: impl FnOnce(&mut Self) -> RuntimeResult<T>) -> RuntimeResult<T> {
        self.scope.enter_call();
        let result = f(self);
        self.scope.exit();
        result
    }
}

fn literal_value(literal: &crate::ast::Literal) -> Value {
    use crate::ast::Literal;
    match literal {
        Literal::Nil => Value::Nil,
        Literal::Boolean(value) => Value::Boolean(*value),
        Literal::Character(value) => Value::Character(*value),
        Literal::String(value) => Value::String(value.clone()),
        Literal::Integer(value) => Value::Integer(value.clone()),
        Literal::Decimal(value) => Value::Decimal(value.clone()),
    }
}

fn require_boolean(value: &Value) -> RuntimeResult<bool> {
    match value {
        Value::Boolean(value) => Ok(*value),
        other => Err(RuntimeError::UnexpectedType {
            expected: "Boolean",
            found: other.type_name(),
        }),
    }
}

fn require_integer(value: &Value) -> RuntimeResult<&BigInt> {
    match value {
        Value::Integer(value) => Ok(value),
        other => Err(RuntimeError::UnexpectedType {
            expected: "Integer",
            found: other.type_name(),
        }),
    }
}

fn require_decimal(value: &Value) -> RuntimeResult<&BigDecimal> {
    match value {
        Value::Decimal(value) => Ok(value),
        other => Err(RuntimeError::UnexpectedType {
            expected: "Decimal",
            found: other.type_name(),
        }),
    }
}

fn require_list(value: &Value) -> RuntimeResult<Rc<RefCell<Vec<Value>>>> {
    match value {
        Value::List(values) => Ok(Rc::clone(values)),
        other => Err(RuntimeError::UnexpectedType {
            expected: "List",
            found: other.type_name(),
        }),
    }
}

/// `<` and `>` over the four ordered kinds; both sides must share a kind.
fn compare(op: BinaryOp, left: &Value, right: &Value) -> RuntimeResult<Value> {
    let ordering = match (left, right) {
        (Value::Integer(l), Value::Integer(r)) => l.cmp(r),
        (Value::Decimal(l), Value::Decimal(r)) => l.cmp(r),
        (Value::Character(l), Value::Character(r)) => l.cmp(r),
        (Value::String(l), Value::String(r)) => l.cmp(r),
        (Value::Integer(_) | Value::Decimal(_) | Value::Character(_) | Value::String(_), other) => {
            return Err(RuntimeError::UnexpectedType {
                expected: left.type_name(),
                found: other.type_name(),
            });
        }
        (other, _) => {
            return Err(RuntimeError::UnexpectedType {
                expected: "Comparable",
                found: other.type_name(),
            });
        }
    };
    Ok(Value::Boolean(match op {
        BinaryOp::LessThan => ordering.is_lt(),
        _ => ordering.is_gt(),
    }))
}

/// `+`: string concatenation when either side is a string, otherwise
/// matching numeric kinds.
fn add(left: &Value, right: &Value) -> RuntimeResult<Value> {
    match (left, right) {
        (Value::String(_), _) | (_, Value::String(_)) => {
            Ok(Value::String(left.to_output() + &right.to_output()))
        }
        (Value::Integer(l), Value::Integer(r)) => Ok(Value::Integer(l + r)),
        (Value::Decimal(l), Value::Decimal(r)) => Ok(Value::Decimal(l + r)),
        _ => Err(RuntimeError::InvalidOperands {
            op: "+",
            left: left.type_name(),
            right: right.type_name(),
        }),
    }
}

fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> RuntimeResult<Value> {
    match (left, right) {
        (Value::Integer(l), Value::Integer(r)) => match op {
            BinaryOp::Sub => Ok(Value::Integer(l - r)),
            BinaryOp::Mul => Ok(Value::Integer(l * r)),
            _ => {
                if r.is_zero() {
                    return Err(RuntimeError::DivisionByZero);
                }
                Ok(Value::Integer(l / r))
            }
        },
        (Value::Decimal(l), Value::Decimal(r)) => match op {
            BinaryOp::Sub => Ok(Value::Decimal(l - r)),
            BinaryOp::Mul => Ok(Value::Decimal(l * r)),
            _ => {
                if r.is_zero() {
                    return Err(RuntimeError::DivisionByZero);
                }
                // The quotient keeps the dividend's scale, rounding
                // half-even.
                let quotient = (l / r).with_scale_round(
                    l.fractional_digit_count(),
                    RoundingMode::HalfEven,
                );
                Ok(Value::Decimal(quotient))
            }
        },
        _ => Err(RuntimeError::InvalidOperands {
            op: op.as_str(),
            left: left.type_name(),
            right: right.type_name(),
        }),
    }
}

/// Integer exponentiation. Exponents beyond the directly computable range
/// fall back to multiplying by the base once per excess unit.
fn power(left: &Value, right: &Value) -> RuntimeResult<Value> {
    let (base, exponent) = match (left, right) {
        (Value::Integer(l), Value::Integer(r)) => (l, r),
        _ => {
            return Err(RuntimeError::InvalidOperands {
                op: "^",
                left: left.type_name(),
                right: right.type_name(),
            });
        }
    };
    if exponent.sign() == Sign::Minus {
        return Err(RuntimeError::NegativeExponent);
    }
    if let Some(exponent) = exponent.to_u32() {
        return Ok(Value::Integer(Pow::pow(base, exponent)));
    }
    let mut result: BigInt = Pow::pow(base, u32::MAX);
    let mut excess = exponent - BigInt::from(u32::MAX);
    while excess > BigInt::zero() {
        result *= base;
        excess -= BigInt::one();
    }
    Ok(Value::Integer(result))
}
