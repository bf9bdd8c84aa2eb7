//! Lexically nested name resolution.
//!
//! A scope is an explicit stack of frames, each with a parent link and two
//! maps: variables by name and functions by (name, arity). Lookup walks
//! the parent chain from the newest frame; the first hit wins. Every
//! construct that enters a frame must pop it on every exit path; the
//! analyzer and interpreter route all entry through closure helpers so the
//! stack is balanced even when an error propagates.

use std::collections::HashMap;

use thiserror::Error;

use crate::environment::{Function, Variable};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScopeError {
    #[error("The variable '{name}' is already defined in this scope.")]
    DuplicateVariable { name: String },
    #[error("The function '{name}/{arity}' is already defined in this scope.")]
    DuplicateFunction { name: String, arity: usize },
}

#[derive(Debug, Default)]
struct Frame {
    parent: Option<usize>,
    variables: HashMap<String, Variable>,
    functions: HashMap<(String, usize), Function>,
}

#[derive(Debug)]
pub struct Scope {
    frames: Vec<Frame>,
}

impl Scope {
    /// A scope holding only the root frame.
    pub fn new() -> Self {
        Self {
            frames: vec![Frame::default()],
        }
    }

    /// Number of live frames. The root frame never pops, so a balanced
    /// scope has the same depth before and after any walk.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Pushes a frame nested in the current one.
    pub fn enter(&mut self) {
        let parent = Some(self.frames.len() - 1);
        self.frames.push(Frame {
            parent,
            ..Frame::default()
        });
    }

    /// Pushes a frame nested in the root. Function bodies resolve against
    /// their defining scope, which for top-level functions is the root.
    pub fn enter_call(&mut self) {
        self.frames.push(Frame {
            parent: Some(0),
            ..Frame::default()
        });
    }

    /// Pops the current frame. The root frame is never popped.
    pub fn exit(&mut self) {
        debug_assert!(self.frames.len() > 1, "attempted to pop the root frame");
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    pub fn define_variable(&mut self, variable: Variable) -> Result<(), ScopeError> {
        let frame = self.frames.last_mut().expect("scope has a root frame");
        if frame.variables.contains_key(&variable.name) {
            return Err(ScopeError::DuplicateVariable {
                name: variable.name,
            });
        }
        frame.variables.insert(variable.name.clone(), variable);
        Ok(())
    }

    pub fn define_function(&mut self, function: Function) -> Result<(), ScopeError> {
        let key = (function.name.clone(), function.arity());
        let frame = self.frames.last_mut().expect("scope has a root frame");
        if frame.functions.contains_key(&key) {
            return Err(ScopeError::DuplicateFunction {
                name: key.0,
                arity: key.1,
            });
        }
        frame.functions.insert(key, function);
        Ok(())
    }

    pub fn lookup_variable(&self, name: &str) -> Option<&Variable> {
        let index = self.variable_frame(name)?;
        self.frames[index].variables.get(name)
    }

    pub fn lookup_variable_mut(&mut self, name: &str) -> Option<&mut Variable> {
        let index = self.variable_frame(name)?;
        self.frames[index].variables.get_mut(name)
    }

    pub fn lookup_function(&self, name: &str, arity: usize) -> Option<&Function> {
        let key = (name.to_string(), arity);
        let mut frame = Some(self.frames.len() - 1);
        while let Some(index) = frame {
            if let Some(function) = self.frames[index].functions.get(&key) {
                return Some(function);
            }
            frame = self.frames[index].parent;
        }
        None
    }

    fn variable_frame(&self, name: &str) -> Option<usize> {
        let mut frame = Some(self.frames.len() - 1);
        while let Some(index) = frame {
            if self.frames[index].variables.contains_key(name) {
                return Some(index);
            }
            frame = self.frames[index].parent;
        }
        None
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{Type, Value};
    use num_bigint::BigInt;

    fn variable(name: &str, value: i64) -> Variable {
        Variable::new(
            name,
            Type::Integer,
            true,
            Value::Integer(value.into()),
        )
    }

    #[test]
    fn lookup_walks_the_parent_chain() {
        let mut scope = Scope::new();
        scope.define_variable(variable("x", 1)).expect("define failed");
        scope.enter();
        scope.enter();
        assert_eq!(
            scope.lookup_variable("x").map(|v| v.value.clone()),
            Some(Value::Integer(BigInt::from(1)))
        );
        scope.exit();
        scope.exit();
        assert_eq!(scope.depth(), 1);
    }

    #[test]
    fn inner_definitions_shadow_outer_ones() {
        let mut scope = Scope::new();
        scope.define_variable(variable("x", 1)).expect("define failed");
        scope.enter();
        scope.define_variable(variable("x", 2)).expect("define failed");
        assert_eq!(
            scope.lookup_variable("x").map(|v| v.value.clone()),
            Some(Value::Integer(BigInt::from(2)))
        );
        scope.exit();
        assert_eq!(
            scope.lookup_variable("x").map(|v| v.value.clone()),
            Some(Value::Integer(BigInt::from(1)))
        );
    }

    #[test]
    fn redefinition_in_the_same_frame_is_an_error() {
        let mut scope = Scope::new();
        scope.define_variable(variable("x", 1)).expect("define failed");
        assert_eq!(
            scope.define_variable(variable("x", 2)),
            Err(ScopeError::DuplicateVariable {
                name: "x".to_string()
            })
        );
    }

    #[test]
    fn definitions_in_a_popped_frame_are_gone() {
        let mut scope = Scope::new();
        scope.enter();
        scope.define_variable(variable("local", 1)).expect("define failed");
        scope.exit();
        assert!(scope.lookup_variable("local").is_none());
    }

    #[test]
    fn functions_are_keyed_by_name_and_arity() {
        let mut scope = Scope::new();
        let unary = Function {
            name: "f".to_string(),
            target_name: "f".to_string(),
            parameter_types: vec![Type::Integer],
            return_type: Type::Integer,
            body: crate::environment::FunctionBody::Declared,
        };
        let nullary = Function {
            parameter_types: vec![],
            ..unary.clone()
        };
        scope.define_function(unary).expect("define failed");
        scope.define_function(nullary).expect("define failed");
        assert!(scope.lookup_function("f", 0).is_some());
        assert!(scope.lookup_function("f", 1).is_some());
        assert!(scope.lookup_function("f", 2).is_none());
    }

    #[test]
    fn call_frames_skip_intervening_locals() {
        let mut scope = Scope::new();
        scope.define_variable(variable("global", 1)).expect("define failed");
        scope.enter();
        scope.define_variable(variable("local", 2)).expect("define failed");
        scope.enter_call();
        assert!(scope.lookup_variable("global").is_some());
        assert!(scope.lookup_variable("local").is_none());
        scope.exit();
        scope.exit();
        assert_eq!(scope.depth(), 1);
    }
}
