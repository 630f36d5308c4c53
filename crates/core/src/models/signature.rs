use serde_json::{Map, Value};
use thiserror::Error;

/// A named parameter; parameters without a default are required.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub default: Option<Value>,
}

/// Declared calling convention of an invocable function.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FunctionSignature {
    params: Vec<Param>,
    varargs: bool,
    varkwargs: bool,
}

/// Argument binding failure, the analogue of a call-site type error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BindError {
    #[error("missing required argument: '{0}'")]
    Missing(String),

    #[error("takes {expected} positional arguments but {given} were given")]
    TooManyPositional { expected: usize, given: usize },

    #[error("got multiple values for argument '{0}'")]
    Duplicate(String),

    #[error("got an unexpected keyword argument '{0}'")]
    Unexpected(String),
}

/// Arguments after binding against a [`FunctionSignature`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundArgs {
    named: Vec<(String, Value)>,
    extra_args: Vec<Value>,
    extra_kwargs: Map<String, Value>,
}

impl FunctionSignature {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self, name: &str) -> Self {
        self.params.push(Param {
            name: name.to_string(),
            default: None,
        });
        self
    }

    pub fn optional(mut self, name: &str, default: Value) -> Self {
        self.params.push(Param {
            name: name.to_string(),
            default: Some(default),
        });
        self
    }

    pub fn with_varargs(mut self) -> Self {
        self.varargs = true;
        self
    }

    pub fn with_kwargs(mut self) -> Self {
        self.varkwargs = true;
        self
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn accepts_varargs(&self) -> bool {
        self.varargs
    }

    pub fn accepts_kwargs(&self) -> bool {
        self.varkwargs
    }

    pub fn bind(&self, args: &[Value], kwargs: &Map<String, Value>) -> Result<BoundArgs, BindError> {
        let mut slots: Vec<Option<Value>> = vec![None; self.params.len()];
        let mut bound = BoundArgs::default();

        for (index, value) in args.iter().enumerate() {
            if index < slots.len() {
                slots[index] = Some(value.clone());
            } else if self.varargs {
                bound.extra_args.push(value.clone());
            } else {
                return Err(BindError::TooManyPositional {
                    expected: self.params.len(),
                    given: args.len(),
                });
            }
        }

        for (key, value) in kwargs {
            match self.params.iter().position(|p| &p.name == key) {
                Some(index) if slots[index].is_some() => {
                    return Err(BindError::Duplicate(key.clone()));
                }
                Some(index) => slots[index] = Some(value.clone()),
                None if self.varkwargs => {
                    bound.extra_kwargs.insert(key.clone(), value.clone());
                }
                None => return Err(BindError::Unexpected(key.clone())),
            }
        }

        for (param, slot) in self.params.iter().zip(slots) {
            let value = match slot.or_else(|| param.default.clone()) {
                Some(value) => value,
                None => return Err(BindError::Missing(param.name.clone())),
            };
            bound.named.push((param.name.clone(), value));
        }

        Ok(bound)
    }
}

impl BoundArgs {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.named
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_f64)
    }

    pub fn named(&self) -> &[(String, Value)] {
        &self.named
    }

    pub fn extra_args(&self) -> &[Value] {
        &self.extra_args
    }

    pub fn extra_kwargs(&self) -> &Map<String, Value> {
        &self.extra_kwargs
    }
}
