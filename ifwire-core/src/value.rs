//! Instantiation arguments.

use std::fmt;

use crate::error::ModuleError;

/// One argument value handed to a module constructor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    String(String),
    List(Vec<Value>),
}

impl Value {
    pub fn list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::List(items.into_iter().map(|s| Self::String(s.into())).collect())
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::List(_) => "list",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s:?}"),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

/// Positional reader over a fixed-arity argument list.
pub struct Args<'a> {
    module: &'static str,
    values: std::slice::Iter<'a, Value>,
    position: usize,
}

impl<'a> Args<'a> {
    /// Check the arity and start reading.
    pub fn new(module: &'static str, values: &'a [Value], arity: usize) -> Result<Self, ModuleError> {
        if values.len() != arity {
            return Err(ModuleError::config(
                module,
                format!("wrong arity: expected {arity} arguments, got {}", values.len()),
            ));
        }
        Ok(Self {
            module,
            values: values.iter(),
            position: 0,
        })
    }

    fn next(&mut self, name: &str) -> Result<&'a Value, ModuleError> {
        self.position += 1;
        self.values.next().ok_or_else(|| {
            ModuleError::config(self.module, format!("missing argument {name}"))
        })
    }

    fn mismatch(&self, name: &str, expected: &str, got: &Value) -> ModuleError {
        ModuleError::config(
            self.module,
            format!(
                "argument {} ({name}): expected {expected}, got {}",
                self.position,
                got.kind()
            ),
        )
    }

    /// Next argument, which must be a string.
    pub fn string(&mut self, name: &str) -> Result<&'a str, ModuleError> {
        match self.next(name)? {
            Value::String(s) => Ok(s),
            other => Err(self.mismatch(name, "string", other)),
        }
    }

    /// Next argument, which must be a list of strings.
    pub fn string_list(&mut self, name: &str) -> Result<Vec<&'a str>, ModuleError> {
        let value = self.next(name)?;
        let Value::List(items) = value else {
            return Err(self.mismatch(name, "list", value));
        };
        items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.as_str()),
                other => Err(self.mismatch(name, "list of strings", other)),
            })
            .collect()
    }
}
