//! Host methods callable from `call_method` instructions.
//!
//! ```
//! use formrule::{Args, MethodRegistry};
//!
//! let mut methods = MethodRegistry::new();
//! methods.register("echo", |args: &Args| Ok(args.first().cloned().unwrap_or_default()));
//! assert!(methods.contains("echo"));
//! ```

use std::collections::HashMap;
use std::fmt;

use serde_json::{Map, Value};
use thiserror::Error;

/// Failure reported by a host method.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct MethodError {
    message: String,
}

impl MethodError {
    pub fn new(message: impl fmt::Display) -> Self {
        Self {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for MethodError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for MethodError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Arguments passed to a method, already resolved against the value store.
#[derive(Debug, Clone, PartialEq)]
pub enum Args {
    Positional(Vec<Value>),
    Named(Map<String, Value>),
}

impl Args {
    /// Positional argument at `index`. Always `None` for named calls.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Value> {
        match self {
            Args::Positional(values) => values.get(index),
            Args::Named(_) => None,
        }
    }

    #[must_use]
    pub fn first(&self) -> Option<&Value> {
        self.get(0)
    }

    /// Keyword argument by name. Always `None` for positional calls.
    #[must_use]
    pub fn named(&self, name: &str) -> Option<&Value> {
        match self {
            Args::Named(map) => map.get(name),
            Args::Positional(_) => None,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Args::Positional(values) => values.len(),
            Args::Named(map) => map.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The arguments as one JSON value: a list or an object.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Args::Positional(values) => Value::Array(values.clone()),
            Args::Named(map) => Value::Object(map.clone()),
        }
    }
}

impl Default for Args {
    fn default() -> Self {
        Args::Positional(Vec::new())
    }
}

/// A registered host method.
pub type Method = Box<dyn Fn(&Args) -> Result<Value, MethodError> + Send + Sync>;

/// Name → callable mapping owned by one engine instance.
#[derive(Default)]
pub struct MethodRegistry {
    methods: HashMap<String, Method>,
}

impl MethodRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `method` under `name`, replacing any earlier registration.
    pub fn register<F>(&mut self, name: impl Into<String>, method: F)
    where
        F: Fn(&Args) -> Result<Value, MethodError> + Send + Sync + 'static,
    {
        self.methods.insert(name.into(), Box::new(method));
    }

    /// Remove a method. Returns whether it was registered.
    pub fn unregister(&mut self, name: &str) -> bool {
        self.methods.remove(name).is_some()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    pub(crate) fn get(&self, name: &str) -> Option<&Method> {
        self.methods.get(name)
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

impl fmt::Debug for MethodRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodRegistry")
            .field("methods", &self.names())
            .finish()
    }
}
