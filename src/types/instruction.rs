use std::fmt;

use serde_json::Value;

use super::expr::Expression;

/// A writable property of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Prop {
    Value,
    Options,
    Visible,
    Disabled,
    Required,
    Errors,
}

impl Prop {
    #[must_use]
    pub fn from_name(name: &str) -> Option<Prop> {
        Some(match name {
            "value" => Prop::Value,
            "options" => Prop::Options,
            "visible" => Prop::Visible,
            "disabled" => Prop::Disabled,
            "required" => Prop::Required,
            "errors" => Prop::Errors,
            _ => return None,
        })
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Prop::Value => "value",
            Prop::Options => "options",
            Prop::Visible => "visible",
            Prop::Disabled => "disabled",
            Prop::Required => "required",
            Prop::Errors => "errors",
        }
    }
}

impl fmt::Display for Prop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A field property addressed by an instruction, e.g. `app.region.options`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub field: String,
    pub prop: Prop,
}

impl Target {
    #[must_use]
    pub fn new(field: impl Into<String>, prop: Prop) -> Self {
        Self {
            field: field.into(),
            prop,
        }
    }

    /// Split a dotted path into field key and property.
    ///
    /// The last segment names the property only if it is one of the known
    /// properties; otherwise the whole path is the field key and the
    /// property is `value`.
    #[must_use]
    pub fn from_path(path: &str) -> Self {
        if let Some((field, last)) = path.rsplit_once('.') {
            if let Some(prop) = Prop::from_name(last) {
                if !field.is_empty() {
                    return Self::new(field, prop);
                }
            }
        }
        Self::new(path, Prop::Value)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.field, self.prop)
    }
}

/// One method argument as written in the DSL.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    /// A literal parsed once at load time.
    Literal(Value),
    /// A field reference (`region`, `app.region`, `region.value`) resolved
    /// against the value store at call time; falls back to its own text.
    Reference(String),
}

/// The argument list of a method call.
#[derive(Debug, Clone, PartialEq)]
pub enum Params {
    Positional(Vec<Param>),
    Named(Vec<(String, Param)>),
}

impl Default for Params {
    fn default() -> Self {
        Params::Positional(Vec::new())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodCall {
    pub method: String,
    pub params: Params,
}

/// A result path step list paired with the field property it feeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mapping {
    pub target: Target,
    pub path: Vec<String>,
}

/// One parsed line of the instruction DSL.
#[derive(Debug, Clone)]
pub enum Instruction {
    Set {
        target: Target,
        expression: Expression,
    },
    Clear {
        target: Target,
    },
    CallMethod {
        call: MethodCall,
        result_path: Vec<String>,
        target: Target,
    },
    CallMethodMulti {
        call: MethodCall,
        mappings: Vec<Mapping>,
    },
    CallMethodToTemp {
        call: MethodCall,
        temp_var: String,
    },
    Conditional {
        condition: Expression,
        action: Box<Instruction>,
    },
    Emit {
        event: String,
        payload: String,
    },
}

impl Instruction {
    /// The field an instruction-level failure is recorded on, if any.
    #[must_use]
    pub fn target_field(&self) -> Option<&str> {
        match self {
            Instruction::Set { target, .. }
            | Instruction::Clear { target }
            | Instruction::CallMethod { target, .. } => Some(target.field.as_str()),
            _ => None,
        }
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Instruction::Set { .. } => "set",
            Instruction::Clear { .. } => "clear",
            Instruction::CallMethod { .. } => "call_method",
            Instruction::CallMethodMulti { .. } => "call_method_multi",
            Instruction::CallMethodToTemp { .. } => "call_method_to_temp",
            Instruction::Conditional { .. } => "conditional_action",
            Instruction::Emit { .. } => "emit",
        }
    }
}
