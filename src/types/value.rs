use std::cmp::Ordering;

use serde_json::{Number, Value};

use super::expr::CompareOp;

/// Numeric view of a JSON number used by the evaluator's arithmetic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    pub(crate) fn from_value(value: &Value) -> Option<Num> {
        match value {
            Value::Number(n) => Some(Num::from_number(n)),
            _ => None,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    pub(crate) fn from_number(n: &Number) -> Num {
        if let Some(i) = n.as_i64() {
            Num::Int(i)
        } else {
            Num::Float(n.as_f64().unwrap_or(f64::NAN))
        }
    }

    #[allow(clippy::cast_precision_loss)]
    pub(crate) fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }

    /// Converts back into a JSON value. Non-finite floats have no JSON form.
    pub(crate) fn into_value(self) -> Option<Value> {
        match self {
            Num::Int(i) => Some(Value::from(i)),
            Num::Float(f) => Number::from_f64(f).map(Value::Number),
        }
    }
}

/// Truthiness used by conditions, `bool()`, `any()` and `all()`.
#[must_use]
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => match Num::from_number(n) {
            Num::Int(i) => i != 0,
            Num::Float(f) => f != 0.0,
        },
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// A value counts as empty for `required` validation when it is null,
/// an empty string, or an empty list.
#[must_use]
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        _ => false,
    }
}

/// Text rendering used by `str()`, option labels and f-strings.
///
/// Strings render bare; everything else renders as compact JSON.
#[must_use]
pub fn display_str(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[must_use]
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) => match Num::from_number(n) {
            Num::Int(_) => "int",
            Num::Float(_) => "float",
        },
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

/// Equality with numeric cross-type comparison (`1 == 1.0`), applied
/// recursively through lists and objects.
#[must_use]
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            match (Num::from_number(x), Num::from_number(y)) {
                (Num::Int(x), Num::Int(y)) => x == y,
                (x, y) => x.as_f64() == y.as_f64(),
            }
        }
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| loose_eq(l, r))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(k, v)| y.get(k).is_some_and(|other| loose_eq(v, other)))
        }
        _ => a == b,
    }
}

/// Compare two values using the given operator.
///
/// Returns `None` for incompatible types or operators that are not
/// comparisons (`in`, `is`). Equality never fails.
#[must_use]
pub fn compare(left: &Value, op: CompareOp, right: &Value) -> Option<bool> {
    match op {
        CompareOp::Eq => return Some(loose_eq(left, right)),
        CompareOp::Neq => return Some(!loose_eq(left, right)),
        _ => {}
    }
    let ord = partial_cmp_value(left, right)?;
    match op {
        CompareOp::Gt => Some(ord == Ordering::Greater),
        CompareOp::Gte => Some(ord != Ordering::Less),
        CompareOp::Lt => Some(ord == Ordering::Less),
        CompareOp::Lte => Some(ord != Ordering::Greater),
        _ => None,
    }
}

/// Ordering between values of compatible types: numbers with numbers,
/// strings with strings, bools with bools, lists element-wise.
#[must_use]
pub fn partial_cmp_value(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => {
            match (Num::from_number(a), Num::from_number(b)) {
                (Num::Int(a), Num::Int(b)) => Some(a.cmp(&b)),
                (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
            }
        }
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Array(a), Value::Array(b)) => {
            for (x, y) in a.iter().zip(b) {
                match partial_cmp_value(x, y)? {
                    Ordering::Equal => {}
                    other => return Some(other),
                }
            }
            Some(a.len().cmp(&b.len()))
        }
        _ => None,
    }
}

/// Membership test behind `in`: substring for strings, element for lists,
/// key for objects.
#[must_use]
pub fn contains(container: &Value, item: &Value) -> Option<bool> {
    match (container, item) {
        (Value::String(haystack), Value::String(needle)) => Some(haystack.contains(needle.as_str())),
        (Value::Array(items), _) => Some(items.iter().any(|x| loose_eq(x, item))),
        (Value::Object(map), Value::String(key)) => Some(map.contains_key(key)),
        _ => None,
    }
}
