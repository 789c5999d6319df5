use std::cmp::Ordering;

use regex::{Regex, RegexBuilder};
use serde_json::{Map, Number, Value};
use thiserror::Error;

use crate::parse::ParseError;
use crate::types::value::{compare, contains, display_str, is_truthy, partial_cmp_value, type_name, Num};
use crate::types::{BinaryOp, Builtin, CompareOp, Expr, Expression, FormatPart, Scope, UnaryOp, ValueMethod};

/// Compiled patterns larger than this are rejected.
const REGEX_SIZE_LIMIT: usize = 1 << 20;

/// Results of `*` repetition longer than this are rejected.
const MAX_REPEAT_LEN: usize = 1 << 20;

/// Errors raised while evaluating an expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("name '{0}' is not defined")]
    UnknownName(String),

    #[error("{kind} has no attribute '{name}'")]
    NoAttribute { kind: &'static str, name: String },

    #[error("key '{0}' not found")]
    MissingKey(String),

    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: i64, len: usize },

    #[error("unsupported operand types for {op}: {left} and {right}")]
    TypeMismatch {
        op: String,
        left: &'static str,
        right: &'static str,
    },

    #[error("division by zero")]
    DivisionByZero,

    #[error("numeric overflow")]
    Overflow,

    #[error("{function}(): {message}")]
    BadArgument { function: &'static str, message: String },

    #[error("invalid pattern: {0}")]
    Pattern(String),
}

fn mismatch(op: impl ToString, left: &Value, right: &Value) -> EvalError {
    EvalError::TypeMismatch {
        op: op.to_string(),
        left: type_name(left),
        right: type_name(right),
    }
}

fn bad_argument(function: &'static str, message: impl Into<String>) -> EvalError {
    EvalError::BadArgument {
        function,
        message: message.into(),
    }
}

/// Evaluate a parsed-at-load expression. A parse failure is reported as an
/// evaluation failure.
///
/// # Errors
///
/// Returns [`EvalError`] if the expression did not parse or fails at run time.
pub fn evaluate(expression: &Expression, scope: &Scope<'_>) -> Result<Value, EvalError> {
    let expr = expression.ast().map_err(|e| EvalError::Parse(e.clone()))?;
    eval(expr, scope)
}

/// Decide a branch condition. A missing condition holds; a condition that
/// fails to parse or evaluate does not.
#[must_use]
pub fn condition_holds(condition: Option<&Expression>, scope: &Scope<'_>) -> bool {
    let Some(condition) = condition else {
        return true;
    };
    match evaluate(condition, scope) {
        Ok(value) => is_truthy(&value),
        Err(error) => {
            tracing::warn!(condition = %condition, %error, "condition failed; treated as false");
            false
        }
    }
}

/// Evaluate an expression tree against a scope.
///
/// # Errors
///
/// Returns [`EvalError`] for unknown names, type errors, bad indexes,
/// arithmetic faults or invalid builtin arguments.
pub fn eval(expr: &Expr, scope: &Scope<'_>) -> Result<Value, EvalError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Name(name) => scope
            .resolve(&[name.as_str()])
            .ok_or_else(|| EvalError::UnknownName(name.clone())),
        Expr::Attr(target, name) => {
            if let Some(path) = expr.dotted_path() {
                return scope
                    .resolve(&path)
                    .ok_or_else(|| EvalError::UnknownName(path.join(".")));
            }
            attribute(eval(target, scope)?, name)
        }
        Expr::Index(target, index) => subscript(eval(target, scope)?, &eval(index, scope)?),
        Expr::Call(builtin, args) => {
            let args = args.iter().map(|a| eval(a, scope)).collect::<Result<Vec<_>, _>>()?;
            call_builtin(*builtin, &args)
        }
        Expr::Method {
            target,
            method,
            args,
        } => {
            let receiver = eval(target, scope)?;
            let args = args.iter().map(|a| eval(a, scope)).collect::<Result<Vec<_>, _>>()?;
            call_method(*method, &receiver, &args)
        }
        Expr::Unary(op, inner) => unary(*op, &eval(inner, scope)?),
        Expr::Binary(op, left, right) => arithmetic(*op, &eval(left, scope)?, &eval(right, scope)?),
        Expr::Compare { left, op, right } => {
            let left = eval(left, scope)?;
            let right = eval(right, scope)?;
            compare_values(&left, *op, &right).map(Value::Bool)
        }
        Expr::And(left, right) => {
            let left = eval(left, scope)?;
            if is_truthy(&left) {
                eval(right, scope)
            } else {
                Ok(left)
            }
        }
        Expr::Or(left, right) => {
            let left = eval(left, scope)?;
            if is_truthy(&left) {
                Ok(left)
            } else {
                eval(right, scope)
            }
        }
        Expr::Not(inner) => Ok(Value::Bool(!is_truthy(&eval(inner, scope)?))),
        Expr::Conditional {
            condition,
            then,
            otherwise,
        } => {
            if is_truthy(&eval(condition, scope)?) {
                eval(then, scope)
            } else {
                eval(otherwise, scope)
            }
        }
        Expr::List(items) => items
            .iter()
            .map(|item| eval(item, scope))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Expr::Object(entries) => {
            let mut map = Map::new();
            for (key, value) in entries {
                let key = match eval(key, scope)? {
                    Value::String(s) => s,
                    k @ (Value::Number(_) | Value::Bool(_) | Value::Null) => display_str(&k),
                    other => return Err(mismatch("object key", &other, &Value::Null)),
                };
                map.insert(key, eval(value, scope)?);
            }
            Ok(Value::Object(map))
        }
        Expr::Format(parts) => {
            let mut out = String::new();
            for part in parts {
                match part {
                    FormatPart::Text(text) => out.push_str(text),
                    FormatPart::Expr(expr) => out.push_str(&display_str(&eval(expr, scope)?)),
                }
            }
            Ok(Value::String(out))
        }
    }
}

fn attribute(value: Value, name: &str) -> Result<Value, EvalError> {
    match value {
        Value::Object(mut map) => map.remove(name).ok_or_else(|| EvalError::NoAttribute {
            kind: "object",
            name: name.to_owned(),
        }),
        other => Err(EvalError::NoAttribute {
            kind: type_name(&other),
            name: name.to_owned(),
        }),
    }
}

/// Resolve a possibly negative index against a length.
fn position(index: i64, len: usize) -> Result<usize, EvalError> {
    let signed_len = i64::try_from(len).map_err(|_| EvalError::Overflow)?;
    let resolved = if index < 0 { index + signed_len } else { index };
    usize::try_from(resolved)
        .ok()
        .filter(|&i| i < len)
        .ok_or(EvalError::IndexOutOfRange { index, len })
}

fn subscript(target: Value, index: &Value) -> Result<Value, EvalError> {
    match (target, index) {
        (Value::Array(mut items), Value::Number(n)) => {
            let i = n.as_i64().ok_or_else(|| mismatch("[]", &Value::Array(Vec::new()), index))?;
            let at = position(i, items.len())?;
            Ok(items.swap_remove(at))
        }
        (Value::Object(mut map), Value::String(key)) => {
            map.remove(key).ok_or_else(|| EvalError::MissingKey(key.clone()))
        }
        (Value::String(s), Value::Number(n)) => {
            let i = n.as_i64().ok_or_else(|| mismatch("[]", &Value::String(String::new()), index))?;
            let chars: Vec<char> = s.chars().collect();
            let at = position(i, chars.len())?;
            Ok(Value::String(chars[at].to_string()))
        }
        (target, index) => Err(mismatch("[]", &target, index)),
    }
}

/// Numeric view used by arithmetic. Booleans count as 0 and 1.
fn numeric(value: &Value) -> Option<Num> {
    match value {
        Value::Bool(b) => Some(Num::Int(i64::from(*b))),
        other => Num::from_value(other),
    }
}

fn finite(f: f64) -> Result<Value, EvalError> {
    Number::from_f64(f).map(Value::Number).ok_or(EvalError::Overflow)
}

fn unary(op: UnaryOp, value: &Value) -> Result<Value, EvalError> {
    let symbol = match op {
        UnaryOp::Neg => "unary -",
        UnaryOp::Pos => "unary +",
    };
    let n = numeric(value).ok_or_else(|| mismatch(symbol, value, &Value::Null))?;
    match (op, n) {
        (UnaryOp::Neg, Num::Int(i)) => i.checked_neg().map(Value::from).ok_or(EvalError::Overflow),
        (UnaryOp::Neg, Num::Float(f)) => finite(-f),
        (UnaryOp::Pos, n) => n.into_value().ok_or(EvalError::Overflow),
    }
}

fn floor_div(a: i64, b: i64) -> Result<i64, EvalError> {
    if b == 0 {
        return Err(EvalError::DivisionByZero);
    }
    let q = a.checked_div(b).ok_or(EvalError::Overflow)?;
    Ok(if a % b != 0 && ((a < 0) != (b < 0)) { q - 1 } else { q })
}

fn floor_mod(a: i64, b: i64) -> Result<i64, EvalError> {
    if b == 0 {
        return Err(EvalError::DivisionByZero);
    }
    let r = a.checked_rem(b).ok_or(EvalError::Overflow)?;
    Ok(if r != 0 && ((r < 0) != (b < 0)) { r + b } else { r })
}

fn repeat_count(n: &Value, len: usize) -> Option<Result<usize, EvalError>> {
    let Value::Number(n) = n else { return None };
    let times = n.as_i64()?;
    let times = usize::try_from(times).unwrap_or(0);
    Some(match times.checked_mul(len) {
        Some(total) if total <= MAX_REPEAT_LEN => Ok(times),
        _ => Err(EvalError::Overflow),
    })
}

fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, EvalError> {
    match (op, left, right) {
        (BinaryOp::Add, Value::String(a), Value::String(b)) => return Ok(Value::String(format!("{a}{b}"))),
        (BinaryOp::Add, Value::Array(a), Value::Array(b)) => {
            return Ok(Value::Array(a.iter().chain(b).cloned().collect()));
        }
        (BinaryOp::Mul, Value::String(s), n) | (BinaryOp::Mul, n, Value::String(s)) => {
            if let Some(times) = repeat_count(n, s.len()) {
                return Ok(Value::String(s.repeat(times?)));
            }
        }
        (BinaryOp::Mul, Value::Array(items), n) | (BinaryOp::Mul, n, Value::Array(items)) => {
            if let Some(times) = repeat_count(n, items.len()) {
                let times = times?;
                return Ok(Value::Array(
                    std::iter::repeat(items.iter()).take(times).flatten().cloned().collect(),
                ));
            }
        }
        _ => {}
    }

    let (Some(a), Some(b)) = (numeric(left), numeric(right)) else {
        return Err(mismatch(op, left, right));
    };
    match (a, b) {
        (Num::Int(a), Num::Int(b)) => match op {
            BinaryOp::Add => a.checked_add(b).map(Value::from).ok_or(EvalError::Overflow),
            BinaryOp::Sub => a.checked_sub(b).map(Value::from).ok_or(EvalError::Overflow),
            BinaryOp::Mul => a.checked_mul(b).map(Value::from).ok_or(EvalError::Overflow),
            BinaryOp::Div => {
                if b == 0 {
                    Err(EvalError::DivisionByZero)
                } else {
                    finite(Num::Int(a).as_f64() / Num::Int(b).as_f64())
                }
            }
            BinaryOp::FloorDiv => floor_div(a, b).map(Value::from),
            BinaryOp::Mod => floor_mod(a, b).map(Value::from),
        },
        (a, b) => {
            let (a, b) = (a.as_f64(), b.as_f64());
            let zero_divisor = b == 0.0 && matches!(op, BinaryOp::Div | BinaryOp::FloorDiv | BinaryOp::Mod);
            if zero_divisor {
                return Err(EvalError::DivisionByZero);
            }
            finite(match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => a / b,
                BinaryOp::FloorDiv => (a / b).floor(),
                BinaryOp::Mod => a - b * (a / b).floor(),
            })
        }
    }
}

fn compare_values(left: &Value, op: CompareOp, right: &Value) -> Result<bool, EvalError> {
    match op {
        CompareOp::In => contains(right, left).ok_or_else(|| mismatch(op, left, right)),
        CompareOp::NotIn => contains(right, left)
            .map(|found| !found)
            .ok_or_else(|| mismatch(op, left, right)),
        CompareOp::Is => Ok(left == right),
        CompareOp::IsNot => Ok(left != right),
        _ => compare(left, op, right).ok_or_else(|| mismatch(op, left, right)),
    }
}

// -- Builtins ---------------------------------------------------------------

fn arity(function: &'static str, args: &[Value], min: usize, max: usize) -> Result<(), EvalError> {
    if (min..=max).contains(&args.len()) {
        Ok(())
    } else if min == max {
        Err(bad_argument(function, format!("expected {min} argument(s), got {}", args.len())))
    } else {
        Err(bad_argument(
            function,
            format!("expected {min} to {max} arguments, got {}", args.len()),
        ))
    }
}

/// The elements an iterable argument yields: list items, string
/// characters or object keys.
fn iterate(function: &'static str, value: &Value) -> Result<Vec<Value>, EvalError> {
    match value {
        Value::Array(items) => Ok(items.clone()),
        Value::String(s) => Ok(s.chars().map(|c| Value::String(c.to_string())).collect()),
        Value::Object(map) => Ok(map.keys().cloned().map(Value::String).collect()),
        other => Err(bad_argument(function, format!("{} is not iterable", type_name(other)))),
    }
}

fn sort_values(function: &'static str, items: &mut [Value]) -> Result<(), EvalError> {
    let mut incomparable = false;
    items.sort_by(|a, b| {
        partial_cmp_value(a, b).unwrap_or_else(|| {
            incomparable = true;
            Ordering::Equal
        })
    });
    if incomparable {
        Err(bad_argument(function, "values are not comparable"))
    } else {
        Ok(())
    }
}

fn extreme(function: &'static str, args: &[Value], wanted: Ordering) -> Result<Value, EvalError> {
    let items = match args {
        [single] => iterate(function, single)?,
        many => many.to_vec(),
    };
    let mut best: Option<Value> = None;
    for item in items {
        best = Some(match best {
            None => item,
            Some(current) => match partial_cmp_value(&item, &current) {
                Some(ord) if ord == wanted => item,
                Some(_) => current,
                None => return Err(bad_argument(function, "values are not comparable")),
            },
        });
    }
    best.ok_or_else(|| bad_argument(function, "empty sequence"))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn to_int(value: &Value) -> Result<Value, EvalError> {
    match value {
        Value::Bool(b) => Ok(Value::from(i64::from(*b))),
        Value::Number(n) => match Num::from_number(n) {
            Num::Int(i) => Ok(Value::from(i)),
            Num::Float(f) => {
                let t = f.trunc();
                if t.is_finite() && t >= i64::MIN as f64 && t < i64::MAX as f64 {
                    Ok(Value::from(t as i64))
                } else {
                    Err(EvalError::Overflow)
                }
            }
        },
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| bad_argument("int", format!("invalid literal '{s}'"))),
        other => Err(bad_argument("int", format!("cannot convert {}", type_name(other)))),
    }
}

fn to_float(value: &Value) -> Result<Value, EvalError> {
    match value {
        Value::Bool(b) => finite(if *b { 1.0 } else { 0.0 }),
        Value::Number(n) => finite(Num::from_number(n).as_f64()),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| bad_argument("float", format!("invalid literal '{s}'")))
            .and_then(finite),
        other => Err(bad_argument("float", format!("cannot convert {}", type_name(other)))),
    }
}

fn to_dict(value: &Value) -> Result<Value, EvalError> {
    match value {
        Value::Object(map) => Ok(Value::Object(map.clone())),
        Value::Array(pairs) => {
            let mut map = Map::new();
            for pair in pairs {
                match pair.as_array().map(Vec::as_slice) {
                    Some([Value::String(k), v]) => {
                        map.insert(k.clone(), v.clone());
                    }
                    _ => return Err(bad_argument("dict", "expected [key, value] pairs with string keys")),
                }
            }
            Ok(Value::Object(map))
        }
        other => Err(bad_argument("dict", format!("cannot convert {}", type_name(other)))),
    }
}

fn string_arg<'v>(function: &'static str, value: &'v Value) -> Result<&'v str, EvalError> {
    value
        .as_str()
        .ok_or_else(|| bad_argument(function, format!("expected string, got {}", type_name(value))))
}

fn compile_pattern(function: &'static str, pattern: &str, anchor_start: bool, anchor_end: bool) -> Result<Regex, EvalError> {
    let source = match (anchor_start, anchor_end) {
        (true, true) => format!("^(?:{pattern})$"),
        (true, false) => format!("^(?:{pattern})"),
        _ => pattern.to_owned(),
    };
    RegexBuilder::new(&source)
        .size_limit(REGEX_SIZE_LIMIT)
        .build()
        .map_err(|e| EvalError::Pattern(format!("{function}: {e}")))
}

fn regex_call(builtin: Builtin, args: &[Value]) -> Result<Value, EvalError> {
    let function = builtin.name();
    arity(function, args, 2, 2)?;
    let pattern = string_arg(function, &args[0])?;
    let text = string_arg(function, &args[1])?;
    let matched = |re: Regex| {
        re.find(text)
            .map_or(Value::Null, |m| Value::String(m.as_str().to_owned()))
    };
    match builtin {
        Builtin::ReMatch => Ok(matched(compile_pattern(function, pattern, true, false)?)),
        Builtin::ReFullmatch => Ok(matched(compile_pattern(function, pattern, true, true)?)),
        Builtin::ReSearch => Ok(matched(compile_pattern(function, pattern, false, false)?)),
        _ => {
            let re = compile_pattern(function, pattern, false, false)?;
            let group = |caps: &regex::Captures<'_>, i: usize| {
                Value::String(caps.get(i).map_or_else(String::new, |m| m.as_str().to_owned()))
            };
            let found = re
                .captures_iter(text)
                .map(|caps| match re.captures_len() {
                    1 => group(&caps, 0),
                    2 => group(&caps, 1),
                    n => Value::Array((1..n).map(|i| group(&caps, i)).collect()),
                })
                .collect();
            Ok(Value::Array(found))
        }
    }
}

fn call_builtin(builtin: Builtin, args: &[Value]) -> Result<Value, EvalError> {
    let function = builtin.name();
    match builtin {
        Builtin::Len => {
            arity(function, args, 1, 1)?;
            let len = match &args[0] {
                Value::String(s) => s.chars().count(),
                Value::Array(items) => items.len(),
                Value::Object(map) => map.len(),
                other => return Err(bad_argument(function, format!("{} has no length", type_name(other)))),
            };
            Ok(Value::from(len))
        }
        Builtin::Min => {
            arity(function, args, 1, usize::MAX)?;
            extreme(function, args, Ordering::Less)
        }
        Builtin::Max => {
            arity(function, args, 1, usize::MAX)?;
            extreme(function, args, Ordering::Greater)
        }
        Builtin::Sum => {
            arity(function, args, 1, 2)?;
            let mut total = args.get(1).cloned().unwrap_or(Value::from(0));
            for item in iterate(function, &args[0])? {
                total = arithmetic(BinaryOp::Add, &total, &item)?;
            }
            Ok(total)
        }
        Builtin::Any => {
            arity(function, args, 1, 1)?;
            Ok(Value::Bool(iterate(function, &args[0])?.iter().any(is_truthy)))
        }
        Builtin::All => {
            arity(function, args, 1, 1)?;
            Ok(Value::Bool(iterate(function, &args[0])?.iter().all(is_truthy)))
        }
        Builtin::Sorted => {
            arity(function, args, 1, 2)?;
            let mut items = iterate(function, &args[0])?;
            sort_values(function, &mut items)?;
            if args.get(1).is_some_and(is_truthy) {
                items.reverse();
            }
            Ok(Value::Array(items))
        }
        Builtin::Str => {
            arity(function, args, 0, 1)?;
            Ok(Value::String(args.first().map(display_str).unwrap_or_default()))
        }
        Builtin::Int => {
            arity(function, args, 0, 1)?;
            args.first().map_or(Ok(Value::from(0)), to_int)
        }
        Builtin::Float => {
            arity(function, args, 0, 1)?;
            args.first().map_or_else(|| finite(0.0), to_float)
        }
        Builtin::Bool => {
            arity(function, args, 0, 1)?;
            Ok(Value::Bool(args.first().is_some_and(is_truthy)))
        }
        Builtin::List => {
            arity(function, args, 0, 1)?;
            args.first()
                .map_or(Ok(Vec::new()), |v| iterate(function, v))
                .map(Value::Array)
        }
        Builtin::Dict => {
            arity(function, args, 0, 1)?;
            args.first().map_or(Ok(Value::Object(Map::new())), to_dict)
        }
        Builtin::ReMatch | Builtin::ReSearch | Builtin::ReFullmatch | Builtin::ReFindall => {
            regex_call(builtin, args)
        }
    }
}

// -- Value methods ----------------------------------------------------------

fn affixes<'v>(function: &'static str, value: &'v Value) -> Result<Vec<&'v str>, EvalError> {
    match value {
        Value::Array(items) => items.iter().map(|v| string_arg(function, v)).collect(),
        other => Ok(vec![string_arg(function, other)?]),
    }
}

fn call_method(method: ValueMethod, receiver: &Value, args: &[Value]) -> Result<Value, EvalError> {
    let function = method.name();
    match (method, receiver) {
        (ValueMethod::Upper, Value::String(s)) => {
            arity(function, args, 0, 0)?;
            Ok(Value::String(s.to_uppercase()))
        }
        (ValueMethod::Lower, Value::String(s)) => {
            arity(function, args, 0, 0)?;
            Ok(Value::String(s.to_lowercase()))
        }
        (ValueMethod::Strip, Value::String(s)) => {
            arity(function, args, 0, 1)?;
            let stripped = match args.first() {
                None | Some(Value::Null) => s.trim(),
                Some(chars) => {
                    let chars = string_arg(function, chars)?;
                    s.trim_matches(|c| chars.contains(c))
                }
            };
            Ok(Value::String(stripped.to_owned()))
        }
        (ValueMethod::StartsWith, Value::String(s)) => {
            arity(function, args, 1, 1)?;
            Ok(Value::Bool(affixes(function, &args[0])?.iter().any(|p| s.starts_with(p))))
        }
        (ValueMethod::EndsWith, Value::String(s)) => {
            arity(function, args, 1, 1)?;
            Ok(Value::Bool(affixes(function, &args[0])?.iter().any(|p| s.ends_with(p))))
        }
        (ValueMethod::Split, Value::String(s)) => {
            arity(function, args, 0, 2)?;
            let limit = match args.get(1) {
                Some(n) => usize::try_from(n.as_i64().unwrap_or(-1)).ok().map(|n| n + 1),
                None => None,
            };
            let pieces: Vec<Value> = match args.first() {
                None | Some(Value::Null) => s
                    .split_whitespace()
                    .map(|p| Value::String(p.to_owned()))
                    .collect(),
                Some(sep) => {
                    let sep = string_arg(function, sep)?;
                    if sep.is_empty() {
                        return Err(bad_argument(function, "empty separator"));
                    }
                    match limit {
                        Some(n) => s.splitn(n, sep).map(|p| Value::String(p.to_owned())).collect(),
                        None => s.split(sep).map(|p| Value::String(p.to_owned())).collect(),
                    }
                }
            };
            Ok(Value::Array(pieces))
        }
        (ValueMethod::Replace, Value::String(s)) => {
            arity(function, args, 2, 3)?;
            let from = string_arg(function, &args[0])?;
            let to = string_arg(function, &args[1])?;
            let replaced = match args.get(2).and_then(Value::as_i64) {
                Some(count) if count >= 0 => s.replacen(from, to, usize::try_from(count).unwrap_or(usize::MAX)),
                _ => s.replace(from, to),
            };
            Ok(Value::String(replaced))
        }
        (ValueMethod::Join, Value::String(sep)) => {
            arity(function, args, 1, 1)?;
            let parts = iterate(function, &args[0])?
                .iter()
                .map(|v| string_arg(function, v).map(str::to_owned))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::String(parts.join(sep)))
        }
        (ValueMethod::Get, Value::Object(map)) => {
            arity(function, args, 1, 2)?;
            let key = string_arg(function, &args[0])?;
            Ok(map
                .get(key)
                .cloned()
                .or_else(|| args.get(1).cloned())
                .unwrap_or(Value::Null))
        }
        (ValueMethod::Keys, Value::Object(map)) => {
            arity(function, args, 0, 0)?;
            Ok(Value::Array(map.keys().cloned().map(Value::String).collect()))
        }
        (ValueMethod::Values, Value::Object(map)) => {
            arity(function, args, 0, 0)?;
            Ok(Value::Array(map.values().cloned().collect()))
        }
        (method, other) => Err(EvalError::NoAttribute {
            kind: type_name(other),
            name: method.name().to_owned(),
        }),
    }
}
