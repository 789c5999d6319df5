use serde_json::{Map, Value};
use winnow::combinator::terminated;
use winnow::error::ModalResult;
use winnow::prelude::*;
use winnow::token::take_while;

use crate::types::{Expr, Expression, Instruction, Mapping, MethodCall, Param, Params, Prop, Target, UnaryOp};

use super::error::ParseError;
use super::expr::{string_literal, MAX_NESTING};
use super::scan::{find_assign, find_keyword, find_top_level, is_ident_char, matching_close, split_top_level, unquote};

/// Parse one instruction line.
///
/// Recognized shapes, tried in this order: `if <cond> then <action>`,
/// `call_method` (multi-target, temp binding, single target), `clear`,
/// `set` and `emit`.
pub(crate) fn parse(line: &str) -> Result<Instruction, ParseError> {
    parse_nested(line, 0)
}

fn parse_nested(line: &str, depth: usize) -> Result<Instruction, ParseError> {
    let line = line.trim();
    if let Some(rest) = strip_keyword(line, "if") {
        return conditional(rest, depth + 1);
    }
    if let Some(rest) = strip_keyword(line, "call_method") {
        return call_method(rest);
    }
    if let Some(rest) = strip_keyword(line, "clear") {
        return clear(rest);
    }
    if let Some(rest) = strip_keyword(line, "set") {
        return set(rest);
    }
    if let Some(rest) = strip_keyword(line, "emit") {
        return emit(rest);
    }
    Err(ParseError::new(format!("unrecognized instruction `{line}`")))
}

fn strip_keyword<'a>(line: &'a str, word: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(word)?;
    rest.starts_with(char::is_whitespace).then(|| rest.trim_start())
}

/// A field path such as `app.region.options`.
fn is_path(s: &str) -> bool {
    !s.is_empty()
        && !s.starts_with('.')
        && !s.ends_with('.')
        && !s.contains("..")
        && !s.contains(|c: char| c.is_whitespace() || "=()[]{}'\",:".contains(c))
}

fn is_identifier(s: &str) -> bool {
    s.chars().next().is_some_and(|c| c.is_alphabetic() || c == '_') && s.chars().all(is_ident_char)
}

fn conditional(rest: &str, depth: usize) -> Result<Instruction, ParseError> {
    if depth > MAX_NESTING {
        return Err(ParseError::new("conditional actions nested too deeply"));
    }
    let at = find_keyword(rest, "then")
        .ok_or_else(|| ParseError::new(format!("`if {rest}` has no `then` clause")))?;
    let condition = rest[..at].trim();
    let action = rest[at + "then".len()..].trim();
    if condition.is_empty() {
        return Err(ParseError::new("conditional action without a condition"));
    }
    if action.is_empty() {
        return Err(ParseError::new("conditional action without an action"));
    }
    Ok(Instruction::Conditional {
        condition: Expression::parse(condition),
        action: Box::new(parse_nested(action, depth)?),
    })
}

fn set(rest: &str) -> Result<Instruction, ParseError> {
    let at = find_assign(rest)
        .ok_or_else(|| ParseError::new(format!("`set {rest}` has no `=`")))?;
    let path = rest[..at].trim();
    let source = rest[at + 1..].trim();
    if !is_path(path) {
        return Err(ParseError::new(format!("invalid set target `{path}`")));
    }
    if source.is_empty() {
        return Err(ParseError::new(format!("`set {path}` has no expression")));
    }
    Ok(Instruction::Set {
        target: Target::from_path(path),
        expression: Expression::parse(source),
    })
}

fn clear(rest: &str) -> Result<Instruction, ParseError> {
    let path = rest.trim();
    let prop = path
        .rsplit_once('.')
        .and_then(|(field, prop)| (!field.is_empty()).then_some(prop))
        .and_then(Prop::from_name);
    match prop {
        Some(Prop::Value | Prop::Options) if is_path(path) => Ok(Instruction::Clear {
            target: Target::from_path(path),
        }),
        _ => Err(ParseError::new(format!(
            "clear expects `<field>.value` or `<field>.options`, found `{path}`"
        ))),
    }
}

fn method_name<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    terminated(
        take_while(1.., |c: char| is_ident_char(c) || c == '.'),
        take_while(0.., char::is_whitespace),
    )
    .parse_next(input)
}

fn call_method(rest: &str) -> Result<Instruction, ParseError> {
    let mut cursor = rest;
    let method = method_name
        .parse_next(&mut cursor)
        .map_err(|_| ParseError::new(format!("missing method name in `call_method {rest}`")))?;
    if !cursor.starts_with('(') {
        return Err(ParseError::new(format!("method `{method}` has no argument list")));
    }
    let close = matching_close(cursor, 0)
        .ok_or_else(|| ParseError::new(format!("unclosed argument list for `{method}`")))?;
    let call = MethodCall {
        method: method.to_owned(),
        params: params(&cursor[1..close]),
    };

    let after = &cursor[close + 1..];
    let arrow = find_top_level(after, "->")
        .ok_or_else(|| ParseError::new(format!("call_method `{method}` has no `->` target")))?;
    let inline = after[..arrow].trim();
    let target = after[arrow + 2..].trim();

    let result_path = match inline.strip_prefix('.') {
        _ if inline.is_empty() => Vec::new(),
        Some(path) if path.split('.').all(|s| !s.is_empty() && s.chars().all(is_ident_char)) => {
            path.split('.').map(str::to_owned).collect()
        }
        _ => {
            return Err(ParseError::new(format!(
                "invalid result path `{inline}` for `{method}`"
            )))
        }
    };

    if let Some(body) = target.strip_prefix('{') {
        let body = body
            .strip_suffix('}')
            .ok_or_else(|| ParseError::new(format!("unclosed target map for `{method}`")))?;
        if !result_path.is_empty() {
            return Err(ParseError::new(format!(
                "`{method}` combines a result path with a target map"
            )));
        }
        return Ok(Instruction::CallMethodMulti {
            call,
            mappings: mappings(body),
        });
    }

    if !target.contains('.') {
        if !is_identifier(target) {
            return Err(ParseError::new(format!("invalid temp variable `{target}`")));
        }
        if !result_path.is_empty() {
            return Err(ParseError::new(format!(
                "temp variable `{target}` cannot take a result path"
            )));
        }
        return Ok(Instruction::CallMethodToTemp {
            call,
            temp_var: target.to_owned(),
        });
    }

    if !is_path(target) {
        return Err(ParseError::new(format!("invalid call_method target `{target}`")));
    }
    Ok(Instruction::CallMethod {
        call,
        result_path,
        target: Target::from_path(target),
    })
}

fn mappings(body: &str) -> Vec<Mapping> {
    let mut mappings = Vec::new();
    for entry in split_top_level(body, ',') {
        let Some(colon) = find_top_level(entry, ":") else {
            tracing::warn!(mapping = entry, "target mapping has no `:`; dropped");
            continue;
        };
        let field = unquote(entry[..colon].trim());
        let path = unquote(entry[colon + 1..].trim());
        if !field.contains('.') || !is_path(field) {
            tracing::warn!(mapping = entry, "target mapping needs `<field>.<prop>` on the left; dropped");
            continue;
        }
        mappings.push(Mapping {
            target: Target::from_path(field),
            path: path
                .split('.')
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect(),
        });
    }
    mappings
}

/// Parameter list of a method call. A top-level `name=value` item anywhere
/// switches the whole list to named mode.
fn params(src: &str) -> Params {
    let items = split_top_level(src, ',');
    if !items.iter().any(|item| find_assign(item).is_some()) {
        return Params::Positional(
            items
                .into_iter()
                .filter(|item| !item.is_empty())
                .map(param)
                .collect(),
        );
    }

    let mut named = Vec::new();
    for item in items {
        match find_assign(item) {
            Some(at) if is_identifier(item[..at].trim()) => {
                named.push((item[..at].trim().to_owned(), param(item[at + 1..].trim())));
            }
            _ => tracing::warn!(param = item, "positional argument in a named parameter list; dropped"),
        }
    }
    Params::Named(named)
}

fn param(src: &str) -> Param {
    match super::expr::parse(src).ok().as_ref().and_then(constant) {
        Some(value) => Param::Literal(value),
        None => Param::Reference(src.to_owned()),
    }
}

/// Fold a constant expression (literals, containers, signs) into a value.
fn constant(expr: &Expr) -> Option<Value> {
    match expr {
        Expr::Literal(value) => Some(value.clone()),
        Expr::Unary(UnaryOp::Pos, inner) => constant(inner).filter(Value::is_number),
        Expr::Unary(UnaryOp::Neg, inner) => match constant(inner)? {
            Value::Number(n) => match n.as_i64() {
                Some(i) => i.checked_neg().map(Value::from),
                None => n.as_f64().map(|f| Value::from(-f)),
            },
            _ => None,
        },
        Expr::List(items) => items.iter().map(constant).collect::<Option<Vec<_>>>().map(Value::Array),
        Expr::Object(entries) => entries
            .iter()
            .map(|(k, v)| match constant(k)? {
                Value::String(key) => Some((key, constant(v)?)),
                _ => None,
            })
            .collect::<Option<Map<String, Value>>>()
            .map(Value::Object),
        _ => None,
    }
}

fn emit_call(input: &mut &str) -> ModalResult<(String, String)> {
    let event = take_while(1.., |c: char| is_ident_char(c) || c == '.').parse_next(input)?;
    (take_while(0.., char::is_whitespace), '(', take_while(0.., char::is_whitespace))
        .parse_next(input)?;
    let payload = string_literal.parse_next(input)?;
    (take_while(0.., char::is_whitespace), ')').parse_next(input)?;
    Ok((event.to_owned(), payload))
}

fn emit(rest: &str) -> Result<Instruction, ParseError> {
    let (event, payload) = emit_call
        .parse(rest.trim())
        .map_err(|_| ParseError::new(format!("emit expects `<event>('<payload>')`, found `{rest}`")))?;
    Ok(Instruction::Emit { event, payload })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn set_with_and_without_prop() {
        let Instruction::Set { target, expression } = parse("set app.name = \"east-app\"").unwrap() else {
            panic!("expected set");
        };
        assert_eq!(target, Target::new("app.name", Prop::Value));
        assert_eq!(expression.source(), "\"east-app\"");

        let Instruction::Set { target, .. } = parse("set region.visible = x == 1").unwrap() else {
            panic!("expected set");
        };
        assert_eq!(target, Target::new("region", Prop::Visible));
    }

    #[test]
    fn set_keeps_unparseable_expression() {
        let Instruction::Set { expression, .. } = parse("set a.value = 1 +").unwrap() else {
            panic!("expected set");
        };
        assert!(expression.ast().is_err());
    }

    #[test]
    fn clear_only_value_or_options() {
        assert!(matches!(
            parse("clear profile.options").unwrap(),
            Instruction::Clear { target } if target == Target::new("profile", Prop::Options)
        ));
        assert!(parse("clear profile.visible").is_err());
        assert!(parse("clear profile").is_err());
    }

    #[test]
    fn call_method_single_target_with_inline_path() {
        let Instruction::CallMethod { call, result_path, target } =
            parse("call_method get_regions(app.env, 'prod').data.items -> region.options").unwrap()
        else {
            panic!("expected call_method");
        };
        assert_eq!(call.method, "get_regions");
        assert_eq!(
            call.params,
            Params::Positional(vec![
                Param::Reference("app.env".into()),
                Param::Literal(json!("prod")),
            ])
        );
        assert_eq!(result_path, vec!["data".to_owned(), "items".to_owned()]);
        assert_eq!(target, Target::new("region", Prop::Options));
    }

    #[test]
    fn call_method_to_temp() {
        let Instruction::CallMethodToTemp { call, temp_var } =
            parse("call_method lookup(region) -> temp_result").unwrap()
        else {
            panic!("expected temp binding");
        };
        assert_eq!(call.method, "lookup");
        assert_eq!(temp_var, "temp_result");
        assert!(parse("call_method lookup(region).data -> temp_result").is_err());
    }

    #[test]
    fn call_method_multi_mappings() {
        let Instruction::CallMethodMulti { mappings, .. } = parse(
            "call_method describe(id=plan.id, limit=10) -> {service.options: data.services, owner: data.owner, app.name.value: data.name}",
        )
        .unwrap() else {
            panic!("expected multi");
        };
        assert_eq!(
            mappings,
            vec![
                Mapping {
                    target: Target::new("service", Prop::Options),
                    path: vec!["data".into(), "services".into()],
                },
                Mapping {
                    target: Target::new("app.name", Prop::Value),
                    path: vec!["data".into(), "name".into()],
                },
            ]
        );
    }

    #[test]
    fn named_params() {
        assert_eq!(
            params("releasePlanId=plan.id, region='cn-hangzhou', flags=[1, -2]"),
            Params::Named(vec![
                ("releasePlanId".into(), Param::Reference("plan.id".into())),
                ("region".into(), Param::Literal(json!("cn-hangzhou"))),
                ("flags".into(), Param::Literal(json!([1, -2]))),
            ])
        );
        assert_eq!(
            params("a == b, 3"),
            Params::Positional(vec![Param::Reference("a == b".into()), Param::Literal(json!(3))])
        );
        assert_eq!(params(""), Params::Positional(Vec::new()));
    }

    #[test]
    fn conditional_splits_at_first_then() {
        let Instruction::Conditional { condition, action } =
            parse("if temp_result.code == 200 then set status.value = temp_result.data").unwrap()
        else {
            panic!("expected conditional");
        };
        assert_eq!(condition.source(), "temp_result.code == 200");
        assert_eq!(action.kind(), "set");

        let Instruction::Conditional { condition, .. } =
            parse("if label == 'then' then clear a.value").unwrap()
        else {
            panic!("expected conditional");
        };
        assert_eq!(condition.source(), "label == 'then'");
    }

    #[test]
    fn conditional_with_bad_action_fails() {
        assert!(parse("if x then frobnicate").is_err());
        assert!(parse("if x").is_err());
    }

    #[test]
    fn nested_conditionals_are_bounded() {
        let nested = |n: usize| format!("{}set a = 1", "if x then ".repeat(n));
        assert_eq!(parse(&nested(MAX_NESTING)).unwrap().kind(), "conditional_action");
        let err = parse(&nested(50_000)).unwrap_err();
        assert!(err.message().contains("nested too deeply"), "{err}");
    }

    #[test]
    fn emit_event() {
        let Instruction::Emit { event, payload } =
            parse("emit agent.request_user_input('app.region')").unwrap()
        else {
            panic!("expected emit");
        };
        assert_eq!(event, "agent.request_user_input");
        assert_eq!(payload, "app.region");
        assert!(parse("emit agent.request_user_input(app.region)").is_err());
    }

    #[test]
    fn unknown_lines() {
        for line in ["", "print x", "setx = 1", "set = 1", "call_method -> x", "call_method f(x)"] {
            assert!(parse(line).is_err(), "{line}");
        }
    }
}
