use formrule::parse::{parse_expression, parse_instruction};
use formrule::{
    evaluate, CompareOp, EvalError, Expr, Expression, FormEngine, Instruction, Param, Params, Prop,
    Scope, Target, TempVars,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

fn engine() -> FormEngine {
    FormEngine::from_value(json!([
        {"key": "region", "name": "Region", "type": "select", "value": "cn-hangzhou"},
        {"key": "app.name", "name": "App", "type": "text", "value": "web"},
        {"key": "app.replicas", "name": "Replicas", "type": "number", "value": 3},
        {"key": "tags", "name": "Tags", "type": "multi", "value": ["a", "b"], "visible": false}
    ]))
    .unwrap()
}

fn eval_in(engine: &FormEngine, source: &str) -> Result<Value, EvalError> {
    let temps = TempVars::new();
    evaluate(&Expression::parse(source), &Scope::new(engine.store(), &temps))
}

#[test]
fn expression_ast_shape() {
    let expr = parse_expression("region == \"cn-hangzhou\"").unwrap();
    assert_eq!(
        expr,
        Expr::Compare {
            left: Box::new(Expr::Name("region".into())),
            op: CompareOp::Eq,
            right: Box::new(Expr::Literal(json!("cn-hangzhou"))),
        }
    );
}

#[test]
fn expressions_against_live_fields() {
    let engine = engine();
    assert_eq!(eval_in(&engine, "region == 'cn-hangzhou'").unwrap(), json!(true));
    assert_eq!(eval_in(&engine, "app.replicas * 2").unwrap(), json!(6));
    assert_eq!(eval_in(&engine, "values['app.name']").unwrap(), json!("web"));
    assert_eq!(eval_in(&engine, "f.tags.visible").unwrap(), json!(false));
    assert_eq!(eval_in(&engine, "len(tags) > 1 and 'a' in tags").unwrap(), json!(true));
    assert_eq!(eval_in(&engine, "f'{app.name}:{app.replicas}'").unwrap(), json!("web:3"));
    assert_eq!(eval_in(&engine, "'big' if app.replicas > 2 else 'small'").unwrap(), json!("big"));
}

#[test]
fn sandbox_rejects_unlisted_functions() {
    for source in ["open('x')", "__import__('os')", "eval('1')", "exec('1')"] {
        assert!(parse_expression(source).is_err(), "{source}");
    }
    let engine = engine();
    assert!(matches!(eval_in(&engine, "open('x')"), Err(EvalError::Parse(_))));
}

#[test]
fn undefined_names_fail() {
    let engine = engine();
    assert_eq!(
        eval_in(&engine, "nowhere").unwrap_err().to_string(),
        "name 'nowhere' is not defined"
    );
}

#[test]
fn set_instruction_targets() {
    let Instruction::Set { target, expression } = parse_instruction("set app.name.visible = false").unwrap() else {
        panic!("expected set");
    };
    assert_eq!(target, Target::new("app.name", Prop::Visible));
    assert_eq!(expression.source(), "false");

    // last segment is not a property: whole path is the key
    let Instruction::Set { target, .. } = parse_instruction("set app.name = 'x'").unwrap() else {
        panic!("expected set");
    };
    assert_eq!(target, Target::new("app.name", Prop::Value));
}

#[test]
fn call_method_forms() {
    let Instruction::CallMethod { call, result_path, target } =
        parse_instruction("call_method regions(app.name, 5) -> region.options").unwrap()
    else {
        panic!("expected call_method");
    };
    assert_eq!(call.method, "regions");
    assert_eq!(
        call.params,
        Params::Positional(vec![Param::Reference("app.name".into()), Param::Literal(json!(5))])
    );
    assert!(result_path.is_empty());
    assert_eq!(target, Target::new("region", Prop::Options));

    assert_eq!(
        parse_instruction("call_method lookup(region) -> temp_result").unwrap().kind(),
        "call_method_to_temp"
    );
    assert_eq!(
        parse_instruction("call_method lookup() -> {region.options: data.items}").unwrap().kind(),
        "call_method_multi"
    );
}

#[test]
fn conditional_wraps_any_instruction() {
    let Instruction::Conditional { condition, action } =
        parse_instruction("if region != null then clear app.name.value").unwrap()
    else {
        panic!("expected conditional");
    };
    assert_eq!(condition.source(), "region != null");
    assert!(matches!(*action, Instruction::Clear { ref target } if *target == Target::new("app.name", Prop::Value)));
}

#[test]
fn malformed_lines_are_errors() {
    for line in [
        "set = 1",
        "set a",
        "clear a.visible",
        "call_method f(x)",
        "emit agent.request_user_input(x)",
        "if a then",
        "print a",
    ] {
        assert!(parse_instruction(line).is_err(), "{line}");
    }
}
