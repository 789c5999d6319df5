use formrule::{Args, FieldOption, FormEngine, FormError, Schema, SUBMIT_NOT_READY};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

fn engine(schema: Value) -> FormEngine {
    FormEngine::from_value(schema).unwrap()
}

#[test]
fn region_drives_app_name() {
    let mut engine = engine(json!([
        {"key": "region", "name": "Region", "type": "select", "value": "cn-hangzhou"},
        {"key": "app.name", "name": "App name", "type": "text", "dependencies": ["region"],
         "rules": [{"if": "region == \"cn-hangzhou\"", "then": ["set app.name = \"east-app\""]}]}
    ]));

    let report = engine.on_field_change("region", json!("cn-hangzhou")).unwrap();

    assert_eq!(report.updated_fields, vec!["app.name"]);
    assert_eq!(report.updated_field_values["app.name"], json!("east-app"));
    assert_eq!(engine.value("app.name"), Some(&json!("east-app")));
    assert_eq!(engine.values_tree()["app"]["name"], json!("east-app"));
}

#[test]
fn chain_runs_breadth_first_and_transitively() {
    // c depends on b, b depends on a; c never names a
    let mut engine = engine(json!([
        {"key": "a", "name": "A", "type": "text"},
        {"key": "c", "name": "C", "type": "text", "dependencies": ["b"],
         "rules": [{"if": "b != null", "then": ["set c = b + '-c'"]}]},
        {"key": "b", "name": "B", "type": "text", "dependencies": ["a"],
         "rules": [{"if": "a != null", "then": ["set b = a + '-b'"]}]}
    ]));

    let report = engine.on_field_change("a", json!("x")).unwrap();

    assert_eq!(report.updated_fields, vec!["b", "c"]);
    assert_eq!(engine.value("c"), Some(&json!("x-b-c")));
}

#[test]
fn multi_target_options_from_nested_path() {
    let mut engine = FormEngine::builder()
        .method("list_services", |_: &Args| Ok(json!({"data": {"services": [1, 2, 3]}})))
        .build(
            Schema::from_value(json!([
                {"key": "trigger", "name": "Trigger", "type": "text"},
                {"key": "service", "name": "Service", "type": "select", "dependencies": ["trigger"],
                 "rules": [{"then": ["call_method list_services() -> {service.options: data.services}"]}]}
            ]))
            .unwrap(),
        )
        .unwrap();

    engine.on_field_change("trigger", json!(true)).unwrap();

    assert_eq!(
        engine.field("service").unwrap().options().unwrap(),
        &[FieldOption::new("1", 1), FieldOption::new("2", 2), FieldOption::new("3", 3)]
    );
}

#[test]
fn unregistered_temp_method_leaves_target_untouched() {
    let mut engine = engine(json!([
        {"key": "region", "name": "Region", "type": "text"},
        {"key": "status", "name": "Status", "type": "text", "value": "unknown",
         "dependencies": ["region"],
         "rules": [{"then": [
             "call_method lookup(region) -> temp_result",
             "if temp_result.code == 200 then set status.value = temp_result.data"
         ]}]}
    ]));

    let report = engine.on_field_change("region", json!("cn")).unwrap();

    let status = engine.field("status").unwrap();
    assert_eq!(status.value(), &json!("unknown"));
    assert_eq!(status.errors(), "");
    assert!(report.updated_fields.is_empty());
}

#[test]
fn temp_result_feeds_later_instruction() {
    let mut engine = FormEngine::builder()
        .method("lookup", |args: &Args| {
            Ok(json!({"code": 200, "data": format!("ok:{}", args.first().and_then(Value::as_str).unwrap_or("?"))}))
        })
        .build(
            Schema::from_value(json!([
                {"key": "region", "name": "Region", "type": "text"},
                {"key": "status", "name": "Status", "type": "text", "dependencies": ["region"],
                 "rules": [{"then": [
                     "call_method lookup(region) -> temp_result",
                     "if temp_result.code == 200 then set status.value = temp_result.data"
                 ]}]}
            ]))
            .unwrap(),
        )
        .unwrap();

    engine.on_field_change("region", json!("cn")).unwrap();
    assert_eq!(engine.value("status"), Some(&json!("ok:cn")));
}

#[test]
fn clear_options_keeps_value() {
    let mut engine = engine(json!([
        {"key": "toggle", "name": "Toggle", "type": "checkbox"},
        {"key": "profile", "name": "Profile", "type": "select", "value": "p1",
         "options": ["p1", "p2"], "dependencies": ["toggle"],
         "rules": [{"if": "toggle", "then": ["clear profile.options"]}]}
    ]));

    engine.on_field_change("toggle", json!(true)).unwrap();

    let profile = engine.field("profile").unwrap();
    assert_eq!(profile.options(), None);
    assert_eq!(profile.value(), &json!("p1"));
}

#[test]
fn submit_requires_both_dependencies() {
    let mut engine = engine(json!({
        "fields": [
            {"key": "name", "name": "Name", "type": "text"},
            {"key": "age", "name": "Age", "type": "number"}
        ],
        "submit": {"key": "can_submit", "dependencies": ["name", "age"],
                   "rules": [{"if": "name != null and age != null",
                              "then": ["set can_submit.value = true"]}]}
    }));

    let report = engine.check_submit("can_submit").unwrap();
    assert!(!report.can_submit);
    assert_eq!(report.errors, SUBMIT_NOT_READY);

    engine.on_field_change("name", json!("Ann")).unwrap();
    let report = engine.check_submit("can_submit").unwrap();
    assert!(!report.can_submit);
    assert_eq!(report.errors, SUBMIT_NOT_READY);

    engine.on_field_change("age", json!(30)).unwrap();
    let report = engine.check_submit("can_submit").unwrap();
    assert!(report.can_submit);
    assert_eq!(report.errors, "");
    assert_eq!(report.submit_key, "can_submit");
}

#[test]
fn submit_report_for_missing_field() {
    let mut engine = engine(json!([{"key": "a", "name": "A", "type": "text"}]));
    let err = engine.check_submit("can_submit").unwrap_err();
    assert_eq!(err.report()["can_submit"], json!(false));
    assert_eq!(err.report()["submit_key"], json!("can_submit"));
}

#[test]
fn validation_flags_only_visible_required_blanks() {
    let engine = engine(json!([
        {"key": "empty_string", "name": "S", "type": "text", "value": ""},
        {"key": "empty_list", "name": "L", "type": "multi", "value": []},
        {"key": "zero", "name": "Z", "type": "number", "value": 0},
        {"key": "false_flag", "name": "F", "type": "checkbox", "value": false},
        {"key": "hidden", "name": "H", "type": "text", "visible": false},
        {"key": "optional", "name": "O", "type": "text", "required": false},
        {"key": "null_value", "name": "N", "type": "text"}
    ]));

    let report = engine.validate();

    assert!(!report.valid);
    assert_eq!(report.invalid_fields, vec!["empty_string", "empty_list", "null_value"]);
    assert_eq!(report.errors["null_value"], "N is required");
}

#[test]
fn agent_projection_ignores_visibility() {
    let engine = engine(json!([
        {"key": "shown", "name": "Shown", "type": "text", "options": ["a"]},
        {"key": "hidden", "name": "Hidden", "type": "text", "visible": false, "description": "secret"}
    ]));

    let agent = serde_json::to_value(engine.get_fields_for_agent()).unwrap();

    assert_eq!(
        agent,
        json!([
            {"key": "shown", "name": "Shown", "value": null, "type": "text", "errors": "",
             "required": true, "description": "", "options": [{"label": "a", "value": "a"}]},
            {"key": "hidden", "name": "Hidden", "value": null, "type": "text", "errors": "",
             "required": true, "description": "secret"}
        ])
    );
    assert_eq!(engine.get_all_visible_fields().len(), 1);
}

#[test]
fn repeated_change_is_idempotent() {
    let mut engine = engine(json!([
        {"key": "qty", "name": "Qty", "type": "number"},
        {"key": "total", "name": "Total", "type": "number", "dependencies": ["qty"],
         "rules": [{"if": "qty > 10", "then": ["set total = qty * 2", "set total.required = false"],
                    "else": ["set total = qty", "set total.required = true"]}]}
    ]));

    engine.on_field_change("qty", json!(12)).unwrap();
    let first = serde_json::to_value(engine.get_fields_for_agent()).unwrap();
    engine.on_field_change("qty", json!(12)).unwrap();
    let second = serde_json::to_value(engine.get_fields_for_agent()).unwrap();

    assert_eq!(first, second);
    assert_eq!(engine.value("total"), Some(&json!(24)));
}

#[test]
fn init_runs_once_per_rule_unconditionally() {
    let mut engine = FormEngine::builder()
        .method("regions", |_: &Args| Ok(json!(["cn", "us"])))
        .build(
            Schema::from_value(json!([
                {"key": "region", "name": "Region", "type": "select",
                 "rules": [{"if": "false", "then": ["set region = 'never'"],
                            "init": ["call_method regions() -> region.options", "set region = 'cn'"]}]}
            ]))
            .unwrap(),
        )
        .unwrap();

    let report = engine.init();

    assert_eq!(report.updated_fields, vec!["region"]);
    assert_eq!(report.updated_field_values["region"], json!("cn"));
    assert_eq!(engine.field("region").unwrap().options().map(<[FieldOption]>::len), Some(2));
    assert!(report.validation.valid);
}

#[test]
fn unknown_field_change_is_reported() {
    let mut engine = engine(json!([{"key": "a", "name": "A", "type": "text"}]));
    let err = engine.on_field_change("b", json!(1)).unwrap_err();
    assert!(matches!(err, FormError::UnknownField { ref key } if key == "b"));
    assert_eq!(err.report(), json!({"error": "field not found: b"}));
}

#[test]
fn user_input_requests_are_returned() {
    let mut engine = engine(json!([
        {"key": "a", "name": "A", "type": "text"},
        {"key": "b", "name": "B", "type": "text", "dependencies": ["a"],
         "rules": [{"if": "a == 'ask'", "then": ["emit agent.request_user_input('b')"]}]}
    ]));

    let report = engine.on_field_change("a", json!("ask")).unwrap();
    assert_eq!(report.requests_user_input, vec!["b"]);

    let wire = serde_json::to_value(&report).unwrap();
    assert_eq!(wire["requests_user_input"], json!(["b"]));
    assert!(wire.get("get_fields_for_agent").is_some());
    assert!(wire.get("validate").is_some());
}

#[test]
fn method_backed_form_reports_changes() {
    let schema = Schema::from_value(json!([
        {"key": "region", "name": "Region", "type": "select", "required": true},
        {"key": "zone", "name": "Zone", "type": "select", "required": true,
         "dependencies": ["region"],
         "rules": [{"if": "region != null",
                    "then": ["call_method zones(region) -> {zone.options: data.zones}",
                             "clear zone.value"],
                    "else": ["clear zone.options"]}]},
        {"key": "app.name", "name": "App name", "type": "text", "dependencies": ["region"],
         "rules": [{"if": "region.startswith('cn')", "then": ["set app.name = f'{region}-app'"]}]}
    ]))
    .unwrap();
    let mut engine = FormEngine::builder()
        .method("zones", |args: &Args| {
            let region = args.first().and_then(Value::as_str).unwrap_or_default();
            Ok(json!({"data": {"zones": [format!("{region}-a"), format!("{region}-b")]}}))
        })
        .build(schema)
        .unwrap();

    let report = engine.on_field_change("region", json!("cn-hangzhou")).unwrap();
    assert_eq!(report.updated_fields, vec!["zone", "app.name"]);
    assert_eq!(engine.field("zone").unwrap().options().map(<[_]>::len), Some(2));

    let wire = serde_json::to_value(&report).unwrap();
    assert_eq!(wire["updated_field_values"]["app.name"], json!("cn-hangzhou-app"));
    assert_eq!(wire["validate"]["invalid_fields"], json!(["zone"]));
    assert!(wire.get("requests_user_input").is_none());
    assert!(serde_json::to_string_pretty(&report).unwrap().contains("\"get_fields_for_agent\""));
}

#[test]
fn cyclic_schema_is_rejected() {
    let err = FormEngine::from_value(json!([
        {"key": "a", "name": "A", "type": "text", "dependencies": ["b"]},
        {"key": "b", "name": "B", "type": "text", "dependencies": ["a"]}
    ]))
    .unwrap_err();
    assert_eq!(err.to_string(), "cyclic dependency detected: a -> b -> a");
}
