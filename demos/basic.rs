use formrule::{Args, FormEngine, LogLevel, MethodError, Schema};
use serde_json::{json, Value};

fn main() {
    // Declare the form
    let schema = Schema::from_value(json!([
        {"key": "region", "name": "Region", "type": "select", "required": true,
         "options": ["cn-hangzhou", "us-west-1"]},
        {"key": "zone", "name": "Zone", "type": "select", "required": true,
         "dependencies": ["region"],
         "rules": [
             {"if": "region != null",
              "then": ["call_method zones(region) -> {zone.options: data.zones}",
                       "clear zone.value"],
              "else": ["clear zone.options"]}
         ]},
        {"key": "app.name", "name": "App name", "type": "text",
         "dependencies": ["region"],
         "rules": [
             {"if": "region.startswith('cn')", "then": ["set app.name = f'{region}-app'"]}
         ]}
    ]))
    .expect("failed to read schema");

    // Register the host methods the rules call
    let mut engine = FormEngine::builder()
        .method("zones", |args: &Args| -> Result<Value, MethodError> {
            let region = args.first().and_then(Value::as_str).unwrap_or_default();
            Ok(json!({"data": {"zones": [format!("{region}-a"), format!("{region}-b")]}}))
        })
        .log_level(LogLevel::Warn)
        .build(schema)
        .expect("failed to build engine");

    // Change a field and show what the rules did
    let report = engine
        .on_field_change("region", json!("cn-hangzhou"))
        .expect("region is a known field");
    println!(
        "{}",
        serde_json::to_string_pretty(&report).expect("reports serialize")
    );

    let validation = engine.validate();
    println!("valid: {}, missing: {:?}", validation.valid, validation.invalid_fields);
}
