use proptest::prelude::*;
use serde_json::{json, Value};

// --- Generated schema shape ---
// keys f0..f{n-1}; a field may only depend on fields declared before it, so
// every generated graph is acyclic. A field with dependencies copies its
// first dependency's value when that value is non-null.

const WORDS: &[&str] = &["cn-hangzhou", "us-west", "eu", "prod", "x"];

#[derive(Debug, Clone)]
pub struct GenField {
    pub key: String,
    pub dependencies: Vec<usize>,
    pub value: Value,
    pub visible: bool,
    pub required: bool,
}

#[derive(Debug, Clone)]
pub struct GenSchema {
    pub fields: Vec<GenField>,
}

impl GenSchema {
    pub fn to_json(&self) -> Value {
        let fields: Vec<Value> = self
            .fields
            .iter()
            .map(|f| {
                let deps: Vec<&str> = f.dependencies.iter().map(|&d| self.fields[d].key.as_str()).collect();
                let rules = match deps.first() {
                    Some(first) => json!([{
                        "if": format!("{first} != null"),
                        "then": [format!("set {} = {first}", f.key)],
                    }]),
                    None => json!([]),
                };
                json!({
                    "key": f.key,
                    "name": f.key.to_uppercase(),
                    "type": "text",
                    "value": f.value,
                    "visible": f.visible,
                    "required": f.required,
                    "dependencies": deps,
                    "rules": rules,
                })
            })
            .collect();
        Value::Array(fields)
    }

    /// Every field reachable from `start` through reverse dependency edges,
    /// excluding `start` itself.
    pub fn dependents_closure(&self, start: usize) -> Vec<usize> {
        let mut reached = vec![false; self.fields.len()];
        reached[start] = true;
        let mut changed = true;
        while changed {
            changed = false;
            for (i, field) in self.fields.iter().enumerate() {
                if !reached[i] && field.dependencies.iter().any(|&d| reached[d]) {
                    reached[i] = true;
                    changed = true;
                }
            }
        }
        reached[start] = false;
        (0..self.fields.len()).filter(|&i| reached[i]).collect()
    }
}

/// A field value drawn from the shapes that matter for emptiness checks.
pub fn arb_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        Just(json!("")),
        Just(json!([])),
        Just(json!(0)),
        Just(json!(false)),
        (-50_i64..50).prop_map(Value::from),
        prop::sample::select(WORDS).prop_map(Value::from),
        prop::collection::vec(prop::sample::select(WORDS), 1..3)
            .prop_map(|words| json!(words)),
    ]
}

/// Generate an acyclic schema of 1 to 8 fields.
pub fn arb_schema() -> impl Strategy<Value = GenSchema> {
    (1_usize..=8)
        .prop_flat_map(|n| {
            (
                prop::collection::vec(any::<bool>(), n * n),
                prop::collection::vec(arb_value(), n),
                prop::collection::vec(any::<bool>(), n),
                prop::collection::vec(any::<bool>(), n),
            )
        })
        .prop_map(|(edges, values, visible, required)| {
            let n = values.len();
            let fields = values
                .into_iter()
                .enumerate()
                .map(|(i, value)| GenField {
                    key: format!("f{i}"),
                    dependencies: (0..i).filter(|&j| edges[i * n + j]).collect(),
                    value,
                    visible: visible[i],
                    required: required[i],
                })
                .collect();
            GenSchema { fields }
        })
}

/// A schema paired with the index of one of its fields.
pub fn arb_schema_and_field() -> impl Strategy<Value = (GenSchema, usize)> {
    arb_schema().prop_flat_map(|schema| {
        let n = schema.fields.len();
        (Just(schema), 0..n)
    })
}
