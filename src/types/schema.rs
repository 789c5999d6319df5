use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use super::error::SchemaError;

fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn yes() -> bool {
    true
}

/// An `if`/`then` pair inside a rule's `elif` list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BranchDef {
    #[serde(rename = "if", default)]
    pub condition: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub then: Vec<String>,
}

/// Rule definition as it appears in a schema:
/// `{if, then, elif: [{if, then}], else, init}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuleDef {
    #[serde(rename = "if", default)]
    pub condition: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub then: Vec<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub elif: Vec<BranchDef>,
    #[serde(rename = "else", default)]
    pub otherwise: Option<Vec<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub init: Vec<String>,
}

/// Field definition as it appears in a schema.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldDef {
    pub key: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data_source: Option<String>,
    #[serde(default)]
    pub options: Option<Value>,
    #[serde(default)]
    pub value: Value,
    #[serde(default, deserialize_with = "nullable")]
    pub dependencies: Vec<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub rules: Vec<RuleDef>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: String,
    #[serde(default = "yes")]
    pub visible: bool,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default = "yes")]
    pub required: bool,
    #[serde(default, deserialize_with = "nullable")]
    pub errors: String,
    #[serde(default = "yes")]
    pub render: bool,
}

/// An ordered list of field definitions, ready to compile into an engine.
///
/// Accepts either a bare list of fields or a record
/// `{"fields": [...], "submit": {...}}`. The submit definition is appended
/// as a hidden, non-rendered field; its `name` defaults to its `key` and its
/// `type` to `"hidden"`.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    pub fields: Vec<FieldDef>,
}

impl Schema {
    /// Interpret a JSON document as a schema.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] if the document is neither a list nor a
    /// record, or if a field definition is malformed.
    pub fn from_value(value: Value) -> Result<Self, SchemaError> {
        match value {
            Value::Array(items) => Ok(Self {
                fields: field_defs(items)?,
            }),
            Value::Object(mut record) => {
                let mut fields = match record.remove("fields") {
                    None | Some(Value::Null) => Vec::new(),
                    Some(Value::Array(items)) => field_defs(items)?,
                    Some(other) => {
                        return Err(SchemaError::InvalidShape {
                            message: format!("`fields` must be a list, found {other}"),
                        })
                    }
                };
                match record.remove("submit") {
                    None | Some(Value::Null) => {}
                    Some(Value::Object(submit)) if submit.is_empty() => {}
                    Some(Value::Object(submit)) => {
                        let index = fields.len();
                        fields.push(field_def(index, Value::Object(with_submit_defaults(submit)))?);
                    }
                    Some(other) => {
                        return Err(SchemaError::InvalidShape {
                            message: format!("`submit` must be a record, found {other}"),
                        })
                    }
                }
                Ok(Self { fields })
            }
            other => Err(SchemaError::InvalidShape {
                message: format!("expected a list of fields or a record, found {other}"),
            }),
        }
    }
}

impl From<Vec<FieldDef>> for Schema {
    fn from(fields: Vec<FieldDef>) -> Self {
        Self { fields }
    }
}

fn field_defs(items: Vec<Value>) -> Result<Vec<FieldDef>, SchemaError> {
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| field_def(index, item))
        .collect()
}

fn field_def(index: usize, item: Value) -> Result<FieldDef, SchemaError> {
    serde_json::from_value(item).map_err(|e| SchemaError::InvalidField {
        index,
        message: e.to_string(),
    })
}

fn with_submit_defaults(mut submit: Map<String, Value>) -> Map<String, Value> {
    if !submit.contains_key("name") {
        let name = match submit.get("key") {
            Some(Value::String(key)) => key.clone(),
            _ => "submit".to_owned(),
        };
        submit.insert("name".to_owned(), Value::String(name));
    }
    submit
        .entry("type")
        .or_insert_with(|| Value::String("hidden".to_owned()));
    submit.entry("visible").or_insert(Value::Bool(false));
    submit.entry("render").or_insert(Value::Bool(false));
    submit
}
