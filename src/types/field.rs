use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::rule::Rule;
use super::value::{display_str, is_truthy};

/// One selectable choice of a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldOption {
    pub label: String,
    pub value: Value,
}

impl FieldOption {
    pub fn new(label: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

/// Normalize an arbitrary value into an options list.
///
/// A list whose elements are all `{label, value}` records is kept as-is;
/// any other list maps each element `x` to `{label: str(x), value: x}`.
/// Anything that is not a list yields no options.
#[must_use]
pub fn normalize_options(value: &Value) -> Vec<FieldOption> {
    let Value::Array(items) = value else {
        return Vec::new();
    };
    let labelled = items.iter().all(|item| {
        item.as_object()
            .is_some_and(|o| o.contains_key("label") && o.contains_key("value"))
    });
    if labelled {
        items
            .iter()
            .filter_map(Value::as_object)
            .map(|o| FieldOption {
                label: o.get("label").map(display_str).unwrap_or_default(),
                value: o.get("value").cloned().unwrap_or(Value::Null),
            })
            .collect()
    } else {
        items
            .iter()
            .map(|x| FieldOption {
                label: display_str(x),
                value: x.clone(),
            })
            .collect()
    }
}

/// Full declarative state of one form input.
///
/// Fields are created once at schema load. Their values and flags change
/// only through rule execution or the engine's public operations.
#[derive(Debug, Clone, Serialize)]
pub struct Field {
    pub(crate) key: String,
    pub(crate) name: String,
    #[serde(rename = "type")]
    pub(crate) kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) data_source: Option<String>,
    pub(crate) options: Option<Vec<FieldOption>>,
    pub(crate) value: Value,
    pub(crate) dependencies: Vec<String>,
    #[serde(skip)]
    pub(crate) rules: Arc<[Rule]>,
    pub(crate) description: String,
    pub(crate) visible: bool,
    pub(crate) disabled: bool,
    pub(crate) required: bool,
    pub(crate) errors: String,
    pub(crate) render: bool,
}

impl Field {
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The UI type tag (`text`, `select`, `hidden`, ...). Opaque to the engine.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    #[must_use]
    pub fn data_source(&self) -> Option<&str> {
        self.data_source.as_deref()
    }

    #[must_use]
    pub fn options(&self) -> Option<&[FieldOption]> {
        self.options.as_deref()
    }

    #[must_use]
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Keys of the fields whose change re-runs this field's rules.
    #[must_use]
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[must_use]
    pub fn visible(&self) -> bool {
        self.visible
    }

    #[must_use]
    pub fn disabled(&self) -> bool {
        self.disabled
    }

    #[must_use]
    pub fn required(&self) -> bool {
        self.required
    }

    /// The error left by the most recent instruction touching this field.
    #[must_use]
    pub fn errors(&self) -> &str {
        &self.errors
    }

    /// Whether the field is rendered by a UI. The synthetic submit field is not.
    #[must_use]
    pub fn render(&self) -> bool {
        self.render
    }

    pub(crate) fn value_json(&self) -> Value {
        self.value.clone()
    }

    /// The read-only view exposed to expressions through `f.<key>`.
    #[must_use]
    pub fn view(&self) -> Value {
        let options = match &self.options {
            Some(options) => serde_json::to_value(options).unwrap_or(Value::Null),
            None => Value::Null,
        };
        serde_json::json!({
            "key": self.key,
            "value": self.value,
            "options": options,
            "visible": self.visible,
            "disabled": self.disabled,
            "required": self.required,
            "errors": self.errors,
        })
    }

    pub(crate) fn set_errors_from(&mut self, value: &Value) {
        self.errors = if is_truthy(value) {
            display_str(value)
        } else {
            String::new()
        };
    }
}

#[cfg(test)]
impl Field {
    pub(crate) fn for_test(key: &str, value: Value, dependencies: &[&str]) -> Field {
        Field {
            key: key.to_owned(),
            name: key.to_owned(),
            kind: "text".to_owned(),
            data_source: None,
            options: None,
            value,
            dependencies: dependencies.iter().map(|d| (*d).to_owned()).collect(),
            rules: Arc::from(Vec::new()),
            description: String::new(),
            visible: true,
            disabled: false,
            required: true,
            errors: String::new(),
            render: true,
        }
    }

    pub(crate) fn with_rules(mut self, rules: Vec<Rule>) -> Field {
        self.rules = Arc::from(rules);
        self
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn normalize_plain_list() {
        let options = normalize_options(&json!([1, 2, 3]));
        assert_eq!(
            options,
            vec![
                FieldOption::new("1", 1),
                FieldOption::new("2", 2),
                FieldOption::new("3", 3),
            ]
        );
    }

    #[test]
    fn normalize_keeps_labelled_records() {
        let options = normalize_options(&json!([
            {"label": "East", "value": "cn-hangzhou"},
            {"label": "North", "value": "cn-beijing", "extra": true},
        ]));
        assert_eq!(options[0], FieldOption::new("East", "cn-hangzhou"));
        assert_eq!(options[1], FieldOption::new("North", "cn-beijing"));
    }

    #[test]
    fn normalize_mixed_list_wraps_everything() {
        let options = normalize_options(&json!([{"label": "a", "value": 1}, "b"]));
        assert_eq!(options[0].label, r#"{"label":"a","value":1}"#);
        assert_eq!(options[1], FieldOption::new("b", "b"));
    }

    #[test]
    fn normalize_non_list_is_empty() {
        assert!(normalize_options(&json!({"data": [1]})).is_empty());
        assert!(normalize_options(&json!(null)).is_empty());
        assert!(normalize_options(&json!("abc")).is_empty());
    }
}
