use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use super::field::{Field, FieldOption};

/// Outcome of [`crate::FormEngine::validate`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    /// Field key → `"<name> is required"`.
    pub errors: BTreeMap<String, String>,
    /// Failing keys in field order.
    pub invalid_fields: Vec<String>,
}

/// Simplified field projection for an external agent. Never filtered by
/// visibility.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentField {
    pub key: String,
    pub name: String,
    pub value: Value,
    #[serde(rename = "type")]
    pub kind: String,
    pub errors: String,
    pub required: bool,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<FieldOption>>,
}

impl From<&Field> for AgentField {
    fn from(field: &Field) -> Self {
        Self {
            key: field.key().to_owned(),
            name: field.name().to_owned(),
            value: field.value().clone(),
            kind: field.kind().to_owned(),
            errors: field.errors().to_owned(),
            required: field.required(),
            description: field.description().to_owned(),
            options: field
                .options()
                .filter(|options| !options.is_empty())
                .map(<[FieldOption]>::to_vec),
        }
    }
}

/// Result of `init` and `on_field_change`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeReport {
    /// Keys written during the operation, in first-touch order.
    pub updated_fields: Vec<String>,
    pub updated_field_values: BTreeMap<String, Value>,
    #[serde(rename = "get_fields_for_agent")]
    pub agent_fields: Vec<AgentField>,
    #[serde(rename = "validate")]
    pub validation: ValidationReport,
    /// Payloads of `emit agent.request_user_input(...)` instructions.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub requests_user_input: Vec<String>,
}

/// Result of `check_submit`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmitReport {
    pub can_submit: bool,
    pub submit_key: String,
    pub errors: String,
    pub updated_fields: Vec<String>,
    pub updated_field_values: BTreeMap<String, Value>,
}
