use serde_json::{json, Value};
use thiserror::Error;

use crate::types::SchemaError;

/// Unified error type for caller-level failures: loading a schema,
/// addressing a field that does not exist, or bad configuration.
///
/// Failures inside rule execution never surface here; they are recorded
/// on the affected fields instead.
#[derive(Debug, Error)]
pub enum FormError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("field not found: {key}")]
    UnknownField { key: String },

    #[error("submit field '{key}' does not exist")]
    MissingSubmitField { key: String },

    #[error("invalid configuration: {message}")]
    Config { message: String },
}

impl FormError {
    /// The error rendered in the external result shape: `{"error": ...}`,
    /// or the `check_submit` shape for a missing submit field.
    #[must_use]
    pub fn report(&self) -> Value {
        match self {
            FormError::MissingSubmitField { key } => json!({
                "can_submit": false,
                "submit_key": key,
                "errors": self.to_string(),
            }),
            other => json!({ "error": other.to_string() }),
        }
    }
}
