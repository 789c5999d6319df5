use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("invalid schema: {message}")]
    InvalidShape { message: String },

    #[error("invalid field definition at index {index}: {message}")]
    InvalidField { index: usize, message: String },

    #[error("field at index {index} has an empty key")]
    EmptyKey { index: usize },

    #[error("duplicate field key '{key}'")]
    DuplicateField { key: String },

    #[error("options of field '{field}' must be a list")]
    InvalidOptions { field: String },

    #[error("field '{field}' depends on undefined field '{dependency}'")]
    UnknownDependency { field: String, dependency: String },

    #[error("cyclic dependency detected: {}", path.join(" -> "))]
    CyclicDependency { path: Vec<String> },
}
