use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde_json::{Map, Value};
use tracing::Dispatch;

use crate::compile::compile;
use crate::config::EngineConfig;
use crate::diagnostics::{stderr_dispatch, LogLevel};
use crate::error::FormError;
use crate::execute::{Outcome, Pass};
use crate::methods::{Args, MethodError, MethodRegistry};
use crate::propagate::affected_positions;
use crate::types::value::{is_blank, is_truthy};
use crate::types::{
    AgentField, ChangeReport, Field, FieldStore, Schema, SubmitReport, ValidationReport,
};

/// `errors` reported by `check_submit` when the submit flag is false and
/// the rules left no message of their own.
pub const SUBMIT_NOT_READY: &str = "condition not met; form cannot be submitted yet";

/// Run `f` under the engine's own dispatch, if it has one.
fn observed<R>(dispatch: Option<&Dispatch>, f: impl FnOnce() -> R) -> R {
    match dispatch {
        Some(dispatch) => tracing::dispatcher::with_default(dispatch, f),
        None => f(),
    }
}

/// Builder for a [`FormEngine`].
///
/// # Example
///
/// ```
/// use formrule::{Args, FormEngine, LogLevel, Schema};
/// use serde_json::json;
///
/// let schema = Schema::from_value(json!([
///     {"key": "region", "name": "Region", "type": "select", "value": "cn-hangzhou"},
///     {"key": "zone", "name": "Zone", "type": "select", "dependencies": ["region"],
///      "rules": [{"if": "region != null", "then": ["call_method zones(region) -> zone.options"]}]}
/// ]))
/// .unwrap();
///
/// let mut engine = FormEngine::builder()
///     .log_level(LogLevel::Off)
///     .method("zones", |args: &Args| {
///         let region = args.first().and_then(|v| v.as_str()).unwrap_or_default();
///         Ok(json!([format!("{region}-a"), format!("{region}-b")]))
///     })
///     .build(schema)
///     .unwrap();
///
/// let report = engine.on_field_change("region", json!("cn-beijing")).unwrap();
/// assert_eq!(report.updated_fields, vec!["zone"]);
/// assert_eq!(engine.field("zone").unwrap().options().unwrap()[1].label, "cn-beijing-b");
/// ```
#[derive(Debug, Default)]
pub struct FormEngineBuilder {
    config: EngineConfig,
    dispatch: Option<Dispatch>,
    methods: MethodRegistry,
}

impl FormEngineBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration.
    #[must_use]
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn key_separator(mut self, separator: impl Into<String>) -> Self {
        self.config.key_separator = separator.into();
        self
    }

    #[must_use]
    pub fn submit_key(mut self, key: impl Into<String>) -> Self {
        self.config.submit_key = key.into();
        self
    }

    /// Log to stderr at `level` through a dispatch owned by the engine.
    /// Ignored if [`diagnostics`](Self::diagnostics) is also given.
    #[must_use]
    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.config.log_level = Some(level);
        self
    }

    #[must_use]
    pub fn max_log_content(mut self, bytes: usize) -> Self {
        self.config.max_log_content = bytes;
        self
    }

    /// Send the engine's events to `dispatch`.
    #[must_use]
    pub fn diagnostics(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = Some(dispatch);
        self
    }

    /// Register a host method callable from `call_method` instructions.
    #[must_use]
    pub fn method<F>(mut self, name: impl Into<String>, method: F) -> Self
    where
        F: Fn(&Args) -> Result<Value, MethodError> + Send + Sync + 'static,
    {
        self.methods.register(name, method);
        self
    }

    /// Use `methods` as the registry, replacing methods added so far.
    #[must_use]
    pub fn methods(mut self, methods: MethodRegistry) -> Self {
        self.methods = methods;
        self
    }

    /// Validate `schema` and build the engine.
    ///
    /// # Errors
    ///
    /// Returns [`FormError::Schema`] if the schema fails validation.
    pub fn build(self, schema: Schema) -> Result<FormEngine, FormError> {
        let dispatch = self
            .dispatch
            .or_else(|| self.config.log_level.map(stderr_dispatch));
        let store = observed(dispatch.as_ref(), || {
            let _span = tracing::debug_span!("load_schema", fields = schema.fields.len()).entered();
            compile(schema, &self.config.key_separator)
        })?;
        Ok(FormEngine {
            store,
            methods: self.methods,
            config: self.config,
            dispatch,
        })
    }

    /// Parse a JSON schema document and build the engine.
    ///
    /// # Errors
    ///
    /// Returns [`FormError::Json`] for malformed JSON and
    /// [`FormError::Schema`] for an invalid schema.
    pub fn build_json(self, json: &str) -> Result<FormEngine, FormError> {
        let value: Value = serde_json::from_str(json)?;
        self.build(Schema::from_value(value)?)
    }
}

/// A live form: field state, the rules that drive it and the host methods
/// those rules may call.
///
/// Every operation runs to completion synchronously. Callers sharing an
/// engine between threads must serialize access to it.
pub struct FormEngine {
    store: FieldStore,
    methods: MethodRegistry,
    config: EngineConfig,
    dispatch: Option<Dispatch>,
}

impl FormEngine {
    #[must_use]
    pub fn builder() -> FormEngineBuilder {
        FormEngineBuilder::new()
    }

    /// Build an engine with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`FormError::Schema`] if the schema fails validation.
    pub fn new(schema: Schema) -> Result<Self, FormError> {
        Self::builder().build(schema)
    }

    /// Load a schema from a JSON value: a list of field definitions or a
    /// `{fields, submit}` record.
    ///
    /// # Errors
    ///
    /// Returns [`FormError::Schema`] if the document is not a valid schema.
    pub fn from_value(value: Value) -> Result<Self, FormError> {
        Self::new(Schema::from_value(value)?)
    }

    /// # Errors
    ///
    /// Returns [`FormError::Json`] for malformed JSON and
    /// [`FormError::Schema`] for an invalid schema.
    pub fn from_json(json: &str) -> Result<Self, FormError> {
        Self::builder().build_json(json)
    }

    /// Read a JSON schema file.
    ///
    /// # Errors
    ///
    /// Returns [`FormError::Io`] if the file cannot be read, otherwise as
    /// [`from_json`](Self::from_json).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, FormError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    fn pass(&mut self) -> Pass<'_> {
        Pass::new(&mut self.store, &self.methods, self.config.max_log_content)
    }

    /// Run every field's `init` instructions.
    pub fn init(&mut self) -> ChangeReport {
        let dispatch = self.dispatch.clone();
        observed(dispatch.as_ref(), || {
            let _span = tracing::debug_span!("init").entered();
            let mut pass = self.pass();
            pass.run_init();
            let outcome = pass.finish();
            self.change_report(outcome)
        })
    }

    /// Store a new value for `key`, run its rules, then the rules of every
    /// field that depends on it, breadth first.
    ///
    /// # Errors
    ///
    /// Returns [`FormError::UnknownField`] if `key` names no field. Nothing
    /// is written in that case.
    pub fn on_field_change(&mut self, key: &str, value: Value) -> Result<ChangeReport, FormError> {
        let dispatch = self.dispatch.clone();
        observed(dispatch.as_ref(), || {
            let _span = tracing::debug_span!("on_field_change", field = key).entered();
            let position = self.store.position(key).ok_or_else(|| FormError::UnknownField {
                key: key.to_owned(),
            })?;
            self.store.write_value(key, value);

            let affected = affected_positions(&self.store, position);
            tracing::debug!(affected = affected.len(), "propagating change");

            let mut pass = self.pass();
            pass.run_rules(position);
            for dependent in affected {
                pass.run_rules(dependent);
            }
            let outcome = pass.finish();
            Ok(self.change_report(outcome))
        })
    }

    /// Check that every visible, required field holds a value.
    #[must_use]
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::default();
        for field in self.store.iter() {
            if field.required() && field.visible() && is_blank(field.value()) {
                report
                    .errors
                    .insert(field.key().to_owned(), format!("{} is required", field.name()));
                report.invalid_fields.push(field.key().to_owned());
            }
        }
        report.valid = report.invalid_fields.is_empty();
        report
    }

    /// Run the rules of the submit field `key` alone and read its value as
    /// the "can submit" flag.
    ///
    /// # Errors
    ///
    /// Returns [`FormError::MissingSubmitField`] if there is no such field.
    pub fn check_submit(&mut self, key: &str) -> Result<SubmitReport, FormError> {
        let dispatch = self.dispatch.clone();
        observed(dispatch.as_ref(), || {
            let _span = tracing::debug_span!("check_submit", field = key).entered();
            let position = self
                .store
                .position(key)
                .ok_or_else(|| FormError::MissingSubmitField { key: key.to_owned() })?;

            let mut pass = self.pass();
            pass.run_rules(position);
            let outcome = pass.finish();

            let field = self.store.at(position);
            let can_submit = is_truthy(field.value());
            let errors = if !can_submit && field.errors().is_empty() {
                SUBMIT_NOT_READY.to_owned()
            } else {
                field.errors().to_owned()
            };
            tracing::debug!(can_submit, "submit checked");
            Ok(SubmitReport {
                can_submit,
                submit_key: key.to_owned(),
                errors,
                updated_field_values: self.updated_values(&outcome.updated),
                updated_fields: outcome.updated,
            })
        })
    }

    /// [`check_submit`](Self::check_submit) with the configured submit key.
    ///
    /// # Errors
    ///
    /// Returns [`FormError::MissingSubmitField`] if there is no such field.
    pub fn check_default_submit(&mut self) -> Result<SubmitReport, FormError> {
        let key = self.config.submit_key.clone();
        self.check_submit(&key)
    }

    /// Every field, visible or not, in the simplified agent shape.
    #[must_use]
    pub fn get_fields_for_agent(&self) -> Vec<AgentField> {
        self.store.iter().map(AgentField::from).collect()
    }

    /// Full detail of the visible fields, in field order.
    #[must_use]
    pub fn get_all_visible_fields(&self) -> Vec<&Field> {
        self.store.iter().filter(|f| f.visible()).collect()
    }

    #[must_use]
    pub fn field(&self, key: &str) -> Option<&Field> {
        self.store.get(key)
    }

    /// All fields in schema order.
    pub fn fields(&self) -> std::slice::Iter<'_, Field> {
        self.store.iter()
    }

    #[must_use]
    pub fn store(&self) -> &FieldStore {
        &self.store
    }

    #[must_use]
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.store.get(key).map(Field::value)
    }

    #[must_use]
    pub fn values(&self) -> Map<String, Value> {
        self.store.values()
    }

    #[must_use]
    pub fn values_tree(&self) -> &Map<String, Value> {
        self.store.tree()
    }

    #[must_use]
    pub fn visible_values(&self) -> Map<String, Value> {
        self.store.visible_values()
    }

    #[must_use]
    pub fn visible_values_tree(&self) -> Map<String, Value> {
        self.store.visible_values_tree()
    }

    /// Write a value without running any rules.
    ///
    /// # Errors
    ///
    /// Returns [`FormError::UnknownField`] if `key` names no field.
    pub fn set_value(&mut self, key: &str, value: Value) -> Result<(), FormError> {
        if self.store.write_value(key, value) {
            Ok(())
        } else {
            Err(FormError::UnknownField { key: key.to_owned() })
        }
    }

    /// # Errors
    ///
    /// Returns [`FormError::UnknownField`] if `key` names no field.
    pub fn set_visible(&mut self, key: &str, visible: bool) -> Result<(), FormError> {
        self.field_mut(key)?.visible = visible;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`FormError::UnknownField`] if `key` names no field.
    pub fn set_required(&mut self, key: &str, required: bool) -> Result<(), FormError> {
        self.field_mut(key)?.required = required;
        Ok(())
    }

    fn field_mut(&mut self, key: &str) -> Result<&mut Field, FormError> {
        self.store
            .field_mut(key)
            .ok_or_else(|| FormError::UnknownField { key: key.to_owned() })
    }

    /// The keys `key` declares as dependencies, or `None` for an unknown key.
    #[must_use]
    pub fn dependencies_of(&self, key: &str) -> Option<&[String]> {
        self.store.get(key).map(Field::dependencies)
    }

    /// Fields whose rules a change to `key` re-runs, in execution order,
    /// or `None` for an unknown key.
    #[must_use]
    pub fn affected_fields(&self, key: &str) -> Option<Vec<String>> {
        self.store.position(key).map(|_| crate::propagate::affected_fields(&self.store, key))
    }

    /// Log to stderr at `level` from now on.
    pub fn set_log_level(&mut self, level: LogLevel) {
        self.config.log_level = Some(level);
        self.dispatch = Some(stderr_dispatch(level));
    }

    /// Route the engine's events to `dispatch`, or back to the host's
    /// default subscriber with `None`.
    pub fn set_diagnostics(&mut self, dispatch: Option<Dispatch>) {
        self.dispatch = dispatch;
    }

    pub fn register_method<F>(&mut self, name: impl Into<String>, method: F)
    where
        F: Fn(&Args) -> Result<Value, MethodError> + Send + Sync + 'static,
    {
        self.methods.register(name, method);
    }

    #[must_use]
    pub fn methods(&self) -> &MethodRegistry {
        &self.methods
    }

    pub fn methods_mut(&mut self) -> &mut MethodRegistry {
        &mut self.methods
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn updated_values(&self, keys: &[String]) -> BTreeMap<String, Value> {
        keys.iter()
            .filter_map(|k| Some((k.clone(), self.store.get(k)?.value().clone())))
            .collect()
    }

    fn change_report(&self, outcome: Outcome) -> ChangeReport {
        ChangeReport {
            updated_field_values: self.updated_values(&outcome.updated),
            updated_fields: outcome.updated,
            agent_fields: self.get_fields_for_agent(),
            validation: self.validate(),
            requests_user_input: outcome.requests,
        }
    }
}

impl fmt::Debug for FormEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormEngine")
            .field("fields", &self.store.len())
            .field("methods", &self.methods)
            .field("config", &self.config)
            .field("diagnostics", &self.dispatch.is_some())
            .finish()
    }
}

impl fmt::Display for FormEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FormEngine({} fields, {} methods)",
            self.store.len(),
            self.methods.len()
        )
    }
}
