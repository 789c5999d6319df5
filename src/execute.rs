use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::diagnostics::clip;
use crate::evaluate::{condition_holds, evaluate, EvalError};
use crate::methods::{Args, MethodRegistry};
use crate::types::value::is_truthy;
use crate::types::{
    normalize_options, FieldStore, Instruction, Mapping, MethodCall, Param, Params, Prop, Rule,
    Scope, Statement, Target, TempVars,
};

/// Event name whose payload is handed back to the caller.
pub(crate) const REQUEST_USER_INPUT: &str = "agent.request_user_input";

/// Failure of a single instruction. Recorded on the instruction's target
/// field; never aborts the surrounding pass.
#[derive(Debug, Error)]
pub(crate) enum ExecError {
    #[error("failed to evaluate expression `{expression}`: {error}")]
    Expression { expression: String, error: EvalError },

    #[error("method not registered: {0}")]
    NotRegistered(String),

    #[error("method {name} failed: {message}")]
    MethodFailed { name: String, message: String },

    #[error("cannot access path `{0}` in method result")]
    Path(String),
}

/// What one orchestrated pass changed.
#[derive(Debug, Default)]
pub(crate) struct Outcome {
    /// Keys of written fields, in first-touch order.
    pub(crate) updated: Vec<String>,
    pub(crate) requests: Vec<String>,
}

/// One orchestrated operation's worth of rule execution.
///
/// Temporary variables live exactly as long as the pass.
pub(crate) struct Pass<'a> {
    store: &'a mut FieldStore,
    methods: &'a MethodRegistry,
    temps: TempVars,
    updated: Vec<String>,
    seen: HashSet<String>,
    requests: Vec<String>,
    max_log: usize,
}

impl<'a> Pass<'a> {
    pub(crate) fn new(store: &'a mut FieldStore, methods: &'a MethodRegistry, max_log: usize) -> Self {
        Self {
            store,
            methods,
            temps: TempVars::new(),
            updated: Vec::new(),
            seen: HashSet::new(),
            requests: Vec::new(),
            max_log,
        }
    }

    pub(crate) fn finish(self) -> Outcome {
        Outcome {
            updated: self.updated,
            requests: self.requests,
        }
    }

    /// Run every field's `init` list, in field order.
    pub(crate) fn run_init(&mut self) {
        for position in 0..self.store.len() {
            let rules = Arc::clone(&self.store.at(position).rules);
            for rule in rules.iter() {
                self.execute(&rule.init);
            }
        }
    }

    /// Run the rules of the field at `position`.
    pub(crate) fn run_rules(&mut self, position: usize) {
        let field = self.store.at(position);
        let key = field.key().to_owned();
        let rules = Arc::clone(&field.rules);
        for rule in rules.iter() {
            if let Some((branch, statements)) = self.select(rule) {
                tracing::debug!(field = %key, branch, "rule branch selected");
                self.execute(statements);
            }
        }
    }

    /// The first branch whose condition holds, else the `else` list.
    fn select<'r>(&self, rule: &'r Rule) -> Option<(&'static str, &'r [Statement])> {
        let scope = Scope::new(&*self.store, &self.temps);
        if condition_holds(rule.branch.condition.as_ref(), &scope) {
            return Some(("if", &rule.branch.then));
        }
        for branch in &rule.elif {
            if condition_holds(branch.condition.as_ref(), &scope) {
                return Some(("elif", &branch.then));
            }
        }
        rule.otherwise.as_deref().map(|lines| ("else", lines))
    }

    /// Execute statements in order. Each one succeeds or fails on its own.
    pub(crate) fn execute(&mut self, statements: &[Statement]) {
        for statement in statements {
            match &statement.instruction {
                Ok(instruction) => self.run(instruction, &statement.source),
                Err(error) => {
                    tracing::warn!(instruction = %statement.source, %error, "skipping unparseable instruction");
                }
            }
        }
    }

    fn run(&mut self, instruction: &Instruction, source: &str) {
        if let Err(error) = self.apply(instruction, source) {
            tracing::error!(instruction = %source, %error, "instruction failed");
            if let Some(key) = instruction.target_field() {
                self.record_error(key, error.to_string());
            }
        }
    }

    fn apply(&mut self, instruction: &Instruction, source: &str) -> Result<(), ExecError> {
        match instruction {
            Instruction::Set { target, expression } => {
                let scope = Scope::new(&*self.store, &self.temps);
                let value = evaluate(expression, &scope).map_err(|error| ExecError::Expression {
                    expression: expression.source().to_owned(),
                    error,
                })?;
                if target.prop == Prop::Options && value.is_null() {
                    self.clear_options(&target.field);
                } else {
                    self.write(target, value);
                }
            }
            Instruction::Clear { target } => match target.prop {
                Prop::Options => self.clear_options(&target.field),
                _ => self.write(target, Value::Null),
            },
            Instruction::CallMethod {
                call,
                result_path,
                target,
            } => {
                let result = self.invoke(call)?;
                let extracted = extract(&result, result_path)?;
                self.write(target, extracted.clone());
            }
            Instruction::CallMethodMulti { call, mappings } => self.call_multi(call, mappings),
            Instruction::CallMethodToTemp { call, temp_var } => {
                let value = self.invoke(call).unwrap_or_else(|error| {
                    tracing::error!(%temp_var, %error, "method failed; binding error payload");
                    json!({ "error": error.to_string() })
                });
                tracing::debug!(
                    %temp_var,
                    value = %clip(&value.to_string(), self.max_log),
                    "temporary variable bound"
                );
                self.temps.insert(temp_var.clone(), value);
            }
            Instruction::Conditional { condition, action } => {
                let scope = Scope::new(&*self.store, &self.temps);
                if condition_holds(Some(condition), &scope) {
                    tracing::debug!(%condition, "condition holds; running action");
                    self.run(action, source);
                } else {
                    tracing::debug!(%condition, "condition not met; action skipped");
                }
            }
            Instruction::Emit { event, payload } => {
                if event == REQUEST_USER_INPUT {
                    self.requests.push(payload.clone());
                } else {
                    tracing::warn!(%event, "ignoring unknown event");
                }
            }
        }
        Ok(())
    }

    fn call_multi(&mut self, call: &MethodCall, mappings: &[Mapping]) {
        let result = match self.invoke(call) {
            Ok(result) => result,
            Err(error) => {
                tracing::error!(method = %call.method, %error, "method failed");
                let message = error.to_string();
                for mapping in mappings {
                    self.record_error(&mapping.target.field, message.clone());
                }
                return;
            }
        };
        for mapping in mappings {
            match extract(&result, &mapping.path) {
                Ok(value) => self.write(&mapping.target, value.clone()),
                Err(error) => {
                    tracing::error!(mapping = %mapping.target, %error, "result extraction failed");
                    self.record_error(&mapping.target.field, error.to_string());
                }
            }
        }
    }

    fn invoke(&self, call: &MethodCall) -> Result<Value, ExecError> {
        let name = &call.method;
        let method = self
            .methods
            .get(name)
            .ok_or_else(|| ExecError::NotRegistered(name.clone()))?;
        let args = self.resolve_params(&call.params);
        tracing::debug!(
            method = %name,
            args = %clip(&args.to_value().to_string(), self.max_log),
            "calling method"
        );

        match panic::catch_unwind(AssertUnwindSafe(|| method(&args))) {
            Ok(Ok(result)) => {
                tracing::debug!(
                    method = %name,
                    result = %clip(&result.to_string(), self.max_log),
                    "method returned"
                );
                Ok(result)
            }
            Ok(Err(error)) => Err(ExecError::MethodFailed {
                name: name.clone(),
                message: error.to_string(),
            }),
            Err(payload) => Err(ExecError::MethodFailed {
                name: name.clone(),
                message: panic_message(payload.as_ref()),
            }),
        }
    }

    fn resolve_params(&self, params: &Params) -> Args {
        match params {
            Params::Positional(items) => Args::Positional(items.iter().map(|p| self.resolve_param(p)).collect()),
            Params::Named(items) => Args::Named(
                items
                    .iter()
                    .map(|(name, p)| (name.clone(), self.resolve_param(p)))
                    .collect::<Map<_, _>>(),
            ),
        }
    }

    /// Literals pass through. A reference names a field, optionally with a
    /// trailing `.value`; an unknown reference is passed as its own text.
    fn resolve_param(&self, param: &Param) -> Value {
        match param {
            Param::Literal(value) => value.clone(),
            Param::Reference(text) => self
                .store
                .get(text)
                .or_else(|| text.strip_suffix(".value").and_then(|key| self.store.get(key)))
                .map_or_else(|| Value::String(text.clone()), |field| field.value().clone()),
        }
    }

    /// Write one property. Every write except to `errors` clears the
    /// field's error.
    fn write(&mut self, target: &Target, value: Value) {
        let Some(field) = self.store.field_mut(&target.field) else {
            tracing::warn!(field = %target, "target field not found; write skipped");
            return;
        };
        match target.prop {
            Prop::Value => {}
            Prop::Options => field.options = Some(normalize_options(&value)),
            Prop::Visible => field.visible = is_truthy(&value),
            Prop::Disabled => field.disabled = is_truthy(&value),
            Prop::Required => field.required = is_truthy(&value),
            Prop::Errors => field.set_errors_from(&value),
        }
        if target.prop != Prop::Errors {
            field.errors.clear();
        }
        if target.prop == Prop::Value {
            self.store.write_value(&target.field, value);
        }
        self.touch(&target.field);
    }

    fn clear_options(&mut self, key: &str) {
        let Some(field) = self.store.field_mut(key) else {
            tracing::warn!(field = %key, "target field not found; clear skipped");
            return;
        };
        field.options = None;
        field.errors.clear();
        self.touch(key);
    }

    fn record_error(&mut self, key: &str, message: String) {
        match self.store.field_mut(key) {
            Some(field) => {
                field.errors = message;
                self.touch(key);
            }
            None => tracing::warn!(field = %key, "cannot record error on unknown field"),
        }
    }

    fn touch(&mut self, key: &str) {
        if self.seen.insert(key.to_owned()) {
            self.updated.push(key.to_owned());
        }
    }
}

/// Follow a result path: object keys by name, list elements by
/// non-negative index.
fn extract<'v>(result: &'v Value, path: &[String]) -> Result<&'v Value, ExecError> {
    let mut current = result;
    for step in path {
        let next = match current {
            Value::Object(map) => map.get(step),
            Value::Array(items) => step.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        current = next.ok_or_else(|| ExecError::Path(path.join(".")))?;
    }
    Ok(current)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "method panicked".to_owned()
    }
}
