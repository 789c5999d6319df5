mod compile;
mod config;
mod diagnostics;
mod engine;
mod error;
mod evaluate;
mod execute;
mod methods;
pub mod parse;
mod propagate;
mod types;

pub use config::{EngineConfig, DEFAULT_SUBMIT_KEY};
pub use diagnostics::{stderr_dispatch, LogLevel};
pub use engine::{FormEngine, FormEngineBuilder, SUBMIT_NOT_READY};
pub use error::FormError;
pub use evaluate::{condition_holds, eval, evaluate, EvalError};
pub use methods::{Args, Method, MethodError, MethodRegistry};
pub use parse::ParseError;
pub use propagate::affected_fields;
pub use types::value;
pub use types::{
    AgentField, BinaryOp, Branch, BranchDef, Builtin, ChangeReport, CompareOp, Expr, Expression,
    Field, FieldDef, FieldOption, FieldStore, FormatPart, Instruction, Mapping, MethodCall,
    Param, Params, Prop, Rule, RuleDef, Schema, SchemaError, Scope, Statement, SubmitReport,
    Target, TempVars, UnaryOp, ValidationReport, ValueMethod, normalize_options, traverse,
};
