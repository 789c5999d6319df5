mod context;
mod error;
mod expr;
mod field;
mod instruction;
mod report;
mod rule;
mod schema;
mod store;
pub mod value;

pub use context::{traverse, Scope, TempVars};
pub use error::SchemaError;
pub use expr::{BinaryOp, Builtin, CompareOp, Expr, Expression, FormatPart, UnaryOp, ValueMethod};
pub use field::{normalize_options, Field, FieldOption};
pub use instruction::{Instruction, Mapping, MethodCall, Param, Params, Prop, Target};
pub use report::{AgentField, ChangeReport, SubmitReport, ValidationReport};
pub use rule::{Branch, Rule, Statement};
pub use schema::{BranchDef, FieldDef, RuleDef, Schema};
pub use store::FieldStore;
