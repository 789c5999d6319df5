mod error;
mod expr;
mod instruction;
mod scan;

pub use error::ParseError;

use crate::types::{Expr, Instruction};

/// Parse a rule expression such as `region == "cn-hangzhou" and len(items) > 0`.
///
/// # Errors
///
/// Returns [`ParseError`] if the input is not a valid expression or calls a
/// function outside the whitelist.
pub fn parse_expression(source: &str) -> Result<Expr, ParseError> {
    expr::parse(source)
}

/// Parse one line of the instruction DSL.
///
/// # Errors
///
/// Returns [`ParseError`] if the line matches none of the instruction shapes.
pub fn parse_instruction(line: &str) -> Result<Instruction, ParseError> {
    instruction::parse(line)
}
