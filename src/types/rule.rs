use crate::parse::ParseError;

use super::expr::Expression;
use super::instruction::Instruction;

/// One instruction line as written in the schema, with its parse outcome.
///
/// Lines that match no instruction shape are kept so they can be reported
/// when the owning branch runs; executing them is a no-op.
#[derive(Debug, Clone)]
pub struct Statement {
    pub source: String,
    pub instruction: Result<Instruction, ParseError>,
}

impl Statement {
    #[must_use]
    pub fn parse(line: &str) -> Self {
        let source = line.trim();
        Self {
            source: source.to_owned(),
            instruction: crate::parse::parse_instruction(source),
        }
    }
}

/// An `if`/`then` pair. A missing condition always holds.
#[derive(Debug, Clone)]
pub struct Branch {
    pub condition: Option<Expression>,
    pub then: Vec<Statement>,
}

/// A field's conditional instruction set.
///
/// The first branch whose condition holds runs; `otherwise` runs only when
/// no branch matched. `init` runs once, unconditionally, during engine
/// initialization.
#[derive(Debug, Clone)]
pub struct Rule {
    pub branch: Branch,
    pub elif: Vec<Branch>,
    pub otherwise: Option<Vec<Statement>>,
    pub init: Vec<Statement>,
}

#[cfg(test)]
impl Rule {
    fn statements(lines: &[&str]) -> Vec<Statement> {
        lines.iter().map(|line| Statement::parse(line)).collect()
    }

    /// `if condition then lines`; an empty condition always holds.
    pub(crate) fn when(condition: &str, then: &[&str]) -> Rule {
        Rule {
            branch: Branch {
                condition: (!condition.is_empty()).then(|| Expression::parse(condition)),
                then: Self::statements(then),
            },
            elif: Vec::new(),
            otherwise: None,
            init: Vec::new(),
        }
    }

    pub(crate) fn elif(mut self, condition: &str, then: &[&str]) -> Rule {
        self.elif.push(Branch {
            condition: Some(Expression::parse(condition)),
            then: Self::statements(then),
        });
        self
    }

    pub(crate) fn otherwise(mut self, lines: &[&str]) -> Rule {
        self.otherwise = Some(Self::statements(lines));
        self
    }

    pub(crate) fn init(lines: &[&str]) -> Rule {
        Rule {
            init: Self::statements(lines),
            ..Rule::when("", &[])
        }
    }
}
