use std::fmt;

use serde_json::Value;

use crate::parse::ParseError;

/// Comparison operators supported in rule expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    NotIn,
    Is,
    IsNot,
}

/// Arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
}

/// The closed set of functions an expression may call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Len,
    Min,
    Max,
    Sum,
    Any,
    All,
    Sorted,
    Str,
    Int,
    Float,
    Bool,
    List,
    Dict,
    ReMatch,
    ReSearch,
    ReFullmatch,
    ReFindall,
}

impl Builtin {
    /// Resolve a (possibly dotted) function name. Anything not listed here is
    /// rejected when the expression is parsed.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Builtin> {
        Some(match name {
            "len" => Builtin::Len,
            "min" => Builtin::Min,
            "max" => Builtin::Max,
            "sum" => Builtin::Sum,
            "any" => Builtin::Any,
            "all" => Builtin::All,
            "sorted" | "sort" => Builtin::Sorted,
            "str" => Builtin::Str,
            "int" => Builtin::Int,
            "float" => Builtin::Float,
            "bool" => Builtin::Bool,
            "list" => Builtin::List,
            "dict" => Builtin::Dict,
            "re.match" => Builtin::ReMatch,
            "re.search" => Builtin::ReSearch,
            "re.fullmatch" => Builtin::ReFullmatch,
            "re.findall" => Builtin::ReFindall,
            _ => return None,
        })
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Builtin::Len => "len",
            Builtin::Min => "min",
            Builtin::Max => "max",
            Builtin::Sum => "sum",
            Builtin::Any => "any",
            Builtin::All => "all",
            Builtin::Sorted => "sorted",
            Builtin::Str => "str",
            Builtin::Int => "int",
            Builtin::Float => "float",
            Builtin::Bool => "bool",
            Builtin::List => "list",
            Builtin::Dict => "dict",
            Builtin::ReMatch => "re.match",
            Builtin::ReSearch => "re.search",
            Builtin::ReFullmatch => "re.fullmatch",
            Builtin::ReFindall => "re.findall",
        }
    }
}

/// Methods callable on a value (`name.upper()`, `temp.get("k")`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueMethod {
    Upper,
    Lower,
    Strip,
    StartsWith,
    EndsWith,
    Split,
    Replace,
    Join,
    Get,
    Keys,
    Values,
}

impl ValueMethod {
    #[must_use]
    pub fn from_name(name: &str) -> Option<ValueMethod> {
        Some(match name {
            "upper" => ValueMethod::Upper,
            "lower" => ValueMethod::Lower,
            "strip" => ValueMethod::Strip,
            "startswith" => ValueMethod::StartsWith,
            "endswith" => ValueMethod::EndsWith,
            "split" => ValueMethod::Split,
            "replace" => ValueMethod::Replace,
            "join" => ValueMethod::Join,
            "get" => ValueMethod::Get,
            "keys" => ValueMethod::Keys,
            "values" => ValueMethod::Values,
            _ => return None,
        })
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            ValueMethod::Upper => "upper",
            ValueMethod::Lower => "lower",
            ValueMethod::Strip => "strip",
            ValueMethod::StartsWith => "startswith",
            ValueMethod::EndsWith => "endswith",
            ValueMethod::Split => "split",
            ValueMethod::Replace => "replace",
            ValueMethod::Join => "join",
            ValueMethod::Get => "get",
            ValueMethod::Keys => "keys",
            ValueMethod::Values => "values",
        }
    }
}

/// A piece of an f-string.
#[derive(Debug, Clone, PartialEq)]
pub enum FormatPart {
    Text(String),
    Expr(Expr),
}

/// Expression AST produced by the expression grammar.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Name(String),
    Attr(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Call(Builtin, Vec<Expr>),
    Method {
        target: Box<Expr>,
        method: ValueMethod,
        args: Vec<Expr>,
    },
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Compare {
        left: Box<Expr>,
        op: CompareOp,
        right: Box<Expr>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Conditional {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    List(Vec<Expr>),
    Object(Vec<(Expr, Expr)>),
    Format(Vec<FormatPart>),
}

impl Expr {
    /// The segments of a pure `a.b.c` chain, or `None` if the expression is
    /// anything else.
    #[must_use]
    pub fn dotted_path(&self) -> Option<Vec<&str>> {
        match self {
            Expr::Name(name) => Some(vec![name.as_str()]),
            Expr::Attr(target, attr) => {
                let mut path = target.dotted_path()?;
                path.push(attr.as_str());
                Some(path)
            }
            _ => None,
        }
    }

    /// Whether the expression can be evaluated without any context
    /// (literals, containers of literals, unary signs).
    #[must_use]
    pub fn is_constant(&self) -> bool {
        match self {
            Expr::Literal(_) => true,
            Expr::Unary(_, inner) => inner.is_constant(),
            Expr::List(items) => items.iter().all(Expr::is_constant),
            Expr::Object(entries) => entries.iter().all(|(k, v)| k.is_constant() && v.is_constant()),
            _ => false,
        }
    }

    /// Height of the syntax tree, counting this node.
    ///
    /// Walks an explicit stack so arbitrarily deep trees are measured safely.
    #[must_use]
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut pending = vec![(self, 1)];
        while let Some((expr, depth)) = pending.pop() {
            deepest = deepest.max(depth);
            let below = depth + 1;
            match expr {
                Expr::Literal(_) | Expr::Name(_) => {}
                Expr::Attr(inner, _) | Expr::Unary(_, inner) | Expr::Not(inner) => {
                    pending.push((inner.as_ref(), below));
                }
                Expr::Index(left, right)
                | Expr::Binary(_, left, right)
                | Expr::Compare { left, right, .. }
                | Expr::And(left, right)
                | Expr::Or(left, right) => {
                    pending.push((left.as_ref(), below));
                    pending.push((right.as_ref(), below));
                }
                Expr::Call(_, items) | Expr::List(items) => {
                    pending.extend(items.iter().map(|item| (item, below)));
                }
                Expr::Method { target, args, .. } => {
                    pending.push((target.as_ref(), below));
                    pending.extend(args.iter().map(|arg| (arg, below)));
                }
                Expr::Conditional {
                    condition,
                    then,
                    otherwise,
                } => {
                    pending.push((condition.as_ref(), below));
                    pending.push((then.as_ref(), below));
                    pending.push((otherwise.as_ref(), below));
                }
                Expr::Object(entries) => {
                    for (key, value) in entries {
                        pending.push((key, below));
                        pending.push((value, below));
                    }
                }
                Expr::Format(parts) => {
                    for part in parts {
                        if let FormatPart::Expr(inner) = part {
                            pending.push((inner, below));
                        }
                    }
                }
            }
        }
        deepest
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompareOp::Eq => "==",
            CompareOp::Neq => "!=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
            CompareOp::In => "in",
            CompareOp::NotIn => "not in",
            CompareOp::Is => "is",
            CompareOp::IsNot => "is not",
        };
        f.write_str(s)
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::FloorDiv => "//",
            BinaryOp::Mod => "%",
        };
        f.write_str(s)
    }
}

fn write_args(f: &mut fmt::Formatter<'_>, args: &[Expr]) -> fmt::Result {
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{arg}")?;
    }
    Ok(())
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(v) => write!(f, "{v}"),
            Expr::Name(name) => f.write_str(name),
            Expr::Attr(target, attr) => write!(f, "{target}.{attr}"),
            Expr::Index(target, index) => write!(f, "{target}[{index}]"),
            Expr::Call(builtin, args) => {
                write!(f, "{}(", builtin.name())?;
                write_args(f, args)?;
                f.write_str(")")
            }
            Expr::Method {
                target,
                method,
                args,
            } => {
                write!(f, "{target}.{}(", method.name())?;
                write_args(f, args)?;
                f.write_str(")")
            }
            Expr::Unary(UnaryOp::Neg, inner) => write!(f, "(-{inner})"),
            Expr::Unary(UnaryOp::Pos, inner) => write!(f, "(+{inner})"),
            Expr::Binary(op, a, b) => write!(f, "({a} {op} {b})"),
            Expr::Compare { left, op, right } => write!(f, "({left} {op} {right})"),
            Expr::And(a, b) => write!(f, "({a} and {b})"),
            Expr::Or(a, b) => write!(f, "({a} or {b})"),
            Expr::Not(inner) => write!(f, "(not {inner})"),
            Expr::Conditional {
                condition,
                then,
                otherwise,
            } => write!(f, "({then} if {condition} else {otherwise})"),
            Expr::List(items) => {
                f.write_str("[")?;
                write_args(f, items)?;
                f.write_str("]")
            }
            Expr::Object(entries) => {
                f.write_str("{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_str("}")
            }
            Expr::Format(parts) => {
                f.write_str("f\"")?;
                for part in parts {
                    match part {
                        FormatPart::Text(text) => f.write_str(text)?,
                        FormatPart::Expr(expr) => write!(f, "{{{expr}}}")?,
                    }
                }
                f.write_str("\"")
            }
        }
    }
}

/// Source text of a condition or value expression together with its parse
/// outcome. Parsing happens once, at schema load; a parse failure is kept
/// and reported whenever the expression is evaluated.
#[derive(Debug, Clone)]
pub struct Expression {
    source: String,
    parsed: Result<Expr, ParseError>,
}

impl Expression {
    #[must_use]
    pub fn parse(source: &str) -> Self {
        let source = source.trim();
        Self {
            source: source.to_owned(),
            parsed: crate::parse::parse_expression(source),
        }
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The parsed AST, or the error that prevented parsing.
    pub fn ast(&self) -> Result<&Expr, &ParseError> {
        self.parsed.as_ref()
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn name(n: &str) -> Box<Expr> {
        Box::new(Expr::Name(n.to_owned()))
    }

    #[test]
    fn dotted_path_of_chain() {
        let expr = Expr::Attr(Box::new(Expr::Attr(name("app"), "region".into())), "value".into());
        assert_eq!(expr.dotted_path(), Some(vec!["app", "region", "value"]));
    }

    #[test]
    fn depth_counts_the_longest_branch() {
        assert_eq!(Expr::Name("a".into()).depth(), 1);
        let sum = Expr::Binary(BinaryOp::Add, name("a"), name("b"));
        let expr = Expr::List(vec![
            Expr::Literal(json!(1)),
            Expr::Not(Box::new(Expr::Call(Builtin::Len, vec![sum]))),
        ]);
        assert_eq!(expr.depth(), 5);

        let mut chain = Expr::Name("x".into());
        for _ in 0..1_000 {
            chain = Expr::Unary(UnaryOp::Neg, Box::new(chain));
        }
        assert_eq!(chain.depth(), 1_001);
    }

    #[test]
    fn dotted_path_rejects_index() {
        let expr = Expr::Attr(
            Box::new(Expr::Index(name("a"), Box::new(Expr::Literal(json!(0))))),
            "b".into(),
        );
        assert_eq!(expr.dotted_path(), None);
    }

    #[test]
    fn constants() {
        assert!(Expr::Literal(json!(1)).is_constant());
        assert!(Expr::Unary(UnaryOp::Neg, Box::new(Expr::Literal(json!(1)))).is_constant());
        assert!(Expr::List(vec![Expr::Literal(json!("a"))]).is_constant());
        assert!(!Expr::List(vec![Expr::Name("a".into())]).is_constant());
        assert!(!Expr::Name("region".into()).is_constant());
    }

    #[test]
    fn builtin_names_round_trip() {
        for name in ["len", "min", "max", "sum", "any", "all", "sorted", "str", "int", "float", "bool", "list", "dict", "re.match", "re.search", "re.fullmatch", "re.findall"] {
            let builtin = Builtin::from_name(name).unwrap();
            assert_eq!(builtin.name(), name);
        }
        assert_eq!(Builtin::from_name("sort"), Some(Builtin::Sorted));
        assert_eq!(Builtin::from_name("open"), None);
        assert_eq!(Builtin::from_name("__import__"), None);
    }

    #[test]
    fn display_is_fully_parenthesized() {
        let expr = Expr::Or(
            name("a"),
            Box::new(Expr::And(name("b"), Box::new(Expr::Not(name("c"))))),
        );
        assert_eq!(expr.to_string(), "(a or (b and (not c)))");
    }
}
