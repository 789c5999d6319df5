use std::cell::Cell;

use serde_json::{Number, Value};
use winnow::ascii::{digit0, digit1};
use winnow::combinator::{
    alt, cut_err, delimited, fail, not, opt, peek, preceded, repeat, separated, terminated,
};
use winnow::error::{ContextError, ErrMode, ModalResult, StrContext, StrContextValue};
use winnow::prelude::*;
use winnow::token::{any, one_of, take_while};

use crate::types::{BinaryOp, Builtin, CompareOp, Expr, FormatPart, UnaryOp, ValueMethod};

use super::error::ParseError;
use super::scan::{is_ident_char, matching_close};

// -- Whitespace & identifiers -----------------------------------------------

fn ws(input: &mut &str) -> ModalResult<()> {
    take_while(0.., char::is_whitespace).void().parse_next(input)
}

pub(crate) fn ident<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    (
        one_of(|c: char| c.is_alphabetic() || c == '_'),
        take_while(0.., is_ident_char),
    )
        .take()
        .parse_next(input)
}

fn is_reserved(word: &str) -> bool {
    matches!(word, "and" | "or" | "not" | "in" | "is" | "if" | "else")
}

/// Match `word` as a whole identifier.
fn keyword<'i>(word: &'static str) -> impl Parser<&'i str, (), ErrMode<ContextError>> {
    move |input: &mut &'i str| -> ModalResult<()> {
        let checkpoint = input.checkpoint();
        let found = ident.parse_next(input)?;
        if found == word {
            Ok(())
        } else {
            input.reset(&checkpoint);
            Err(ErrMode::from_input(input))
        }
    }
}

fn reject<T>(input: &mut &str, what: &'static str) -> ModalResult<T> {
    cut_err(fail::<_, T, _>)
        .context(StrContext::Label(what))
        .parse_next(input)
}

// -- Nesting limits ---------------------------------------------------------

/// Brackets, conditionals and prefix operators nested deeper than this are
/// rejected.
pub(crate) const MAX_NESTING: usize = 64;

/// Most operators in one run of the same precedence level, or accessors
/// after one atom.
pub(crate) const MAX_CHAIN: usize = 64;

/// Tallest syntax tree handed to the evaluator.
pub(crate) const MAX_TREE_DEPTH: usize = 128;

thread_local! {
    static NESTING: Cell<usize> = const { Cell::new(0) };
}

/// One open nesting level, closed on drop.
struct Level;

impl Drop for Level {
    fn drop(&mut self) {
        NESTING.with(|n| n.set(n.get().saturating_sub(1)));
    }
}

fn descend(input: &mut &str) -> ModalResult<Level> {
    let depth = NESTING.with(Cell::get);
    if depth >= MAX_NESTING {
        return reject(input, "nesting depth");
    }
    NESTING.with(|n| n.set(depth + 1));
    Ok(Level)
}

fn check_chain<T>(input: &mut &str, links: &[T]) -> ModalResult<()> {
    if links.len() > MAX_CHAIN {
        return reject(input, "operator chain");
    }
    Ok(())
}

// -- Literals ---------------------------------------------------------------

fn number(input: &mut &str) -> ModalResult<Value> {
    let text = (
        digit1,
        opt(('.', digit0)),
        opt((one_of(['e', 'E']), opt(one_of(['+', '-'])), digit1)),
    )
        .take()
        .parse_next(input)?;
    if text.contains(['.', 'e', 'E']) {
        let f: f64 = text
            .parse()
            .map_err(|_| ErrMode::from_input(input).cut())?;
        Number::from_f64(f)
            .map(Value::Number)
            .ok_or_else(|| ErrMode::from_input(input).cut())
    } else {
        text.parse::<i64>()
            .map(Value::from)
            .map_err(|_| ErrMode::from_input(input).cut())
    }
}

pub(crate) fn string_literal(input: &mut &str) -> ModalResult<String> {
    let quote = one_of(['"', '\'']).parse_next(input)?;
    let mut s = String::new();
    loop {
        let ch = cut_err(any)
            .context(StrContext::Expected(StrContextValue::Description(
                "closing quote",
            )))
            .parse_next(input)?;
        match ch {
            c if c == quote => return Ok(s),
            '\\' => {
                let esc = cut_err(any).parse_next(input)?;
                match esc {
                    'n' => s.push('\n'),
                    't' => s.push('\t'),
                    'r' => s.push('\r'),
                    '\\' | '"' | '\'' => s.push(esc),
                    other => {
                        s.push('\\');
                        s.push(other);
                    }
                }
            }
            c => s.push(c),
        }
    }
}

fn format_string(input: &mut &str) -> ModalResult<Expr> {
    terminated('f', peek(one_of(['"', '\'']))).parse_next(input)?;
    let raw = string_literal.parse_next(input)?;
    match format_parts(&raw) {
        Ok(parts) => Ok(Expr::Format(parts)),
        Err(_) => reject(input, "f-string"),
    }
}

fn format_parts(raw: &str) -> Result<Vec<FormatPart>, ParseError> {
    let mut parts = Vec::new();
    let mut text = String::new();
    let mut rest = raw;
    while let Some(c) = rest.chars().next() {
        if rest.starts_with("{{") || rest.starts_with("}}") {
            text.push(c);
            rest = &rest[2..];
        } else if c == '{' {
            let close = matching_close(rest, 0)
                .ok_or_else(|| ParseError::new("unclosed `{` in f-string"))?;
            if !text.is_empty() {
                parts.push(FormatPart::Text(std::mem::take(&mut text)));
            }
            parts.push(FormatPart::Expr(parse(&rest[1..close])?));
            rest = &rest[close + 1..];
        } else if c == '}' {
            return Err(ParseError::new("single `}` in f-string"));
        } else {
            text.push(c);
            rest = &rest[c.len_utf8()..];
        }
    }
    if !text.is_empty() {
        parts.push(FormatPart::Text(text));
    }
    Ok(parts)
}

fn name_or_constant(input: &mut &str) -> ModalResult<Expr> {
    let checkpoint = input.checkpoint();
    let word = ident.parse_next(input)?;
    Ok(match word {
        "true" | "True" => Expr::Literal(Value::Bool(true)),
        "false" | "False" => Expr::Literal(Value::Bool(false)),
        "null" | "None" => Expr::Literal(Value::Null),
        w if is_reserved(w) => {
            input.reset(&checkpoint);
            return Err(ErrMode::from_input(input));
        }
        w => Expr::Name(w.to_owned()),
    })
}

fn list_literal(input: &mut &str) -> ModalResult<Expr> {
    '['.parse_next(input)?;
    let items: Vec<Expr> = separated(0.., ternary, (ws, ',')).parse_next(input)?;
    (ws, opt(','), ws).parse_next(input)?;
    cut_err(']')
        .context(StrContext::Expected(StrContextValue::CharLiteral(']')))
        .parse_next(input)?;
    Ok(Expr::List(items))
}

fn object_entry(input: &mut &str) -> ModalResult<(Expr, Expr)> {
    let key = ternary.parse_next(input)?;
    ws.parse_next(input)?;
    cut_err(':')
        .context(StrContext::Expected(StrContextValue::CharLiteral(':')))
        .parse_next(input)?;
    let value = cut_err(ternary).parse_next(input)?;
    Ok((key, value))
}

fn object_literal(input: &mut &str) -> ModalResult<Expr> {
    '{'.parse_next(input)?;
    let entries: Vec<(Expr, Expr)> =
        separated(0.., object_entry, (ws, ',')).parse_next(input)?;
    (ws, opt(','), ws).parse_next(input)?;
    cut_err('}')
        .context(StrContext::Expected(StrContextValue::CharLiteral('}')))
        .parse_next(input)?;
    Ok(Expr::Object(entries))
}

fn atom(input: &mut &str) -> ModalResult<Expr> {
    ws.parse_next(input)?;
    alt((
        number.map(Expr::Literal),
        format_string,
        string_literal.map(|s| Expr::Literal(Value::String(s))),
        delimited(('(', ws), cut_err(ternary), (ws, cut_err(')'))),
        list_literal,
        object_literal,
        name_or_constant,
    ))
    .context(StrContext::Expected(StrContextValue::Description(
        "expression",
    )))
    .parse_next(input)
}

// -- Postfix: attributes, indexing, calls -----------------------------------

fn call_args(input: &mut &str) -> ModalResult<Vec<Expr>> {
    '('.parse_next(input)?;
    let args: Vec<Expr> = separated(0.., ternary, (ws, ',')).parse_next(input)?;
    (ws, opt(','), ws).parse_next(input)?;
    cut_err(')')
        .context(StrContext::Expected(StrContextValue::CharLiteral(')')))
        .parse_next(input)?;
    Ok(args)
}

fn postfix(input: &mut &str) -> ModalResult<Expr> {
    let mut expr = atom.parse_next(input)?;
    let mut links = 0;
    loop {
        if links > MAX_CHAIN {
            return reject(input, "accessor chain");
        }
        links += 1;
        if opt('.').parse_next(input)?.is_some() {
            let name = cut_err(ident)
                .context(StrContext::Expected(StrContextValue::Description(
                    "attribute name",
                )))
                .parse_next(input)?;
            if !input.starts_with('(') {
                expr = Expr::Attr(Box::new(expr), name.to_owned());
                continue;
            }
            let args = call_args.parse_next(input)?;
            let qualified = expr.dotted_path().map(|mut path| {
                path.push(name);
                path.join(".")
            });
            expr = if let Some(builtin) = qualified.as_deref().and_then(Builtin::from_name) {
                Expr::Call(builtin, args)
            } else if let Some(method) = ValueMethod::from_name(name) {
                Expr::Method {
                    target: Box::new(expr),
                    method,
                    args,
                }
            } else {
                return reject(input, "method call");
            };
        } else if input.starts_with('[') {
            let index = delimited(('[', ws), cut_err(ternary), (ws, cut_err(']')))
                .parse_next(input)?;
            expr = Expr::Index(Box::new(expr), Box::new(index));
        } else if input.starts_with('(') {
            let builtin = match &expr {
                Expr::Name(name) => Builtin::from_name(name),
                _ => None,
            };
            let Some(builtin) = builtin else {
                return reject(input, "function call");
            };
            let args = call_args.parse_next(input)?;
            expr = Expr::Call(builtin, args);
        } else {
            return Ok(expr);
        }
    }
}

// -- Operators (precedence: ternary < or < and < not < compare < + < * < unary)

fn unary(input: &mut &str) -> ModalResult<Expr> {
    ws.parse_next(input)?;
    let sign = opt(alt(('-'.value(UnaryOp::Neg), '+'.value(UnaryOp::Pos)))).parse_next(input)?;
    let Some(op) = sign else {
        return postfix(input);
    };
    let _level = descend(input)?;
    let inner = cut_err(unary).parse_next(input)?;
    if let (UnaryOp::Neg, Expr::Literal(Value::Number(n))) = (op, &inner) {
        if let Some(negated) = negate_literal(n) {
            return Ok(Expr::Literal(negated));
        }
    }
    Ok(Expr::Unary(op, Box::new(inner)))
}

fn negate_literal(n: &Number) -> Option<Value> {
    match n.as_i64() {
        Some(i) => i.checked_neg().map(Value::from),
        None => n.as_f64().and_then(|f| Number::from_f64(-f)).map(Value::Number),
    }
}

fn term(input: &mut &str) -> ModalResult<Expr> {
    let first = unary(input)?;
    let rest: Vec<(BinaryOp, Expr)> = repeat(
        0..,
        (
            preceded(
                ws,
                alt((
                    "//".value(BinaryOp::FloorDiv),
                    '*'.value(BinaryOp::Mul),
                    '/'.value(BinaryOp::Div),
                    '%'.value(BinaryOp::Mod),
                )),
            ),
            cut_err(unary),
        ),
    )
    .parse_next(input)?;
    check_chain(input, &rest)?;
    Ok(rest
        .into_iter()
        .fold(first, |acc, (op, r)| Expr::Binary(op, Box::new(acc), Box::new(r))))
}

fn additive(input: &mut &str) -> ModalResult<Expr> {
    let first = term(input)?;
    let rest: Vec<(BinaryOp, Expr)> = repeat(
        0..,
        (
            preceded(
                ws,
                alt(('+'.value(BinaryOp::Add), '-'.value(BinaryOp::Sub))),
            ),
            cut_err(term),
        ),
    )
    .parse_next(input)?;
    check_chain(input, &rest)?;
    Ok(rest
        .into_iter()
        .fold(first, |acc, (op, r)| Expr::Binary(op, Box::new(acc), Box::new(r))))
}

fn compare_op(input: &mut &str) -> ModalResult<CompareOp> {
    alt((
        "==".value(CompareOp::Eq),
        "!=".value(CompareOp::Neq),
        ">=".value(CompareOp::Gte),
        "<=".value(CompareOp::Lte),
        '>'.value(CompareOp::Gt),
        '<'.value(CompareOp::Lt),
        (keyword("not"), ws, keyword("in")).value(CompareOp::NotIn),
        keyword("in").value(CompareOp::In),
        (keyword("is"), ws, keyword("not")).value(CompareOp::IsNot),
        keyword("is").value(CompareOp::Is),
    ))
    .parse_next(input)
}

/// `a < b < c` reads as `a < b and b < c`.
fn comparison(input: &mut &str) -> ModalResult<Expr> {
    let first = additive(input)?;
    let rest: Vec<(CompareOp, Expr)> =
        repeat(0.., (preceded(ws, compare_op), cut_err(additive))).parse_next(input)?;
    check_chain(input, &rest)?;

    let mut left = first;
    let mut chain: Option<Expr> = None;
    for (op, right) in rest {
        let link = Expr::Compare {
            left: Box::new(left),
            op,
            right: Box::new(right.clone()),
        };
        chain = Some(match chain {
            None => link,
            Some(acc) => Expr::And(Box::new(acc), Box::new(link)),
        });
        left = right;
    }
    Ok(chain.unwrap_or(left))
}

fn not_expr(input: &mut &str) -> ModalResult<Expr> {
    ws.parse_next(input)?;
    let negated = opt(alt((keyword("not"), terminated('!', not('=')).void())))
        .parse_next(input)?;
    if negated.is_some() {
        let _level = descend(input)?;
        let inner = cut_err(not_expr).parse_next(input)?;
        Ok(Expr::Not(Box::new(inner)))
    } else {
        comparison(input)
    }
}

fn and_expr(input: &mut &str) -> ModalResult<Expr> {
    let first = not_expr(input)?;
    let rest: Vec<Expr> = repeat(
        0..,
        preceded((ws, alt((keyword("and"), "&&".void()))), cut_err(not_expr)),
    )
    .parse_next(input)?;
    check_chain(input, &rest)?;
    Ok(rest
        .into_iter()
        .fold(first, |acc, r| Expr::And(Box::new(acc), Box::new(r))))
}

fn or_expr(input: &mut &str) -> ModalResult<Expr> {
    let first = and_expr(input)?;
    let rest: Vec<Expr> = repeat(
        0..,
        preceded((ws, alt((keyword("or"), "||".void()))), cut_err(and_expr)),
    )
    .parse_next(input)?;
    check_chain(input, &rest)?;
    Ok(rest
        .into_iter()
        .fold(first, |acc, r| Expr::Or(Box::new(acc), Box::new(r))))
}

/// A full expression, one nesting level below the caller.
fn ternary(input: &mut &str) -> ModalResult<Expr> {
    let _level = descend(input)?;
    let expr = conditional(input)?;
    if expr.depth() > MAX_TREE_DEPTH {
        return reject(input, "nesting depth");
    }
    Ok(expr)
}

fn conditional(input: &mut &str) -> ModalResult<Expr> {
    let then = or_expr(input)?;
    let checkpoint = input.checkpoint();
    ws.parse_next(input)?;
    if opt(keyword("if")).parse_next(input)?.is_none() {
        input.reset(&checkpoint);
        return Ok(then);
    }
    let condition = cut_err(or_expr).parse_next(input)?;
    ws.parse_next(input)?;
    cut_err(keyword("else"))
        .context(StrContext::Expected(StrContextValue::StringLiteral("else")))
        .parse_next(input)?;
    let otherwise = cut_err(ternary).parse_next(input)?;
    Ok(Expr::Conditional {
        condition: Box::new(condition),
        then: Box::new(then),
        otherwise: Box::new(otherwise),
    })
}

/// Parse a complete expression.
pub(crate) fn parse(source: &str) -> Result<Expr, ParseError> {
    delimited(ws, ternary, ws).parse(source).map_err(|e| {
        let detail = e.inner().to_string().replace('\n', "; ");
        let detail = if detail.is_empty() {
            "unexpected input".to_owned()
        } else {
            detail
        };
        ParseError::new(format!("`{source}`: {detail}")).at(e.offset())
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn shown(source: &str) -> String {
        parse(source).unwrap().to_string()
    }

    #[test]
    fn precedence() {
        assert_eq!(shown("a or b and not c"), "(a or (b and (not c)))");
        assert_eq!(shown("1 + 2 * 3"), "(1 + (2 * 3))");
        assert_eq!(shown("(1 + 2) * 3"), "((1 + 2) * 3)");
        assert_eq!(shown("a == 1 and b != 2"), "((a == 1) and (b != 2))");
    }

    #[test]
    fn symbolic_boolean_operators() {
        assert_eq!(shown("a && b || !c"), "((a and b) or (not c))");
        assert_eq!(shown("a != b"), "(a != b)");
    }

    #[test]
    fn membership_and_identity() {
        assert_eq!(shown("x in [1, 2]"), "(x in [1, 2])");
        assert_eq!(shown("x not in y"), "(x not in y)");
        assert_eq!(shown("x is None"), "(x is null)");
        assert_eq!(shown("x is not None"), "(x is not null)");
    }

    #[test]
    fn chained_comparison() {
        assert_eq!(shown("0 < x <= 10"), "((0 < x) and (x <= 10))");
    }

    #[test]
    fn conditional_expression() {
        assert_eq!(shown("'a' if x else 'b'"), "(\"a\" if x else \"b\")");
    }

    #[test]
    fn literals() {
        assert_eq!(parse("42").unwrap(), Expr::Literal(json!(42)));
        assert_eq!(parse("-7").unwrap(), Expr::Literal(json!(-7)));
        assert_eq!(parse("3.5").unwrap(), Expr::Literal(json!(3.5)));
        assert_eq!(parse("-0.5").unwrap(), Expr::Literal(json!(-0.5)));
        assert_eq!(parse("1e3").unwrap(), Expr::Literal(json!(1000.0)));
        assert_eq!(parse("'it\\'s'").unwrap(), Expr::Literal(json!("it's")));
        assert_eq!(parse("True").unwrap(), Expr::Literal(json!(true)));
        assert_eq!(parse("null").unwrap(), Expr::Literal(Value::Null));
        assert_eq!(
            parse("{'a': [1, 2,], \"b\": None}").unwrap(),
            Expr::Object(vec![
                (
                    Expr::Literal(json!("a")),
                    Expr::List(vec![Expr::Literal(json!(1)), Expr::Literal(json!(2))])
                ),
                (Expr::Literal(json!("b")), Expr::Literal(Value::Null)),
            ])
        );
    }

    #[test]
    fn postfix_chains() {
        assert_eq!(
            parse("temp_result.data").unwrap().dotted_path(),
            Some(vec!["temp_result", "data"])
        );
        assert_eq!(shown("f['app.name'].value"), "f[\"app.name\"].value");
        assert_eq!(shown("name.strip().upper()"), "name.strip().upper()");
    }

    #[test]
    fn whitelisted_calls() {
        assert_eq!(
            parse("len(items)").unwrap(),
            Expr::Call(Builtin::Len, vec![Expr::Name("items".into())])
        );
        assert!(matches!(
            parse("re.match('^a', name)").unwrap(),
            Expr::Call(Builtin::ReMatch, _)
        ));
        assert!(matches!(
            parse("sort([3, 1])").unwrap(),
            Expr::Call(Builtin::Sorted, _)
        ));
    }

    #[test]
    fn calls_outside_whitelist_are_rejected() {
        assert!(parse("open('x')").is_err());
        assert!(parse("__import__('os')").is_err());
        assert!(parse("name.__class__()").is_err());
        assert!(parse("os.system('ls')").is_err());
        assert!(parse("(lambda)(1)").is_err());
    }

    #[test]
    fn format_strings() {
        assert_eq!(
            parse("f'{a}-{b + 1}'").unwrap(),
            Expr::Format(vec![
                FormatPart::Expr(Expr::Name("a".into())),
                FormatPart::Text("-".into()),
                FormatPart::Expr(Expr::Binary(
                    BinaryOp::Add,
                    Box::new(Expr::Name("b".into())),
                    Box::new(Expr::Literal(json!(1)))
                )),
            ])
        );
        assert_eq!(
            parse("f'{{x}}'").unwrap(),
            Expr::Format(vec![FormatPart::Text("{x}".into())])
        );
        assert!(parse("f'{a'").is_err());
    }

    #[test]
    fn unicode_names() {
        assert_eq!(parse("地区").unwrap(), Expr::Name("地区".into()));
    }

    #[test]
    fn malformed_input() {
        for bad in ["", "a ==", "1 +", "(a", "[1, 2", "'open", "a b", "x if y", "not"] {
            let err = parse(bad).unwrap_err();
            assert!(err.to_string().starts_with("parse error"), "{bad}: {err}");
            assert!(err.message().starts_with(&format!("`{bad}`: ")), "{bad}: {err}");
            let offset = err.offset().expect("grammar errors carry an offset");
            assert!(offset <= bad.len(), "{bad}: offset {offset}");
        }
    }

    #[test]
    fn nesting_is_bounded() {
        let within = MAX_NESTING - 1;
        let ok = format!("{}1{}", "(".repeat(within), ")".repeat(within));
        assert_eq!(parse(&ok).unwrap(), Expr::Literal(json!(1)));

        let too_deep = format!("{}1{}", "(".repeat(MAX_NESTING), ")".repeat(MAX_NESTING));
        assert!(parse(&too_deep).unwrap_err().message().contains("nesting depth"));

        for bad in [
            format!("{}1{}", "(".repeat(1_000), ")".repeat(1_000)),
            format!("{}1", "(".repeat(50_000)),
            format!("{}1", "[".repeat(50_000)),
            format!("{}true", "not ".repeat(50_000)),
            format!("{}true", "!".repeat(50_000)),
            format!("{}1", "-".repeat(50_000)),
            format!("{}a", "a if b else ".repeat(50_000)),
        ] {
            let err = parse(&bad).unwrap_err();
            assert!(err.message().contains("nesting depth"), "{err}");
        }
        let deep = format!("{}1{}", "(".repeat(1_000), ")".repeat(1_000));
        assert!(parse(&format!("f'{{{deep}}}'")).is_err());
    }

    #[test]
    fn operator_chains_are_bounded() {
        let operands = |n: usize, op: &str| vec!["x"; n].join(op);
        assert!(parse(&operands(MAX_CHAIN + 1, " + ")).is_ok());
        assert!(parse(&operands(MAX_CHAIN + 1, " and ")).is_ok());

        for op in [" + ", " * ", " < ", " and ", " or "] {
            let err = parse(&operands(MAX_CHAIN + 2, op)).unwrap_err();
            assert!(err.message().contains("operator chain"), "{op}: {err}");
            assert!(parse(&operands(50_000, op)).is_err());
        }

        assert!(parse(&format!("a{}", ".b".repeat(MAX_CHAIN))).is_ok());
        assert!(parse(&format!("a{}", ".b".repeat(50_000))).is_err());
        assert!(parse(&format!("a{}", "[0]".repeat(50_000))).is_err());
    }

    #[test]
    fn tree_depth_is_bounded() {
        let nest = |levels: usize| {
            (0..levels).fold("1".to_owned(), |inner, _| {
                format!("({inner}){}", " + 1".repeat(20))
            })
        };
        let shallow = parse(&nest(5)).unwrap();
        assert!(shallow.depth() <= MAX_TREE_DEPTH);
        let err = parse(&nest(10)).unwrap_err();
        assert!(err.message().contains("nesting depth"), "{err}");
    }
}
