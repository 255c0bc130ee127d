// Arithmetic expression grammar for derived variables
//
// Precedence, lowest first:
//   expr   := term (('+' | '-') term)*
//   term   := factor (('*' | '/' | '//' | '%') factor)*
//   factor := ('+' | '-') factor | power
//   power  := atom ('**' factor)?
//   atom   := number | name '(' args ')' | name | '(' expr ')'
//
// Anything outside this grammar (attribute access, subscripts, comparisons,
// boolean operators, keyword arguments, ...) is a parse error.

use super::ast::{Assignment, BinaryOp, Expr, UnaryOp};
use super::lexer::{identifier, number_literal, ws};
use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::char,
    combinator::{all_consuming, map, not, value},
    multi::{many0, separated_list0},
    sequence::{delimited, pair, preceded, terminated},
    IResult,
};

fn additive_op(input: &str) -> IResult<&str, BinaryOp> {
    alt((
        value(BinaryOp::Add, char('+')),
        value(BinaryOp::Sub, char('-')),
    ))(input)
}

fn multiplicative_op(input: &str) -> IResult<&str, BinaryOp> {
    alt((
        value(BinaryOp::FloorDiv, tag("//")),
        value(BinaryOp::Mul, terminated(char('*'), not(char('*')))),
        value(BinaryOp::Div, char('/')),
        value(BinaryOp::Mod, char('%')),
    ))(input)
}

/// Parse a full expression (may be followed by unparsed input)
pub fn parse_expr(input: &str) -> IResult<&str, Expr> {
    let (input, first) = term(input)?;
    let (input, rest) = many0(pair(ws(additive_op), term))(input)?;
    Ok((
        input,
        rest.into_iter()
            .fold(first, |acc, (op, rhs)| Expr::binary(op, acc, rhs)),
    ))
}

fn term(input: &str) -> IResult<&str, Expr> {
    let (input, first) = factor(input)?;
    let (input, rest) = many0(pair(ws(multiplicative_op), factor))(input)?;
    Ok((
        input,
        rest.into_iter()
            .fold(first, |acc, (op, rhs)| Expr::binary(op, acc, rhs)),
    ))
}

fn factor(input: &str) -> IResult<&str, Expr> {
    alt((
        map(
            pair(
                ws(alt((
                    value(UnaryOp::Neg, char('-')),
                    value(UnaryOp::Pos, char('+')),
                ))),
                factor,
            ),
            |(op, operand)| Expr::unary(op, operand),
        ),
        power,
    ))(input)
}

/// `**` is right-associative and binds tighter than a unary minus on its left
fn power(input: &str) -> IResult<&str, Expr> {
    let (input, base) = atom(input)?;
    let (input, exponent) = nom::combinator::opt(preceded(ws(tag("**")), factor))(input)?;
    Ok((
        input,
        match exponent {
            Some(exp) => Expr::binary(BinaryOp::Pow, base, exp),
            None => base,
        },
    ))
}

fn atom(input: &str) -> IResult<&str, Expr> {
    ws(alt((
        map(number_literal, Expr::Number),
        call,
        map(identifier, Expr::Name),
        delimited(char('('), parse_expr, char(')')),
    )))(input)
}

fn call(input: &str) -> IResult<&str, Expr> {
    let (input, function) = identifier(input)?;
    let (input, args) = delimited(
        ws(char('(')),
        separated_list0(ws(char(',')), parse_expr),
        ws(char(')')),
    )(input)?;
    Ok((input, Expr::Call { function, args }))
}

/// Parse `output = expression`
pub fn parse_assignment(input: &str) -> IResult<&str, Assignment> {
    let (input, output) = ws(identifier)(input)?;
    let (input, _) = terminated(char('='), not(char('=')))(input)?;
    let (input, expr) = parse_expr(input)?;
    Ok((input, Assignment { output, expr }))
}

/// Longest formula accepted, in bytes.
pub const MAX_FORMULA_LEN: usize = 4096;

/// Deepest parenthesis nesting, longest run of sign operators and most
/// `**` operators accepted in one formula.
pub const MAX_NESTING: usize = 64;

/// Reject input whose nesting would recurse past [`MAX_NESTING`] levels
/// before any grammar rule runs.
fn check_nesting(input: &str) -> Result<(), String> {
    if input.len() > MAX_FORMULA_LEN {
        return Err(format!("formula longer than {} bytes", MAX_FORMULA_LEN));
    }
    let mut depth = 0usize;
    let mut signs = 0usize;
    let mut prev = ' ';
    let mut powers = 0usize;
    for c in input.chars().filter(|c| !c.is_whitespace()) {
        match c {
            '(' => {
                depth += 1;
                if depth > MAX_NESTING {
                    return Err(format!("parentheses nested deeper than {}", MAX_NESTING));
                }
            }
            ')' => depth = depth.saturating_sub(1),
            '*' if prev == '*' => {
                powers += 1;
                if powers > MAX_NESTING {
                    return Err(format!("more than {} '**' operators", MAX_NESTING));
                }
            }
            _ => {}
        }
        if c == '+' || c == '-' {
            signs += 1;
            if signs > MAX_NESTING {
                return Err(format!("more than {} consecutive sign operators", MAX_NESTING));
            }
        } else {
            signs = 0;
        }
        // "***" is one power followed by a stray '*'
        prev = if c == '*' && prev == '*' { ' ' } else { c };
    }
    Ok(())
}

/// Parse a complete expression, rejecting any trailing input.
pub fn parse_expression(input: &str) -> Result<Expr, String> {
    check_nesting(input)?;
    all_consuming(ws(parse_expr))(input)
        .map(|(_, expr)| expr)
        .map_err(describe_error)
}

/// Parse a complete assignment, rejecting any trailing input.
pub fn parse_assignment_complete(input: &str) -> Result<Assignment, String> {
    check_nesting(input)?;
    all_consuming(ws(parse_assignment))(input)
        .map(|(_, assignment)| assignment)
        .map_err(describe_error)
}

fn describe_error(err: nom::Err<nom::error::Error<&str>>) -> String {
    match err {
        nom::Err::Error(e) | nom::Err::Failure(e) => {
            let rest: String = e.input.chars().take(20).collect();
            if rest.is_empty() {
                "unexpected end of formula".to_string()
            } else {
                format!("unsupported syntax at '{}'", rest)
            }
        }
        nom::Err::Incomplete(_) => "incomplete formula".to_string(),
    }
}
