// Ratio formula grammar: A/B or A/B*K

use super::ast::{Operand, Ratio};
use super::lexer::{identifier, number_literal, ws};
use nom::{
    branch::alt,
    character::complete::char,
    combinator::{all_consuming, map, opt},
    sequence::preceded,
    IResult,
};

fn operand(input: &str) -> IResult<&str, Operand> {
    ws(alt((
        map(number_literal, Operand::Literal),
        map(identifier, Operand::Field),
    )))(input)
}

pub fn parse_ratio(input: &str) -> IResult<&str, Ratio> {
    let (input, numerator) = operand(input)?;
    let (input, denominator) = preceded(char('/'), operand)(input)?;
    let (input, multiplier) = opt(preceded(char('*'), operand))(input)?;
    Ok((
        input,
        Ratio {
            numerator,
            denominator,
            multiplier,
        },
    ))
}

/// Parse a complete ratio formula, rejecting trailing input.
pub fn parse_ratio_complete(input: &str) -> Result<Ratio, String> {
    all_consuming(parse_ratio)(input)
        .map(|(_, ratio)| ratio)
        .map_err(|_| format!("expected 'A/B' or 'A/B*K', got '{}'", input.trim()))
}
