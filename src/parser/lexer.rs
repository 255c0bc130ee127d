// Lexical helpers shared by the formula grammars

use nom::{
    character::complete::{char, digit0, digit1, multispace0, one_of, satisfy},
    bytes::complete::take_while,
    combinator::{map_res, opt, recognize},
    branch::alt,
    sequence::{delimited, pair, tuple},
    IResult,
};

/// Wrap a parser so that it skips surrounding whitespace
pub fn ws<'a, F, O>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

/// Parse an identifier (field or function name).
/// Unicode letters are allowed so that field names such as `出勤次数` work.
pub fn identifier(input: &str) -> IResult<&str, String> {
    let (input, name) = recognize(pair(
        satisfy(|c: char| c.is_alphabetic() || c == '_'),
        take_while(|c: char| c.is_alphanumeric() || c == '_'),
    ))(input)?;
    Ok((input, name.to_string()))
}

/// Parse an unsigned decimal literal: `12`, `1.5`, `.5`, `3.`, `2e-3`
pub fn number_literal(input: &str) -> IResult<&str, f64> {
    let exponent = tuple((one_of("eE"), opt(one_of("+-")), digit1));
    map_res(
        recognize(pair(
            alt((
                recognize(pair(digit1, opt(pair(char('.'), digit0)))),
                recognize(pair(char('.'), digit1)),
            )),
            opt(exponent),
        )),
        |s: &str| s.parse::<f64>(),
    )(input)
}
