//! Parsers for the textual forms of types and methods.
//!
//! Three notations are understood:
//!
//! * source-level type names: `int`, `java.lang.String`, `long[][]`, `java.lang.Object...`
//! * JVM descriptors: `I`, `[Ljava/lang/String;`, `(IJ)V`
//! * method signatures: `public int compute(int count, java.lang.String[] names) throws
//!   java.io.IOException`
//!
//! # Examples
//!
//! ```
//! use rust_plastic::model::TypeName;
//! use rust_plastic::parser::parse_type_name;
//!
//! let ty = parse_type_name("java.lang.String[]").unwrap();
//! assert_eq!(TypeName::array_of(TypeName::string()), ty);
//! ```

use nom::branch::alt;
use nom::bytes::complete::{tag, take_while, take_while1};
use nom::character::complete::{char, multispace0, multispace1};
use nom::combinator::{all_consuming, map, opt, recognize, value};
use nom::multi::{many0, separated_list0, separated_list1};
use nom::sequence::{delimited, pair, preceded, terminated, tuple};
use nom::{Finish, IResult};

use crate::error::{Error, Result};
use crate::model::access_flags;
use crate::model::method::MethodDescription;
use crate::model::types::{Primitive, TypeName};

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        take_while1(|c: char| c.is_alphabetic() || c == '_' || c == '$'),
        take_while(|c: char| c.is_alphanumeric() || c == '_' || c == '$'),
    ))(input)
}

fn qualified_name(input: &str) -> IResult<&str, &str> {
    recognize(separated_list1(char('.'), identifier))(input)
}

/// A source-level type name, with any number of `[]` suffixes and an optional varargs `...`.
pub fn source_type(input: &str) -> IResult<&str, TypeName> {
    let (input, name) = qualified_name(input)?;
    let (input, dimensions) = many0(preceded(multispace0, tag("[]")))(input)?;
    let (input, varargs) = opt(preceded(multispace0, tag("...")))(input)?;
    let base = match Primitive::from_keyword(name) {
        Some(primitive) => TypeName::Primitive(primitive),
        None => TypeName::Class(name.to_string()),
    };
    let depth = dimensions.len() + if varargs.is_some() { 1 } else { 0 };
    Ok((input, (0..depth).fold(base, |ty, _| TypeName::array_of(ty))))
}

/// A JVM field descriptor.
pub fn field_descriptor(input: &str) -> IResult<&str, TypeName> {
    alt((
        value(TypeName::Primitive(Primitive::Boolean), char('Z')),
        value(TypeName::Primitive(Primitive::Byte), char('B')),
        value(TypeName::Primitive(Primitive::Char), char('C')),
        value(TypeName::Primitive(Primitive::Short), char('S')),
        value(TypeName::Primitive(Primitive::Int), char('I')),
        value(TypeName::Primitive(Primitive::Long), char('J')),
        value(TypeName::Primitive(Primitive::Float), char('F')),
        value(TypeName::Primitive(Primitive::Double), char('D')),
        map(delimited(char('L'), take_while1(|c: char| c != ';'), char(';')),
            |name: &str| TypeName::Class(name.replace('/', "."))),
        map(preceded(char('['), field_descriptor), TypeName::array_of),
    ))(input)
}

fn return_descriptor(input: &str) -> IResult<&str, TypeName> {
    alt((value(TypeName::void(), char('V')), field_descriptor))(input)
}

/// A JVM method descriptor: argument types and return type.
pub fn method_descriptor(input: &str) -> IResult<&str, (Vec<TypeName>, TypeName)> {
    pair(delimited(char('('), many0(field_descriptor), char(')')), return_descriptor)(input)
}

fn modifier(input: &str) -> IResult<&str, u16> {
    let (rest, keyword) = terminated(identifier, multispace1)(input)?;
    match access_flags::from_keyword(keyword) {
        Some(flag) => Ok((rest, flag)),
        None => Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag))),
    }
}

fn parameter(input: &str) -> IResult<&str, TypeName> {
    terminated(source_type, opt(preceded(multispace1, identifier)))(input)
}

fn comma(input: &str) -> IResult<&str, char> {
    delimited(multispace0, char(','), multispace0)(input)
}

/// A method signature in source form.
pub fn method_description(input: &str) -> IResult<&str, MethodDescription> {
    let (input, modifiers) = many0(modifier)(input)?;
    let (input, (return_type, _, name)) = tuple((source_type, multispace1, identifier))(input)?;
    let (input, argument_types) = delimited(
        pair(multispace0, char('(')),
        delimited(multispace0, separated_list0(comma, parameter), multispace0),
        char(')'),
    )(input)?;
    let (input, exceptions) = opt(preceded(
        delimited(multispace1, tag("throws"), multispace1),
        separated_list1(comma, source_type),
    ))(input)?;
    let description = MethodDescription {
        modifiers: modifiers.into_iter().fold(0, |flags, flag| flags | flag),
        return_type: return_type,
        method_name: name.to_string(),
        argument_types: argument_types,
        generic_signature: None,
        checked_exception_types: exceptions.unwrap_or_default(),
    };
    Ok((input, description))
}

fn parse_complete<'a, O, F>(input: &'a str, parser: F) -> Result<O>
    where F: FnMut(&'a str) -> IResult<&'a str, O>
{
    all_consuming(delimited(multispace0, parser, multispace0))(input)
        .finish()
        .map(|(_, output)| output)
        .map_err(|e| Error::Parse {
            input: input.to_string(),
            message: format!("unexpected input at '{}' ({:?})", e.input, e.code),
        })
}

pub fn parse_type_name(input: &str) -> Result<TypeName> {
    parse_complete(input, source_type)
}

pub fn parse_field_descriptor(input: &str) -> Result<TypeName> {
    parse_complete(input, field_descriptor)
}

pub fn parse_method_descriptor(input: &str) -> Result<(Vec<TypeName>, TypeName)> {
    parse_complete(input, method_descriptor)
}

pub fn parse_method_description(input: &str) -> Result<MethodDescription> {
    parse_complete(input, method_description)
}
