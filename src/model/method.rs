//! Method identity: full descriptions for the class model, and name/descriptor keys for linking.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::model::access_flags;
use crate::model::types::{self, TypeName};
use crate::parser;

/// The name and descriptor of a method: what the stack machine links invocations against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodKey {
    pub name: String,
    pub descriptor: String,
}

impl MethodKey {
    pub fn new(name: &str, descriptor: &str) -> Self {
        MethodKey {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        }
    }

    pub fn of(name: &str, argument_types: &[TypeName], return_type: &TypeName) -> Self {
        MethodKey::new(name, &types::method_descriptor(argument_types, return_type))
    }

    /// Splits the descriptor into argument and return types.
    pub fn parse_descriptor(&self) -> Result<(Vec<TypeName>, TypeName)> {
        parser::parse_method_descriptor(&self.descriptor)
    }
}

impl fmt::Display for MethodKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}", self.name, self.descriptor)
    }
}

/// A full method description: modifiers, return type, name, parameter types, generic signature
/// and checked exceptions.
///
/// Descriptions sort by name, then by descending parameter count, so that overloads with more
/// parameters come first.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodDescription {
    pub modifiers: u16,
    pub return_type: TypeName,
    pub method_name: String,
    pub argument_types: Vec<TypeName>,
    pub generic_signature: Option<String>,
    pub checked_exception_types: Vec<TypeName>,
}

impl MethodDescription {
    /// A public method with no checked exceptions.
    pub fn new(return_type: TypeName, method_name: &str, argument_types: Vec<TypeName>) -> Self {
        MethodDescription {
            modifiers: access_flags::ACC_PUBLIC,
            return_type: return_type,
            method_name: method_name.to_string(),
            argument_types: argument_types,
            generic_signature: None,
            checked_exception_types: vec![],
        }
    }

    /// Parses a signature such as `public int compute(int, java.lang.String[]) throws
    /// java.io.IOException`. Parameter names are optional and ignored.
    pub fn parse(signature: &str) -> Result<Self> {
        parser::parse_method_description(signature)
    }

    pub fn with_modifiers(mut self, modifiers: u16) -> Self {
        self.modifiers = modifiers;
        self
    }

    pub fn throws(mut self, exception_type: TypeName) -> Self {
        self.checked_exception_types.push(exception_type);
        self
    }

    pub fn with_generic_signature(mut self, signature: &str) -> Self {
        self.generic_signature = Some(signature.to_string());
        self
    }

    pub fn descriptor(&self) -> String {
        types::method_descriptor(&self.argument_types, &self.return_type)
    }

    pub fn key(&self) -> MethodKey {
        MethodKey::new(&self.method_name, &self.descriptor())
    }

    /// Same name and parameter types. Two such methods cannot coexist in one class.
    pub fn same_parameters(&self, other: &MethodDescription) -> bool {
        self.method_name == other.method_name && self.argument_types == other.argument_types
    }

    pub fn is_static(&self) -> bool {
        access_flags::is_static(self.modifiers)
    }

    pub fn is_abstract(&self) -> bool {
        access_flags::is_abstract(self.modifiers)
    }

    /// Number of local variable slots taken by `this` (unless static) and the parameters.
    pub fn parameter_slots(&self) -> u16 {
        let this_slot = if self.is_static() { 0 } else { 1 };
        self.argument_types.iter()
            .filter_map(TypeName::kind)
            .fold(this_slot, |slots, kind| slots + kind.slots())
    }
}

impl Ord for MethodDescription {
    fn cmp(&self, other: &Self) -> Ordering {
        self.method_name.cmp(&other.method_name)
            .then_with(|| other.argument_types.len().cmp(&self.argument_types.len()))
            .then_with(|| self.argument_types.cmp(&other.argument_types))
            .then_with(|| self.return_type.cmp(&other.return_type))
            .then_with(|| self.checked_exception_types.cmp(&other.checked_exception_types))
            .then_with(|| self.modifiers.cmp(&other.modifiers))
            .then_with(|| self.generic_signature.cmp(&other.generic_signature))
    }
}

impl PartialOrd for MethodDescription {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for MethodDescription {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        MethodDescription::parse(s)
    }
}

impl fmt::Display for MethodDescription {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let modifiers = access_flags::to_keywords(self.modifiers);
        if !modifiers.is_empty() {
            write!(f, "{} ", modifiers)?;
        }
        let arguments: Vec<String> = self.argument_types.iter().map(|t| t.to_string()).collect();
        write!(f, "{} {}({})", self.return_type, self.method_name, arguments.join(", "))?;
        if !self.checked_exception_types.is_empty() {
            let exceptions: Vec<String> = self.checked_exception_types.iter()
                .map(|t| t.to_string())
                .collect();
            write!(f, " throws {}", exceptions.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::types::Primitive;

    #[test]
    fn ordering_by_name_then_descending_arity() {
        let mut methods = vec![
            MethodDescription::new(TypeName::void(), "run", vec![]),
            MethodDescription::new(TypeName::void(), "add", vec![TypeName::int()]),
            MethodDescription::new(TypeName::void(), "add",
                                   vec![TypeName::int(), TypeName::int()]),
        ];
        methods.sort();
        let summary: Vec<(String, usize)> = methods.iter()
            .map(|m| (m.method_name.clone(), m.argument_types.len()))
            .collect();
        assert_eq!(vec![("add".to_string(), 2), ("add".to_string(), 1), ("run".to_string(), 0)],
                   summary);
    }

    #[test]
    fn equality_covers_every_part() {
        let base = MethodDescription::new(TypeName::int(), "size", vec![]);
        assert_eq!(base, base.clone());
        assert_ne!(base, base.clone().throws(TypeName::class("java.io.IOException")));
        assert_ne!(base, base.clone().with_modifiers(access_flags::ACC_PROTECTED));
        assert_ne!(base, base.clone().with_generic_signature("()I"));
    }

    #[test]
    fn display_and_descriptor() {
        let method = MethodDescription::new(Primitive::Long.into(), "sum",
                                            vec![TypeName::array_of(Primitive::Long.into())])
            .throws(TypeName::class("java.io.IOException"));
        assert_eq!("public long sum(long[]) throws java.io.IOException", method.to_string());
        assert_eq!("([J)J", method.descriptor());
        assert_eq!(2, method.parameter_slots());
    }
}
