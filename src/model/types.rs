//! Type names as they appear in source code and in descriptors.

use std::fmt;

use crate::error::Result;
use crate::parser;

/// The Java primitive types, plus `void` for method returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Primitive {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    Void,
}

impl Primitive {
    pub const ALL: [Primitive; 9] = [Primitive::Boolean, Primitive::Byte, Primitive::Char,
                                     Primitive::Short, Primitive::Int, Primitive::Long,
                                     Primitive::Float, Primitive::Double, Primitive::Void];

    pub fn from_keyword(keyword: &str) -> Option<Primitive> {
        Primitive::ALL.iter().cloned().find(|p| p.keyword() == keyword)
    }

    pub fn keyword(self) -> &'static str {
        match self {
            Primitive::Boolean => "boolean",
            Primitive::Byte => "byte",
            Primitive::Char => "char",
            Primitive::Short => "short",
            Primitive::Int => "int",
            Primitive::Long => "long",
            Primitive::Float => "float",
            Primitive::Double => "double",
            Primitive::Void => "void",
        }
    }

    pub fn descriptor(self) -> char {
        match self {
            Primitive::Boolean => 'Z',
            Primitive::Byte => 'B',
            Primitive::Char => 'C',
            Primitive::Short => 'S',
            Primitive::Int => 'I',
            Primitive::Long => 'J',
            Primitive::Float => 'F',
            Primitive::Double => 'D',
            Primitive::Void => 'V',
        }
    }

    /// The class used to box values of this type.
    pub fn wrapper_class(self) -> &'static str {
        match self {
            Primitive::Boolean => "java.lang.Boolean",
            Primitive::Byte => "java.lang.Byte",
            Primitive::Char => "java.lang.Character",
            Primitive::Short => "java.lang.Short",
            Primitive::Int => "java.lang.Integer",
            Primitive::Long => "java.lang.Long",
            Primitive::Float => "java.lang.Float",
            Primitive::Double => "java.lang.Double",
            Primitive::Void => "java.lang.Void",
        }
    }

    pub fn from_wrapper_class(name: &str) -> Option<Primitive> {
        Primitive::ALL.iter().cloned().find(|p| *p != Primitive::Void && p.wrapper_class() == name)
    }

    /// The name of the wrapper method that extracts the primitive value, e.g. `intValue`.
    pub fn unbox_method(self) -> String {
        format!("{}Value", self.keyword())
    }

    /// The stack representation of this type; `None` for `void`.
    pub fn kind(self) -> Option<ValueKind> {
        match self {
            Primitive::Boolean | Primitive::Byte | Primitive::Char | Primitive::Short
                | Primitive::Int => Some(ValueKind::Int),
            Primitive::Long => Some(ValueKind::Long),
            Primitive::Float => Some(ValueKind::Float),
            Primitive::Double => Some(ValueKind::Double),
            Primitive::Void => None,
        }
    }
}

/// The computational kind of a value on the operand stack or in a local variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Int,
    Long,
    Float,
    Double,
    Reference,
}

impl ValueKind {
    /// `long` and `double` values are category 2: they take two local variable slots.
    pub fn is_wide(self) -> bool {
        matches!(self, ValueKind::Long | ValueKind::Double)
    }

    pub fn slots(self) -> u16 {
        if self.is_wide() { 2 } else { 1 }
    }

    /// Mnemonic prefix used by the disassembler (`i`, `l`, `f`, `d`, `a`).
    pub fn prefix(self) -> char {
        match self {
            ValueKind::Int => 'i',
            ValueKind::Long => 'l',
            ValueKind::Float => 'f',
            ValueKind::Double => 'd',
            ValueKind::Reference => 'a',
        }
    }
}

/// A type, named the way it is written in source: `int`, `java.lang.String`, `long[][]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeName {
    Primitive(Primitive),
    Class(String),
    Array(Box<TypeName>),
}

impl TypeName {
    /// Parses a source-level type name such as `java.lang.String[]` or `int`.
    pub fn parse(name: &str) -> Result<TypeName> {
        parser::parse_type_name(name)
    }

    /// Parses a JVM field descriptor such as `[Ljava/lang/String;`.
    pub fn from_descriptor(descriptor: &str) -> Result<TypeName> {
        parser::parse_field_descriptor(descriptor)
    }

    pub fn class(name: &str) -> TypeName {
        TypeName::Class(name.to_string())
    }

    pub fn object() -> TypeName {
        TypeName::class("java.lang.Object")
    }

    pub fn string() -> TypeName {
        TypeName::class("java.lang.String")
    }

    pub fn void() -> TypeName {
        TypeName::Primitive(Primitive::Void)
    }

    pub fn int() -> TypeName {
        TypeName::Primitive(Primitive::Int)
    }

    pub fn boolean() -> TypeName {
        TypeName::Primitive(Primitive::Boolean)
    }

    pub fn array_of(component: TypeName) -> TypeName {
        TypeName::Array(Box::new(component))
    }

    pub fn as_primitive(&self) -> Option<Primitive> {
        match *self {
            TypeName::Primitive(p) => Some(p),
            _ => None,
        }
    }

    pub fn is_primitive(&self) -> bool {
        self.as_primitive().is_some()
    }

    pub fn is_void(&self) -> bool {
        self.as_primitive() == Some(Primitive::Void)
    }

    pub fn component_type(&self) -> Option<&TypeName> {
        match *self {
            TypeName::Array(ref component) => Some(component),
            _ => None,
        }
    }

    /// The stack kind of values of this type; `None` for `void`.
    pub fn kind(&self) -> Option<ValueKind> {
        match *self {
            TypeName::Primitive(p) => p.kind(),
            TypeName::Class(_) | TypeName::Array(_) => Some(ValueKind::Reference),
        }
    }

    pub fn is_wide(&self) -> bool {
        self.kind().map_or(false, ValueKind::is_wide)
    }

    /// The name under which the class loader knows this type. Arrays use their source form.
    pub fn class_name(&self) -> String {
        match *self {
            TypeName::Class(ref name) => name.clone(),
            _ => self.to_string(),
        }
    }

    /// The reference type used to hold a value of this type: primitives map to their wrappers.
    pub fn boxed(&self) -> TypeName {
        match *self {
            TypeName::Primitive(p) => TypeName::class(p.wrapper_class()),
            _ => self.clone(),
        }
    }

    pub fn descriptor(&self) -> String {
        match *self {
            TypeName::Primitive(p) => p.descriptor().to_string(),
            TypeName::Class(ref name) => format!("L{};", name.replace('.', "/")),
            TypeName::Array(ref component) => format!("[{}", component.descriptor()),
        }
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            TypeName::Primitive(p) => write!(f, "{}", p.keyword()),
            TypeName::Class(ref name) => write!(f, "{}", name),
            TypeName::Array(ref component) => write!(f, "{}[]", component),
        }
    }
}

impl From<Primitive> for TypeName {
    fn from(primitive: Primitive) -> TypeName {
        TypeName::Primitive(primitive)
    }
}

/// Renders the descriptor of a method with the given argument and return types.
pub fn method_descriptor(argument_types: &[TypeName], return_type: &TypeName) -> String {
    let mut descriptor = String::from("(");
    for argument in argument_types {
        descriptor.push_str(&argument.descriptor());
    }
    descriptor.push(')');
    descriptor.push_str(&return_type.descriptor());
    descriptor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptors() {
        assert_eq!("I", TypeName::int().descriptor());
        assert_eq!("[Ljava/lang/String;", TypeName::array_of(TypeName::string()).descriptor());
        assert_eq!("(I[J)V",
                   method_descriptor(&[TypeName::int(),
                                       TypeName::array_of(Primitive::Long.into())],
                                     &TypeName::void()));
    }

    #[test]
    fn source_names() {
        let ty = TypeName::array_of(TypeName::array_of(TypeName::string()));
        assert_eq!("java.lang.String[][]", ty.to_string());
        assert_eq!(Some(ValueKind::Reference), ty.kind());
        assert!(TypeName::Primitive(Primitive::Double).is_wide());
        assert_eq!(None, TypeName::void().kind());
    }

    #[test]
    fn wrappers() {
        assert_eq!(Some(Primitive::Int), Primitive::from_wrapper_class("java.lang.Integer"));
        assert_eq!(None, Primitive::from_wrapper_class("java.lang.Void"));
        assert_eq!("booleanValue", Primitive::Boolean.unbox_method());
        assert_eq!(TypeName::class("java.lang.Character"),
                   TypeName::Primitive(Primitive::Char).boxed());
    }
}
