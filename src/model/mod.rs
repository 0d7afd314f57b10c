//! The structural model of classes: type names, method descriptions, annotations, and the
//! class definitions that are handed to the class loader.

pub mod access_flags;
pub mod annotation;
pub mod class_def;
pub mod method;
pub mod types;

pub use self::annotation::{Annotation, AnnotationAccess, ElementValue};
pub use self::class_def::{ClassDef, FieldDef, MethodBody, MethodDef};
pub use self::method::{MethodDescription, MethodKey};
pub use self::types::{Primitive, TypeName, ValueKind};
