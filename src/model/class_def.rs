//! Class definitions: the input to the class loader.
//!
//! A [`ClassDef`] plays the part of a parsed class file. Method bodies are either assembled
//! [`Code`], native Rust functions, or absent (abstract).

use std::fmt;

use crate::assembler::{Code, InstructionBuilder};
use crate::error::{Error, Result};
use crate::model::access_flags;
use crate::model::annotation::{Annotation, AnnotationAccess};
use crate::model::method::{MethodDescription, MethodKey};
use crate::model::types::TypeName;
use crate::vm::native::NativeMethod;
use crate::vm::value::Value;

#[derive(Clone)]
pub enum MethodBody {
    Abstract,
    Code(Code),
    Native(NativeMethod),
}

impl fmt::Debug for MethodBody {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            MethodBody::Abstract => write!(f, "Abstract"),
            MethodBody::Code(ref code) => {
                write!(f, "Code({} instructions)", code.instructions.len())
            },
            MethodBody::Native(_) => write!(f, "Native"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub ty: TypeName,
    pub access_flags: u16,
    pub annotations: Vec<Annotation>,
    /// Initial value of a `static` field.
    pub constant_value: Option<Value>,
}

impl FieldDef {
    pub fn new(access_flags: u16, ty: TypeName, name: &str) -> Self {
        FieldDef {
            name: name.to_string(),
            ty: ty,
            access_flags: access_flags,
            annotations: vec![],
            constant_value: None,
        }
    }

    pub fn with_annotation(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn is_static(&self) -> bool {
        access_flags::is_static(self.access_flags)
    }
}

impl AnnotationAccess for FieldDef {
    fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }
}

#[derive(Debug, Clone)]
pub struct MethodDef {
    pub description: MethodDescription,
    pub annotations: Vec<Annotation>,
    /// One list per parameter.
    pub parameter_annotations: Vec<Vec<Annotation>>,
    pub body: MethodBody,
}

impl MethodDef {
    pub fn new(description: MethodDescription, body: MethodBody) -> Self {
        let parameters = description.argument_types.len();
        MethodDef {
            description: description,
            annotations: vec![],
            parameter_annotations: vec![vec![]; parameters],
            body: body,
        }
    }

    pub fn with_annotation(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn with_parameter_annotation(mut self, index: usize, annotation: Annotation) -> Self {
        if let Some(annotations) = self.parameter_annotations.get_mut(index) {
            annotations.push(annotation);
        }
        self
    }

    pub fn key(&self) -> MethodKey {
        self.description.key()
    }

    pub fn is_abstract(&self) -> bool {
        matches!(self.body, MethodBody::Abstract)
    }
}

impl AnnotationAccess for MethodDef {
    fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }
}

#[derive(Debug, Clone)]
pub struct ClassDef {
    pub name: String,
    /// `None` only for `java.lang.Object`.
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub access_flags: u16,
    pub annotations: Vec<Annotation>,
    pub fields: Vec<FieldDef>,
    pub methods: Vec<MethodDef>,
}

impl ClassDef {
    /// A public class extending `super_name`.
    pub fn new(name: &str, super_name: &str) -> Self {
        ClassDef {
            name: name.to_string(),
            super_name: Some(super_name.to_string()),
            interfaces: vec![],
            access_flags: access_flags::ACC_PUBLIC,
            annotations: vec![],
            fields: vec![],
            methods: vec![],
        }
    }

    /// A public interface; its methods are added with [`ClassDef::add_abstract_method`].
    pub fn interface(name: &str) -> Self {
        let mut def = ClassDef::new(name, "java.lang.Object");
        def.access_flags |= access_flags::ACC_INTERFACE | access_flags::ACC_ABSTRACT;
        def
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags & access_flags::ACC_INTERFACE != 0
    }

    pub fn with_interface(mut self, interface: &str) -> Self {
        self.interfaces.push(interface.to_string());
        self
    }

    pub fn with_annotation(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn add_field(&mut self, field: FieldDef) -> &mut Self {
        self.fields.push(field);
        self
    }

    pub fn add_method(&mut self, method: MethodDef) -> &mut Self {
        self.methods.push(method);
        self
    }

    pub fn add_abstract_method(&mut self, description: MethodDescription) -> &mut Self {
        let description = description.with_modifiers(access_flags::ACC_PUBLIC
                                                      | access_flags::ACC_ABSTRACT);
        self.add_method(MethodDef::new(description, MethodBody::Abstract))
    }

    /// Assembles a method body and adds the method.
    pub fn add_code_method<F>(&mut self, description: MethodDescription, callback: F)
                              -> Result<&mut Self>
        where F: FnOnce(&mut InstructionBuilder)
    {
        let super_name = self.super_name.clone().unwrap_or_default();
        let mut builder = InstructionBuilder::new(&self.name, &super_name, &description);
        callback(&mut builder);
        let code = builder.build()?;
        Ok(self.add_method(MethodDef::new(description, MethodBody::Code(code))))
    }

    pub fn add_native_method<F>(&mut self, description: MethodDescription, native: F) -> &mut Self
        where F: Fn(&crate::vm::ClassLoader, &[Value]) -> Result<Option<Value>> + Send + Sync
                 + 'static
    {
        self.add_method(MethodDef::new(description, MethodBody::Native(NativeMethod::new(native))))
    }

    /// Adds a public no-argument constructor that only calls the superclass constructor.
    pub fn add_default_constructor(&mut self) -> Result<&mut Self> {
        let super_name = self.super_name.clone()
            .ok_or_else(|| Error::Contract(format!("class {} has no superclass", self.name)))?;
        let description = MethodDescription::new(TypeName::void(), "<init>", vec![]);
        self.add_code_method(description, |b| {
            b.load_this().invoke_constructor(&super_name, vec![]).return_result();
        })
    }

    pub fn method(&self, key: &MethodKey) -> Option<&MethodDef> {
        self.methods.iter().find(|m| m.key() == *key)
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }
}

impl AnnotationAccess for ClassDef {
    fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }
}
