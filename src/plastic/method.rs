//! Methods of a class under transformation.

use std::fmt;
use std::sync::Arc;

use crate::assembler::InstructionBuilder;
use crate::error::{Error, Result};
use crate::model::access_flags;
use crate::model::annotation::{Annotation, AnnotationAccess};
use crate::model::class_def::{MethodBody, MethodDef};
use crate::model::method::MethodDescription;
use crate::plastic::advice::MethodAdvice;
use crate::plastic::class::PlasticClass;
use crate::plastic::field::FieldId;
use crate::plastic::handle::MethodHandle;

/// Identifies a method of one [`PlasticClass`]. Ids of one class are rejected by every other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodId {
    pub(crate) class: u64,
    pub(crate) index: usize,
}

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}@{}", self.index, self.class)
    }
}

#[derive(Clone)]
pub(crate) struct MethodState {
    pub(crate) description: MethodDescription,
    pub(crate) annotations: Vec<Annotation>,
    pub(crate) parameter_annotations: Vec<Vec<Annotation>>,
    pub(crate) body: MethodBody,
    pub(crate) advice: Vec<Arc<dyn MethodAdvice>>,
}

impl MethodState {
    pub(crate) fn new(description: MethodDescription, body: MethodBody) -> Self {
        let parameters = description.argument_types.len();
        MethodState {
            description: description,
            annotations: vec![],
            parameter_annotations: vec![vec![]; parameters],
            body: body,
            advice: vec![],
        }
    }

    pub(crate) fn from_def(def: MethodDef) -> Self {
        MethodState {
            description: def.description,
            annotations: def.annotations,
            parameter_annotations: def.parameter_annotations,
            body: def.body,
            advice: vec![],
        }
    }

    pub(crate) fn is_constructor(&self) -> bool {
        self.description.method_name == "<init>"
    }

    pub(crate) fn into_def(self) -> MethodDef {
        MethodDef {
            description: self.description,
            annotations: self.annotations,
            parameter_annotations: self.parameter_annotations,
            body: self.body,
        }
    }
}

/// Where a delegating method gets the object it delegates to.
#[derive(Debug, Clone, Copy)]
pub(crate) enum DelegateSource {
    Field(FieldId),
    Method(MethodId),
}

/// A method of a class under transformation.
pub struct PlasticMethod<'c> {
    class: &'c mut PlasticClass,
    id: MethodId,
}

impl<'c> PlasticMethod<'c> {
    pub(crate) fn new(class: &'c mut PlasticClass, id: MethodId) -> Self {
        PlasticMethod { class: class, id: id }
    }

    fn state(&self) -> &MethodState {
        &self.class.methods[self.id.index]
    }

    pub fn id(&self) -> MethodId {
        self.id
    }

    pub fn description(&self) -> &MethodDescription {
        &self.state().description
    }

    pub fn parameter_annotations(&self, index: usize) -> &[Annotation] {
        self.state().parameter_annotations.get(index).map_or(&[], |a| a.as_slice())
    }

    pub fn is_abstract(&self) -> bool {
        matches!(self.state().body, MethodBody::Abstract)
    }

    /// Whether a superclass provides an implementation of this method.
    pub fn is_overridden(&self) -> bool {
        self.class.inherits_implementation(self.description())
    }

    /// Wraps the method in advice. Advice added first runs outermost. Advice stays with the
    /// method when its implementation is replaced later.
    pub fn add_advice<A>(&mut self, advice: A) -> Result<&mut Self>
        where A: MethodAdvice + 'static
    {
        self.add_shared_advice(Arc::new(advice))
    }

    pub(crate) fn add_shared_advice(&mut self, advice: Arc<dyn MethodAdvice>)
                                    -> Result<&mut Self> {
        self.class.check_open("add_advice")?;
        let state = &self.class.methods[self.id.index];
        if state.description.is_static() || state.is_constructor() {
            return Err(Error::Contract(format!("method {} of class {} can not be advised",
                                               state.description, self.class.class_name())));
        }
        self.class.methods[self.id.index].advice.push(advice);
        Ok(self)
    }

    /// Replaces the body of the method.
    pub fn change_implementation<F>(&mut self, callback: F) -> Result<&mut Self>
        where F: FnOnce(&mut InstructionBuilder)
    {
        self.class.check_open("change_implementation")?;
        let mut description = self.description().clone();
        description.modifiers &= !access_flags::ACC_ABSTRACT;
        let code = self.class.assemble(&description, callback)?;
        let state = &mut self.class.methods[self.id.index];
        state.description = description;
        state.body = MethodBody::Code(code);
        Ok(self)
    }

    /// Replaces the body with a call of the same method on the value of a field.
    pub fn delegate_to(&mut self, field: FieldId) -> Result<&mut Self> {
        self.delegate("delegate_to", DelegateSource::Field(field))
    }

    /// Replaces the body with a call of the same method on the value returned by another,
    /// argument-less, method. The other method runs on every call.
    pub fn delegate_to_method(&mut self, method: MethodId) -> Result<&mut Self> {
        self.delegate("delegate_to_method", DelegateSource::Method(method))
    }

    fn delegate(&mut self, operation: &str, source: DelegateSource) -> Result<&mut Self> {
        self.class.check_open(operation)?;
        let description = self.description().clone();
        let code = self.class.delegating_code(&description, source)?;
        let state = &mut self.class.methods[self.id.index];
        state.description.modifiers &= !access_flags::ACC_ABSTRACT;
        state.body = MethodBody::Code(code);
        Ok(self)
    }

    pub fn handle(&self) -> MethodHandle {
        MethodHandle::new(self.class.class_name(), self.description().clone(),
                          self.class.loader().clone())
    }
}

impl<'c> AnnotationAccess for PlasticMethod<'c> {
    fn annotations(&self) -> &[Annotation] {
        &self.state().annotations
    }
}

impl<'c> fmt::Debug for PlasticMethod<'c> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "PlasticMethod[{} in {}]", self.description(), self.class.class_name())
    }
}
