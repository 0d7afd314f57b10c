//! Method advice: behaviors wrapped around a method invocation.

use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::model::annotation::{Annotation, AnnotationAccess};
use crate::model::method::{MethodDescription, MethodKey};
use crate::model::types::TypeName;
use crate::plastic::context::InstanceContext;
use crate::plastic::{conform, to_object};
use crate::vm::class_loader::ClassLoader;
use crate::vm::value::{ObjectRef, Value};

/// The name and descriptor of the static method generated on every invocation class.
pub const INVOKE_DELEGATE: (&str, &str) =
    ("invokeDelegateMethod", "(Ljava/lang/Object;[Ljava/lang/Object;)Ljava/lang/Object;");

/// Advice around a method. Advice decides whether to call [`MethodInvocation::proceed`], may
/// change parameters before proceeding and the result afterwards.
pub trait MethodAdvice: Send + Sync {
    fn advise(&self, invocation: &mut MethodInvocation<'_>) -> Result<()>;
}

impl<F> MethodAdvice for F
    where F: for<'a, 'b> Fn(&'a mut MethodInvocation<'b>) -> Result<()> + Send + Sync
{
    fn advise(&self, invocation: &mut MethodInvocation<'_>) -> Result<()> {
        self(invocation)
    }
}

/// An advised method after finalization: the chain, and the class that reaches the original
/// implementation.
pub struct AdvisedMethod {
    pub class_name: String,
    pub description: MethodDescription,
    pub annotations: Vec<Annotation>,
    pub parameter_annotations: Vec<Vec<Annotation>>,
    /// Outermost first.
    pub advice: Vec<Arc<dyn MethodAdvice>>,
    /// The supporting class with the static `invokeDelegateMethod`.
    pub invocation_class: String,
}

impl AdvisedMethod {
    /// Whether a thrown object is an instance of one of the declared checked exception types.
    fn declares(&self, exception: &ObjectRef) -> bool {
        self.description.checked_exception_types.iter()
            .any(|ty| exception.class().is_subclass_of(&ty.class_name()))
    }
}

impl fmt::Debug for AdvisedMethod {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("AdvisedMethod")
            .field("method", &format!("{}.{}", self.class_name, self.description))
            .field("advice", &self.advice.len())
            .field("invocation_class", &self.invocation_class)
            .finish()
    }
}

/// One call of an advised method, as seen by its advice.
///
/// The chain is a vector of advice and a cursor. `proceed` moves the cursor into the next
/// advice, or calls the original implementation once the chain is exhausted, and moves it back
/// when that returns; advice may proceed more than once.
pub struct MethodInvocation<'a> {
    loader: &'a ClassLoader,
    method: &'a AdvisedMethod,
    instance: ObjectRef,
    context: InstanceContext,
    cursor: usize,
    parameters: Vec<Value>,
    result: Option<Value>,
    checked_exception: Option<ObjectRef>,
}

impl<'a> MethodInvocation<'a> {
    pub fn new(loader: &'a ClassLoader, method: &'a AdvisedMethod, instance: ObjectRef,
               context: InstanceContext, parameters: Vec<Value>) -> Self {
        MethodInvocation {
            loader: loader,
            method: method,
            instance: instance,
            context: context,
            cursor: 0,
            parameters: parameters,
            result: None,
            checked_exception: None,
        }
    }

    pub fn instance(&self) -> &ObjectRef {
        &self.instance
    }

    pub fn instance_context(&self) -> &InstanceContext {
        &self.context
    }

    pub fn loader(&self) -> &'a ClassLoader {
        self.loader
    }

    pub fn method(&self) -> &MethodDescription {
        &self.method.description
    }

    pub fn method_key(&self) -> MethodKey {
        self.method.description.key()
    }

    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    pub fn parameter(&self, index: usize) -> Result<&Value> {
        self.parameters.get(index).ok_or_else(|| self.no_parameter(index))
    }

    pub fn parameter_annotations(&self, index: usize) -> &[Annotation] {
        self.method.parameter_annotations.get(index).map_or(&[], |a| a.as_slice())
    }

    /// Replaces a parameter. The value must fit the declared parameter type; wrappers and
    /// primitives are converted as needed.
    pub fn set_parameter(&mut self, index: usize, value: Value) -> Result<&mut Self> {
        let ty = self.method.description.argument_types.get(index).cloned()
            .ok_or_else(|| self.no_parameter(index))?;
        self.parameters[index] = conform(self.loader, value, &ty)?;
        Ok(self)
    }

    fn no_parameter(&self, index: usize) -> Error {
        Error::Contract(format!("method {} has no parameter {}", self.method.description, index))
    }

    /// Continues with the next advice, or with the original implementation.
    pub fn proceed(&mut self) -> Result<&mut Self> {
        match self.method.advice.get(self.cursor).cloned() {
            Some(advice) => {
                self.cursor += 1;
                let result = advice.advise(self);
                self.cursor -= 1;
                result?;
            },
            None => self.invoke_delegate()?,
        }
        Ok(self)
    }

    fn invoke_delegate(&mut self) -> Result<()> {
        let argument_types = &self.method.description.argument_types;
        let boxed = self.parameters.iter().zip(argument_types)
            .map(|(value, ty)| to_object(self.loader, value.clone(), ty))
            .collect();
        let parameters = self.loader.new_array(&TypeName::object(), boxed);
        let key = MethodKey::new(INVOKE_DELEGATE.0, INVOKE_DELEGATE.1);
        let args = vec![Value::Reference(self.instance.clone()), parameters];
        match self.loader.invoke_static(&self.method.invocation_class, &key, args) {
            Ok(result) => {
                let return_type = &self.method.description.return_type;
                self.result = if return_type.is_void() {
                    None
                } else {
                    Some(conform(self.loader, result.unwrap_or(Value::Null), return_type)?)
                };
                self.checked_exception = None;
                Ok(())
            },
            Err(Error::Thrown(exception)) if self.method.declares(&exception) => {
                self.result = None;
                self.checked_exception = Some(exception);
                Ok(())
            },
            Err(error) => Err(error),
        }
    }

    /// The value returned so far; `None` for void methods or before proceeding.
    pub fn return_value(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    /// Overrides the return value and clears any checked exception.
    pub fn set_return_value(&mut self, value: Value) -> Result<&mut Self> {
        let return_type = self.method.description.return_type.clone();
        if return_type.is_void() {
            return Err(Error::Contract(format!("method {} is void and can not return a value",
                                               self.method.description)));
        }
        self.result = Some(conform(self.loader, value, &return_type)?);
        self.checked_exception = None;
        Ok(self)
    }

    pub fn did_throw_checked_exception(&self) -> bool {
        self.checked_exception.is_some()
    }

    /// The checked exception, if one was thrown and it is an instance of `exception_type`.
    pub fn checked_exception(&self, exception_type: &str) -> Option<&ObjectRef> {
        self.checked_exception.as_ref().filter(|e| e.class().is_subclass_of(exception_type))
    }

    /// Replaces the checked exception. It must be an instance of one of the method's declared
    /// exception types.
    pub fn set_checked_exception(&mut self, exception: ObjectRef) -> Result<&mut Self> {
        if !self.method.declares(&exception) {
            return Err(Error::Contract(format!(
                "Exception class {} is not a declared exception type for method {}.",
                exception.class_name(), self.method.description)));
        }
        self.result = None;
        self.checked_exception = Some(exception);
        Ok(self)
    }

    /// Fails with the checked exception, if there is one.
    pub fn rethrow(&self) -> Result<()> {
        match self.checked_exception {
            Some(ref exception) => Err(Error::Thrown(exception.clone())),
            None => Ok(()),
        }
    }

    /// What the caller of the advised method receives.
    pub(crate) fn into_outcome(self) -> Result<Option<Value>> {
        if let Some(exception) = self.checked_exception {
            return Err(Error::Thrown(exception));
        }
        let return_type = &self.method.description.return_type;
        if return_type.is_void() {
            Ok(None)
        } else {
            Ok(Some(self.result.unwrap_or_else(|| Value::default_for(return_type))))
        }
    }
}

impl<'a> AnnotationAccess for MethodInvocation<'a> {
    fn annotations(&self) -> &[Annotation] {
        &self.method.annotations
    }
}

impl<'a> fmt::Debug for MethodInvocation<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "MethodInvocation[{}.{} #{}]", self.method.class_name,
               self.method.description.method_name, self.cursor)
    }
}
