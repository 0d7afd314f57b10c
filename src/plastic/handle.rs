//! Handles for reading fields and invoking methods of transformed classes from Rust.
//!
//! A handle is bound to one member of one class. It resolves the class lazily, so a handle
//! taken while the class is being transformed works once the class has been defined.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::model::method::{MethodDescription, MethodKey};
use crate::model::types::TypeName;
use crate::plastic::{conform, CONDUIT_GETTER, CONDUIT_SETTER};
use crate::vm::class::Class;
use crate::vm::class_loader::ClassLoader;
use crate::vm::value::{ObjectRef, Value};

fn defined_class(loader: &ClassLoader, class_name: &str) -> Result<Arc<Class>> {
    loader.find_loaded(class_name).ok_or_else(|| Error::Contract(format!(
        "class {} has not been defined yet; create its instantiator first", class_name)))
}

fn check_instance(instance: &ObjectRef, class_name: &str) -> Result<()> {
    if instance.class().is_subclass_of(class_name) {
        Ok(())
    } else {
        Err(Error::TypeMismatch {
            expected: class_name.to_string(),
            actual: instance.class_name().to_string(),
        })
    }
}

/// Reads and writes one field of instances of a transformed class, ignoring visibility.
/// Fields with a conduit are read and written through it.
#[derive(Clone)]
pub struct FieldHandle {
    class_name: String,
    field_name: String,
    ty: TypeName,
    loader: Arc<ClassLoader>,
}

impl FieldHandle {
    pub(crate) fn new(class_name: &str, field_name: &str, ty: TypeName,
                      loader: Arc<ClassLoader>) -> Self {
        FieldHandle {
            class_name: class_name.to_string(),
            field_name: field_name.to_string(),
            ty: ty,
            loader: loader,
        }
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    pub fn get(&self, instance: &ObjectRef) -> Result<Value> {
        let class = defined_class(&self.loader, &self.class_name)?;
        check_instance(instance, &self.class_name)?;
        let getter = MethodKey::of(&format!("{}{}", CONDUIT_GETTER, self.field_name), &[],
                                   &self.ty);
        if let Some(method) = class.declared_method(&getter) {
            let value = self.loader.invoke(method, vec![Value::Reference(instance.clone())])?;
            return Ok(value.unwrap_or(Value::Null));
        }
        instance.class().field_slot(&self.class_name, &self.field_name)
            .and_then(|slot| instance.get_slot(slot))
            .ok_or_else(|| self.no_such_field())
    }

    pub fn set(&self, instance: &ObjectRef, value: Value) -> Result<()> {
        let class = defined_class(&self.loader, &self.class_name)?;
        check_instance(instance, &self.class_name)?;
        let value = conform(&self.loader, value, &self.ty)?;
        let setter = MethodKey::of(&format!("{}{}", CONDUIT_SETTER, self.field_name),
                                   &[self.ty.clone()], &TypeName::void());
        if let Some(method) = class.declared_method(&setter) {
            self.loader.invoke(method, vec![Value::Reference(instance.clone()), value])?;
            return Ok(());
        }
        let stored = instance.class().field_slot(&self.class_name, &self.field_name)
            .map_or(false, |slot| instance.put_slot(slot, value));
        if stored { Ok(()) } else { Err(self.no_such_field()) }
    }

    fn no_such_field(&self) -> Error {
        Error::NoSuchField {
            class: self.class_name.clone(),
            field: self.field_name.clone(),
        }
    }
}

/// The outcome of [`MethodHandle::invoke`]: a return value, or a checked exception declared by
/// the method.
#[derive(Debug, Clone)]
pub struct MethodInvocationResult {
    pub return_value: Option<Value>,
    pub checked_exception: Option<ObjectRef>,
}

impl MethodInvocationResult {
    pub fn did_throw_checked_exception(&self) -> bool {
        self.checked_exception.is_some()
    }

    /// Turns a captured checked exception back into an error.
    pub fn rethrow(&self) -> Result<()> {
        match self.checked_exception {
            Some(ref exception) => Err(Error::Thrown(exception.clone())),
            None => Ok(()),
        }
    }
}

/// Invokes one method of a transformed class with virtual dispatch, ignoring visibility.
#[derive(Clone)]
pub struct MethodHandle {
    class_name: String,
    description: MethodDescription,
    loader: Arc<ClassLoader>,
}

impl MethodHandle {
    pub(crate) fn new(class_name: &str, description: MethodDescription,
                      loader: Arc<ClassLoader>) -> Self {
        MethodHandle {
            class_name: class_name.to_string(),
            description: description,
            loader: loader,
        }
    }

    pub fn description(&self) -> &MethodDescription {
        &self.description
    }

    /// Invokes the method. Checked exceptions the method declares are captured in the result;
    /// anything else is returned as an error.
    pub fn invoke(&self, instance: &ObjectRef, args: Vec<Value>) -> Result<MethodInvocationResult> {
        defined_class(&self.loader, &self.class_name)?;
        check_instance(instance, &self.class_name)?;
        if args.len() != self.description.argument_types.len() {
            return Err(Error::Contract(format!("method {} takes {} arguments but was given {}",
                                               self.description,
                                               self.description.argument_types.len(),
                                               args.len())));
        }
        let mut values = Vec::with_capacity(args.len());
        for (value, ty) in args.into_iter().zip(&self.description.argument_types) {
            values.push(conform(&self.loader, value, ty)?);
        }
        let key = self.description.key();
        match self.loader.invoke_virtual(instance, &key, values) {
            Ok(value) => Ok(MethodInvocationResult {
                return_value: value,
                checked_exception: None,
            }),
            Err(Error::Thrown(exception)) if self.declares(&exception) => {
                Ok(MethodInvocationResult {
                    return_value: None,
                    checked_exception: Some(exception),
                })
            },
            Err(error) => Err(error),
        }
    }

    fn declares(&self, exception: &ObjectRef) -> bool {
        self.description.checked_exception_types.iter()
            .any(|ty| exception.class().is_subclass_of(&ty.class_name()))
    }
}
