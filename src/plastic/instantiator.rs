//! Creating instances of transformed classes.

use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::model::types::TypeName;
use crate::plastic::context::{InstanceContext, INSTANCE_CONTEXT_CLASS};
use crate::vm::class_loader::ClassLoader;
use crate::vm::value::{ObjectRef, Value};

/// Creates instances of one transformed class, handing each its instance context.
///
/// Instantiators are immutable; [`ClassInstantiator::with`] returns a new one.
#[derive(Clone)]
pub struct ClassInstantiator {
    class_name: String,
    loader: Arc<ClassLoader>,
    context: InstanceContext,
}

impl ClassInstantiator {
    pub(crate) fn new(class_name: &str, loader: Arc<ClassLoader>) -> Self {
        ClassInstantiator {
            class_name: class_name.to_string(),
            loader: loader,
            context: InstanceContext::new(class_name),
        }
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn loader(&self) -> &Arc<ClassLoader> {
        &self.loader
    }

    pub fn instance_context(&self) -> &InstanceContext {
        &self.context
    }

    /// An instantiator whose context also holds `value` under `value_type`. Each type may be
    /// bound once; the value must not be null and must be an instance of the type.
    pub fn with(&self, value_type: &str, value: Value) -> Result<ClassInstantiator> {
        if !value.is_null() && !self.loader.is_instance(&value, &TypeName::parse(value_type)?)? {
            return Err(Error::TypeMismatch {
                expected: value_type.to_string(),
                actual: self.loader.type_of(&value).to_string(),
            });
        }
        Ok(ClassInstantiator {
            class_name: self.class_name.clone(),
            loader: self.loader.clone(),
            context: self.context.with(value_type, value)?,
        })
    }

    /// Creates an instance. Computed values and per-instance conduits are evaluated anew for
    /// every instance.
    pub fn new_instance(&self) -> Result<ObjectRef> {
        let context = self.loader.host(INSTANCE_CONTEXT_CLASS, self.context.clone());
        let descriptor = format!("({})V", TypeName::class(INSTANCE_CONTEXT_CLASS).descriptor());
        self.loader.instantiate(&self.class_name, &descriptor, vec![context])
    }
}

impl fmt::Debug for ClassInstantiator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ClassInstantiator[{} {:?}]", self.class_name, self.context)
    }
}
