//! The class transformation engine.
//!
//! A [`PlasticManager`] owns a class loader and a pool of source class definitions. When a
//! class in a controlled package is first loaded, the pool hands a [`PlasticClass`] to the
//! manager's delegate, which changes it through fields, methods, advice and injections. The
//! pool then finalizes the model into class definitions for the stack machine and defines them.
//! Instances are created by a [`ClassInstantiator`], which carries an [`InstanceContext`]
//! into the generated constructor.

pub mod advice;
pub mod aspect;
pub mod class;
pub mod conduit;
pub mod context;
pub mod events;
pub mod field;
mod finalize;
pub mod handle;
pub mod instantiator;
pub mod manager;
pub mod method;
pub mod naming;
pub mod pipeline;
mod pool;
pub mod transformation;

pub use self::advice::{MethodAdvice, MethodInvocation};
pub use self::aspect::AspectInterceptorBuilder;
pub use self::class::PlasticClass;
pub use self::conduit::{ComputedValue, ConstructorCallback, FieldConduit};
pub use self::context::{InstanceContext, INSTANCE_CONTEXT_CLASS};
pub use self::events::{ClassType, PlasticClassEvent, PlasticClassListener};
pub use self::field::{FieldId, PlasticField, PropertyAccessType};
pub use self::handle::{FieldHandle, MethodHandle, MethodInvocationResult};
pub use self::instantiator::ClassInstantiator;
pub use self::manager::{PlasticManager, PlasticManagerBuilder, PlasticManagerDelegate,
                        TransformationOption};
pub use self::method::{MethodId, PlasticMethod};
pub use self::naming::UniqueId;
pub use self::pipeline::{PlasticClassTransformer, TransformationPipeline};
pub use self::transformation::PlasticClassTransformation;

use crate::error::{Error, Result};
use crate::model::types::{Primitive, TypeName};
use crate::vm::class_loader::ClassLoader;
use crate::vm::value::Value;

/// Instance field holding the instance context of advised instances and conduit fields.
pub(crate) const CONTEXT_FIELD: &str = "$context";
/// Prefix of the generated accessors that replace field reads and writes.
pub(crate) const CONDUIT_GETTER: &str = "$get$";
pub(crate) const CONDUIT_SETTER: &str = "$set$";
/// Method run by the generated constructor to apply injections and callbacks.
pub(crate) const INITIALIZER: &str = "$plastic$initialize";
/// Host class of per-instance conduits.
pub(crate) const FIELD_CONDUIT_CLASS: &str = "plastic.FieldConduit";

/// Converts a value to what a variable of type `ty` holds: wrappers are unboxed for primitive
/// types, primitives are boxed for reference types, and references must be instances of the
/// type.
pub(crate) fn conform(loader: &ClassLoader, value: Value, ty: &TypeName) -> Result<Value> {
    let mismatch = |value: &Value| Error::TypeMismatch {
        expected: ty.to_string(),
        actual: loader.type_of(value).to_string(),
    };
    match *ty {
        TypeName::Primitive(Primitive::Void) => Ok(Value::Null),
        TypeName::Primitive(primitive) => {
            let unboxed = value.unboxed();
            if primitive.kind() == Some(unboxed.kind()) {
                Ok(unboxed)
            } else {
                Err(mismatch(&value))
            }
        },
        _ => {
            let value = match value {
                Value::Null => return Ok(Value::Null),
                Value::Reference(_) => value,
                primitive => box_for(loader, primitive, ty),
            };
            if loader.is_instance(&value, ty)? {
                Ok(value)
            } else {
                Err(mismatch(&value))
            }
        },
    }
}

/// The value as an object, boxing primitives of type `ty`.
pub(crate) fn to_object(loader: &ClassLoader, value: Value, ty: &TypeName) -> Value {
    match ty.as_primitive() {
        Some(Primitive::Void) | None => value,
        Some(primitive) => loader.boxed(primitive, value),
    }
}

/// Boxes a bare primitive for a reference target: the target's own wrapper if it is one,
/// otherwise the wrapper that matches the value.
fn box_for(loader: &ClassLoader, value: Value, target: &TypeName) -> Value {
    let wrapped = Primitive::from_wrapper_class(&target.class_name())
        .filter(|p| p.kind() == Some(value.kind()));
    let primitive = wrapped.unwrap_or(match value.kind() {
        crate::model::types::ValueKind::Long => Primitive::Long,
        crate::model::types::ValueKind::Float => Primitive::Float,
        crate::model::types::ValueKind::Double => Primitive::Double,
        _ => Primitive::Int,
    });
    loader.boxed(primitive, value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_and_wrappers_convert() {
        let loader = ClassLoader::new();
        let boxed = loader.boxed(Primitive::Int, Value::Int(4));
        assert_eq!(Some(4), conform(&loader, boxed, &TypeName::int()).unwrap().as_int());

        let object = conform(&loader, Value::Long(9), &TypeName::object()).unwrap();
        assert_eq!("java.lang.Long", object.as_object().unwrap().class_name());

        let number = conform(&loader, Value::Int(1), &TypeName::class("java.lang.Boolean"))
            .unwrap();
        assert_eq!("true", loader.to_display_string(&number).unwrap());
    }

    #[test]
    fn mismatches_are_reported() {
        let loader = ClassLoader::new();
        let error = conform(&loader, loader.string("x"), &TypeName::int()).unwrap_err();
        assert!(matches!(error, Error::TypeMismatch { .. }));
        let error = conform(&loader, loader.string("x"), &TypeName::class("java.lang.Number"))
            .unwrap_err();
        assert_eq!("expected an instance of java.lang.Number but found java.lang.String",
                   error.to_string());
        assert!(conform(&loader, Value::Null, &TypeName::string()).unwrap().is_null());
    }
}
