//! Callbacks that supply field values and storage to transformed instances.

use crate::error::Result;
use crate::plastic::context::InstanceContext;
use crate::vm::value::{ObjectRef, Value};

/// Replaces the storage of a field: every read and write of the field inside its class goes
/// through the conduit.
pub trait FieldConduit: Send + Sync {
    fn get(&self, instance: &ObjectRef, context: &InstanceContext) -> Result<Value>;

    fn set(&self, instance: &ObjectRef, context: &InstanceContext, value: Value) -> Result<()>;
}

/// Computes a value from the instance context. Invoked once per new instance.
pub trait ComputedValue<T>: Send + Sync {
    fn get(&self, context: &InstanceContext) -> Result<T>;
}

impl<T, F> ComputedValue<T> for F
    where F: Fn(&InstanceContext) -> Result<T> + Send + Sync
{
    fn get(&self, context: &InstanceContext) -> Result<T> {
        self(context)
    }
}

/// Runs at the end of construction, after field injections.
pub trait ConstructorCallback: Send + Sync {
    fn on_construct(&self, instance: &ObjectRef, context: &InstanceContext) -> Result<()>;
}

impl<F> ConstructorCallback for F
    where F: Fn(&ObjectRef, &InstanceContext) -> Result<()> + Send + Sync
{
    fn on_construct(&self, instance: &ObjectRef, context: &InstanceContext) -> Result<()> {
        self(instance, context)
    }
}
