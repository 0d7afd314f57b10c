//! The instance context: per-instance values supplied at construction time.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::vm::value::Value;

/// The name of the host class that carries an [`InstanceContext`] through generated
/// constructors.
pub const INSTANCE_CONTEXT_CLASS: &str = "plastic.InstanceContext";

/// An immutable map from a value type (a class name) to one value of that type.
///
/// Extending a context copies it; a context that has been handed to an instance never changes.
#[derive(Clone)]
pub struct InstanceContext {
    instance_type: Arc<str>,
    values: Arc<HashMap<String, Value>>,
}

impl InstanceContext {
    pub fn new(instance_type: &str) -> Self {
        InstanceContext {
            instance_type: Arc::from(instance_type),
            values: Arc::new(HashMap::new()),
        }
    }

    /// The class of the instances this context is used to create.
    pub fn instance_type(&self) -> &str {
        &self.instance_type
    }

    /// A new context with one more value. Each value type may be bound only once, and `null` is
    /// never a valid value.
    pub fn with(&self, value_type: &str, value: Value) -> Result<InstanceContext> {
        if value.is_null() {
            return Err(Error::Contract(format!(
                "instance context value for type {} may not be null", value_type)));
        }
        if self.values.contains_key(value_type) {
            return Err(Error::Contract(format!(
                "an instance context value of type {} has already been added", value_type)));
        }
        let mut values = (*self.values).clone();
        values.insert(value_type.to_string(), value);
        Ok(InstanceContext {
            instance_type: self.instance_type.clone(),
            values: Arc::new(values),
        })
    }

    /// The value bound to a type, or `None` if nothing was bound.
    pub fn get(&self, value_type: &str) -> Option<&Value> {
        self.values.get(value_type)
    }

    /// The value bound to a type; a missing value is an error.
    pub fn require(&self, value_type: &str) -> Result<Value> {
        self.get(value_type).cloned().ok_or_else(|| Error::Contract(format!(
            "instance context for class {} does not contain a value for type {}",
            self.instance_type, value_type)))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for InstanceContext {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut types: Vec<&String> = self.values.keys().collect();
        types.sort();
        write!(f, "InstanceContext[{}: {:?}]", self.instance_type, types)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extending_copies() {
        let empty = InstanceContext::new("demo.Page");
        let one = empty.with("demo.Locale", Value::Int(1)).unwrap();
        assert!(empty.get("demo.Locale").is_none());
        assert_eq!(Some(1), one.get("demo.Locale").and_then(|v| v.as_int()));
        assert_eq!("demo.Page", one.instance_type());
    }

    #[test]
    fn each_type_binds_once() {
        let context = InstanceContext::new("demo.Page").with("demo.Locale", Value::Int(1)).unwrap();
        assert!(matches!(context.with("demo.Locale", Value::Int(2)), Err(Error::Contract(_))));
        assert!(matches!(context.with("demo.Other", Value::Null), Err(Error::Contract(_))));
        assert!(context.require("demo.Missing").is_err());
    }
}
