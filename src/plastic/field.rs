//! Fields of a class under transformation.

use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::model::access_flags;
use crate::model::annotation::{Annotation, AnnotationAccess};
use crate::model::class_def::FieldDef;
use crate::model::method::MethodDescription;
use crate::model::types::TypeName;
use crate::plastic::class::PlasticClass;
use crate::plastic::conduit::{ComputedValue, FieldConduit};
use crate::plastic::handle::FieldHandle;
use crate::plastic::conform;
use crate::vm::value::Value;

/// Identifies a field of one [`PlasticClass`]. Ids of one class are rejected by every other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldId {
    pub(crate) class: u64,
    pub(crate) index: usize,
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}@{}", self.index, self.class)
    }
}

/// Which accessor methods [`PlasticField::create_accessors`] adds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyAccessType {
    Getter,
    Setter,
    GetterAndSetter,
}

/// How a field gets its value.
#[derive(Clone)]
pub(crate) enum FieldAccess {
    Plain,
    /// Set once per instance from a constant.
    Constant(Value),
    /// Set once per instance from a computed value.
    Computed(Arc<dyn ComputedValue<Value>>),
    /// Set once per instance from the instance context, by field type.
    FromContext,
    /// Every read and write goes through the conduit.
    Conduit(Arc<dyn FieldConduit>),
    /// Like `Conduit`, with one conduit per instance.
    ComputedConduit(Arc<dyn ComputedValue<Arc<dyn FieldConduit>>>),
}

impl FieldAccess {
    pub(crate) fn is_injected(&self) -> bool {
        matches!(*self, FieldAccess::Constant(_) | FieldAccess::Computed(_)
                 | FieldAccess::FromContext)
    }

    pub(crate) fn is_conduit(&self) -> bool {
        matches!(*self, FieldAccess::Conduit(_) | FieldAccess::ComputedConduit(_))
    }

    fn describe(&self) -> &'static str {
        match *self {
            FieldAccess::Plain => "no value source",
            FieldAccess::Constant(_) => "an injected value",
            FieldAccess::Computed(_) => "a computed value",
            FieldAccess::FromContext => "a value from the instance context",
            FieldAccess::Conduit(_) | FieldAccess::ComputedConduit(_) => "a conduit",
        }
    }
}

#[derive(Clone)]
pub(crate) struct FieldState {
    pub(crate) def: FieldDef,
    pub(crate) claimed_by: Option<String>,
    pub(crate) access: FieldAccess,
}

impl FieldState {
    pub(crate) fn new(def: FieldDef) -> Self {
        FieldState {
            def: def,
            claimed_by: None,
            access: FieldAccess::Plain,
        }
    }
}

/// A field of a class under transformation. Borrowing the class, it is short-lived: keep the
/// [`FieldId`] and ask the class for the field again.
pub struct PlasticField<'c> {
    class: &'c mut PlasticClass,
    id: FieldId,
}

impl<'c> PlasticField<'c> {
    pub(crate) fn new(class: &'c mut PlasticClass, id: FieldId) -> Self {
        PlasticField { class: class, id: id }
    }

    fn state(&self) -> &FieldState {
        &self.class.fields[self.id.index]
    }

    pub fn id(&self) -> FieldId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.state().def.name
    }

    pub fn type_name(&self) -> &TypeName {
        &self.state().def.ty
    }

    pub fn modifiers(&self) -> u16 {
        self.state().def.access_flags
    }

    /// The tag of the transformer that claimed the field.
    pub fn claimed_by(&self) -> Option<&str> {
        self.state().claimed_by.as_deref()
    }

    /// Marks the field as handled by the transformer identified by `tag`. A field can be
    /// claimed only once.
    pub fn claim(&mut self, tag: &str) -> Result<&mut Self> {
        self.class.check_open("claim")?;
        let class_name = self.class.class_name().to_string();
        let state = &mut self.class.fields[self.id.index];
        if let Some(ref existing) = state.claimed_by {
            return Err(Error::FieldClaimed {
                class: class_name,
                field: state.def.name.clone(),
                existing: existing.clone(),
                requested: tag.to_string(),
            });
        }
        state.claimed_by = Some(tag.to_string());
        Ok(self)
    }

    /// Sets the field of every new instance to a constant. The field becomes read-only.
    pub fn inject(&mut self, value: Value) -> Result<&mut Self> {
        self.class.check_open("inject")?;
        let value = conform(self.class.loader(), value, self.type_name())?;
        self.set_access("inject", FieldAccess::Constant(value))
    }

    /// Sets the field of every new instance to a value computed from its instance context. The
    /// field becomes read-only.
    pub fn inject_computed<C>(&mut self, computed: C) -> Result<&mut Self>
        where C: ComputedValue<Value> + 'static
    {
        self.set_access("inject_computed", FieldAccess::Computed(Arc::new(computed)))
    }

    /// Sets the field of every new instance to the instance context value registered under the
    /// field's type. The field becomes read-only.
    pub fn inject_from_instance_context(&mut self) -> Result<&mut Self> {
        self.set_access("inject_from_instance_context", FieldAccess::FromContext)
    }

    /// Routes every read and write of the field through a conduit.
    pub fn set_conduit<C>(&mut self, conduit: C) -> Result<&mut Self>
        where C: FieldConduit + 'static
    {
        self.set_access("set_conduit", FieldAccess::Conduit(Arc::new(conduit)))
    }

    /// Routes reads and writes through a conduit created for each instance.
    pub fn set_computed_conduit<C>(&mut self, computed: C) -> Result<&mut Self>
        where C: ComputedValue<Arc<dyn FieldConduit>> + 'static
    {
        self.set_access("set_computed_conduit", FieldAccess::ComputedConduit(Arc::new(computed)))
    }

    fn set_access(&mut self, operation: &str, access: FieldAccess) -> Result<&mut Self> {
        self.class.check_open(operation)?;
        let class_name = self.class.class_name().to_string();
        let state = &mut self.class.fields[self.id.index];
        if state.def.is_static() {
            return Err(Error::Contract(format!(
                "field {} of class {} is static and can not be given a value source",
                state.def.name, class_name)));
        }
        if !matches!(state.access, FieldAccess::Plain) {
            return Err(Error::Conflict(format!("field {} of class {} already has {}",
                                               state.def.name, class_name,
                                               state.access.describe())));
        }
        state.access = access;
        Ok(self)
    }

    /// Adds public `getX`/`setX` methods for the field.
    pub fn create_accessors(&mut self, access_type: PropertyAccessType) -> Result<&mut Self> {
        self.class.check_open("create_accessors")?;
        let name = self.name().to_string();
        let ty = self.type_name().clone();
        let property = property_name(&name);
        let getter = MethodDescription::new(ty.clone(), &format!("get{}", property), vec![]);
        let setter = MethodDescription::new(TypeName::void(), &format!("set{}", property),
                                            vec![ty.clone()]);
        let (get, set) = match access_type {
            PropertyAccessType::Getter => (true, false),
            PropertyAccessType::Setter => (false, true),
            PropertyAccessType::GetterAndSetter => (true, true),
        };
        let mut wanted = vec![];
        if get {
            wanted.push(&getter);
        }
        if set {
            wanted.push(&setter);
        }
        for description in wanted {
            if self.class.has_method(description) {
                return Err(Error::Conflict(format!(
                    "unable to create accessor method {} for field {} of class {}, as the method \
                     is already implemented", description, name, self.class.class_name())));
            }
        }
        let owner = self.class.class_name().to_string();
        if get {
            self.class.introduce_method_with_body(getter.clone(), |b| {
                b.load_this().get_field(&owner, &name, &ty).return_result();
            })?;
        }
        if set {
            self.class.introduce_method_with_body(setter.clone(), |b| {
                b.load_this().load_argument(0).put_field(&owner, &name, &ty).return_result();
            })?;
        }
        Ok(self)
    }

    pub fn handle(&self) -> FieldHandle {
        FieldHandle::new(self.class.class_name(), self.name(), self.type_name().clone(),
                         self.class.loader().clone())
    }

    pub fn is_static(&self) -> bool {
        access_flags::is_static(self.modifiers())
    }
}

impl<'c> AnnotationAccess for PlasticField<'c> {
    fn annotations(&self) -> &[Annotation] {
        &self.state().def.annotations
    }
}

impl<'c> fmt::Debug for PlasticField<'c> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "PlasticField[{} {}.{}]", self.type_name(), self.class.class_name(), self.name())
    }
}

/// `_userName` and `$userName` both become `UserName`.
fn property_name(field_name: &str) -> String {
    let trimmed = field_name.trim_start_matches(|c| c == '_' || c == '$');
    let mut chars = trimmed.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn property_names() {
        assert_eq!("UserName", property_name("_userName"));
        assert_eq!("Count", property_name("$count"));
        assert_eq!("X", property_name("x"));
    }
}
