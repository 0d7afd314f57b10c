//! Internal representations of loaded classes and methods.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::model::access_flags;
use crate::model::annotation::{Annotation, AnnotationAccess};
use crate::model::class_def::{ClassDef, FieldDef, MethodBody};
use crate::model::method::{MethodDescription, MethodKey};
use crate::model::types::TypeName;
use crate::vm::value::Value;

/// A method of a loaded class.
#[derive(Debug)]
pub struct Method {
    /// The name of the declaring class.
    class_name: String,
    pub description: MethodDescription,
    pub annotations: Vec<Annotation>,
    pub parameter_annotations: Vec<Vec<Annotation>>,
    pub body: MethodBody,
}

impl Method {
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn key(&self) -> MethodKey {
        self.description.key()
    }

    pub fn is_static(&self) -> bool {
        self.description.is_static()
    }

    pub fn is_abstract(&self) -> bool {
        matches!(self.body, MethodBody::Abstract)
    }
}

impl AnnotationAccess for Method {
    fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}", self.class_name, self.description)
    }
}

/// One instance field slot. Slots of superclass fields come first.
#[derive(Debug, Clone)]
pub struct FieldSlot {
    pub declaring_class: String,
    pub name: String,
    pub ty: TypeName,
}

/// A class that has been loaded.
pub struct Class {
    name: String,
    access_flags: u16,
    /// The superclass extended by the class. If the class is `java.lang.Object`, this is `None`.
    superclass: Option<Arc<Class>>,
    interfaces: Vec<Arc<Class>>,
    /// The element type, for array classes.
    component_type: Option<TypeName>,
    annotations: Vec<Annotation>,
    /// Fields declared by this class, `static` or not.
    fields: Vec<FieldDef>,
    /// Instance field slots of this class and its superclasses.
    instance_fields: Vec<FieldSlot>,
    /// The values of the static fields declared by this class.
    static_values: RwLock<HashMap<String, Value>>,
    methods: HashMap<MethodKey, Arc<Method>>,
}

impl Class {
    pub fn new(def: ClassDef, superclass: Option<Arc<Class>>, interfaces: Vec<Arc<Class>>)
               -> Self {
        let mut instance_fields = superclass.as_ref()
            .map(|s| s.instance_fields.clone())
            .unwrap_or_default();
        let mut static_values = HashMap::new();
        for field in &def.fields {
            if field.is_static() {
                let value = field.constant_value.clone()
                    .unwrap_or_else(|| Value::default_for(&field.ty));
                static_values.insert(field.name.clone(), value);
            } else {
                instance_fields.push(FieldSlot {
                    declaring_class: def.name.clone(),
                    name: field.name.clone(),
                    ty: field.ty.clone(),
                });
            }
        }

        let mut methods = HashMap::new();
        for method in def.methods {
            let key = method.key();
            methods.insert(key, Arc::new(Method {
                class_name: def.name.clone(),
                description: method.description,
                annotations: method.annotations,
                parameter_annotations: method.parameter_annotations,
                body: method.body,
            }));
        }

        Class {
            name: def.name,
            access_flags: def.access_flags,
            superclass: superclass,
            interfaces: interfaces,
            component_type: None,
            annotations: def.annotations,
            fields: def.fields,
            instance_fields: instance_fields,
            static_values: RwLock::new(static_values),
            methods: methods,
        }
    }

    /// Create a new array class for a given element type.
    pub fn new_array(object_class: Arc<Class>, component_type: TypeName) -> Self {
        Class {
            name: TypeName::array_of(component_type.clone()).to_string(),
            access_flags: access_flags::ACC_PUBLIC | access_flags::ACC_FINAL,
            superclass: Some(object_class),
            interfaces: vec![],
            component_type: Some(component_type),
            annotations: vec![],
            fields: vec![],
            instance_fields: vec![],
            static_values: RwLock::new(HashMap::new()),
            methods: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn access_flags(&self) -> u16 {
        self.access_flags
    }

    pub fn superclass(&self) -> Option<&Arc<Class>> {
        self.superclass.as_ref()
    }

    pub fn interfaces(&self) -> &[Arc<Class>] {
        &self.interfaces
    }

    pub fn component_type(&self) -> Option<&TypeName> {
        self.component_type.as_ref()
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags & access_flags::ACC_INTERFACE != 0
    }

    pub fn is_abstract(&self) -> bool {
        access_flags::is_abstract(self.access_flags)
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn instance_fields(&self) -> &[FieldSlot] {
        &self.instance_fields
    }

    pub fn declared_methods(&self) -> impl Iterator<Item = &Arc<Method>> {
        self.methods.values()
    }

    pub fn declared_method(&self, key: &MethodKey) -> Option<&Arc<Method>> {
        self.methods.get(key)
    }

    /// Implements dynamic lookup of a method's signature in the current class. If no method with
    /// the given signature is found, then recursively searches the current class's superclasses,
    /// and finally its interfaces.
    pub fn find_method(&self, key: &MethodKey) -> Option<Arc<Method>> {
        let mut class = Some(self);
        while let Some(current) = class {
            if let Some(method) = current.methods.get(key) {
                return Some(method.clone());
            }
            class = current.superclass.as_deref();
        }
        self.find_interface_method(key)
    }

    fn find_interface_method(&self, key: &MethodKey) -> Option<Arc<Method>> {
        let own = self.interfaces.iter().find_map(|i| {
            i.methods.get(key).cloned().or_else(|| i.find_interface_method(key))
        });
        own.or_else(|| self.superclass.as_ref().and_then(|s| s.find_interface_method(key)))
    }

    /// Whether this class is, extends or implements the named class.
    pub fn is_subclass_of(&self, name: &str) -> bool {
        if self.name == name {
            return true;
        }
        self.interfaces.iter().any(|i| i.is_subclass_of(name))
            || self.superclass.as_ref().map_or(false, |s| s.is_subclass_of(name))
    }

    /// The named class among this class and its superclasses.
    fn ancestor(&self, name: &str) -> Option<&Class> {
        let mut class = Some(self);
        while let Some(current) = class {
            if current.name == name {
                return Some(current);
            }
            class = current.superclass.as_deref();
        }
        None
    }

    /// Resolves an instance field reference (`owner.name`) to a slot of this class's instances.
    /// Resolution starts at `owner` and proceeds up through its superclasses.
    pub fn field_slot(&self, owner: &str, name: &str) -> Option<usize> {
        let mut class = self.ancestor(owner);
        while let Some(current) = class {
            if current.fields.iter().any(|f| f.name == name && !f.is_static()) {
                return self.instance_fields.iter()
                    .position(|slot| slot.declaring_class == current.name && slot.name == name);
            }
            class = current.superclass.as_deref();
        }
        None
    }

    /// The class among this class and its superclasses that declares the named static field.
    fn static_holder(&self, name: &str) -> Option<&Class> {
        let mut class = Some(self);
        while let Some(current) = class {
            if current.static_values.read().contains_key(name) {
                return Some(current);
            }
            class = current.superclass.as_deref();
        }
        None
    }

    pub fn get_static(&self, name: &str) -> Option<Value> {
        self.static_holder(name).and_then(|holder| holder.static_values.read().get(name).cloned())
    }

    /// Stores a static field value, returning whether the field exists.
    pub fn put_static(&self, name: &str, value: Value) -> bool {
        match self.static_holder(name) {
            Some(holder) => {
                holder.static_values.write().insert(name.to_string(), value);
                true
            },
            None => false,
        }
    }
}

impl AnnotationAccess for Class {
    fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Class")
            .field("name", &self.name)
            .field("superclass", &self.superclass.as_ref().map(|s| s.name()))
            .field("methods", &self.methods.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::class_def::MethodDef;

    fn object() -> Arc<Class> {
        let mut def = ClassDef::new("java.lang.Object", "java.lang.Object");
        def.super_name = None;
        Arc::new(Class::new(def, None, vec![]))
    }

    #[test]
    fn superclass_fields_come_first_and_shadowing_resolves_by_owner() {
        let object = object();
        let mut base = ClassDef::new("a.Base", "java.lang.Object");
        base.add_field(FieldDef::new(0, TypeName::int(), "count"));
        let base = Arc::new(Class::new(base, Some(object), vec![]));
        let mut derived = ClassDef::new("a.Derived", "a.Base");
        derived.add_field(FieldDef::new(0, TypeName::string(), "count"));
        derived.add_field(FieldDef::new(access_flags::ACC_STATIC, TypeName::int(), "total"));
        let derived = Class::new(derived, Some(base), vec![]);

        assert_eq!(2, derived.instance_fields().len());
        assert_eq!(Some(0), derived.field_slot("a.Base", "count"));
        assert_eq!(Some(1), derived.field_slot("a.Derived", "count"));
        assert_eq!(None, derived.field_slot("a.Other", "count"));
        assert_eq!(Some(0), derived.get_static("total").and_then(|v| v.as_int()));
        assert!(derived.put_static("total", Value::Int(3)));
        assert!(!derived.put_static("missing", Value::Int(3)));
    }

    #[test]
    fn methods_are_found_in_superclasses_and_interfaces() {
        let object = object();
        let mut runnable = ClassDef::interface("a.Runnable");
        runnable.add_abstract_method(MethodDescription::new(TypeName::void(), "run", vec![]));
        let runnable = Arc::new(Class::new(runnable, Some(object.clone()), vec![]));
        let mut base = ClassDef::new("a.Base", "java.lang.Object");
        base.add_method(MethodDef::new(MethodDescription::new(TypeName::int(), "size", vec![]),
                                       MethodBody::Abstract));
        let base = Arc::new(Class::new(base, Some(object), vec![runnable]));
        let derived = Class::new(ClassDef::new("a.Derived", "a.Base"), Some(base), vec![]);

        let size = MethodKey::new("size", "()I");
        assert_eq!("a.Base", derived.find_method(&size).unwrap().class_name());
        let run = MethodKey::new("run", "()V");
        assert_eq!("a.Runnable", derived.find_method(&run).unwrap().class_name());
        assert!(derived.is_subclass_of("a.Runnable"));
        assert!(!derived.is_subclass_of("a.Other"));
    }
}
