//! The class loader: the registry of loaded classes, and the factory for heap objects.

use std::any::Any;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use parking_lot::{ReentrantMutex, RwLock};

use crate::error::{Error, Result};
use crate::model::class_def::ClassDef;
use crate::model::method::MethodKey;
use crate::model::types::{Primitive, TypeName};
use crate::vm::bootstrap;
use crate::vm::class::{Class, Method};
use crate::vm::frame;
use crate::vm::value::{Object, ObjectData, ObjectRef, Value};

/// Supplies definitions for classes the loader has not seen yet.
pub trait ClassProvider: Send + Sync {
    /// Returns the definition of `name`, or `None` if this provider does not know the class.
    /// The provider may define other classes on `loader` first (supporting classes).
    fn provide(&self, loader: &ClassLoader, name: &str) -> Result<Option<ClassDef>>;
}

/// Loads, caches and links classes, and creates objects.
///
/// The cache is a concurrent map, so lookups of loaded classes never block. Loading a new
/// class is serialized by a reentrant lock: loading a class may load its superclass and
/// interfaces, or ask the provider to define supporting classes, on the same thread.
pub struct ClassLoader {
    classes: DashMap<String, Arc<Class>>,
    /// Names currently being loaded, to detect classes that are their own ancestors.
    loading: ReentrantMutex<RefCell<HashSet<String>>>,
    provider: RwLock<Option<Weak<dyn ClassProvider>>>,
    object: Arc<Class>,
    string: Arc<Class>,
    list: Arc<Class>,
    wrappers: HashMap<Primitive, Arc<Class>>,
}

impl ClassLoader {
    /// A loader holding only the bootstrap `java.lang` and `java.util` classes.
    pub fn new() -> Self {
        let bootstrap = bootstrap::classes();
        let classes = DashMap::new();
        for class in &bootstrap.all {
            classes.insert(class.name().to_string(), class.clone());
        }
        ClassLoader {
            classes: classes,
            loading: ReentrantMutex::new(RefCell::new(HashSet::new())),
            provider: RwLock::new(None),
            object: bootstrap.object,
            string: bootstrap.string,
            list: bootstrap.list,
            wrappers: bootstrap.wrappers,
        }
    }

    pub fn set_provider(&self, provider: Weak<dyn ClassProvider>) {
        *self.provider.write() = Some(provider);
    }

    /// Returns an already loaded class without loading anything.
    pub fn find_loaded(&self, name: &str) -> Option<Arc<Class>> {
        self.classes.get(name).map(|entry| entry.value().clone())
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    /// Returns the named class, loading it through the provider on first use. Array classes
    /// (`java.lang.String[]`) are created on demand.
    pub fn load_class(&self, name: &str) -> Result<Arc<Class>> {
        if let Some(class) = self.find_loaded(name) {
            return Ok(class);
        }
        if name.ends_with("[]") {
            let ty = TypeName::parse(name)?;
            if let Some(component) = ty.component_type() {
                return Ok(self.array_class(component));
            }
        }

        let guard = self.loading.lock();
        // another thread may have finished loading while we waited
        if let Some(class) = self.find_loaded(name) {
            return Ok(class);
        }
        if !guard.borrow_mut().insert(name.to_string()) {
            return Err(Error::ClassCircularity(name.to_string()));
        }
        let result = self.provide(name);
        guard.borrow_mut().remove(name);
        result
    }

    fn provide(&self, name: &str) -> Result<Arc<Class>> {
        let provider = self.provider.read().as_ref().and_then(Weak::upgrade);
        let def = match provider {
            Some(provider) => provider.provide(self, name)?,
            None => None,
        };
        match def {
            Some(def) if def.name == name => self.link(def),
            Some(def) => Err(Error::Linkage(format!("asked for {} but was given {}",
                                                    name, def.name))),
            None => Err(Error::ClassNotFound(name.to_string())),
        }
    }

    /// Defines a class from its definition, loading its superclass and interfaces first.
    pub fn define(&self, def: ClassDef) -> Result<Arc<Class>> {
        let guard = self.loading.lock();
        if !guard.borrow_mut().insert(def.name.clone()) {
            return Err(Error::ClassCircularity(def.name));
        }
        let name = def.name.clone();
        let result = self.link(def);
        guard.borrow_mut().remove(&name);
        result
    }

    fn link(&self, def: ClassDef) -> Result<Arc<Class>> {
        if self.is_loaded(&def.name) {
            return Err(Error::Conflict(format!("class {} is already defined", def.name)));
        }
        let superclass = match def.super_name {
            Some(ref super_name) => Some(self.load_class(super_name)?),
            None => None,
        };
        if let Some(ref superclass) = superclass {
            if superclass.is_interface() && !def.is_interface() {
                return Err(Error::Linkage(format!("class {} extends interface {}",
                                                  def.name, superclass.name())));
            }
        }
        let mut interfaces = vec![];
        for interface in &def.interfaces {
            let interface = self.load_class(interface)?;
            if !interface.is_interface() {
                return Err(Error::Linkage(format!("class {} implements non-interface {}",
                                                  def.name, interface.name())));
            }
            interfaces.push(interface);
        }
        let class = Arc::new(Class::new(def, superclass, interfaces));
        self.classes.insert(class.name().to_string(), class.clone());
        debug!("defined class {}", class.name());
        Ok(class)
    }

    /// The class of arrays with the given element type.
    pub fn array_class(&self, component: &TypeName) -> Arc<Class> {
        let name = TypeName::array_of(component.clone()).to_string();
        self.classes.entry(name)
            .or_insert_with(|| Arc::new(Class::new_array(self.object.clone(), component.clone())))
            .value()
            .clone()
    }

    /// The class used for host objects of the given name, created on first use.
    pub fn host_class(&self, name: &str) -> Arc<Class> {
        if let Some(class) = self.find_loaded(name) {
            return class;
        }
        let mut def = ClassDef::new(name, self.object.name());
        def.access_flags |= crate::model::access_flags::ACC_FINAL;
        let class = Arc::new(Class::new(def, Some(self.object.clone()), vec![]));
        self.classes.entry(name.to_string()).or_insert(class).value().clone()
    }

    pub fn string(&self, value: &str) -> Value {
        Value::Reference(Object::new(self.string.clone(), ObjectData::Str(value.to_string())))
    }

    /// Boxes a primitive value into its wrapper class.
    pub fn boxed(&self, primitive: Primitive, value: Value) -> Value {
        let class = self.wrappers.get(&primitive).cloned().unwrap_or_else(|| self.object.clone());
        let value = match primitive.kind() {
            Some(kind) => value.convert(kind).unwrap_or(value),
            None => value,
        };
        Value::Reference(Object::new(class, ObjectData::Boxed(primitive, value)))
    }

    pub fn new_array(&self, component: &TypeName, elements: Vec<Value>) -> Value {
        let class = self.array_class(component);
        Value::Reference(Object::new(class, ObjectData::Array(RwLock::new(elements))))
    }

    /// A `java.util.ArrayList` with the given elements.
    pub fn new_list(&self, elements: Vec<Value>) -> Value {
        Value::Reference(Object::new(self.list.clone(), ObjectData::List(RwLock::new(elements))))
    }

    /// Wraps Rust data as an object of the named host class.
    pub fn host<T: Any + Send + Sync>(&self, class_name: &str, value: T) -> Value {
        let class = self.host_class(class_name);
        Value::Reference(Object::new(class, ObjectData::Host(Arc::new(value))))
    }

    /// Creates a throwable of the given class with an optional message.
    pub fn new_throwable(&self, class_name: &str, message: Option<&str>) -> Result<ObjectRef> {
        let class = self.load_class(class_name)?;
        if !class.is_subclass_of("java.lang.Throwable") {
            return Err(Error::TypeMismatch {
                expected: String::from("java.lang.Throwable"),
                actual: class_name.to_string(),
            });
        }
        let object = Object::new_instance(class);
        if let Some(message) = message {
            if let Some(slot) = object.class().field_slot("java.lang.Throwable", "message") {
                object.put_slot(slot, self.string(message));
            }
        }
        Ok(object)
    }

    /// The error that throws a new exception of the given class into the running code.
    pub fn exception(&self, class_name: &str, message: Option<&str>) -> Error {
        match self.new_throwable(class_name, message) {
            Ok(object) => Error::Thrown(object),
            Err(error) => error,
        }
    }

    /// Whether a value of type `from` may be stored where a `to` is expected.
    pub fn is_assignable(&self, from: &TypeName, to: &TypeName) -> Result<bool> {
        match (from, to) {
            (_, &TypeName::Class(ref name)) if name == "java.lang.Object" => {
                Ok(!from.is_primitive())
            },
            (&TypeName::Primitive(a), &TypeName::Primitive(b)) => Ok(a == b),
            (&TypeName::Array(ref a), &TypeName::Array(ref b)) => {
                if a.is_primitive() || b.is_primitive() {
                    Ok(a == b)
                } else {
                    self.is_assignable(a, b)
                }
            },
            (&TypeName::Class(ref a), &TypeName::Class(ref b)) =>
                Ok(self.load_class(a)?.is_subclass_of(b)),
            _ => Ok(false),
        }
    }

    /// Whether a value is an instance of a type. `null` is an instance of no type.
    pub fn is_instance(&self, value: &Value, ty: &TypeName) -> Result<bool> {
        match *value {
            Value::Reference(ref object) => match object.class().component_type() {
                Some(component) => self.is_assignable(&TypeName::array_of(component.clone()), ty),
                None => match *ty {
                    TypeName::Class(ref name) => Ok(object.class().is_subclass_of(name)),
                    _ => Ok(false),
                },
            },
            Value::Null => Ok(false),
            ref primitive => Ok(ty.kind() == Some(primitive.kind()) && ty.is_primitive()),
        }
    }

    /// The runtime type of a value, as a type name.
    pub fn type_of(&self, value: &Value) -> TypeName {
        match *value {
            Value::Int(_) => TypeName::int(),
            Value::Long(_) => TypeName::Primitive(Primitive::Long),
            Value::Float(_) => TypeName::Primitive(Primitive::Float),
            Value::Double(_) => TypeName::Primitive(Primitive::Double),
            Value::Reference(ref object) => match object.class().component_type() {
                Some(component) => TypeName::array_of(component.clone()),
                None => TypeName::class(object.class_name()),
            },
            Value::Null => TypeName::object(),
        }
    }

    /// Runs a method with the given arguments (`this` first, for instance methods).
    pub fn invoke(&self, method: &Method, args: Vec<Value>) -> Result<Option<Value>> {
        frame::invoke(self, method, args)
    }

    /// Dispatches an instance method on the runtime class of `receiver`.
    pub fn invoke_virtual(&self, receiver: &ObjectRef, key: &MethodKey, mut args: Vec<Value>)
                          -> Result<Option<Value>> {
        let method = receiver.class().find_method(key).ok_or_else(|| Error::NoSuchMethod {
            class: receiver.class_name().to_string(),
            method: key.to_string(),
        })?;
        args.insert(0, Value::Reference(receiver.clone()));
        self.invoke(&method, args)
    }

    /// Invokes a static method.
    pub fn invoke_static(&self, class_name: &str, key: &MethodKey, args: Vec<Value>)
                         -> Result<Option<Value>> {
        let class = self.load_class(class_name)?;
        let method = class.find_method(key).ok_or_else(|| Error::NoSuchMethod {
            class: class_name.to_string(),
            method: key.to_string(),
        })?;
        self.invoke(&method, args)
    }

    /// Allocates an instance and runs the constructor with the given descriptor.
    pub fn instantiate(&self, class_name: &str, constructor_descriptor: &str, mut args: Vec<Value>)
                       -> Result<ObjectRef> {
        let class = self.load_class(class_name)?;
        if class.is_abstract() || class.is_interface() {
            return Err(self.exception("java.lang.InstantiationError", Some(class_name)));
        }
        let key = MethodKey::new("<init>", constructor_descriptor);
        let constructor = class.declared_method(&key).cloned().ok_or_else(|| {
            Error::NoSuchMethod { class: class_name.to_string(), method: key.to_string() }
        })?;
        let object = Object::new_instance(class);
        args.insert(0, Value::Reference(object.clone()));
        self.invoke(&constructor, args)?;
        Ok(object)
    }

    /// The string form of a value, using `toString()` for objects.
    pub fn to_display_string(&self, value: &Value) -> Result<String> {
        match *value {
            Value::Reference(ref object) => {
                let key = MethodKey::new("toString", "()Ljava/lang/String;");
                match self.invoke_virtual(object, &key, vec![])? {
                    Some(result) => Ok(result.as_str().map(String::from)
                                       .unwrap_or_else(|| result.to_string())),
                    None => Ok(String::from("null")),
                }
            },
            ref other => Ok(other.to_string()),
        }
    }
}

impl Default for ClassLoader {
    fn default() -> Self {
        ClassLoader::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::class_def::FieldDef;
    use crate::model::method::MethodDescription;

    struct Source(HashMap<String, ClassDef>);

    impl ClassProvider for Source {
        fn provide(&self, _: &ClassLoader, name: &str) -> Result<Option<ClassDef>> {
            Ok(self.0.get(name).cloned())
        }
    }

    fn with_source(defs: Vec<ClassDef>) -> (ClassLoader, Arc<Source>) {
        let source = Arc::new(Source(defs.into_iter().map(|d| (d.name.clone(), d)).collect()));
        let loader = ClassLoader::new();
        let weak: Weak<dyn ClassProvider> = Arc::downgrade(&source) as Weak<dyn ClassProvider>;
        loader.set_provider(weak);
        (loader, source)
    }

    #[test]
    fn loads_through_the_provider_once() {
        let mut def = ClassDef::new("a.Point", "java.lang.Object");
        def.add_field(FieldDef::new(0, TypeName::int(), "x"));
        let (loader, _source) = with_source(vec![def]);
        let first = loader.load_class("a.Point").unwrap();
        let second = loader.load_class("a.Point").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(matches!(loader.load_class("a.Missing"), Err(Error::ClassNotFound(_))));
    }

    #[test]
    fn detects_circular_inheritance() {
        let (loader, _source) = with_source(vec![ClassDef::new("a.A", "a.B"),
                                                 ClassDef::new("a.B", "a.A")]);
        assert!(matches!(loader.load_class("a.A"), Err(Error::ClassCircularity(_))));
    }

    #[test]
    fn instance_checks() {
        let loader = ClassLoader::new();
        let text = loader.string("hi");
        assert!(loader.is_instance(&text, &TypeName::class("java.lang.CharSequence")).unwrap());
        assert!(!loader.is_instance(&Value::Null, &TypeName::string()).unwrap());
        let strings = loader.new_array(&TypeName::string(), vec![text]);
        assert!(loader.is_instance(&strings,
                                   &TypeName::array_of(TypeName::object())).unwrap());
        assert!(!loader.is_instance(&strings,
                                    &TypeName::array_of(TypeName::int())).unwrap());
        let list = loader.new_list(vec![]);
        assert!(loader.is_instance(&list, &TypeName::class("java.util.Collection")).unwrap());
    }

    #[test]
    fn throwables_carry_messages() {
        let loader = ClassLoader::new();
        let error = loader.exception("java.lang.IllegalStateException", Some("broken"));
        assert_eq!("uncaught exception java.lang.IllegalStateException: broken",
                   error.to_string());
        assert!(loader.new_throwable("java.lang.String", None).is_err());
    }

    #[test]
    fn native_methods_run_through_invoke() {
        let mut def = ClassDef::new("a.Greeter", "java.lang.Object");
        def.add_default_constructor().unwrap();
        def.add_native_method(MethodDescription::new(TypeName::string(), "greet",
                                                     vec![TypeName::string()]),
                              |loader, args| {
                                  let name = crate::vm::native::string_arg(loader, args, 1)?;
                                  Ok(Some(loader.string(&format!("Hello, {}", name))))
                              });
        let (loader, _source) = with_source(vec![def]);
        let greeter = loader.instantiate("a.Greeter", "()V", vec![]).unwrap();
        let key = MethodKey::new("greet", "(Ljava/lang/String;)Ljava/lang/String;");
        let result = loader.invoke_virtual(&greeter, &key, vec![loader.string("Fred")]).unwrap();
        assert_eq!(Some("Hello, Fred"), result.as_ref().and_then(|v| v.as_str()));
    }
}
