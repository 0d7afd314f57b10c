//! Type coercion: converting values between reference types through a table of registered
//! conversions.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::model::types::{Primitive, TypeName};
use crate::vm::class::Class;
use crate::vm::class_loader::ClassLoader;
use crate::vm::value::Value;

/// Converts a value of the tuple's source type to its target type.
pub type Coercion = Arc<dyn Fn(&ClassLoader, &Value) -> Result<Value> + Send + Sync>;

/// The key under which coercions from `null` are registered.
pub const NULL_SOURCE: &str = "void";

/// One registered conversion.
#[derive(Clone)]
pub struct CoercionTuple {
    source: String,
    target: String,
    coercion: Coercion,
}

impl CoercionTuple {
    pub fn new<F>(source: &str, target: &str, coercion: F) -> Self
        where F: Fn(&ClassLoader, &Value) -> Result<Value> + Send + Sync + 'static
    {
        CoercionTuple {
            source: source.to_string(),
            target: target.to_string(),
            coercion: Arc::new(coercion),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

impl fmt::Debug for CoercionTuple {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.target)
    }
}

/// Coerces values using a table of [`CoercionTuple`]s.
///
/// A coercion is looked up by the source value's runtime class, then its superclasses, then
/// the interfaces they implement, so a tuple registered for `java.lang.Number` serves every
/// wrapper class. Arrays of references also match tuples registered for `java.lang.Object[]`.
/// `null` matches tuples whose source is [`NULL_SOURCE`].
pub struct TypeCoercer {
    loader: Arc<ClassLoader>,
    tuples: HashMap<(String, String), CoercionTuple>,
}

impl TypeCoercer {
    /// A coercer with the built-in conversions.
    pub fn new(loader: Arc<ClassLoader>) -> Self {
        let mut coercer = TypeCoercer::empty(loader);
        for tuple in builtin_tuples() {
            coercer.add(tuple);
        }
        coercer
    }

    pub fn empty(loader: Arc<ClassLoader>) -> Self {
        TypeCoercer { loader: loader, tuples: HashMap::new() }
    }

    /// Registers a conversion, replacing any previous one for the same pair of types.
    pub fn add(&mut self, tuple: CoercionTuple) -> &mut Self {
        self.tuples.insert((tuple.source.clone(), tuple.target.clone()), tuple);
        self
    }

    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    /// Coerces `value` to `target`. Primitive targets are treated as their wrapper classes; a
    /// value that already is an instance of the target is returned unchanged.
    pub fn coerce(&self, value: &Value, target: &TypeName) -> Result<Value> {
        let target = target.boxed();
        let value = match *value {
            Value::Int(_) | Value::Long(_) | Value::Float(_) | Value::Double(_) => {
                let primitive = self.loader.type_of(value).as_primitive().unwrap_or(Primitive::Int);
                self.loader.boxed(primitive, value.clone())
            },
            ref other => other.clone(),
        };
        if self.loader.is_instance(&value, &target)? {
            return Ok(value);
        }

        let target_name = target.class_name();
        for source in self.lineage(&value) {
            if let Some(tuple) = self.tuples.get(&(source, target_name.clone())) {
                trace!("coercing {} to {} via {:?}", self.loader.type_of(&value), target_name,
                       tuple);
                return (tuple.coercion)(&self.loader, &value);
            }
        }
        Err(Error::Coercion {
            from: if value.is_null() {
                String::from("null")
            } else {
                self.loader.type_of(&value).to_string()
            },
            to: target_name,
        })
    }

    /// The names under which coercions from a value are searched, most specific first.
    fn lineage(&self, value: &Value) -> Vec<String> {
        let object = match value.as_object() {
            Some(object) => object,
            None => return vec![String::from(NULL_SOURCE)],
        };
        let mut names = vec![];
        let class = object.class();
        if let Some(component) = class.component_type() {
            names.push(class.name().to_string());
            if !component.is_primitive() {
                names.push(TypeName::array_of(TypeName::object()).to_string());
            }
        }
        let mut superclass = Some(class);
        let mut chain = vec![];
        while let Some(current) = superclass {
            names.push(current.name().to_string());
            chain.push(current.clone());
            superclass = current.superclass();
        }
        let mut seen = HashSet::new();
        for current in &chain {
            collect_interfaces(current, &mut seen, &mut names);
        }
        names.dedup();
        names
    }
}

fn collect_interfaces(class: &Class, seen: &mut HashSet<String>, names: &mut Vec<String>) {
    for interface in class.interfaces() {
        if seen.insert(interface.name().to_string()) {
            names.push(interface.name().to_string());
            collect_interfaces(interface, seen, names);
        }
    }
}

impl fmt::Debug for TypeCoercer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut tuples: Vec<&CoercionTuple> = self.tuples.values().collect();
        tuples.sort_by(|a, b| (&a.source, &a.target).cmp(&(&b.source, &b.target)));
        f.debug_struct("TypeCoercer").field("tuples", &tuples).finish()
    }
}

fn parse<T: std::str::FromStr>(value: &Value, what: &str) -> Result<T> {
    let input = value.as_str().unwrap_or_default().trim();
    input.parse().map_err(|_| Error::Parse {
        input: input.to_string(),
        message: format!("not a valid {}", what),
    })
}

fn boolean(loader: &ClassLoader, value: bool) -> Value {
    loader.boxed(Primitive::Boolean, Value::from_bool(value))
}

fn to_string(loader: &ClassLoader, value: &Value) -> Result<Value> {
    let string = loader.to_display_string(value)?;
    Ok(loader.string(&string))
}

fn builtin_tuples() -> Vec<CoercionTuple> {
    vec![
        CoercionTuple::new("java.lang.String", "java.lang.Double", |loader, value| {
            let parsed: f64 = parse(value, "double")?;
            Ok(loader.boxed(Primitive::Double, Value::Double(parsed)))
        }),
        CoercionTuple::new("java.lang.String", "java.lang.Float", |loader, value| {
            let parsed: f32 = parse(value, "float")?;
            Ok(loader.boxed(Primitive::Float, Value::Float(parsed)))
        }),
        CoercionTuple::new("java.lang.String", "java.lang.Long", |loader, value| {
            let parsed: i64 = parse(value, "long")?;
            Ok(loader.boxed(Primitive::Long, Value::Long(parsed)))
        }),
        CoercionTuple::new("java.lang.String", "java.lang.Integer", |loader, value| {
            let parsed: i32 = parse(value, "integer")?;
            Ok(loader.boxed(Primitive::Int, Value::Int(parsed)))
        }),
        CoercionTuple::new("java.lang.String", "java.lang.Boolean", |loader, value| {
            let input = value.as_str().unwrap_or_default().trim();
            if input.is_empty() || input.eq_ignore_ascii_case("false") {
                Ok(boolean(loader, false))
            } else if input.eq_ignore_ascii_case("true") {
                Ok(boolean(loader, true))
            } else {
                Err(Error::Parse {
                    input: input.to_string(),
                    message: String::from("not a valid boolean"),
                })
            }
        }),
        CoercionTuple::new("java.lang.Number", "java.lang.String", to_string),
        CoercionTuple::new("java.lang.Double", "java.lang.String", to_string),
        CoercionTuple::new("java.lang.Object", "java.lang.String", to_string),
        CoercionTuple::new(NULL_SOURCE, "java.lang.Boolean",
                           |loader, _| Ok(boolean(loader, false))),
        CoercionTuple::new("java.util.Collection", "java.lang.Boolean", |loader, value| {
            let empty = value.as_object()
                .and_then(|object| object.elements())
                .map_or(true, |elements| elements.read().is_empty());
            Ok(boolean(loader, !empty))
        }),
        CoercionTuple::new("java.lang.Object[]", "java.util.List", |loader, value| {
            let elements = value.as_object()
                .and_then(|object| object.elements())
                .map(|elements| elements.read().clone())
                .unwrap_or_default();
            Ok(loader.new_list(elements))
        }),
    ]
}
