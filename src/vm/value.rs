//! Internal representations of values and heap objects.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::model::types::{Primitive, TypeName, ValueKind};
use crate::vm::class::Class;

/// A shared reference to a heap object.
pub type ObjectRef = Arc<Object>;

/// A value on the operand stack, in a local variable, a field or an array element.
#[derive(Debug, Clone)]
pub enum Value {
    /// A 32-bit signed integral type, representing the Java types `byte`, `char`, `short`, `int`,
    /// and `boolean`.
    Int(i32),
    /// A 64-bit signed integral type, representing the Java type `long`.
    Long(i64),
    /// A 32-bit floating-point type, representing the Java type `float`.
    Float(f32),
    /// A 64-bit floating-point type, representing the Java type `double`.
    Double(f64),
    /// A reference to an object in the heap.
    Reference(ObjectRef),
    /// A reference which is `null`.
    Null,
}

impl Value {
    /// The zero value of a type: what fields and array elements start out as.
    pub fn default_for(ty: &TypeName) -> Value {
        match ty.kind() {
            Some(ValueKind::Int) => Value::Int(0),
            Some(ValueKind::Long) => Value::Long(0),
            Some(ValueKind::Float) => Value::Float(0.0),
            Some(ValueKind::Double) => Value::Double(0.0),
            Some(ValueKind::Reference) | None => Value::Null,
        }
    }

    pub fn from_bool(value: bool) -> Value {
        Value::Int(if value { 1 } else { 0 })
    }

    pub fn kind(&self) -> ValueKind {
        match *self {
            Value::Int(_) => ValueKind::Int,
            Value::Long(_) => ValueKind::Long,
            Value::Float(_) => ValueKind::Float,
            Value::Double(_) => ValueKind::Double,
            Value::Reference(_) | Value::Null => ValueKind::Reference,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(*self, Value::Null)
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match *self {
            Value::Reference(ref object) => Some(object),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match *self {
            Value::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match *self {
            Value::Long(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match *self {
            Value::Double(v) => Some(v),
            _ => None,
        }
    }

    /// The contents of a `java.lang.String` reference.
    pub fn as_str(&self) -> Option<&str> {
        self.as_object().and_then(|object| object.as_str())
    }

    /// The primitive inside a boxed reference, or the value itself if it is a primitive.
    pub fn unboxed(&self) -> Value {
        match *self {
            Value::Reference(ref object) => match object.data {
                ObjectData::Boxed(_, ref inner) => inner.clone(),
                _ => self.clone(),
            },
            _ => self.clone(),
        }
    }

    /// Numeric conversion with the semantics of the `i2l`, `d2i`, ... instructions: narrowing
    /// truncates, float-to-integer conversion saturates and maps NaN to zero.
    pub fn convert(&self, to: ValueKind) -> Option<Value> {
        let converted = match *self {
            Value::Int(v) => match to {
                ValueKind::Int => Value::Int(v),
                ValueKind::Long => Value::Long(v as i64),
                ValueKind::Float => Value::Float(v as f32),
                ValueKind::Double => Value::Double(v as f64),
                ValueKind::Reference => return None,
            },
            Value::Long(v) => match to {
                ValueKind::Int => Value::Int(v as i32),
                ValueKind::Long => Value::Long(v),
                ValueKind::Float => Value::Float(v as f32),
                ValueKind::Double => Value::Double(v as f64),
                ValueKind::Reference => return None,
            },
            Value::Float(v) => match to {
                ValueKind::Int => Value::Int(v as i32),
                ValueKind::Long => Value::Long(v as i64),
                ValueKind::Float => Value::Float(v),
                ValueKind::Double => Value::Double(v as f64),
                ValueKind::Reference => return None,
            },
            Value::Double(v) => match to {
                ValueKind::Int => Value::Int(v as i32),
                ValueKind::Long => Value::Long(v as i64),
                ValueKind::Float => Value::Float(v as f32),
                ValueKind::Double => Value::Double(v),
                ValueKind::Reference => return None,
            },
            Value::Reference(_) | Value::Null => return None,
        };
        Some(converted)
    }

    /// Reference identity for objects, bitwise equality for primitives.
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (&Value::Reference(ref a), &Value::Reference(ref b)) => Arc::ptr_eq(a, b),
            (&Value::Null, &Value::Null) => true,
            (&Value::Int(a), &Value::Int(b)) => a == b,
            (&Value::Long(a), &Value::Long(b)) => a == b,
            (&Value::Float(a), &Value::Float(b)) => a.to_bits() == b.to_bits(),
            (&Value::Double(a), &Value::Double(b)) => a.to_bits() == b.to_bits(),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Long(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{:?}", v),
            Value::Double(v) => write!(f, "{:?}", v),
            Value::Reference(ref object) => write!(f, "{}", object),
            Value::Null => write!(f, "null"),
        }
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Value {
        Value::Int(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Value {
        Value::Long(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Value {
        Value::Double(value)
    }
}

impl From<ObjectRef> for Value {
    fn from(object: ObjectRef) -> Value {
        Value::Reference(object)
    }
}

/// The storage of an object, by the kind of object.
pub enum ObjectData {
    /// Field slots, laid out by [`Class::instance_fields`].
    Instance(RwLock<Vec<Value>>),
    Array(RwLock<Vec<Value>>),
    Str(String),
    /// A boxed primitive; `boolean`, `char`, `byte` and `short` are held as `Value::Int`.
    Boxed(Primitive, Value),
    /// The elements of a `java.util.ArrayList`.
    List(RwLock<Vec<Value>>),
    /// Rust data handed into the machine, such as an instance context.
    Host(Arc<dyn Any + Send + Sync>),
}

/// An object in the heap. Every object knows its class.
pub struct Object {
    class: Arc<Class>,
    pub data: ObjectData,
}

impl Object {
    pub fn new(class: Arc<Class>, data: ObjectData) -> ObjectRef {
        Arc::new(Object { class: class, data: data })
    }

    /// A fresh instance of a class, with every field at its zero value.
    pub fn new_instance(class: Arc<Class>) -> ObjectRef {
        let data = if class.is_subclass_of("java.util.ArrayList") {
            ObjectData::List(RwLock::new(vec![]))
        } else {
            let fields = class.instance_fields().iter()
                .map(|f| Value::default_for(&f.ty))
                .collect();
            ObjectData::Instance(RwLock::new(fields))
        };
        Object::new(class, data)
    }

    pub fn class(&self) -> &Arc<Class> {
        &self.class
    }

    pub fn class_name(&self) -> &str {
        self.class.name()
    }

    pub fn as_str(&self) -> Option<&str> {
        match self.data {
            ObjectData::Str(ref s) => Some(s),
            _ => None,
        }
    }

    /// The Rust value inside a host object, if it has the requested type.
    pub fn host<T: Any + Send + Sync>(&self) -> Option<&T> {
        match self.data {
            ObjectData::Host(ref value) => value.downcast_ref::<T>(),
            _ => None,
        }
    }

    pub fn get_slot(&self, slot: usize) -> Option<Value> {
        match self.data {
            ObjectData::Instance(ref fields) => fields.read().get(slot).cloned(),
            _ => None,
        }
    }

    /// Stores into a field slot, returning whether the slot exists.
    pub fn put_slot(&self, slot: usize, value: Value) -> bool {
        match self.data {
            ObjectData::Instance(ref fields) => match fields.write().get_mut(slot) {
                Some(field) => {
                    *field = value;
                    true
                },
                None => false,
            },
            _ => false,
        }
    }

    /// Reads a field by name, searching from the object's own class upwards.
    pub fn get_field(&self, name: &str) -> Option<Value> {
        self.class.field_slot(self.class.name(), name).and_then(|slot| self.get_slot(slot))
    }

    /// The element storage of an array or list.
    pub fn elements(&self) -> Option<&RwLock<Vec<Value>>> {
        match self.data {
            ObjectData::Array(ref elements) | ObjectData::List(ref elements) => Some(elements),
            _ => None,
        }
    }

    /// The string form of the `message` of a throwable.
    pub fn message(&self) -> Option<String> {
        self.get_field("message").and_then(|message| message.as_str().map(String::from))
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.data {
            ObjectData::Str(ref s) => write!(f, "{}", s),
            ObjectData::Boxed(Primitive::Boolean, ref v) => write!(f, "{}", v.as_int() != Some(0)),
            ObjectData::Boxed(Primitive::Char, Value::Int(c)) =>
                write!(f, "{}", std::char::from_u32(c as u32).unwrap_or('\u{fffd}')),
            ObjectData::Boxed(_, ref v) => write!(f, "{}", v),
            ObjectData::Array(ref elements) | ObjectData::List(ref elements) => {
                let elements: Vec<String> = elements.read().iter().map(|e| e.to_string()).collect();
                write!(f, "[{}]", elements.join(", "))
            },
            _ if self.class.is_subclass_of("java.lang.Throwable") => match self.message() {
                Some(message) => write!(f, "{}: {}", self.class_name(), message),
                None => write!(f, "{}", self.class_name()),
            },
            _ => write!(f, "{}@{:x}", self.class_name(), self as *const Object as usize),
        }
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Object({}: {})", self.class_name(), self)
    }
}
