//! The core library classes every loader starts with, implemented natively.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;
use crate::model::access_flags::{ACC_ABSTRACT, ACC_FINAL, ACC_PRIVATE, ACC_PUBLIC, ACC_STATIC};
use crate::model::class_def::{ClassDef, FieldDef};
use crate::model::method::MethodDescription;
use crate::model::types::{Primitive, TypeName};
use crate::vm::class::Class;
use crate::vm::class_loader::ClassLoader;
use crate::vm::native::{arg, int_arg, object_arg, string_arg};
use crate::vm::value::{Object, ObjectData, Value};

/// The linked bootstrap classes, with the ones the loader needs by hand.
pub struct Bootstrap {
    pub all: Vec<Arc<Class>>,
    pub object: Arc<Class>,
    pub string: Arc<Class>,
    pub list: Arc<Class>,
    pub wrappers: HashMap<Primitive, Arc<Class>>,
}

fn method(return_type: TypeName, name: &str, argument_types: Vec<TypeName>) -> MethodDescription {
    MethodDescription::new(return_type, name, argument_types)
}

fn static_method(return_type: TypeName, name: &str, argument_types: Vec<TypeName>)
                 -> MethodDescription {
    method(return_type, name, argument_types).with_modifiers(ACC_PUBLIC | ACC_STATIC)
}

fn native<F>(def: &mut ClassDef, description: MethodDescription, function: F)
    where F: Fn(&ClassLoader, &[Value]) -> Result<Option<Value>> + Send + Sync + 'static
{
    def.add_native_method(description, function);
}

fn no_op_constructor(def: &mut ClassDef) {
    native(def, method(TypeName::void(), "<init>", vec![]), |_, _| Ok(None));
}

/// Links the classes in definition order: each class's superclass and interfaces precede it.
struct Linker {
    all: Vec<Arc<Class>>,
}

impl Linker {
    fn find(&self, name: &str) -> Option<Arc<Class>> {
        self.all.iter().find(|c| c.name() == name).cloned()
    }

    fn link(&mut self, def: ClassDef) -> Arc<Class> {
        let superclass = def.super_name.as_ref().and_then(|name| self.find(name));
        let interfaces = def.interfaces.iter().filter_map(|name| self.find(name)).collect();
        let class = Arc::new(Class::new(def, superclass, interfaces));
        self.all.push(class.clone());
        class
    }
}

fn object_class() -> ClassDef {
    let mut def = ClassDef::new("java.lang.Object", "java.lang.Object");
    def.super_name = None;
    no_op_constructor(&mut def);
    native(&mut def, method(TypeName::string(), "toString", vec![]), |loader, args| {
        let this = object_arg(loader, args, 0)?;
        Ok(Some(loader.string(&this.to_string())))
    });
    native(&mut def, method(TypeName::int(), "hashCode", vec![]), |loader, args| {
        let this = object_arg(loader, args, 0)?;
        Ok(Some(Value::Int(Arc::as_ptr(this) as usize as i32)))
    });
    native(&mut def, method(TypeName::boolean(), "equals", vec![TypeName::object()]),
           |loader, args| {
               let this = object_arg(loader, args, 0)?;
               Ok(Some(Value::from_bool(arg(args, 1)?.same(&Value::Reference(this.clone())))))
           });
    def
}

fn string_hash(s: &str) -> i32 {
    s.encode_utf16().fold(0i32, |hash, unit| hash.wrapping_mul(31).wrapping_add(unit as i32))
}

fn string_class() -> ClassDef {
    let mut def = ClassDef::new("java.lang.String", "java.lang.Object")
        .with_interface("java.lang.CharSequence");
    def.access_flags |= ACC_FINAL;
    native(&mut def, method(TypeName::int(), "length", vec![]), |loader, args| {
        Ok(Some(Value::Int(string_arg(loader, args, 0)?.encode_utf16().count() as i32)))
    });
    native(&mut def, method(TypeName::boolean(), "isEmpty", vec![]), |loader, args| {
        Ok(Some(Value::from_bool(string_arg(loader, args, 0)?.is_empty())))
    });
    native(&mut def, method(TypeName::string(), "toUpperCase", vec![]), |loader, args| {
        Ok(Some(loader.string(&string_arg(loader, args, 0)?.to_uppercase())))
    });
    native(&mut def, method(TypeName::string(), "toLowerCase", vec![]), |loader, args| {
        Ok(Some(loader.string(&string_arg(loader, args, 0)?.to_lowercase())))
    });
    native(&mut def, method(TypeName::string(), "trim", vec![]), |loader, args| {
        Ok(Some(loader.string(string_arg(loader, args, 0)?.trim())))
    });
    native(&mut def, method(TypeName::string(), "concat", vec![TypeName::string()]),
           |loader, args| {
               let joined = format!("{}{}", string_arg(loader, args, 0)?,
                                    string_arg(loader, args, 1)?);
               Ok(Some(loader.string(&joined)))
           });
    native(&mut def, method(TypeName::string(), "toString", vec![]), |_, args| {
        Ok(Some(arg(args, 0)?.clone()))
    });
    native(&mut def, method(TypeName::int(), "hashCode", vec![]), |loader, args| {
        Ok(Some(Value::Int(string_hash(string_arg(loader, args, 0)?))))
    });
    native(&mut def, method(TypeName::boolean(), "equals", vec![TypeName::object()]),
           |loader, args| {
               let this = string_arg(loader, args, 0)?;
               Ok(Some(Value::from_bool(arg(args, 1)?.as_str() == Some(this))))
           });
    native(&mut def, static_method(TypeName::string(), "valueOf", vec![TypeName::object()]),
           |loader, args| {
               let text = loader.to_display_string(arg(args, 0)?)?;
               Ok(Some(loader.string(&text)))
           });
    def
}

fn char_sequence_class() -> ClassDef {
    let mut def = ClassDef::interface("java.lang.CharSequence");
    def.add_abstract_method(method(TypeName::int(), "length", vec![]));
    def
}

fn number_class() -> ClassDef {
    let mut def = ClassDef::new("java.lang.Number", "java.lang.Object");
    def.access_flags |= ACC_ABSTRACT;
    no_op_constructor(&mut def);
    for &primitive in &[Primitive::Int, Primitive::Long, Primitive::Float, Primitive::Double,
                        Primitive::Short, Primitive::Byte] {
        let name = primitive.unbox_method();
        native(&mut def, method(TypeName::Primitive(primitive), &name, vec![]),
               move |loader, args| {
                   let value = boxed_value(object_arg(loader, args, 0)?);
                   Ok(narrow(value, primitive))
               });
    }
    def
}

/// Converts an unboxed value to a primitive type, truncating to `short` and `byte`.
fn narrow(value: Value, primitive: Primitive) -> Option<Value> {
    let converted = value.convert(primitive.kind()?)?;
    Some(match (primitive, converted) {
        (Primitive::Short, Value::Int(v)) => Value::Int(v as i16 as i32),
        (Primitive::Byte, Value::Int(v)) => Value::Int(v as i8 as i32),
        (Primitive::Char, Value::Int(v)) => Value::Int(v as u16 as i32),
        (Primitive::Boolean, Value::Int(v)) => Value::from_bool(v != 0),
        (_, converted) => converted,
    })
}

/// The primitive held by a boxed object, or `null` for anything else.
fn boxed_value(object: &Object) -> Value {
    match object.data {
        ObjectData::Boxed(_, ref value) => value.clone(),
        _ => Value::Null,
    }
}

fn wrapper_hash(value: &Value) -> i32 {
    match *value {
        Value::Int(v) => v,
        Value::Long(v) => (v ^ ((v as u64) >> 32) as i64) as i32,
        Value::Float(v) => v.to_bits() as i32,
        Value::Double(v) => {
            let bits = v.to_bits();
            (bits ^ (bits >> 32)) as i32
        },
        _ => 0,
    }
}

fn wrapper_class(primitive: Primitive) -> ClassDef {
    let super_name = match primitive {
        Primitive::Boolean | Primitive::Char => "java.lang.Object",
        _ => "java.lang.Number",
    };
    let ty = TypeName::Primitive(primitive);
    let mut def = ClassDef::new(primitive.wrapper_class(), super_name);
    def.access_flags |= ACC_FINAL;
    native(&mut def, static_method(TypeName::class(primitive.wrapper_class()), "valueOf",
                                   vec![ty.clone()]),
           move |loader, args| Ok(Some(loader.boxed(primitive, arg(args, 0)?.clone()))));
    if primitive == Primitive::Boolean || primitive == Primitive::Char {
        native(&mut def, method(ty, &primitive.unbox_method(), vec![]), move |loader, args| {
            let value = boxed_value(object_arg(loader, args, 0)?);
            Ok(narrow(value, primitive))
        });
    }
    native(&mut def, method(TypeName::int(), "hashCode", vec![]), move |loader, args| {
        let value = boxed_value(object_arg(loader, args, 0)?);
        let hash = match primitive {
            Primitive::Boolean if value.as_int() == Some(0) => 1237,
            Primitive::Boolean => 1231,
            _ => wrapper_hash(&value),
        };
        Ok(Some(Value::Int(hash)))
    });
    native(&mut def, method(TypeName::boolean(), "equals", vec![TypeName::object()]),
           |loader, args| {
               let this = object_arg(loader, args, 0)?;
               let equal = match *arg(args, 1)? {
                   Value::Reference(ref other) => Arc::ptr_eq(this.class(), other.class())
                       && boxed_value(this).same(&boxed_value(other)),
                   _ => false,
               };
               Ok(Some(Value::from_bool(equal)))
           });
    def
}

fn collection_classes() -> Vec<ClassDef> {
    let mut collection = ClassDef::interface("java.util.Collection");
    collection.add_abstract_method(method(TypeName::int(), "size", vec![]));
    collection.add_abstract_method(method(TypeName::boolean(), "isEmpty", vec![]));
    collection.add_abstract_method(method(TypeName::boolean(), "add", vec![TypeName::object()]));

    let mut list = ClassDef::interface("java.util.List").with_interface("java.util.Collection");
    list.add_abstract_method(method(TypeName::object(), "get", vec![TypeName::int()]));

    let mut array_list = ClassDef::new("java.util.ArrayList", "java.lang.Object")
        .with_interface("java.util.List");
    no_op_constructor(&mut array_list);
    native(&mut array_list, method(TypeName::int(), "size", vec![]), |loader, args| {
        let elements = list_elements(loader, args)?;
        let size = elements.read().len();
        Ok(Some(Value::Int(size as i32)))
    });
    native(&mut array_list, method(TypeName::boolean(), "isEmpty", vec![]), |loader, args| {
        let elements = list_elements(loader, args)?;
        let empty = elements.read().is_empty();
        Ok(Some(Value::from_bool(empty)))
    });
    native(&mut array_list, method(TypeName::boolean(), "add", vec![TypeName::object()]),
           |loader, args| {
               let element = arg(args, 1)?.clone();
               list_elements(loader, args)?.write().push(element);
               Ok(Some(Value::from_bool(true)))
           });
    native(&mut array_list, method(TypeName::object(), "get", vec![TypeName::int()]),
           |loader, args| {
               let index = int_arg(args, 1)?;
               let elements = list_elements(loader, args)?;
               let element = elements.read().get(index as usize).cloned();
               match element {
                   Some(element) if index >= 0 => Ok(Some(element)),
                   _ => Err(loader.exception("java.lang.IndexOutOfBoundsException",
                                             Some(&format!("Index: {}", index)))),
               }
           });
    vec![collection, list, array_list]
}

fn list_elements<'a>(loader: &ClassLoader, args: &'a [Value])
                     -> Result<&'a parking_lot::RwLock<Vec<Value>>> {
    let this = object_arg(loader, args, 0)?;
    this.elements().ok_or_else(|| crate::error::Error::TypeMismatch {
        expected: String::from("java.util.ArrayList"),
        actual: this.class_name().to_string(),
    })
}

fn throwable_class() -> ClassDef {
    let mut def = ClassDef::new("java.lang.Throwable", "java.lang.Object");
    def.add_field(FieldDef::new(ACC_PRIVATE, TypeName::string(), "message"));
    no_op_constructor(&mut def);
    native(&mut def, method(TypeName::void(), "<init>", vec![TypeName::string()]),
           |loader, args| {
               let this = object_arg(loader, args, 0)?;
               if let Some(slot) = this.class().field_slot("java.lang.Throwable", "message") {
                   this.put_slot(slot, arg(args, 1)?.clone());
               }
               Ok(None)
           });
    native(&mut def, method(TypeName::string(), "getMessage", vec![]), |loader, args| {
        let this = object_arg(loader, args, 0)?;
        Ok(Some(this.get_field("message").unwrap_or(Value::Null)))
    });
    def
}

/// Throwable subclasses, each after its superclass.
const EXCEPTIONS: &[(&str, &str)] = &[
    ("java.lang.Exception", "java.lang.Throwable"),
    ("java.lang.Error", "java.lang.Throwable"),
    ("java.lang.RuntimeException", "java.lang.Exception"),
    ("java.io.IOException", "java.lang.Exception"),
    ("java.lang.IllegalArgumentException", "java.lang.RuntimeException"),
    ("java.lang.IllegalStateException", "java.lang.RuntimeException"),
    ("java.lang.NullPointerException", "java.lang.RuntimeException"),
    ("java.lang.ClassCastException", "java.lang.RuntimeException"),
    ("java.lang.ArithmeticException", "java.lang.RuntimeException"),
    ("java.lang.IndexOutOfBoundsException", "java.lang.RuntimeException"),
    ("java.lang.ArrayIndexOutOfBoundsException", "java.lang.IndexOutOfBoundsException"),
    ("java.lang.NegativeArraySizeException", "java.lang.RuntimeException"),
    ("java.lang.UnsupportedOperationException", "java.lang.RuntimeException"),
    ("java.lang.LinkageError", "java.lang.Error"),
    ("java.lang.AbstractMethodError", "java.lang.LinkageError"),
    ("java.lang.InstantiationError", "java.lang.LinkageError"),
];

pub fn classes() -> Bootstrap {
    let mut linker = Linker { all: vec![] };
    let object = linker.link(object_class());
    linker.link(char_sequence_class());
    let string = linker.link(string_class());
    linker.link(number_class());

    let mut wrappers = HashMap::new();
    for &primitive in &Primitive::ALL {
        if primitive != Primitive::Void {
            wrappers.insert(primitive, linker.link(wrapper_class(primitive)));
        }
    }
    let mut void = ClassDef::new("java.lang.Void", "java.lang.Object");
    void.access_flags |= ACC_FINAL;
    linker.link(void);

    let mut list = object.clone();
    for def in collection_classes() {
        list = linker.link(def);
    }

    linker.link(throwable_class());
    for &(name, super_name) in EXCEPTIONS {
        linker.link(ClassDef::new(name, super_name));
    }

    Bootstrap {
        all: linker.all,
        object: object,
        string: string,
        list: list,
        wrappers: wrappers,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::method::MethodKey;

    #[test]
    fn every_class_links_to_its_ancestors() {
        let bootstrap = classes();
        let npe = bootstrap.all.iter()
            .find(|c| c.name() == "java.lang.NullPointerException")
            .unwrap();
        assert!(npe.is_subclass_of("java.lang.Throwable"));
        assert!(bootstrap.string.is_subclass_of("java.lang.CharSequence"));
        assert!(bootstrap.list.is_subclass_of("java.util.Collection"));
        assert_eq!("java.util.ArrayList", bootstrap.list.name());
        assert_eq!(8, bootstrap.wrappers.len());
    }

    #[test]
    fn strings_and_wrappers() {
        let loader = ClassLoader::new();
        let text = loader.string("Fred");
        let upper = loader.invoke_virtual(text.as_object().unwrap(),
                                          &MethodKey::new("toUpperCase", "()Ljava/lang/String;"),
                                          vec![]).unwrap();
        assert_eq!(Some("FRED"), upper.as_ref().and_then(Value::as_str));
        assert_eq!(string_hash("hello"), 99162322);

        let boxed = loader.boxed(Primitive::Double, Value::Double(2.5));
        let as_int = loader.invoke_virtual(boxed.as_object().unwrap(),
                                           &MethodKey::new("intValue", "()I"), vec![]).unwrap();
        assert_eq!(Some(2), as_int.and_then(|v| v.as_int()));
        assert_eq!("2.5", boxed.to_string());
    }

    #[test]
    fn array_list_natives() {
        let loader = ClassLoader::new();
        let list = loader.instantiate("java.util.ArrayList", "()V", vec![]).unwrap();
        loader.invoke_virtual(&list, &MethodKey::new("add", "(Ljava/lang/Object;)Z"),
                              vec![loader.string("a")]).unwrap();
        let size = loader.invoke_virtual(&list, &MethodKey::new("size", "()I"), vec![]).unwrap();
        assert_eq!(Some(1), size.and_then(|v| v.as_int()));
        let missing = loader.invoke_virtual(&list, &MethodKey::new("get", "(I)Ljava/lang/Object;"),
                                            vec![Value::Int(5)]);
        let thrown = missing.unwrap_err();
        assert_eq!("java.lang.IndexOutOfBoundsException",
                   thrown.thrown().unwrap().class_name());
    }
}
