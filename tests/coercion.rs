extern crate rust_plastic;

use std::sync::Arc;

use rust_plastic::coerce::{CoercionTuple, TypeCoercer};
use rust_plastic::model::{MethodKey, TypeName};
use rust_plastic::vm::{ClassLoader, Value};
use rust_plastic::Error;

fn coercer() -> (Arc<ClassLoader>, TypeCoercer) {
    let loader = Arc::new(ClassLoader::new());
    (loader.clone(), TypeCoercer::new(loader))
}

fn boolean() -> TypeName {
    TypeName::class("java.lang.Boolean")
}

fn new_list(loader: &ClassLoader, elements: &[&str]) -> Value {
    let list = loader.instantiate("java.util.ArrayList", "()V", vec![]).unwrap();
    let add = MethodKey::new("add", "(Ljava/lang/Object;)Z");
    for element in elements {
        loader.invoke_virtual(&list, &add, vec![loader.string(element)]).unwrap();
    }
    Value::Reference(list)
}

#[test]
fn strings_and_doubles_round_trip() {
    let (loader, coercer) = coercer();
    let double = coercer.coerce(&loader.string("2.27"), &TypeName::class("java.lang.Double"))
        .unwrap();
    assert_eq!("java.lang.Double", double.as_object().unwrap().class_name());
    assert_eq!(Some(2.27), double.unboxed().as_double());

    let text = coercer.coerce(&double, &TypeName::string()).unwrap();
    assert_eq!(Some("2.27"), text.as_str());
}

#[test]
fn null_coerces_to_false() {
    let (_, coercer) = coercer();
    let result = coercer.coerce(&Value::Null, &boolean()).unwrap();
    assert_eq!(Some(0), result.unboxed().as_int());
    // primitive targets use the wrapper coercion
    let result = coercer.coerce(&Value::Null, &TypeName::boolean()).unwrap();
    assert_eq!(Some(0), result.unboxed().as_int());
}

#[test]
fn collections_are_true_when_not_empty() {
    let (loader, coercer) = coercer();
    let empty = coercer.coerce(&new_list(&loader, &[]), &boolean()).unwrap();
    assert_eq!(Some(0), empty.unboxed().as_int());
    let full = coercer.coerce(&new_list(&loader, &["x"]), &boolean()).unwrap();
    assert_eq!(Some(1), full.unboxed().as_int());
}

#[test]
fn null_has_no_coercion_to_other_types() {
    let (_, coercer) = coercer();
    match coercer.coerce(&Value::Null, &TypeName::class("java.lang.Integer")) {
        Err(Error::Coercion { from, to }) => {
            assert_eq!("null", from);
            assert_eq!("java.lang.Integer", to);
        },
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn custom_coercions_are_found_through_the_superclass() {
    let (loader, mut coercer) = coercer();
    coercer.add(CoercionTuple::new("java.lang.Number", "java.lang.Boolean", |loader, value| {
        let nonzero = value.unboxed().as_int().map_or(false, |v| v != 0);
        Ok(loader.boxed(rust_plastic::model::Primitive::Boolean, Value::from_bool(nonzero)))
    }));
    let three = loader.boxed(rust_plastic::model::Primitive::Int, Value::Int(3));
    let result = coercer.coerce(&three, &boolean()).unwrap();
    assert_eq!(Some(1), result.unboxed().as_int());
}
