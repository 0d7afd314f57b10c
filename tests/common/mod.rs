//! Class definitions and helpers shared by the integration tests.

#![allow(dead_code)]

use rust_plastic::model::access_flags::ACC_PROTECTED;
use rust_plastic::assembler::{ArithOp, Condition};
use rust_plastic::model::{ClassDef, FieldDef, MethodDescription, MethodKey, TypeName, ValueKind};
use rust_plastic::plastic::{FieldId, MethodId, PlasticClass, PlasticManager};
use rust_plastic::vm::{ClassLoader, ObjectRef, Value};
use rust_plastic::Result;

pub fn manager() -> PlasticManager {
    PlasticManager::builder().create()
}

pub fn string_array() -> TypeName {
    TypeName::array_of(TypeName::string())
}

pub fn method_named(class: &PlasticClass, name: &str) -> MethodId {
    class.methods().into_iter()
        .find(|&id| class.method_description(id).unwrap().method_name == name)
        .unwrap_or_else(|| panic!("no method {} in {}", name, class.class_name()))
}

pub fn field_named(class: &PlasticClass, name: &str) -> FieldId {
    class.field_named(name).unwrap_or_else(|| panic!("no field {} in {}", name, class.class_name()))
}

/// Calls an instance method by name and descriptor.
pub fn call(loader: &ClassLoader, instance: &ObjectRef, name: &str, descriptor: &str,
            args: Vec<Value>) -> Result<Option<Value>> {
    loader.invoke_virtual(instance, &MethodKey::new(name, descriptor), args)
}

pub fn strings(value: &Value) -> Vec<String> {
    value.as_object().and_then(|array| array.elements()).expect("an array")
        .read()
        .iter()
        .map(|element| element.as_str().expect("a string").to_string())
        .collect()
}

pub fn string_values(loader: &ClassLoader, values: &[&str]) -> Value {
    loader.new_array(&TypeName::string(), values.iter().map(|v| loader.string(v)).collect())
}

/// `test.Greeter`: `String[] names(String[])` returns its argument, `String greet(String)`
/// throws `java.io.IOException` for an empty name.
pub fn greeter() -> ClassDef {
    let mut def = ClassDef::new("test.Greeter", "java.lang.Object");
    def.add_default_constructor().unwrap();
    def.add_code_method(MethodDescription::new(string_array(), "names", vec![string_array()]),
                        |b| {
                            b.load_argument(0).return_result();
                        })
        .unwrap();
    let greet = MethodDescription::new(TypeName::string(), "greet", vec![TypeName::string()])
        .throws(TypeName::class("java.io.IOException"));
    def.add_code_method(greet, |b| {
        b.load_argument(0)
            .invoke_virtual("java.lang.String", TypeName::int(), "length", vec![])
            .when(Condition::Zero, |b| {
                b.throw_exception("java.io.IOException", "no name");
            })
            .load_constant("Hello, ")
            .load_argument(0)
            .invoke_virtual("java.lang.String", TypeName::string(), "concat",
                            vec![TypeName::string()])
            .return_result();
    })
        .unwrap();
    def
}

/// `test.Counter`: a protected `int touches` field, `void touch()` increments it and
/// `int touches()` reads it.
pub fn counter() -> ClassDef {
    let mut def = ClassDef::new("test.Counter", "java.lang.Object");
    def.add_field(FieldDef::new(ACC_PROTECTED, TypeName::int(), "touches"));
    def.add_default_constructor().unwrap();
    def.add_code_method(MethodDescription::new(TypeName::void(), "touch", vec![]), |b| {
        b.load_this()
            .dup(0)
            .get_field("test.Counter", "touches", &TypeName::int())
            .load_constant(1)
            .arithmetic(ArithOp::Add, ValueKind::Int)
            .put_field("test.Counter", "touches", &TypeName::int())
            .return_result();
    })
        .unwrap();
    def.add_code_method(MethodDescription::new(TypeName::int(), "touches", vec![]), |b| {
        b.load_this().get_field("test.Counter", "touches", &TypeName::int()).return_result();
    })
        .unwrap();
    def
}

/// `test.Greeting`: an interface with `String greet(String)`.
pub fn greeting_interface() -> ClassDef {
    let mut def = ClassDef::interface("test.Greeting");
    def.add_abstract_method(MethodDescription::new(TypeName::string(), "greet",
                                                   vec![TypeName::string()]));
    def
}

/// `test.Shouting`: implements `test.Greeting` by upper-casing the name.
pub fn shouting() -> ClassDef {
    let mut def = ClassDef::new("test.Shouting", "java.lang.Object")
        .with_interface("test.Greeting");
    def.add_default_constructor().unwrap();
    def.add_code_method(MethodDescription::new(TypeName::string(), "greet",
                                               vec![TypeName::string()]),
                        |b| {
                            b.load_argument(0)
                                .invoke_virtual("java.lang.String", TypeName::string(),
                                                "toUpperCase", vec![])
                                .return_result();
                        })
        .unwrap();
    def
}
