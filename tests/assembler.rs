extern crate rust_plastic;

use rust_plastic::assembler::{disassemble_class, ArithOp, Condition, InstructionBuilder};
use rust_plastic::model::access_flags::{ACC_PUBLIC, ACC_STATIC};
use rust_plastic::model::{ClassDef, MethodDescription, TypeName, ValueKind};
use rust_plastic::vm::{ClassLoader, Value};
use rust_plastic::{Error, Result};

fn static_method(signature: &str) -> MethodDescription {
    MethodDescription::parse(signature).unwrap().with_modifiers(ACC_PUBLIC | ACC_STATIC)
}

/// Defines `test.Tools` with one static method and calls it.
fn run<F>(signature: &str, args: Vec<Value>, body: F) -> Result<Option<Value>>
    where F: FnOnce(&mut InstructionBuilder)
{
    let loader = ClassLoader::new();
    let description = static_method(signature);
    let key = description.key();
    let mut def = ClassDef::new("test.Tools", "java.lang.Object");
    def.add_code_method(description, body)?;
    loader.define(def)?;
    loader.invoke_static("test.Tools", &key, args)
}

#[test]
fn iterating_an_array_visits_every_element() {
    let loader = ClassLoader::new();
    let description = static_method("int totalLength(java.lang.String[] names)");
    let key = description.key();
    let mut def = ClassDef::new("test.Tools", "java.lang.Object");
    def.add_code_method(description, |b| {
        b.start_variable(TypeName::int(), |b, total| {
            b.load_constant(0).store_variable(total);
            b.load_argument(0).iterate_array(&TypeName::string(), |b| {
                b.invoke_virtual("java.lang.String", TypeName::int(), "length", vec![])
                    .load_variable(total)
                    .arithmetic(ArithOp::Add, ValueKind::Int)
                    .store_variable(total);
            });
            b.load_variable(total).return_result();
        });
    })
        .unwrap();
    loader.define(def).unwrap();

    let names = ["Fred", "Barney", "Wilma"].iter().map(|name| loader.string(name)).collect();
    let names = loader.new_array(&TypeName::string(), names);
    let total = loader.invoke_static("test.Tools", &key, vec![names]).unwrap();
    assert_eq!(Some(15), total.and_then(|v| v.as_int()));
}

#[test]
fn switch_cases_fall_out_to_the_following_code() {
    let body = |b: &mut InstructionBuilder| {
        b.start_variable(TypeName::int(), |b, result| {
            b.load_constant(0).store_variable(result);
            b.load_argument(0).start_switch(1, 3, |switch| {
                switch.add_case(1, |b| {
                    b.load_constant(10).store_variable(result);
                });
                switch.add_case(3, |b| {
                    b.load_constant(30).store_variable(result);
                });
                switch.add_default(|b| {
                    b.load_constant(-1).store_variable(result);
                });
            });
            b.load_variable(result).return_result();
        });
    };
    for &(input, expected) in &[(1, 10), (2, -1), (3, 30), (7, -1)] {
        let result = run("int pick(int value)", vec![Value::Int(input)], body).unwrap();
        assert_eq!(Some(expected), result.and_then(|v| v.as_int()), "for {}", input);
    }
}

#[test]
fn the_first_matching_catch_handler_wins() {
    // the superclass handler is added first, so the subclass handler never runs
    let result = run("int divide(int a, int b)", vec![Value::Int(4), Value::Int(0)], |b| {
        b.start_try_catch(|block| {
            block.add_try(|b| {
                b.load_argument(0)
                    .load_argument(1)
                    .arithmetic(ArithOp::Div, ValueKind::Int)
                    .return_result();
            });
            block.add_catch("java.lang.RuntimeException", |b| {
                b.pop().load_constant(-2).return_result();
            });
            block.add_catch("java.lang.ArithmeticException", |b| {
                b.pop().load_constant(-1).return_result();
            });
        });
        b.load_constant(0).return_result();
    }).unwrap();
    assert_eq!(Some(-2), result.and_then(|v| v.as_int()));
}

#[test]
fn finally_runs_on_every_path() {
    let body = |b: &mut InstructionBuilder| {
        b.start_variable(TypeName::int(), |b, result| {
            b.load_constant(0).store_variable(result);
            b.start_try_catch(|block| {
                block.add_try(|b| {
                    b.load_argument(0).when(Condition::Zero, |b| {
                        b.throw_exception("java.lang.IllegalStateException", "zero");
                    });
                    b.load_constant(1).store_variable(result);
                });
                block.add_catch("java.lang.IllegalStateException", |b| {
                    b.pop().load_constant(2).store_variable(result);
                });
                block.add_finally(|b| {
                    b.load_variable(result)
                        .load_constant(10)
                        .arithmetic(ArithOp::Mul, ValueKind::Int)
                        .store_variable(result);
                });
            });
            b.load_variable(result).return_result();
        });
    };
    let normal = run("int attempt(int value)", vec![Value::Int(5)], body).unwrap();
    assert_eq!(Some(10), normal.and_then(|v| v.as_int()));
    let caught = run("int attempt(int value)", vec![Value::Int(0)], body).unwrap();
    assert_eq!(Some(20), caught.and_then(|v| v.as_int()));
}

#[test]
fn exceptions_escaping_finally_are_rethrown() {
    let error = run("void fail()", vec![], |b| {
        b.start_try_catch(|block| {
            block.add_try(|b| {
                b.throw_exception("java.lang.UnsupportedOperationException", "nope");
            });
            block.add_catch("java.lang.IllegalStateException", |b| {
                b.pop();
            });
            block.add_finally(|b| {
                b.load_constant(1).pop();
            });
        });
        b.return_result();
    }).unwrap_err();
    let thrown = error.thrown().unwrap();
    assert_eq!("java.lang.UnsupportedOperationException", thrown.class_name());
    assert_eq!(Some(String::from("nope")), thrown.message());
}

#[test]
fn badly_typed_bodies_are_rejected_when_added() {
    let mut def = ClassDef::new("test.Tools", "java.lang.Object");
    let result = def.add_code_method(static_method("int broken()"), |b| {
        b.load_constant("not a number").return_result();
    });
    match result {
        Err(Error::Assembly { method, .. }) => assert_eq!("test.Tools.broken()I", method),
        other => panic!("unexpected {:?}", other.map(|_| ())),
    }
}

#[test]
fn disassembly_shows_members_and_instructions() {
    let mut def = ClassDef::new("test.Tools", "java.lang.Object");
    def.add_code_method(static_method("int twice(int value)"), |b| {
        b.load_argument(0)
            .load_constant(2)
            .arithmetic(ArithOp::Mul, ValueKind::Int)
            .return_result();
    })
        .unwrap();
    let text = disassemble_class(&def);
    assert!(text.starts_with("public class test.Tools {"), "{}", text);
    assert!(text.contains("public static int twice(int)"), "{}", text);
    assert!(text.contains("imul"), "{}", text);
}
