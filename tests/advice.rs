extern crate rust_plastic;

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rust_plastic::assembler::{ArithOp, Condition};
use rust_plastic::model::{ClassDef, MethodDescription, TypeName, ValueKind};
use rust_plastic::plastic::{ClassInstantiator, MethodAdvice, MethodInvocation, PlasticClass,
                            PlasticManager};
use rust_plastic::vm::Value;
use rust_plastic::{Error, Result};

use common::*;

const NAMES: &str = "([Ljava/lang/String;)[Ljava/lang/String;";
const GREET: &str = "(Ljava/lang/String;)Ljava/lang/String;";

/// Upper-cases every name before proceeding.
struct Upcase;

impl MethodAdvice for Upcase {
    fn advise(&self, invocation: &mut MethodInvocation<'_>) -> Result<()> {
        let names = strings(invocation.parameter(0)?);
        let upper: Vec<String> = names.iter().map(|name| name.to_uppercase()).collect();
        let upper: Vec<&str> = upper.iter().map(String::as_str).collect();
        let value = string_values(invocation.loader(), &upper);
        invocation.set_parameter(0, value)?.proceed()?;
        Ok(())
    }
}

/// Prefixes every name with its index before proceeding.
struct Index;

impl MethodAdvice for Index {
    fn advise(&self, invocation: &mut MethodInvocation<'_>) -> Result<()> {
        let names = strings(invocation.parameter(0)?);
        let indexed: Vec<String> = names.iter().enumerate()
            .map(|(index, name)| format!("{}:{}", index, name))
            .collect();
        let indexed: Vec<&str> = indexed.iter().map(String::as_str).collect();
        let value = string_values(invocation.loader(), &indexed);
        invocation.set_parameter(0, value)?.proceed()?;
        Ok(())
    }
}

/// Records the order in which advice runs.
struct Trace {
    name: &'static str,
    log: Arc<parking_lot::Mutex<Vec<String>>>,
}

impl MethodAdvice for Trace {
    fn advise(&self, invocation: &mut MethodInvocation<'_>) -> Result<()> {
        self.log.lock().push(format!("enter {}", self.name));
        invocation.proceed()?;
        self.log.lock().push(format!("leave {}", self.name));
        Ok(())
    }
}

fn advised_greeter<F>(advise: F) -> (PlasticManager, ClassInstantiator)
    where F: FnOnce(&mut PlasticClass)
{
    let manager = manager();
    manager.add_class_definition(greeter()).unwrap();
    let mut transformation = manager.plastic_class("test.Greeter").unwrap();
    advise(transformation.plastic_class());
    let instantiator = transformation.create_instantiator().unwrap();
    (manager, instantiator)
}

#[test]
fn advice_runs_in_the_order_it_was_added() {
    let (manager, instantiator) = advised_greeter(|class| {
        let names = method_named(class, "names");
        class.method(names).unwrap().add_advice(Upcase).unwrap().add_advice(Index).unwrap();
    });
    let loader = manager.class_loader();
    let greeter = instantiator.new_instance().unwrap();

    let input = string_values(loader, &["Fred", "Barney"]);
    let result = call(loader, &greeter, "names", NAMES, vec![input]).unwrap().unwrap();
    assert_eq!(vec!["0:FRED", "1:BARNEY"], strings(&result));
}

#[test]
fn earlier_advice_wraps_later_advice() {
    let log = Arc::new(parking_lot::Mutex::new(vec![]));
    let (outer, inner) = (log.clone(), log.clone());
    let (manager, instantiator) = advised_greeter(move |class| {
        let names = method_named(class, "names");
        class.method(names).unwrap()
            .add_advice(Trace { name: "outer", log: outer }).unwrap()
            .add_advice(Trace { name: "inner", log: inner }).unwrap();
    });
    let loader = manager.class_loader();
    let greeter = instantiator.new_instance().unwrap();
    call(loader, &greeter, "names", NAMES, vec![string_values(loader, &["x"])]).unwrap();

    assert_eq!(vec!["enter outer", "enter inner", "leave inner", "leave outer"], *log.lock());
}

#[test]
fn advice_may_skip_the_implementation() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counted = calls.clone();
    let (manager, instantiator) = advised_greeter(move |class| {
        let greet = method_named(class, "greet");
        class.method(greet).unwrap()
            .add_advice(|invocation: &mut MethodInvocation<'_>| -> Result<()> {
                let name = invocation.parameter(0)?.as_str().unwrap_or_default().to_string();
                if name == "cached" {
                    let value = invocation.loader().string("from cache");
                    invocation.set_return_value(value)?;
                    return Ok(());
                }
                invocation.proceed()?;
                Ok(())
            })
            .unwrap()
            .add_advice(move |invocation: &mut MethodInvocation<'_>| -> Result<()> {
                counted.fetch_add(1, Ordering::SeqCst);
                invocation.proceed()?;
                Ok(())
            })
            .unwrap();
    });
    let loader = manager.class_loader();
    let greeter = instantiator.new_instance().unwrap();

    let cached = call(loader, &greeter, "greet", GREET, vec![loader.string("cached")])
        .unwrap().unwrap();
    assert_eq!(Some("from cache"), cached.as_str());
    let greeted = call(loader, &greeter, "greet", GREET, vec![loader.string("Wilma")])
        .unwrap().unwrap();
    assert_eq!(Some("Hello, Wilma"), greeted.as_str());
    assert_eq!(1, calls.load(Ordering::SeqCst));
}

#[test]
fn declared_exceptions_are_visible_to_advice() {
    let (manager, instantiator) = advised_greeter(|class| {
        let greet = method_named(class, "greet");
        class.method(greet).unwrap()
            .add_advice(|invocation: &mut MethodInvocation<'_>| -> Result<()> {
                invocation.proceed()?;
                if invocation.checked_exception("java.io.IOException").is_some() {
                    let value = invocation.loader().string("Hello, stranger");
                    invocation.set_return_value(value)?;
                }
                Ok(())
            })
            .unwrap();
    });
    let loader = manager.class_loader();
    let greeter = instantiator.new_instance().unwrap();

    let result = call(loader, &greeter, "greet", GREET, vec![loader.string("")]).unwrap().unwrap();
    assert_eq!(Some("Hello, stranger"), result.as_str());
}

#[test]
fn unhandled_declared_exceptions_reach_the_caller() {
    let (manager, instantiator) = advised_greeter(|class| {
        let greet = method_named(class, "greet");
        class.method(greet).unwrap()
            .add_advice(|invocation: &mut MethodInvocation<'_>| -> Result<()> {
                invocation.proceed()?;
                assert!(invocation.did_throw_checked_exception());
                assert!(invocation.return_value().is_none());
                Ok(())
            })
            .unwrap();
    });
    let loader = manager.class_loader();
    let greeter = instantiator.new_instance().unwrap();

    match call(loader, &greeter, "greet", GREET, vec![loader.string("")]) {
        Err(Error::Thrown(exception)) => {
            assert_eq!("java.io.IOException", exception.class_name());
            assert_eq!(Some(String::from("no name")), exception.message());
        },
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn undeclared_checked_exceptions_are_rejected() {
    let (manager, instantiator) = advised_greeter(|class| {
        let greet = method_named(class, "greet");
        class.method(greet).unwrap()
            .add_advice(|invocation: &mut MethodInvocation<'_>| -> Result<()> {
                let exception = invocation.loader()
                    .new_throwable("java.lang.IllegalStateException", None)?;
                invocation.set_checked_exception(exception)?;
                Ok(())
            })
            .unwrap();
    });
    let loader = manager.class_loader();
    let greeter = instantiator.new_instance().unwrap();

    match call(loader, &greeter, "greet", GREET, vec![loader.string("Betty")]) {
        Err(Error::Contract(message)) => assert_eq!(
            "Exception class java.lang.IllegalStateException is not a declared exception type \
             for method public java.lang.String greet(java.lang.String) throws \
             java.io.IOException.", message),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn parameters_must_fit_their_declared_types() {
    let (manager, instantiator) = advised_greeter(|class| {
        let greet = method_named(class, "greet");
        class.method(greet).unwrap()
            .add_advice(|invocation: &mut MethodInvocation<'_>| -> Result<()> {
                invocation.set_parameter(0, Value::Int(5))?;
                invocation.proceed()?;
                Ok(())
            })
            .unwrap();
    });
    let loader = manager.class_loader();
    let greeter = instantiator.new_instance().unwrap();

    match call(loader, &greeter, "greet", GREET, vec![loader.string("Betty")]) {
        Err(Error::TypeMismatch { expected, .. }) => assert_eq!("java.lang.String", expected),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn void_methods_have_no_return_value() {
    let manager = manager();
    manager.add_class_definition(counter()).unwrap();
    let mut transformation = manager.plastic_class("test.Counter").unwrap();
    {
        let class = transformation.plastic_class();
        let touch = method_named(class, "touch");
        class.method(touch).unwrap()
            .add_advice(|invocation: &mut MethodInvocation<'_>| -> Result<()> {
                invocation.proceed()?;
                assert!(invocation.return_value().is_none());
                match invocation.set_return_value(Value::Int(1)) {
                    Err(Error::Contract(_)) => Ok(()),
                    other => panic!("unexpected {:?}", other.map(|_| ())),
                }
            })
            .unwrap();
    }
    let counter = transformation.create_instantiator().unwrap().new_instance().unwrap();
    let loader = manager.class_loader();
    call(loader, &counter, "touch", "()V", vec![]).unwrap();
    call(loader, &counter, "touch", "()V", vec![]).unwrap();
    assert_eq!(Some(2), call(loader, &counter, "touches", "()I", vec![])
               .unwrap().and_then(|v| v.as_int()));
}

#[test]
fn static_methods_can_not_be_advised() {
    let manager = manager();
    let empty = |_: &mut PlasticClass| -> Result<()> { Ok(()) };
    let mut transformation = manager.create_class("java.lang.Object", empty).unwrap();
    let class = transformation.plastic_class();
    let description = MethodDescription::new(TypeName::int(), "answer", vec![])
        .with_modifiers(rust_plastic::model::access_flags::ACC_PUBLIC
                        | rust_plastic::model::access_flags::ACC_STATIC);
    let answer = class.introduce_method(description).unwrap().id();
    match class.method(answer).unwrap().add_advice(Upcase) {
        Err(Error::Contract(message)) => assert!(message.contains("can not be advised")),
        other => panic!("unexpected {:?}", other.map(|_| ())),
    }
}

#[test]
fn advice_wraps_a_replaced_implementation() {
    let (manager, instantiator) = advised_greeter(|class| {
        let greet = method_named(class, "greet");
        class.method(greet).unwrap()
            .add_advice(|invocation: &mut MethodInvocation<'_>| -> Result<()> {
                invocation.proceed()?;
                let greeting = invocation.return_value()
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_uppercase();
                let value = invocation.loader().string(&greeting);
                invocation.set_return_value(value)?;
                Ok(())
            })
            .unwrap()
            .change_implementation(|b| {
                b.load_constant("Bye, ")
                    .load_argument(0)
                    .invoke_virtual("java.lang.String", TypeName::string(), "concat",
                                    vec![TypeName::string()])
                    .return_result();
            })
            .unwrap();
    });
    let loader = manager.class_loader();
    let greeter = instantiator.new_instance().unwrap();

    let result = call(loader, &greeter, "greet", GREET, vec![loader.string("Dino")])
        .unwrap().unwrap();
    assert_eq!(Some("BYE, DINO"), result.as_str());
}

/// `test.Countdown`: `int countdown(int n)` calls itself until `n` is zero.
fn countdown() -> ClassDef {
    let mut def = ClassDef::new("test.Countdown", "java.lang.Object");
    def.add_default_constructor().unwrap();
    let description = MethodDescription::new(TypeName::int(), "countdown", vec![TypeName::int()]);
    def.add_code_method(description, |b| {
        b.load_argument(0).when(Condition::Zero, |b| {
            b.load_constant(0).return_result();
        });
        b.load_this()
            .load_argument(0)
            .load_constant(1)
            .arithmetic(ArithOp::Sub, ValueKind::Int)
            .invoke_virtual("test.Countdown", TypeName::int(), "countdown", vec![TypeName::int()])
            .return_result();
    })
        .unwrap();
    def
}

#[test]
fn recursive_calls_reenter_the_chain() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counted = calls.clone();
    let manager = manager();
    manager.add_class_definition(countdown()).unwrap();
    let mut transformation = manager.plastic_class("test.Countdown").unwrap();
    {
        let class = transformation.plastic_class();
        let method = method_named(class, "countdown");
        class.method(method).unwrap()
            .add_advice(move |invocation: &mut MethodInvocation<'_>| -> Result<()> {
                counted.fetch_add(1, Ordering::SeqCst);
                invocation.proceed()?;
                Ok(())
            })
            .unwrap();
    }
    let countdown = transformation.create_instantiator().unwrap().new_instance().unwrap();
    let loader = manager.class_loader();

    let result = call(loader, &countdown, "countdown", "(I)I", vec![Value::Int(3)]).unwrap();
    assert_eq!(Some(0), result.and_then(|v| v.as_int()));
    assert_eq!(4, calls.load(Ordering::SeqCst));
}
