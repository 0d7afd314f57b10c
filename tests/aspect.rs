extern crate rust_plastic;

mod common;

use std::sync::Arc;

use parking_lot::Mutex;

use rust_plastic::model::{MethodDescription, TypeName};
use rust_plastic::plastic::{AspectInterceptorBuilder, MethodInvocation, PlasticManager};
use rust_plastic::vm::{ObjectRef, Value};
use rust_plastic::{Error, Result};

use common::*;

const GREET: &str = "(Ljava/lang/String;)Ljava/lang/String;";

fn greet_method() -> MethodDescription {
    MethodDescription::new(TypeName::string(), "greet", vec![TypeName::string()])
}

fn shouting_manager() -> (PlasticManager, ObjectRef) {
    let manager = manager();
    manager.add_class_definition(greeting_interface()).unwrap();
    manager.add_class_definition(shouting()).unwrap();
    let shouting = manager.class_loader().instantiate("test.Shouting", "()V", vec![]).unwrap();
    (manager, shouting)
}

fn greet(manager: &PlasticManager, greeting: &ObjectRef, name: &str) -> Option<String> {
    let loader = manager.class_loader();
    call(loader, greeting, "greet", GREET, vec![loader.string(name)]).unwrap()
        .and_then(|v| v.as_str().map(String::from))
}

/// Appends `suffix` to the result.
fn exclaim(suffix: &'static str)
           -> impl Fn(&mut MethodInvocation<'_>) -> Result<()> + Send + Sync {
    move |invocation: &mut MethodInvocation<'_>| -> Result<()> {
        invocation.proceed()?;
        let text = invocation.return_value().and_then(|v| v.as_str()).map(String::from);
        let value = invocation.loader().string(&format!("{}{}", text.unwrap_or_default(),
                                                        suffix));
        invocation.set_return_value(value)?;
        Ok(())
    }
}

#[test]
fn advice_runs_around_the_delegate() {
    let (manager, shouting) = shouting_manager();
    let mut builder = AspectInterceptorBuilder::new(&manager, "test.Greeting", shouting).unwrap()
        .description("<shouting interceptor>");
    builder.advise(&greet_method(), exclaim("!")).unwrap();
    let interceptor = builder.build().unwrap();

    assert!(interceptor.class().is_subclass_of("test.Greeting"));
    assert_eq!(Some(String::from("BARNEY!")), greet(&manager, &interceptor, "barney"));
    let text = manager.class_loader().to_display_string(&Value::Reference(interceptor))
        .unwrap();
    assert_eq!("<shouting interceptor>", text);
}

#[test]
fn accumulated_advice_runs_in_the_order_added() {
    let (manager, shouting) = shouting_manager();
    let order = Arc::new(Mutex::new(vec![]));
    let mut builder = AspectInterceptorBuilder::new(&manager, "test.Greeting", shouting).unwrap();
    for name in ["outer", "inner"] {
        let order = order.clone();
        let record = move |invocation: &mut MethodInvocation<'_>| -> Result<()> {
            order.lock().push(name);
            invocation.proceed()?;
            Ok(())
        };
        builder.advise(&greet_method(), record).unwrap();
    }
    builder.advise_all(exclaim("?")).unwrap();
    let interceptor = builder.build().unwrap();

    assert_eq!(Some(String::from("WILMA?")), greet(&manager, &interceptor, "wilma"));
    assert_eq!(vec!["outer", "inner"], *order.lock());
}

#[test]
fn methods_outside_the_interface_can_not_be_advised() {
    let (manager, shouting) = shouting_manager();
    let mut builder = AspectInterceptorBuilder::new(&manager, "test.Greeting", shouting).unwrap();
    let wave = MethodDescription::new(TypeName::void(), "wave", vec![]);
    match builder.advise(&wave, exclaim("!")).map(|_| ()) {
        Err(Error::Contract(message)) => {
            assert_eq!("method public void wave() is not defined for interface test.Greeting",
                       message)
        },
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn non_accumulating_builders_advise_a_method_once() {
    let (manager, shouting) = shouting_manager();
    let mut builder = AspectInterceptorBuilder::new(&manager, "test.Greeting", shouting).unwrap()
        .accumulating(false);
    builder.advise(&greet_method(), exclaim("!")).unwrap();

    let conflict = |result: Result<()>| match result {
        Err(Error::Conflict(message)) => {
            assert!(message.contains("greet"), "{}", message);
            assert!(message.ends_with("of interface test.Greeting has already been advised"),
                    "{}", message);
        },
        other => panic!("unexpected {:?}", other),
    };
    conflict(builder.advise(&greet_method(), exclaim("?")).map(|_| ()));
    conflict(builder.advise_all(exclaim("?")).map(|_| ()));

    // the rejected advice was not added
    let interceptor = builder.build().unwrap();
    assert_eq!(Some(String::from("FRED!")), greet(&manager, &interceptor, "fred"));
}

#[test]
fn delegates_must_implement_the_interface() {
    let manager = manager();
    manager.add_class_definition(greeting_interface()).unwrap();
    manager.add_class_definition(greeter()).unwrap();
    let greeter = manager.class_loader().instantiate("test.Greeter", "()V", vec![]).unwrap();
    match AspectInterceptorBuilder::new(&manager, "test.Greeting", greeter).map(|_| ()) {
        Err(Error::TypeMismatch { expected, actual }) => {
            assert_eq!("test.Greeting", expected);
            assert_eq!("test.Greeter", actual);
        },
        other => panic!("unexpected {:?}", other),
    }
}
