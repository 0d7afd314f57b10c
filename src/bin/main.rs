#[macro_use]
extern crate log;
#[macro_use]
extern crate rust_plastic;

use std::sync::Arc;

use rust_plastic::logging::SimpleLogger;
use rust_plastic::model::access_flags::ACC_PRIVATE;
use rust_plastic::model::{ClassDef, FieldDef, MethodDescription, MethodKey, TypeName};
use rust_plastic::plastic::{ClassType, MethodInvocation, PlasticClass, PlasticClassEvent,
                            PlasticManager, TransformationPipeline};
use rust_plastic::Result;

/// `demo.Greeter`, whose `greeting` field is filled from the instance context.
fn greeter() -> Result<ClassDef> {
    let mut def = ClassDef::new("demo.Greeter", "java.lang.Object");
    def.add_field(FieldDef::new(ACC_PRIVATE, TypeName::string(), "greeting"));
    def.add_default_constructor()?;
    def.add_code_method(MethodDescription::new(TypeName::string(), "greet",
                                               vec![TypeName::string()]),
                        |b| {
                            b.load_this()
                                .get_field("demo.Greeter", "greeting", &TypeName::string())
                                .load_argument(0)
                                .invoke_virtual("java.lang.String", TypeName::string(), "concat",
                                                vec![TypeName::string()])
                                .return_result();
                        })?;
    Ok(def)
}

fn transform(class: &mut PlasticClass) -> Result<()> {
    for id in class.unclaimed_fields() {
        class.field(id)?.claim("demo")?.inject_from_instance_context()?;
    }
    for id in class.methods() {
        class.method(id)?.add_advice(|invocation: &mut MethodInvocation<'_>| -> Result<()> {
            info!("calling {}", invocation.method());
            invocation.proceed()?;
            Ok(())
        })?;
    }
    Ok(())
}

fn print_disassembly(event: &PlasticClassEvent) {
    let kind = match event.class_type {
        ClassType::Primary => "class",
        ClassType::Support => "supporting class",
    };
    println!("// {} {}\n{}", kind, event.class_name, event.disassembly);
}

fn run(name: &str) -> Result<()> {
    let manager = PlasticManager::builder()
        .packages(vec!["demo"])
        .delegate(TransformationPipeline::new().add(transform))
        .create();
    manager.add_listener(Arc::new(print_disassembly));
    manager.add_class_definition(greeter()?)?;

    let loader = manager.class_loader();
    let greeter = manager.class_instantiator("demo.Greeter")?
        .with("java.lang.String", loader.string("Hello, "))?
        .new_instance()?;
    let key = MethodKey::new("greet", "(Ljava/lang/String;)Ljava/lang/String;");
    let greeting = loader.invoke_virtual(&greeter, &key, vec![loader.string(name)])?;
    if let Some(greeting) = greeting {
        println!("{}", loader.to_display_string(&greeting)?);
    }
    Ok(())
}

fn main() {
    catching!(SimpleLogger::init());
    let name = std::env::args().nth(1).unwrap_or_else(|| String::from("World"));
    with_warn!("demo failed: {}", run(&name));
}
