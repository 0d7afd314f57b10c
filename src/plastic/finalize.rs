//! Turns a sealed class model into class definitions for the stack machine.

use std::collections::HashSet;
use std::sync::Arc;

use crate::assembler::{Code, Instruction, InvokeKind, MethodRef};
use crate::error::{Error, Result};
use crate::model::access_flags::{self, ACC_FINAL, ACC_PRIVATE, ACC_PUBLIC, ACC_STATIC,
                                 ACC_SYNTHETIC};
use crate::model::annotation::AnnotationAccess;
use crate::model::class_def::{ClassDef, FieldDef, MethodBody};
use crate::model::method::{MethodDescription, MethodKey};
use crate::model::types::TypeName;
use crate::plastic::advice::{AdvisedMethod, MethodInvocation, INVOKE_DELEGATE};
use crate::plastic::class::PlasticClass;
use crate::plastic::conduit::FieldConduit;
use crate::plastic::context::{InstanceContext, INSTANCE_CONTEXT_CLASS};
use crate::plastic::field::{FieldAccess, FieldState};
use crate::plastic::method::MethodState;
use crate::plastic::{conform, CONDUIT_GETTER, CONDUIT_SETTER, CONTEXT_FIELD,
                     FIELD_CONDUIT_CLASS, INITIALIZER};
use crate::vm::class::Class;
use crate::vm::native::{self, NativeMethod};
use crate::vm::value::{ObjectRef, Value};

/// The class definitions produced by one transformation.
pub(crate) struct FinishedClass {
    pub(crate) primary: ClassDef,
    /// Classes the primary class refers to; they must be defined first.
    pub(crate) supporting: Vec<ClassDef>,
}

fn context_type() -> TypeName {
    TypeName::class(INSTANCE_CONTEXT_CLASS)
}

fn synthetic_method(modifiers: u16, return_type: TypeName, name: &str,
                    argument_types: Vec<TypeName>) -> MethodDescription {
    MethodDescription::new(return_type, name, argument_types)
        .with_modifiers(modifiers | ACC_SYNTHETIC)
}

fn native_method<F>(description: MethodDescription, function: F) -> MethodState
    where F: Fn(&crate::vm::ClassLoader, &[Value]) -> Result<Option<Value>> + Send + Sync
             + 'static
{
    MethodState::new(description, MethodBody::Native(NativeMethod::new(function)))
}

fn context_arg(args: &[Value], index: usize) -> Result<InstanceContext> {
    native::arg(args, index)?.as_object()
        .and_then(|object| object.host::<InstanceContext>())
        .cloned()
        .ok_or_else(|| Error::Linkage(format!("argument {} is not an instance context", index)))
}

/// The context stored in an instance by the generated constructor. Instances created some
/// other way get an empty context.
fn instance_context(instance: &ObjectRef, class_name: &str) -> InstanceContext {
    instance.class().field_slot(class_name, CONTEXT_FIELD)
        .and_then(|slot| instance.get_slot(slot))
        .and_then(|value| value.as_object().and_then(|o| o.host::<InstanceContext>().cloned()))
        .unwrap_or_else(|| InstanceContext::new(instance.class_name()))
}

#[derive(Clone)]
enum ConduitSource {
    Shared(Arc<dyn FieldConduit>),
    /// Held by each instance in the named hidden field.
    PerInstance(String),
}

impl ConduitSource {
    fn conduit(&self, instance: &ObjectRef, class_name: &str) -> Result<Arc<dyn FieldConduit>> {
        match *self {
            ConduitSource::Shared(ref conduit) => Ok(conduit.clone()),
            ConduitSource::PerInstance(ref field) => instance.class()
                .field_slot(class_name, field)
                .and_then(|slot| instance.get_slot(slot))
                .and_then(|value| value.as_object()
                          .and_then(|o| o.host::<Arc<dyn FieldConduit>>().cloned()))
                .ok_or_else(|| Error::Contract(format!(
                    "instance of {} was not constructed by its instantiator and has no {}",
                    class_name, field))),
        }
    }
}

/// Replaces reads of conduit fields and writes of conduit or injected fields with calls of
/// the generated accessors. The replacements have the same stack effect.
fn redirect_field_access(code: &mut Code, class_name: &str, conduits: &HashSet<String>,
                         read_only: &HashSet<String>) {
    for instruction in code.instructions.iter_mut() {
        let replacement = match *instruction {
            Instruction::GetField(ref field)
                if field.owner == class_name && conduits.contains(&field.name) =>
                MethodRef::new(class_name, field.ty.clone(),
                               &format!("{}{}", CONDUIT_GETTER, field.name), vec![]),
            Instruction::PutField(ref field)
                if field.owner == class_name
                    && (conduits.contains(&field.name) || read_only.contains(&field.name)) =>
                MethodRef::new(class_name, TypeName::void(),
                               &format!("{}{}", CONDUIT_SETTER, field.name),
                               vec![field.ty.clone()]),
            _ => continue,
        };
        *instruction = Instruction::Invoke(InvokeKind::Special, replacement);
    }
}

/// Abstract methods of the superclasses and interfaces that nothing implements.
fn unimplemented_methods(class: &PlasticClass, interfaces: &[Arc<Class>],
                         declared: &HashSet<MethodKey>) -> Vec<MethodDescription> {
    fn collect(class: &Class, seen: &mut HashSet<MethodKey>, out: &mut Vec<MethodDescription>) {
        for method in class.declared_methods() {
            if method.is_abstract() && !method.is_static() && seen.insert(method.key()) {
                out.push(method.description.clone());
            }
        }
        for interface in class.interfaces() {
            collect(interface, seen, out);
        }
        if let Some(superclass) = class.superclass() {
            collect(superclass, seen, out);
        }
    }
    let mut candidates = vec![];
    let mut seen = HashSet::new();
    collect(class.superclass(), &mut seen, &mut candidates);
    for interface in interfaces {
        collect(interface, &mut seen, &mut candidates);
    }
    candidates.into_iter()
        .filter(|d| !declared.contains(&d.key()) && !class.inherits_implementation(d))
        .collect()
}

pub(crate) fn finalize(class: &PlasticClass) -> Result<FinishedClass> {
    let class_name = class.class_name().to_string();
    let super_name = class.super_class_name().to_string();
    if class.is_interface() {
        return Err(Error::Contract(format!("interface {} can not be transformed", class_name)));
    }
    let loader = class.loader().clone();
    let mut fields: Vec<FieldState> = class.fields.clone();
    let mut methods: Vec<MethodState> = class.methods.clone();
    let mut supporting = vec![];

    // every method gets a body
    for method in methods.iter_mut().filter(|m| matches!(m.body, MethodBody::Abstract)) {
        method.description.modifiers &= !access_flags::ACC_ABSTRACT;
        method.body = class.default_body(&method.description)?;
    }
    let mut interfaces = vec![];
    for interface in &class.interfaces {
        interfaces.push(loader.load_class(interface)?);
    }
    let declared: HashSet<MethodKey> = methods.iter().map(|m| m.description.key()).collect();
    for mut description in unimplemented_methods(class, &interfaces, &declared) {
        description.modifiers &= !access_flags::ACC_ABSTRACT;
        let body = class.default_body(&description)?;
        methods.push(MethodState::new(description, body));
    }

    let conduits: HashSet<String> = fields.iter()
        .filter(|f| f.access.is_conduit())
        .map(|f| f.def.name.clone())
        .collect();
    let read_only: HashSet<String> = fields.iter()
        .filter(|f| f.access.is_injected())
        .map(|f| f.def.name.clone())
        .collect();
    for method in methods.iter_mut() {
        if let MethodBody::Code(ref mut code) = method.body {
            redirect_field_access(code, &class_name, &conduits, &read_only);
        }
    }

    let needs_context = !conduits.is_empty() || methods.iter().any(|m| !m.advice.is_empty());
    if needs_context {
        fields.push(FieldState::new(FieldDef::new(ACC_PRIVATE | ACC_SYNTHETIC, context_type(),
                                                  CONTEXT_FIELD)));
    }

    let mut generated = vec![];
    let mut initialize = vec![];
    for field in class.fields.iter().filter(|f| !f.def.is_static()) {
        let name = field.def.name.clone();
        let ty = field.def.ty.clone();
        match field.access {
            FieldAccess::Plain => {},
            FieldAccess::Constant(ref value) => {
                let constant = format!("$constant${}", name);
                let mut def = FieldDef::new(ACC_PRIVATE | ACC_STATIC | ACC_FINAL | ACC_SYNTHETIC,
                                            ty.clone(), &constant);
                def.constant_value = Some(value.clone());
                fields.push(FieldState::new(def));
                initialize.push(Injection::Static(name.clone(), ty.clone(), constant));
            },
            FieldAccess::Computed(ref computed) => {
                let method = format!("$compute${}", name);
                let computed = computed.clone();
                let value_type = ty.clone();
                generated.push(native_method(
                    synthetic_method(ACC_PRIVATE | ACC_STATIC, ty.clone(), &method,
                                     vec![context_type()]),
                    move |loader, args| {
                        let context = context_arg(args, 0)?;
                        let value = computed.get(&context)?;
                        Ok(Some(conform(loader, value, &value_type)?))
                    }));
                initialize.push(Injection::Call(name.clone(), ty.clone(), method));
            },
            FieldAccess::FromContext => {
                let method = format!("$context${}", name);
                let value_type = ty.clone();
                generated.push(native_method(
                    synthetic_method(ACC_PRIVATE | ACC_STATIC, ty.clone(), &method,
                                     vec![context_type()]),
                    move |loader, args| {
                        let context = context_arg(args, 0)?;
                        let value = context.require(&value_type.boxed().class_name())?;
                        Ok(Some(conform(loader, value, &value_type)?))
                    }));
                initialize.push(Injection::Call(name.clone(), ty.clone(), method));
            },
            FieldAccess::Conduit(ref conduit) => {
                generated.extend(conduit_accessors(&class_name, &name, &ty,
                                                   ConduitSource::Shared(conduit.clone()),
                                                   class.write_behind));
            },
            FieldAccess::ComputedConduit(ref computed) => {
                let holder = format!("$conduit${}", name);
                let holder_type = TypeName::class(FIELD_CONDUIT_CLASS);
                fields.push(FieldState::new(FieldDef::new(ACC_PRIVATE | ACC_SYNTHETIC,
                                                          holder_type.clone(), &holder)));
                let computed = computed.clone();
                generated.push(native_method(
                    synthetic_method(ACC_PRIVATE | ACC_STATIC, holder_type.clone(), &holder,
                                     vec![context_type()]),
                    move |loader, args| {
                        let context = context_arg(args, 0)?;
                        let conduit = computed.get(&context)?;
                        Ok(Some(loader.host(FIELD_CONDUIT_CLASS, conduit)))
                    }));
                initialize.push(Injection::Call(holder.clone(), holder_type, holder.clone()));
                generated.extend(conduit_accessors(&class_name, &name, &ty,
                                                   ConduitSource::PerInstance(holder),
                                                   class.write_behind));
            },
        }
        if field.access.is_injected() {
            let owner = class_name.clone();
            let field_name = name.clone();
            generated.push(native_method(
                synthetic_method(ACC_PRIVATE, TypeName::void(),
                                 &format!("{}{}", CONDUIT_SETTER, name), vec![ty.clone()]),
                move |loader, _| {
                    let message = format!("Field {} of class {} is read-only.", field_name, owner);
                    Err(loader.exception("java.lang.IllegalStateException", Some(&message)))
                }));
        }
    }

    for (index, callback) in class.constructor_callbacks.iter().enumerate() {
        let callback = callback.clone();
        generated.push(native_method(
            synthetic_method(ACC_PRIVATE | ACC_STATIC, TypeName::void(),
                             &format!("$construct${}", index),
                             vec![TypeName::object(), context_type()]),
            move |loader, args| {
                let instance = native::object_arg(loader, args, 0)?;
                let context = context_arg(args, 1)?;
                callback.on_construct(instance, &context)?;
                Ok(None)
            }));
    }

    for index in 0..methods.len() {
        if methods[index].advice.is_empty() {
            continue;
        }
        let (moved, invocation_class) = advise(class, &mut methods[index])?;
        methods.push(moved);
        supporting.push(invocation_class);
    }

    methods.extend(generated);
    methods.push(initializer(class, needs_context, &initialize)?);
    methods.push(constructor(class, &methods)?);

    let flags = class.access_flags & !access_flags::ACC_ABSTRACT;
    let primary = ClassDef {
        name: class_name.clone(),
        super_name: Some(super_name),
        interfaces: class.interfaces.clone(),
        access_flags: flags,
        annotations: class.annotations().to_vec(),
        fields: fields.into_iter().map(|f| f.def).collect(),
        methods: methods.into_iter().map(MethodState::into_def).collect(),
    };
    debug!("finalized class {} with {} supporting classes", class_name, supporting.len());
    Ok(FinishedClass {
        primary: primary,
        supporting: supporting,
    })
}

/// Generated accessors that route a field through its conduit.
fn conduit_accessors(class_name: &str, field_name: &str, ty: &TypeName, source: ConduitSource,
                     write_behind: bool) -> Vec<MethodState> {
    let getter = {
        let owner = class_name.to_string();
        let ty = ty.clone();
        let source = source.clone();
        native_method(synthetic_method(ACC_PRIVATE, ty.clone(),
                                       &format!("{}{}", CONDUIT_GETTER, field_name), vec![]),
                      move |loader, args| {
                          let instance = native::object_arg(loader, args, 0)?;
                          let context = instance_context(instance, &owner);
                          let value = source.conduit(instance, &owner)?.get(instance, &context)?;
                          Ok(Some(conform(loader, value, &ty)?))
                      })
    };
    let setter = {
        let owner = class_name.to_string();
        let field = field_name.to_string();
        native_method(synthetic_method(ACC_PRIVATE, TypeName::void(),
                                       &format!("{}{}", CONDUIT_SETTER, field_name),
                                       vec![ty.clone()]),
                      move |loader, args| {
                          let instance = native::object_arg(loader, args, 0)?;
                          let value = native::arg(args, 1)?.clone();
                          let context = instance_context(instance, &owner);
                          source.conduit(instance, &owner)?.set(instance, &context, value.clone())?;
                          if write_behind {
                              if let Some(slot) = instance.class().field_slot(&owner, &field) {
                                  instance.put_slot(slot, value);
                              }
                          }
                          Ok(None)
                      })
    };
    vec![getter, setter]
}

/// How the initializer sets one field.
enum Injection {
    /// Field, type, and the static field holding the value.
    Static(String, TypeName, String),
    /// Field, type, and the static method computing the value from the instance context.
    Call(String, TypeName, String),
}

/// `$plastic$initialize(InstanceContext)`: runs the superclass initializer, stores the context,
/// applies injections in field order, then runs constructor callbacks.
fn initializer(class: &PlasticClass, needs_context: bool, injections: &[Injection])
               -> Result<MethodState> {
    let description = synthetic_method(ACC_PUBLIC, TypeName::void(), INITIALIZER,
                                       vec![context_type()]);
    let owner = class.class_name().to_string();
    let super_name = class.super_class_name().to_string();
    let inherited = class.superclass().find_method(&description.key()).is_some();
    let callbacks = class.constructor_callbacks.len();
    let code = class.assemble(&description, |b| {
        if inherited {
            b.load_this().load_argument(0)
                .invoke_special(&super_name, TypeName::void(), INITIALIZER, vec![context_type()]);
        }
        if needs_context {
            b.load_this().load_argument(0).put_field(&owner, CONTEXT_FIELD, &context_type());
        }
        for injection in injections {
            match *injection {
                Injection::Static(ref field, ref ty, ref constant) => {
                    b.load_this()
                        .get_static_field(&owner, constant, ty)
                        .put_field(&owner, field, ty);
                },
                Injection::Call(ref field, ref ty, ref method) => {
                    b.load_this()
                        .load_argument(0)
                        .invoke_static(&owner, ty.clone(), method, vec![context_type()])
                        .put_field(&owner, field, ty);
                },
            }
        }
        for index in 0..callbacks {
            b.load_this()
                .load_argument(0)
                .invoke_static(&owner, TypeName::void(), &format!("$construct${}", index),
                               vec![TypeName::object(), context_type()]);
        }
        b.return_result();
    })?;
    Ok(MethodState::new(description, MethodBody::Code(code)))
}

/// `<init>(InstanceContext)`: the class's own no-argument constructor (or the superclass one),
/// then the initializer.
fn constructor(class: &PlasticClass, methods: &[MethodState]) -> Result<MethodState> {
    let description = MethodDescription::new(TypeName::void(), "<init>", vec![context_type()]);
    let owner = class.class_name().to_string();
    let default_constructor = MethodKey::new("<init>", "()V");
    let target = if methods.iter().any(|m| m.description.key() == default_constructor) {
        owner.clone()
    } else {
        class.super_class_name().to_string()
    };
    let code = class.assemble(&description, |b| {
        b.load_this()
            .invoke_constructor(&target, vec![])
            .load_this()
            .load_argument(0)
            .invoke_special(&owner, TypeName::void(), INITIALIZER, vec![context_type()])
            .return_result();
    })?;
    Ok(MethodState::new(description, MethodBody::Code(code)))
}

/// Moves the body of an advised method to a private method, builds the invocation class that
/// calls it, and makes the method a trampoline into the advice chain.
fn advise(class: &PlasticClass, method: &mut MethodState) -> Result<(MethodState, ClassDef)> {
    let class_name = class.class_name().to_string();
    let id = class.ids.next();
    let description = method.description.clone();
    let mut moved_description = description.clone();
    moved_description.method_name = format!("advised${}_{}", description.method_name, id);
    moved_description.modifiers = ACC_PRIVATE | ACC_SYNTHETIC;
    let moved = MethodState {
        description: moved_description.clone(),
        annotations: vec![],
        parameter_annotations: vec![vec![]; description.argument_types.len()],
        body: method.body.clone(),
        advice: vec![],
    };

    let invocation_class = format!("{}$Invocation_{}_{}", class_name, description.method_name,
                                   id);
    let mut def = ClassDef::new(&invocation_class, "java.lang.Object");
    def.access_flags |= ACC_FINAL | ACC_SYNTHETIC;
    let delegate = MethodDescription::new(TypeName::object(), INVOKE_DELEGATE.0,
                                          vec![TypeName::object(),
                                               TypeName::array_of(TypeName::object())])
        .with_modifiers(ACC_PUBLIC | ACC_STATIC);
    def.add_code_method(delegate, |b| {
        b.load_argument(0).check_cast(&TypeName::class(&class_name));
        for (index, ty) in description.argument_types.iter().enumerate() {
            b.load_argument(1)
                .load_constant(index as i32)
                .load_array_element(&TypeName::object())
                .check_cast(ty);
        }
        b.invoke_special(&class_name, description.return_type.clone(),
                         &moved_description.method_name, description.argument_types.clone());
        if description.return_type.is_void() {
            b.load_null();
        } else {
            b.box_primitive(&description.return_type);
        }
        b.return_result();
    })?;

    let advised = Arc::new(AdvisedMethod {
        class_name: class_name.clone(),
        description: description,
        annotations: method.annotations.clone(),
        parameter_annotations: method.parameter_annotations.clone(),
        advice: method.advice.clone(),
        invocation_class: invocation_class,
    });
    method.body = MethodBody::Native(NativeMethod::new(move |loader, args| {
        let instance = native::object_arg(loader, args, 0)?.clone();
        let context = instance_context(&instance, &advised.class_name);
        let parameters = args.get(1..).map(<[Value]>::to_vec).unwrap_or_default();
        let mut invocation = MethodInvocation::new(loader, &advised, instance, context,
                                                   parameters);
        invocation.proceed()?;
        invocation.into_outcome()
    }));
    Ok((moved, def))
}
