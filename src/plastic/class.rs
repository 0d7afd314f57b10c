//! The class model: one class under transformation.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::assembler::{Code, InstructionBuilder};
use crate::error::{Error, Result};
use crate::model::access_flags;
use crate::model::annotation::{self, Annotation, AnnotationAccess};
use crate::model::class_def::{ClassDef, FieldDef, MethodBody};
use crate::model::method::{MethodDescription, MethodKey};
use crate::model::types::TypeName;
use crate::plastic::conduit::ConstructorCallback;
use crate::plastic::field::{FieldId, FieldState, PlasticField};
use crate::plastic::method::{DelegateSource, MethodId, MethodState, PlasticMethod};
use crate::plastic::naming::{self, UniqueId};
use crate::vm::class::Class;
use crate::vm::class_loader::ClassLoader;

/// What subclasses need to know about a class that has already been transformed.
#[derive(Debug)]
pub(crate) struct ClassSummary {
    pub(crate) class_name: String,
    pub(crate) methods: HashSet<MethodKey>,
    pub(crate) parent: Option<Arc<ClassSummary>>,
}

impl ClassSummary {
    /// Whether this class or a transformed ancestor implements the method.
    pub(crate) fn implements(&self, key: &MethodKey) -> bool {
        let mut summary = Some(self);
        while let Some(current) = summary {
            if current.methods.contains(key) {
                return true;
            }
            summary = current.parent.as_deref();
        }
        false
    }
}

/// A class under transformation.
///
/// Transformers add fields and methods, change implementations and attach advice and
/// injections. One thread drives a class model at a time. Once the instantiator has been
/// created the model is sealed: every mutator fails with [`Error::Sealed`] and changes
/// nothing.
pub struct PlasticClass {
    name: String,
    super_name: String,
    superclass: Arc<Class>,
    pub(crate) access_flags: u16,
    pub(crate) interfaces: Vec<String>,
    annotations: Vec<Annotation>,
    pub(crate) fields: Vec<FieldState>,
    pub(crate) methods: Vec<MethodState>,
    pub(crate) constructor_callbacks: Vec<Arc<dyn ConstructorCallback>>,
    parent: Option<Arc<ClassSummary>>,
    loader: Arc<ClassLoader>,
    pub(crate) ids: Arc<UniqueId>,
    token: u64,
    pub(crate) write_behind: bool,
    sealed: bool,
}

impl PlasticClass {
    pub(crate) fn new(def: ClassDef, superclass: Arc<Class>, parent: Option<Arc<ClassSummary>>,
                      loader: Arc<ClassLoader>, ids: Arc<UniqueId>, write_behind: bool)
                      -> Self {
        let annotations = annotation::merge_inherited(&def.annotations,
                                                      superclass.annotations());
        PlasticClass {
            name: def.name,
            super_name: superclass.name().to_string(),
            superclass: superclass,
            access_flags: def.access_flags,
            interfaces: def.interfaces,
            annotations: annotations,
            fields: def.fields.into_iter().map(FieldState::new).collect(),
            methods: def.methods.into_iter().map(MethodState::from_def).collect(),
            constructor_callbacks: vec![],
            parent: parent,
            loader: loader,
            ids: ids,
            token: naming::class_token(),
            write_behind: write_behind,
            sealed: false,
        }
    }

    pub fn class_name(&self) -> &str {
        &self.name
    }

    pub fn super_class_name(&self) -> &str {
        &self.super_name
    }

    pub(crate) fn superclass(&self) -> &Arc<Class> {
        &self.superclass
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags & access_flags::ACC_INTERFACE != 0
    }

    pub fn loader(&self) -> &Arc<ClassLoader> {
        &self.loader
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub(crate) fn seal(&mut self) {
        self.sealed = true;
    }

    pub(crate) fn check_open(&self, operation: &str) -> Result<()> {
        if self.sealed {
            Err(Error::sealed(&self.name, operation))
        } else {
            Ok(())
        }
    }

    /// Assembles a body for a method of this class.
    pub(crate) fn assemble<F>(&self, description: &MethodDescription, callback: F) -> Result<Code>
        where F: FnOnce(&mut InstructionBuilder)
    {
        let mut builder = InstructionBuilder::new(&self.name, &self.super_name, description);
        callback(&mut builder);
        builder.build()
    }

    // fields

    fn field_id(&self, index: usize) -> FieldId {
        FieldId { class: self.token, index: index }
    }

    /// Where a field lives in this class, if the id belongs to it.
    pub(crate) fn field_index(&self, id: FieldId) -> Result<usize> {
        if id.class == self.token && id.index < self.fields.len() {
            Ok(id.index)
        } else {
            Err(Error::Contract(format!("field {} is not defined for class {}", id, self.name)))
        }
    }

    fn instance_fields(&self) -> Vec<FieldId> {
        let mut ids: Vec<FieldId> = (0..self.fields.len())
            .filter(|&i| !self.fields[i].def.is_static())
            .map(|i| self.field_id(i))
            .collect();
        ids.sort_by(|a, b| self.fields[a.index].def.name.cmp(&self.fields[b.index].def.name));
        ids
    }

    /// Every instance field, sorted by name.
    pub fn all_fields(&self) -> Vec<FieldId> {
        self.instance_fields()
    }

    /// Instance fields no transformer has claimed, sorted by name.
    pub fn unclaimed_fields(&self) -> Vec<FieldId> {
        self.instance_fields().into_iter()
            .filter(|id| self.fields[id.index].claimed_by.is_none())
            .collect()
    }

    /// Instance fields with an annotation of the given type, sorted by name.
    pub fn fields_with_annotation(&self, annotation_type: &str) -> Vec<FieldId> {
        self.instance_fields().into_iter()
            .filter(|id| self.fields[id.index].def.has_annotation(annotation_type))
            .collect()
    }

    /// The field with the given id; fails for ids of another class.
    pub fn field(&mut self, id: FieldId) -> Result<PlasticField<'_>> {
        self.field_index(id)?;
        Ok(PlasticField::new(self, id))
    }

    pub fn field_named(&self, name: &str) -> Option<FieldId> {
        self.fields.iter().position(|f| f.def.name == name).map(|i| self.field_id(i))
    }

    pub fn field_def(&self, id: FieldId) -> Result<&FieldDef> {
        let index = self.field_index(id)?;
        Ok(&self.fields[index].def)
    }

    /// Adds a private instance field. If the suggested name is taken, a unique suffix is
    /// added.
    pub fn introduce_field(&mut self, ty: TypeName, suggested_name: &str)
                           -> Result<PlasticField<'_>> {
        self.check_open("introduce_field")?;
        let name = naming::make_unique(&self.ids, suggested_name,
                                       |name| self.fields.iter().any(|f| f.def.name == name));
        self.fields.push(FieldState::new(FieldDef::new(access_flags::ACC_PRIVATE, ty, &name)));
        let id = self.field_id(self.fields.len() - 1);
        Ok(PlasticField::new(self, id))
    }

    // methods

    fn method_id(&self, index: usize) -> MethodId {
        MethodId { class: self.token, index: index }
    }

    pub(crate) fn method_index(&self, id: MethodId) -> Result<usize> {
        if id.class == self.token && id.index < self.methods.len() {
            Ok(id.index)
        } else {
            Err(Error::Contract(format!("method {} is not defined for class {}", id, self.name)))
        }
    }

    /// Every method except constructors, sorted by description.
    pub fn methods(&self) -> Vec<MethodId> {
        let mut ids: Vec<MethodId> = (0..self.methods.len())
            .filter(|&i| !self.methods[i].is_constructor())
            .map(|i| self.method_id(i))
            .collect();
        ids.sort_by(|a, b| {
            self.methods[a.index].description.cmp(&self.methods[b.index].description)
        });
        ids
    }

    pub fn methods_with_annotation(&self, annotation_type: &str) -> Vec<MethodId> {
        self.methods().into_iter()
            .filter(|id| self.methods[id.index].annotations.has_annotation(annotation_type))
            .collect()
    }

    /// The method with the given id; fails for ids of another class.
    pub fn method(&mut self, id: MethodId) -> Result<PlasticMethod<'_>> {
        self.method_index(id)?;
        Ok(PlasticMethod::new(self, id))
    }

    pub fn method_description(&self, id: MethodId) -> Result<&MethodDescription> {
        let index = self.method_index(id)?;
        Ok(&self.methods[index].description)
    }

    /// The method with the same name and parameter types, if the class has one.
    pub fn find_method(&self, description: &MethodDescription) -> Option<MethodId> {
        self.methods.iter()
            .position(|m| m.description.same_parameters(description))
            .map(|i| self.method_id(i))
    }

    pub(crate) fn has_method(&self, description: &MethodDescription) -> bool {
        self.find_method(description).is_some()
    }

    /// Whether a superclass has a non-abstract, non-private implementation.
    pub(crate) fn inherits_implementation(&self, description: &MethodDescription) -> bool {
        if description.is_static() {
            return false;
        }
        self.superclass.find_method(&description.key()).map_or(false, |m| {
            !m.is_abstract() && !access_flags::is_private(m.description.modifiers)
        })
    }

    /// The body of a method with no explicit implementation: call the inherited
    /// implementation, if there is one, and return its result; otherwise return the zero
    /// value of the return type.
    pub(crate) fn default_body(&self, description: &MethodDescription) -> Result<MethodBody> {
        let inherited = self.inherits_implementation(description);
        let super_name = self.super_name.clone();
        let code = self.assemble(description, |b| {
            if inherited {
                let description = b.description().clone();
                b.load_this()
                    .load_arguments()
                    .invoke_special(&super_name, description.return_type.clone(),
                                    &description.method_name, description.argument_types.clone())
                    .return_result();
            } else {
                b.return_default_value();
            }
        })?;
        Ok(MethodBody::Code(code))
    }

    /// Adds a method with default behavior, or returns the method if the class already has
    /// one with the same signature. The method is never abstract.
    pub fn introduce_method(&mut self, description: MethodDescription)
                            -> Result<PlasticMethod<'_>> {
        self.check_open("introduce_method")?;
        let modifiers = description.modifiers & !access_flags::ACC_ABSTRACT;
        let description = description.with_modifiers(modifiers);
        if let Some(id) = self.find_method(&description) {
            let existing = &self.methods[id.index];
            if existing.description.return_type != description.return_type {
                return Err(Error::Conflict(format!(
                    "unable to introduce method {} into class {}: method already exists as {}",
                    description, self.name, existing.description)));
            }
            if matches!(existing.body, MethodBody::Abstract) {
                let mut concrete = existing.description.clone();
                concrete.modifiers &= !access_flags::ACC_ABSTRACT;
                let body = self.default_body(&concrete)?;
                let state = &mut self.methods[id.index];
                state.description = concrete;
                state.body = body;
            }
            return Ok(PlasticMethod::new(self, id));
        }
        let body = self.default_body(&description)?;
        self.methods.push(MethodState::new(description, body));
        let id = self.method_id(self.methods.len() - 1);
        Ok(PlasticMethod::new(self, id))
    }

    /// Adds a method (or finds the existing one) and gives it a body.
    pub fn introduce_method_with_body<F>(&mut self, description: MethodDescription, callback: F)
                                         -> Result<PlasticMethod<'_>>
        where F: FnOnce(&mut InstructionBuilder)
    {
        let id = self.introduce_method(description)?.id();
        let mut method = PlasticMethod::new(self, id);
        method.change_implementation(callback)?;
        Ok(method)
    }

    /// Adds a private method under a unique name derived from `suggested_name`.
    pub fn introduce_private_method(&mut self, return_type: TypeName, suggested_name: &str,
                                    argument_types: Vec<TypeName>,
                                    exception_types: Vec<TypeName>) -> Result<PlasticMethod<'_>> {
        self.check_open("introduce_private_method")?;
        let superclass = self.superclass.clone();
        let name = naming::make_unique(&self.ids, suggested_name, |name| {
            self.methods.iter().any(|m| m.description.method_name == name)
                || superclass.declared_methods().any(|m| m.description.method_name == name)
        });
        let mut description = MethodDescription::new(return_type, &name, argument_types)
            .with_modifiers(access_flags::ACC_PRIVATE);
        description.checked_exception_types = exception_types;
        self.introduce_method(description)
    }

    // interfaces

    fn interface_methods(&self, interface: &str) -> Result<Vec<MethodDescription>> {
        interface_methods(&self.loader, interface)
    }

    /// Adds an interface to the class and default implementations of the interface methods
    /// the class does not implement yet. Returns the methods that were introduced.
    pub fn introduce_interface(&mut self, interface: &str) -> Result<Vec<MethodId>> {
        self.check_open("introduce_interface")?;
        let methods = self.interface_methods(interface)?;
        if !self.interfaces.iter().any(|i| i == interface) {
            self.interfaces.push(interface.to_string());
        }
        let mut introduced = vec![];
        for description in methods {
            if self.has_method(&description) || self.inherits_implementation(&description) {
                continue;
            }
            introduced.push(self.introduce_method(description)?.id());
        }
        Ok(introduced)
    }

    /// Implements an interface by delegating every method to the value of a field.
    pub fn proxy_interface(&mut self, interface: &str, field: FieldId) -> Result<&mut Self> {
        self.proxy(interface, DelegateSource::Field(field))
    }

    /// Implements an interface by delegating every method to the value returned by an
    /// argument-less method, called anew for every invocation.
    pub fn proxy_interface_to_method(&mut self, interface: &str, method: MethodId)
                                     -> Result<&mut Self> {
        self.proxy(interface, DelegateSource::Method(method))
    }

    fn proxy(&mut self, interface: &str, source: DelegateSource) -> Result<&mut Self> {
        self.check_open("proxy_interface")?;
        match source {
            DelegateSource::Field(id) => self.field_index(id)?,
            DelegateSource::Method(id) => self.method_index(id)?,
        };
        let methods = self.interface_methods(interface)?;
        self.introduce_interface(interface)?;
        for description in methods {
            let id = self.introduce_method(description)?.id();
            let mut method = PlasticMethod::new(self, id);
            match source {
                DelegateSource::Field(field) => method.delegate_to(field)?,
                DelegateSource::Method(delegate) => method.delegate_to_method(delegate)?,
            };
        }
        Ok(self)
    }

    /// Code that forwards a call to the object held by a field or returned by a method.
    pub(crate) fn delegating_code(&self, description: &MethodDescription,
                                  source: DelegateSource) -> Result<Code> {
        if description.is_static() {
            return Err(Error::Contract(format!("static method {} can not delegate",
                                               description)));
        }
        let (target_type, load_target): (TypeName, Box<dyn Fn(&mut InstructionBuilder)>) =
            match source {
                DelegateSource::Field(id) => {
                    let field = self.field_def(id)?.clone();
                    let owner = self.name.clone();
                    (field.ty.clone(), Box::new(move |b: &mut InstructionBuilder| {
                        b.load_this().get_field(&owner, &field.name, &field.ty);
                    }))
                },
                DelegateSource::Method(id) => {
                    let method = self.method_description(id)?.clone();
                    if !method.argument_types.is_empty() || method.return_type.is_primitive() {
                        return Err(Error::Contract(format!(
                            "method {} can not provide a delegate: it must take no arguments \
                             and return an object", method)));
                    }
                    let owner = self.name.clone();
                    (method.return_type.clone(), Box::new(move |b: &mut InstructionBuilder| {
                        b.load_this();
                        if access_flags::is_private(method.modifiers) {
                            b.invoke_special(&owner, method.return_type.clone(),
                                             &method.method_name, vec![]);
                        } else {
                            b.invoke_virtual(&owner, method.return_type.clone(),
                                             &method.method_name, vec![]);
                        }
                    }))
                },
            };
        let delegate_class = target_type.class_name();
        let interface = self.loader.load_class(&delegate_class)
            .map(|class| class.is_interface())
            .unwrap_or(false);
        self.assemble(description, |b| {
            load_target(b);
            b.load_arguments();
            let description = b.description().clone();
            if interface {
                b.invoke_interface(&delegate_class, description.return_type.clone(),
                                   &description.method_name, description.argument_types);
            } else {
                b.invoke_virtual(&delegate_class, description.return_type.clone(),
                                 &description.method_name, description.argument_types);
            }
            b.return_result();
        })
    }

    // everything else

    /// Adds `toString()` returning a fixed value, unless the class or a transformed ancestor
    /// already implements it.
    pub fn add_to_string(&mut self, value: &str) -> Result<&mut Self> {
        self.check_open("add_to_string")?;
        let description = MethodDescription::new(TypeName::string(), "toString", vec![]);
        let key = description.key();
        let inherited = self.parent.as_ref().map_or(false, |parent| parent.implements(&key));
        if self.has_method(&description) || inherited {
            return Ok(self);
        }
        let value = value.to_string();
        self.introduce_method_with_body(description, |b| {
            b.load_constant(value).return_result();
        })?;
        Ok(self)
    }

    /// Registers a callback run at the end of every constructor, after field injections.
    /// Callbacks run in registration order.
    pub fn on_construct<C>(&mut self, callback: C) -> Result<&mut Self>
        where C: ConstructorCallback + 'static
    {
        self.check_open("on_construct")?;
        self.constructor_callbacks.push(Arc::new(callback));
        Ok(self)
    }

    /// Keys of the methods this class implements, for the summary kept after transformation.
    pub(crate) fn summary(&self) -> ClassSummary {
        ClassSummary {
            class_name: self.name.clone(),
            methods: self.methods.iter()
                .filter(|m| !m.is_constructor() && !matches!(m.body, MethodBody::Abstract))
                .map(|m| m.description.key())
                .collect(),
            parent: self.parent.clone(),
        }
    }
}

/// The instance methods of an interface and its superinterfaces, sorted.
pub(crate) fn interface_methods(loader: &ClassLoader, interface: &str)
                                -> Result<Vec<MethodDescription>> {
    let class = loader.load_class(interface)?;
    if !class.is_interface() {
        return Err(Error::Contract(format!("class {} is not an interface", interface)));
    }
    fn collect(class: &Class, seen: &mut HashSet<MethodKey>, out: &mut Vec<MethodDescription>) {
        for method in class.declared_methods() {
            if !method.is_static() && seen.insert(method.key()) {
                out.push(method.description.clone());
            }
        }
        for interface in class.interfaces() {
            collect(interface, seen, out);
        }
    }
    let mut methods = vec![];
    collect(&class, &mut HashSet::new(), &mut methods);
    methods.sort();
    Ok(methods)
}

impl AnnotationAccess for PlasticClass {
    fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }
}

impl fmt::Debug for PlasticClass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("PlasticClass")
            .field("name", &self.name)
            .field("super_name", &self.super_name)
            .field("fields", &self.fields.len())
            .field("methods", &self.methods.len())
            .field("sealed", &self.sealed)
            .finish()
    }
}
