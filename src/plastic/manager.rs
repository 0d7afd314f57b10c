//! The manager: configuration and the entry points for loading and creating classes.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Weak};

use crate::error::{Error, Result};
use crate::model::class_def::ClassDef;
use crate::plastic::class::PlasticClass;
use crate::plastic::context::INSTANCE_CONTEXT_CLASS;
use crate::plastic::events::PlasticClassListener;
use crate::plastic::instantiator::ClassInstantiator;
use crate::plastic::pipeline::{PlasticClassTransformer, TransformationPipeline};
use crate::plastic::pool::PlasticClassPool;
use crate::plastic::transformation::PlasticClassTransformation;
use crate::plastic::FIELD_CONDUIT_CLASS;
use crate::vm::class_loader::{ClassLoader, ClassProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransformationOption {
    /// Writes to a field that has a conduit also store into the field itself, so the value
    /// is visible to anything inspecting the instance.
    FieldWriteBehind,
}

/// Transforms the classes of controlled packages as they load.
pub trait PlasticManagerDelegate: Send + Sync {
    fn transform(&self, class: &mut PlasticClass) -> Result<()>;

    /// Adjusts the instantiator of a class loaded through the manager, for example to bind
    /// instance context values.
    fn configure_instantiator(&self, _class_name: &str, instantiator: ClassInstantiator)
                              -> Result<ClassInstantiator> {
        Ok(instantiator)
    }
}

impl PlasticManagerDelegate for TransformationPipeline {
    fn transform(&self, class: &mut PlasticClass) -> Result<()> {
        PlasticClassTransformer::transform(self, class)
    }
}

pub struct PlasticManagerBuilder {
    delegate: Arc<dyn PlasticManagerDelegate>,
    packages: Vec<String>,
    options: HashSet<TransformationOption>,
}

impl PlasticManagerBuilder {
    pub fn delegate<D>(mut self, delegate: D) -> Self
        where D: PlasticManagerDelegate + 'static
    {
        self.delegate = Arc::new(delegate);
        self
    }

    /// Adds packages whose classes (and classes of their subpackages) are transformed.
    pub fn packages<I, S>(mut self, packages: I) -> Self
        where I: IntoIterator<Item = S>,
              S: Into<String>
    {
        self.packages.extend(packages.into_iter().map(Into::into));
        self
    }

    pub fn enable(mut self, option: TransformationOption) -> Self {
        self.options.insert(option);
        self
    }

    pub fn create(self) -> PlasticManager {
        let loader = Arc::new(ClassLoader::new());
        loader.host_class(INSTANCE_CONTEXT_CLASS);
        loader.host_class(FIELD_CONDUIT_CLASS);
        let pool = Arc::new(PlasticClassPool::new(loader.clone(), self.delegate, self.packages,
                                                  self.options));
        let weak: Weak<PlasticClassPool> = Arc::downgrade(&pool);
        let provider: Weak<dyn ClassProvider> = weak;
        loader.set_provider(provider);
        debug!("created plastic manager");
        PlasticManager { pool: pool }
    }
}

/// Owns the class loader and the pool of classes to transform.
///
/// Classes whose definitions are registered with [`add_class_definition`] load on first use;
/// those in controlled packages are transformed by the delegate on the way. Classes can also
/// be created from scratch with [`create_class`] and [`create_proxy`].
///
/// [`add_class_definition`]: PlasticManager::add_class_definition
/// [`create_class`]: PlasticManager::create_class
/// [`create_proxy`]: PlasticManager::create_proxy
pub struct PlasticManager {
    pool: Arc<PlasticClassPool>,
}

impl PlasticManager {
    pub fn builder() -> PlasticManagerBuilder {
        PlasticManagerBuilder {
            delegate: Arc::new(TransformationPipeline::new()),
            packages: vec![],
            options: HashSet::new(),
        }
    }

    pub fn class_loader(&self) -> &Arc<ClassLoader> {
        self.pool.loader()
    }

    pub fn is_enabled(&self, option: TransformationOption) -> bool {
        self.pool.is_enabled(option)
    }

    /// Registers the source definition of a class. It is loaded, and transformed if it is in
    /// a controlled package, when first used.
    pub fn add_class_definition(&self, def: ClassDef) -> Result<()> {
        self.pool.add_source(def)
    }

    /// The instantiator of a class in a controlled package, loading and transforming the
    /// class if needed. Instantiators are cached.
    pub fn class_instantiator(&self, class_name: &str) -> Result<ClassInstantiator> {
        if let Some(instantiator) = self.pool.instantiators.get(class_name) {
            return Ok(instantiator.value().clone());
        }
        if !self.pool.is_controlled(class_name) {
            return Err(Error::Contract(format!("class {} is not in a controlled package",
                                               class_name)));
        }
        let class = self.class_loader().load_class(class_name)?;
        if class.is_interface() {
            return Err(Error::Contract(format!("{} is an interface and can not be instantiated",
                                               class_name)));
        }
        let instantiator = ClassInstantiator::new(class_name, self.class_loader().clone());
        let instantiator = self.pool.delegate.configure_instantiator(class_name, instantiator)?;
        Ok(self.pool.instantiators.entry(class_name.to_string())
           .or_insert(instantiator)
           .value()
           .clone())
    }

    /// Starts a transformation of a registered class without running the delegate. The class
    /// must not have been loaded yet.
    pub fn plastic_class(&self, class_name: &str) -> Result<PlasticClassTransformation> {
        if self.class_loader().is_loaded(class_name) {
            return Err(Error::Conflict(format!("class {} has already been loaded",
                                               class_name)));
        }
        let def = self.pool.source(class_name)
            .ok_or_else(|| Error::ClassNotFound(class_name.to_string()))?;
        let class = self.pool.create_plastic_class(def)?;
        Ok(PlasticClassTransformation::new(class, self.pool.clone()))
    }

    /// Creates a new class, with a unique name, extending `base` and shaped by `transformer`.
    pub fn create_class<T>(&self, base: &str, transformer: T) -> Result<PlasticClassTransformation>
        where T: PlasticClassTransformer
    {
        let name = format!("{}$Plastic_{}", base, self.pool.ids.next());
        self.create_named(&name, base, transformer)
    }

    /// Creates a class implementing `interface`, shaped by `transformer`, and returns its
    /// instantiator. Interface methods the transformer leaves alone return zero values.
    pub fn create_proxy<T>(&self, interface: &str, transformer: T) -> Result<ClassInstantiator>
        where T: PlasticClassTransformer
    {
        let name = format!("{}$Proxy_{}", interface, self.pool.ids.next());
        let mut transformation = self.create_named(&name, "java.lang.Object",
                                                   |class: &mut PlasticClass| {
            class.introduce_interface(interface)?;
            transformer.transform(class)
        })?;
        transformation.create_instantiator()
    }

    fn create_named<T>(&self, name: &str, base: &str, transformer: T)
                       -> Result<PlasticClassTransformation>
        where T: PlasticClassTransformer
    {
        let mut class = self.pool.create_plastic_class(ClassDef::new(name, base))?;
        transformer.transform(&mut class)?;
        Ok(PlasticClassTransformation::new(class, self.pool.clone()))
    }

    /// Listeners hear about every class defined by a transformation, supporting classes
    /// first.
    pub fn add_listener(&self, listener: Arc<dyn PlasticClassListener>) {
        self.pool.add_listener(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn PlasticClassListener>) {
        self.pool.remove_listener(listener);
    }
}

impl fmt::Debug for PlasticManager {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "PlasticManager")
    }
}
