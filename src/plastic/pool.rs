//! The class pool: source definitions, transformation on load, and the caches shared by
//! concurrent transformations.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;

use crate::assembler::disassemble_class;
use crate::error::{Error, Result};
use crate::model::class_def::ClassDef;
use crate::plastic::class::{ClassSummary, PlasticClass};
use crate::plastic::events::{ClassType, PlasticClassEvent, PlasticClassListener};
use crate::plastic::finalize;
use crate::plastic::instantiator::ClassInstantiator;
use crate::plastic::manager::{PlasticManagerDelegate, TransformationOption};
use crate::plastic::naming::UniqueId;
use crate::vm::class_loader::{ClassLoader, ClassProvider};

pub(crate) struct PlasticClassPool {
    loader: Arc<ClassLoader>,
    pub(crate) delegate: Arc<dyn PlasticManagerDelegate>,
    /// Package prefixes whose classes are transformed.
    packages: Vec<String>,
    options: HashSet<TransformationOption>,
    pub(crate) ids: Arc<UniqueId>,
    sources: DashMap<String, ClassDef>,
    pub(crate) instantiators: DashMap<String, ClassInstantiator>,
    summaries: DashMap<String, Arc<ClassSummary>>,
    listeners: RwLock<Vec<Arc<dyn PlasticClassListener>>>,
}

impl PlasticClassPool {
    pub(crate) fn new(loader: Arc<ClassLoader>, delegate: Arc<dyn PlasticManagerDelegate>,
                      packages: Vec<String>, options: HashSet<TransformationOption>) -> Self {
        PlasticClassPool {
            loader: loader,
            delegate: delegate,
            packages: packages,
            options: options,
            ids: Arc::new(UniqueId::new()),
            sources: DashMap::new(),
            instantiators: DashMap::new(),
            summaries: DashMap::new(),
            listeners: RwLock::new(vec![]),
        }
    }

    pub(crate) fn loader(&self) -> &Arc<ClassLoader> {
        &self.loader
    }

    pub(crate) fn is_enabled(&self, option: TransformationOption) -> bool {
        self.options.contains(&option)
    }

    pub(crate) fn is_controlled(&self, class_name: &str) -> bool {
        self.packages.iter().any(|package| {
            class_name.len() > package.len() && class_name.starts_with(package.as_str())
                && class_name[package.len()..].starts_with('.')
        })
    }

    pub(crate) fn add_source(&self, def: ClassDef) -> Result<()> {
        if self.loader.is_loaded(&def.name) || self.sources.contains_key(&def.name) {
            return Err(Error::Conflict(format!("class {} is already defined", def.name)));
        }
        self.sources.insert(def.name.clone(), def);
        Ok(())
    }

    pub(crate) fn source(&self, class_name: &str) -> Option<ClassDef> {
        self.sources.get(class_name).map(|entry| entry.value().clone())
    }

    /// A class model for a definition; the superclass is loaded first.
    pub(crate) fn create_plastic_class(&self, def: ClassDef) -> Result<PlasticClass> {
        let super_name = def.super_name.clone().ok_or_else(|| {
            Error::Contract(format!("class {} has no superclass and can not be transformed",
                                    def.name))
        })?;
        let superclass = self.loader.load_class(&super_name)?;
        if superclass.is_interface() {
            return Err(Error::Contract(format!("class {} can not extend interface {}",
                                               def.name, super_name)));
        }
        let parent = self.summaries.get(&super_name).map(|entry| entry.value().clone());
        Ok(PlasticClass::new(def, superclass, parent, self.loader.clone(), self.ids.clone(),
                             self.is_enabled(TransformationOption::FieldWriteBehind)))
    }

    /// Seals and finalizes a class model, defines its supporting classes and returns the
    /// primary class definition for the caller to define.
    pub(crate) fn finish(&self, class: &mut PlasticClass) -> Result<ClassDef> {
        class.seal();
        let finished = finalize::finalize(class)?;
        for def in finished.supporting {
            self.fire(&def, ClassType::Support);
            self.loader.define(def)?;
        }
        self.fire(&finished.primary, ClassType::Primary);
        self.summaries.insert(class.class_name().to_string(), Arc::new(class.summary()));
        Ok(finished.primary)
    }

    fn fire(&self, def: &ClassDef, class_type: ClassType) {
        let listeners = self.listeners.read().clone();
        if listeners.is_empty() {
            return;
        }
        let event = PlasticClassEvent {
            class_name: def.name.clone(),
            class_type: class_type,
            disassembly: disassemble_class(def),
        };
        debug!("{} class {} will load", class_type, def.name);
        for listener in listeners {
            listener.class_will_load(&event);
        }
    }

    pub(crate) fn add_listener(&self, listener: Arc<dyn PlasticClassListener>) {
        self.listeners.write().push(listener);
    }

    pub(crate) fn remove_listener(&self, listener: &Arc<dyn PlasticClassListener>) {
        self.listeners.write().retain(|l| !Arc::ptr_eq(l, listener));
    }
}

impl ClassProvider for PlasticClassPool {
    fn provide(&self, _loader: &ClassLoader, name: &str) -> Result<Option<ClassDef>> {
        let def = match self.source(name) {
            Some(def) => def,
            None => return Ok(None),
        };
        if def.is_interface() || !self.is_controlled(name) {
            return Ok(Some(def));
        }
        debug!("transforming class {}", name);
        let mut class = self.create_plastic_class(def)?;
        self.delegate.transform(&mut class)?;
        let primary = self.finish(&mut class)?;
        debug!("transformed class {}", name);
        Ok(Some(primary))
    }
}
