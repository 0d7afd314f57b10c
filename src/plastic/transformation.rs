//! A transformation session: a class model and its one-shot finalization.

use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::plastic::class::PlasticClass;
use crate::plastic::instantiator::ClassInstantiator;
use crate::plastic::pool::PlasticClassPool;

/// Holds a class under transformation until [`create_instantiator`] defines it.
///
/// [`create_instantiator`]: PlasticClassTransformation::create_instantiator
pub struct PlasticClassTransformation {
    class: PlasticClass,
    pool: Arc<PlasticClassPool>,
}

impl PlasticClassTransformation {
    pub(crate) fn new(class: PlasticClass, pool: Arc<PlasticClassPool>) -> Self {
        PlasticClassTransformation { class: class, pool: pool }
    }

    /// The class model. It stays readable after the instantiator has been created, but every
    /// change then fails.
    pub fn plastic_class(&mut self) -> &mut PlasticClass {
        &mut self.class
    }

    /// Seals the class model, defines the class (supporting classes first) and returns its
    /// instantiator. Can only be called once.
    pub fn create_instantiator(&mut self) -> Result<ClassInstantiator> {
        if self.class.is_sealed() {
            return Err(Error::sealed(self.class.class_name(), "create_instantiator"));
        }
        let primary = self.pool.finish(&mut self.class)?;
        let loader = self.pool.loader().clone();
        loader.define(primary)?;
        Ok(ClassInstantiator::new(self.class.class_name(), loader))
    }
}

impl fmt::Debug for PlasticClassTransformation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "PlasticClassTransformation[{:?}]", self.class)
    }
}
