//! Transformers, and pipelines that run several of them over one class.

use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::plastic::class::PlasticClass;

/// Changes a class under transformation. Transformers coordinate only through what they do
/// to the class: claimed fields, introduced methods, annotations.
pub trait PlasticClassTransformer: Send + Sync {
    fn transform(&self, class: &mut PlasticClass) -> Result<()>;
}

impl<F> PlasticClassTransformer for F
    where F: Fn(&mut PlasticClass) -> Result<()> + Send + Sync
{
    fn transform(&self, class: &mut PlasticClass) -> Result<()> {
        self(class)
    }
}

/// Runs transformers in the order they were added; each sees what the previous ones did.
#[derive(Clone, Default)]
pub struct TransformationPipeline {
    transformers: Vec<Arc<dyn PlasticClassTransformer>>,
}

impl TransformationPipeline {
    pub fn new() -> Self {
        TransformationPipeline::default()
    }

    pub fn add<T>(mut self, transformer: T) -> Self
        where T: PlasticClassTransformer + 'static
    {
        self.transformers.push(Arc::new(transformer));
        self
    }

    pub fn len(&self) -> usize {
        self.transformers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transformers.is_empty()
    }
}

impl PlasticClassTransformer for TransformationPipeline {
    fn transform(&self, class: &mut PlasticClass) -> Result<()> {
        for (index, transformer) in self.transformers.iter().enumerate() {
            trace!("running transformer {} on {}", index, class.class_name());
            transformer.transform(class)?;
        }
        Ok(())
    }
}

impl fmt::Debug for TransformationPipeline {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "TransformationPipeline[{} transformers]", self.transformers.len())
    }
}
