//! Interceptors: advised proxies around an existing implementation of an interface.

use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::model::method::MethodDescription;
use crate::model::types::TypeName;
use crate::plastic::advice::MethodAdvice;
use crate::plastic::class::{self, PlasticClass};
use crate::plastic::manager::PlasticManager;
use crate::vm::value::{ObjectRef, Value};

/// Collects advice for the methods of an interface, then builds one object implementing the
/// interface that runs the advice around calls to the delegate.
///
/// Advice for a method runs in the order it was added, outermost first. Unless the builder is
/// accumulating (the default), a method can be advised only once.
pub struct AspectInterceptorBuilder<'m> {
    manager: &'m PlasticManager,
    interface: String,
    delegate: ObjectRef,
    description: Option<String>,
    methods: Vec<MethodDescription>,
    advice: Vec<Vec<Arc<dyn MethodAdvice>>>,
    accumulating: bool,
}

impl<'m> AspectInterceptorBuilder<'m> {
    /// Fails if `interface` is not an interface or the delegate does not implement it.
    pub fn new(manager: &'m PlasticManager, interface: &str, delegate: ObjectRef)
               -> Result<Self> {
        let methods = class::interface_methods(manager.class_loader(), interface)?;
        if !delegate.class().is_subclass_of(interface) {
            return Err(Error::TypeMismatch {
                expected: interface.to_string(),
                actual: delegate.class_name().to_string(),
            });
        }
        let advice = vec![vec![]; methods.len()];
        Ok(AspectInterceptorBuilder {
            manager: manager,
            interface: interface.to_string(),
            delegate: delegate,
            description: None,
            methods: methods,
            advice: advice,
            accumulating: true,
        })
    }

    /// Whether more than one advice may be added to a method.
    pub fn accumulating(mut self, accumulating: bool) -> Self {
        self.accumulating = accumulating;
        self
    }

    /// What `toString()` of the interceptor returns.
    pub fn description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// Adds advice to one method of the interface.
    pub fn advise<A>(&mut self, method: &MethodDescription, advice: A) -> Result<&mut Self>
        where A: MethodAdvice + 'static
    {
        let key = method.key();
        let index = self.methods.iter().position(|m| m.key() == key)
            .ok_or_else(|| Error::Contract(format!("method {} is not defined for interface {}",
                                                   method, self.interface)))?;
        self.check_unadvised(index)?;
        self.advice[index].push(Arc::new(advice));
        Ok(self)
    }

    /// Adds the same advice to every method of the interface.
    pub fn advise_all<A>(&mut self, advice: A) -> Result<&mut Self>
        where A: MethodAdvice + 'static
    {
        for index in 0..self.methods.len() {
            self.check_unadvised(index)?;
        }
        let advice: Arc<dyn MethodAdvice> = Arc::new(advice);
        for chain in &mut self.advice {
            chain.push(advice.clone());
        }
        Ok(self)
    }

    fn check_unadvised(&self, index: usize) -> Result<()> {
        if !self.accumulating && !self.advice[index].is_empty() {
            return Err(Error::Conflict(format!(
                "method {} of interface {} has already been advised", self.methods[index],
                self.interface)));
        }
        Ok(())
    }

    /// Creates the interceptor. Methods without advice call the delegate directly.
    pub fn build(self) -> Result<ObjectRef> {
        let AspectInterceptorBuilder { manager, interface, delegate, description, methods,
                                       advice, .. } = self;
        let advised: Vec<(MethodDescription, Vec<Arc<dyn MethodAdvice>>)> = methods.into_iter()
            .zip(advice)
            .filter(|&(_, ref chain)| !chain.is_empty())
            .collect();
        let count = advised.len();
        let target = interface.clone();
        let transformer = move |class: &mut PlasticClass| -> Result<()> {
            let field = class.introduce_field(TypeName::class(&target), "delegate")?.id();
            class.field(field)?.inject(Value::Reference(delegate.clone()))?;
            class.proxy_interface(&target, field)?;
            for &(ref method, ref chain) in &advised {
                let id = class.find_method(method).ok_or_else(|| {
                    Error::Contract(format!("method {} is not defined for class {}", method,
                                            class.class_name()))
                })?;
                let mut method = class.method(id)?;
                for advice in chain {
                    method.add_shared_advice(advice.clone())?;
                }
            }
            if let Some(ref description) = description {
                class.add_to_string(description)?;
            }
            Ok(())
        };
        let instantiator = manager.create_proxy(&interface, transformer)?;
        debug!("built interceptor {} for {} with {} advised methods", instantiator.class_name(),
               interface, count);
        instantiator.new_instance()
    }
}

impl<'m> fmt::Debug for AspectInterceptorBuilder<'m> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("AspectInterceptorBuilder")
            .field("interface", &self.interface)
            .field("advised", &self.advice.iter().filter(|chain| !chain.is_empty()).count())
            .field("accumulating", &self.accumulating)
            .finish()
    }
}
