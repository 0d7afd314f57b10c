//! Runtime class transformation for a small JVM-style stack machine.
//!
//! Classes are described by [`model::ClassDef`]s and run by the [`vm`]. The [`plastic`] layer
//! sits between the two: a [`plastic::PlasticManager`] intercepts class loading for
//! controlled packages, lets [`plastic::PlasticClassTransformer`]s add fields, methods,
//! advice and injections through a [`plastic::PlasticClass`], and produces
//! [`plastic::ClassInstantiator`]s for the result. Method bodies are written with the
//! [`assembler::InstructionBuilder`].

#[macro_use]
extern crate log;

#[macro_use]
pub mod logging;

pub mod assembler;
pub mod coerce;
pub mod error;
pub mod model;
pub mod parser;
pub mod plastic;
pub mod vm;

pub use crate::error::{Error, Result};
