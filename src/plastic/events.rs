//! Notifications about classes defined by a transformation.

use std::fmt;

/// Why a class was defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassType {
    /// The class that was transformed.
    Primary,
    /// A class generated to support the primary class, such as a method invocation class.
    Support,
}

impl fmt::Display for ClassType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ClassType::Primary => write!(f, "primary"),
            ClassType::Support => write!(f, "support"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlasticClassEvent {
    pub class_name: String,
    pub class_type: ClassType,
    /// The disassembled class, for diagnostics.
    pub disassembly: String,
}

/// Observes class definitions. Events arrive synchronously, supporting classes first.
pub trait PlasticClassListener: Send + Sync {
    fn class_will_load(&self, event: &PlasticClassEvent);
}

impl<F> PlasticClassListener for F
    where F: Fn(&PlasticClassEvent) + Send + Sync
{
    fn class_will_load(&self, event: &PlasticClassEvent) {
        self(event)
    }
}
