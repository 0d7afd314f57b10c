//! The error type shared by every layer of the crate.

use thiserror::Error;

use crate::vm::value::ObjectRef;

/// Result type for transformation, assembly and execution.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone)]
pub enum Error {
    /// A field was claimed a second time.
    #[error("field {field} of class {class} is already claimed by {existing} and can not be \
             claimed by {requested}")]
    FieldClaimed {
        class: String,
        field: String,
        existing: String,
        requested: String,
    },

    /// A structural conflict: a member that already exists, a second conduit, a second advice
    /// registration where only one is allowed.
    #[error("{0}")]
    Conflict(String),

    /// A mutation was attempted on a class model that has already been finalized.
    #[error("class {class} has been finalized; {operation} is no longer allowed")]
    Sealed { class: String, operation: String },

    /// Misuse of the API at the call site.
    #[error("{0}")]
    Contract(String),

    /// The verifier rejected a generated method body.
    #[error("unable to assemble method {method}: {message}")]
    Assembly { method: String, message: String },

    #[error("class {0} not found")]
    ClassNotFound(String),

    /// The class is its own superclass or superinterface.
    #[error("class {0} is its own ancestor")]
    ClassCircularity(String),

    #[error("no method {method} in class {class}")]
    NoSuchMethod { class: String, method: String },

    #[error("no field {field} in class {class}")]
    NoSuchField { class: String, field: String },

    /// A handle or cast was used with a value of the wrong runtime type.
    #[error("expected an instance of {expected} but found {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// Operands that the interpreter cannot execute (wrong argument count, bad stack shape).
    #[error("linkage error: {0}")]
    Linkage(String),

    #[error("unable to parse '{input}': {message}")]
    Parse { input: String, message: String },

    #[error("no coercion from {from} to {to}")]
    Coercion { from: String, to: String },

    /// An exception raised inside the stack machine that nothing caught.
    #[error("uncaught exception {0}")]
    Thrown(ObjectRef),
}

impl Error {
    pub fn sealed(class: &str, operation: &str) -> Self {
        Error::Sealed {
            class: class.to_string(),
            operation: operation.to_string(),
        }
    }

    /// The thrown object, if this error carries one.
    pub fn thrown(&self) -> Option<&ObjectRef> {
        match *self {
            Error::Thrown(ref object) => Some(object),
            _ => None,
        }
    }
}
