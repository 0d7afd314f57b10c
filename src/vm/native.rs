//! Methods implemented in Rust.

use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::vm::class_loader::ClassLoader;
use crate::vm::value::{ObjectRef, Value};

type NativeFn = dyn Fn(&ClassLoader, &[Value]) -> Result<Option<Value>> + Send + Sync;

/// A method body implemented by a Rust function. For instance methods, `args[0]` is `this`.
#[derive(Clone)]
pub struct NativeMethod(Arc<NativeFn>);

impl fmt::Debug for NativeMethod {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "<native method>")
    }
}

impl NativeMethod {
    pub fn new<F>(function: F) -> Self
        where F: Fn(&ClassLoader, &[Value]) -> Result<Option<Value>> + Send + Sync + 'static
    {
        NativeMethod(Arc::new(function))
    }

    pub fn invoke(&self, loader: &ClassLoader, args: &[Value]) -> Result<Option<Value>> {
        (self.0)(loader, args)
    }
}

/// Fetches an argument, failing with a linkage error if the caller passed too few.
pub fn arg(args: &[Value], index: usize) -> Result<&Value> {
    args.get(index)
        .ok_or_else(|| Error::Linkage(format!("native method expected argument {}", index)))
}

/// Fetches a non-null reference argument, throwing `NullPointerException` for `null`.
pub fn object_arg<'a>(loader: &ClassLoader, args: &'a [Value], index: usize)
                      -> Result<&'a ObjectRef> {
    match *arg(args, index)? {
        Value::Reference(ref object) => Ok(object),
        Value::Null => Err(loader.exception("java.lang.NullPointerException",
                                            Some("argument is null"))),
        ref other => Err(Error::Linkage(format!("expected a reference but found {}", other))),
    }
}

/// Fetches a `java.lang.String` argument.
pub fn string_arg<'a>(loader: &ClassLoader, args: &'a [Value], index: usize) -> Result<&'a str> {
    let object = object_arg(loader, args, index)?;
    object.as_str().ok_or_else(|| Error::TypeMismatch {
        expected: String::from("java.lang.String"),
        actual: object.class_name().to_string(),
    })
}

pub fn int_arg(args: &[Value], index: usize) -> Result<i32> {
    match *arg(args, index)? {
        Value::Int(v) => Ok(v),
        ref other => Err(Error::Linkage(format!("expected an int but found {}", other))),
    }
}
