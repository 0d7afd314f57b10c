//! A small stack machine that loads [`ClassDef`](crate::model::ClassDef)s and runs their
//! methods.

pub mod bootstrap;
pub mod class;
pub mod class_loader;
pub mod frame;
pub mod native;
pub mod value;

pub use self::class::{Class, FieldSlot, Method};
pub use self::class_loader::{ClassLoader, ClassProvider};
pub use self::native::NativeMethod;
pub use self::value::{Object, ObjectData, ObjectRef, Value};
