//! Assembly of method bodies for the stack machine.

pub mod builder;
pub mod disassemble;
pub mod instruction;
pub mod verify;

pub use self::builder::{InstructionBuilder, LocalVariable, SwitchBlock, TryCatchBlock};
pub use self::disassemble::disassemble_class;
pub use self::instruction::{ArithOp, Code, Condition, Constant, ExceptionHandler, FieldRef,
                            Instruction, InvokeKind, Label, MethodRef};
