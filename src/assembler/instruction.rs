//! The symbolic instruction set of the stack machine.
//!
//! Instructions carry resolved names (owner class, member name, types) instead of constant pool
//! indices, and branch to [`Label`]s rather than byte offsets.

use std::fmt;

use crate::model::method::MethodKey;
use crate::model::types::{self, TypeName, ValueKind};

/// A branch target within one method body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(pub usize);

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// A literal pushed by `ldc` and friends.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
}

impl Constant {
    pub fn kind(&self) -> ValueKind {
        match *self {
            Constant::Int(_) => ValueKind::Int,
            Constant::Long(_) => ValueKind::Long,
            Constant::Float(_) => ValueKind::Float,
            Constant::Double(_) => ValueKind::Double,
            Constant::String(_) => ValueKind::Reference,
        }
    }
}

impl From<i32> for Constant {
    fn from(value: i32) -> Constant {
        Constant::Int(value)
    }
}

impl From<bool> for Constant {
    fn from(value: bool) -> Constant {
        Constant::Int(if value { 1 } else { 0 })
    }
}

impl From<i64> for Constant {
    fn from(value: i64) -> Constant {
        Constant::Long(value)
    }
}

impl From<f32> for Constant {
    fn from(value: f32) -> Constant {
        Constant::Float(value)
    }
}

impl From<f64> for Constant {
    fn from(value: f64) -> Constant {
        Constant::Double(value)
    }
}

impl<'a> From<&'a str> for Constant {
    fn from(value: &'a str) -> Constant {
        Constant::String(value.to_string())
    }
}

impl From<String> for Constant {
    fn from(value: String) -> Constant {
        Constant::String(value)
    }
}

/// A symbolic reference to a field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldRef {
    pub owner: String,
    pub name: String,
    pub ty: TypeName,
}

impl FieldRef {
    pub fn new(owner: &str, name: &str, ty: TypeName) -> Self {
        FieldRef {
            owner: owner.to_string(),
            name: name.to_string(),
            ty: ty,
        }
    }
}

/// A symbolic reference to a method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodRef {
    pub owner: String,
    pub name: String,
    pub argument_types: Vec<TypeName>,
    pub return_type: TypeName,
}

impl MethodRef {
    pub fn new(owner: &str, return_type: TypeName, name: &str,
               argument_types: Vec<TypeName>) -> Self {
        MethodRef {
            owner: owner.to_string(),
            name: name.to_string(),
            argument_types: argument_types,
            return_type: return_type,
        }
    }

    pub fn descriptor(&self) -> String {
        types::method_descriptor(&self.argument_types, &self.return_type)
    }

    pub fn key(&self) -> MethodKey {
        MethodKey::new(&self.name, &self.descriptor())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokeKind {
    Virtual,
    Interface,
    Special,
    Static,
}

/// The predicates available to conditional branches.
///
/// `Null`, `NonNull`, `Zero` and `NonZero` test the top of the stack. The comparisons test the
/// top two values (`value1` below `value2`): `LessThan` branches when `value1 < value2`.
/// `Equal` and `NotEqual` also compare two references by identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    Null,
    NonNull,
    Zero,
    NonZero,
    LessThan,
    Equal,
    NotEqual,
    GreaterThan,
}

impl Condition {
    /// How many stack values the condition consumes.
    pub fn operands(self) -> usize {
        match self {
            Condition::Null | Condition::NonNull | Condition::Zero | Condition::NonZero => 1,
            Condition::LessThan | Condition::Equal | Condition::NotEqual
                | Condition::GreaterThan => 2,
        }
    }

    fn mnemonic(self) -> &'static str {
        match self {
            Condition::Null => "ifnull",
            Condition::NonNull => "ifnonnull",
            Condition::Zero => "ifeq",
            Condition::NonZero => "ifne",
            Condition::LessThan => "if_cmplt",
            Condition::Equal => "if_cmpeq",
            Condition::NotEqual => "if_cmpne",
            Condition::GreaterThan => "if_cmpgt",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl ArithOp {
    fn mnemonic(self) -> &'static str {
        match self {
            ArithOp::Add => "add",
            ArithOp::Sub => "sub",
            ArithOp::Mul => "mul",
            ArithOp::Div => "div",
            ArithOp::Rem => "rem",
        }
    }
}

/// An instruction of the stack machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Nop,
    /// Push `null`.
    Null,
    Constant(Constant),
    Load(ValueKind, u16),
    Store(ValueKind, u16),
    /// Add a constant to an `int` local variable.
    Increment(u16, i32),
    GetField(FieldRef),
    PutField(FieldRef),
    GetStatic(FieldRef),
    PutStatic(FieldRef),
    Invoke(InvokeKind, MethodRef),
    /// Allocate an uninitialized instance; a constructor must be invoked on it.
    New(String),
    /// Pop a length and allocate an array of the given component type.
    NewArray(TypeName),
    ArrayLength,
    ArrayLoad(ValueKind),
    ArrayStore(ValueKind),
    CheckCast(TypeName),
    InstanceOf(TypeName),
    Pop,
    /// Pop one category 2 value, or two category 1 values.
    Pop2,
    Dup,
    DupX1,
    DupX2,
    /// Duplicate one category 2 value, or the top two category 1 values.
    Dup2,
    Swap,
    Arith(ArithOp, ValueKind),
    Neg(ValueKind),
    /// Compare two `long`, `float` or `double` values, pushing -1, 0 or 1.
    Cmp(ValueKind),
    Convert(ValueKind, ValueKind),
    If(Condition, Label),
    Goto(Label),
    TableSwitch { low: i32, default: Label, targets: Vec<Label> },
    Return(Option<ValueKind>),
    Throw,
}

impl Instruction {
    /// Whether execution can continue with the next instruction.
    pub fn falls_through(&self) -> bool {
        !matches!(*self, Instruction::Goto(_) | Instruction::TableSwitch { .. }
                  | Instruction::Return(_) | Instruction::Throw)
    }

    /// Labels this instruction may branch to.
    pub fn branch_targets(&self) -> Vec<Label> {
        match *self {
            Instruction::If(_, label) | Instruction::Goto(label) => vec![label],
            Instruction::TableSwitch { default, ref targets, .. } => {
                let mut labels = vec![default];
                labels.extend(targets.iter().cloned());
                labels
            },
            _ => vec![],
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Instruction::Nop => write!(f, "nop"),
            Instruction::Null => write!(f, "aconst_null"),
            Instruction::Constant(Constant::String(ref s)) => write!(f, "ldc {:?}", s),
            Instruction::Constant(ref c) => match *c {
                Constant::Int(v) => write!(f, "ldc {}", v),
                Constant::Long(v) => write!(f, "ldc {}L", v),
                Constant::Float(v) => write!(f, "ldc {}F", v),
                Constant::Double(v) => write!(f, "ldc {}D", v),
                Constant::String(_) => Ok(()),
            },
            Instruction::Load(kind, index) => write!(f, "{}load {}", kind.prefix(), index),
            Instruction::Store(kind, index) => write!(f, "{}store {}", kind.prefix(), index),
            Instruction::Increment(index, amount) => write!(f, "iinc {} {}", index, amount),
            Instruction::GetField(ref field) =>
                write!(f, "getfield {}.{} : {}", field.owner, field.name, field.ty),
            Instruction::PutField(ref field) =>
                write!(f, "putfield {}.{} : {}", field.owner, field.name, field.ty),
            Instruction::GetStatic(ref field) =>
                write!(f, "getstatic {}.{} : {}", field.owner, field.name, field.ty),
            Instruction::PutStatic(ref field) =>
                write!(f, "putstatic {}.{} : {}", field.owner, field.name, field.ty),
            Instruction::Invoke(kind, ref method) => {
                let mnemonic = match kind {
                    InvokeKind::Virtual => "invokevirtual",
                    InvokeKind::Interface => "invokeinterface",
                    InvokeKind::Special => "invokespecial",
                    InvokeKind::Static => "invokestatic",
                };
                write!(f, "{} {}.{}{}", mnemonic, method.owner, method.name, method.descriptor())
            },
            Instruction::New(ref class) => write!(f, "new {}", class),
            Instruction::NewArray(ref component) => write!(f, "newarray {}", component),
            Instruction::ArrayLength => write!(f, "arraylength"),
            Instruction::ArrayLoad(kind) => write!(f, "{}aload", kind.prefix()),
            Instruction::ArrayStore(kind) => write!(f, "{}astore", kind.prefix()),
            Instruction::CheckCast(ref ty) => write!(f, "checkcast {}", ty),
            Instruction::InstanceOf(ref ty) => write!(f, "instanceof {}", ty),
            Instruction::Pop => write!(f, "pop"),
            Instruction::Pop2 => write!(f, "pop2"),
            Instruction::Dup => write!(f, "dup"),
            Instruction::DupX1 => write!(f, "dup_x1"),
            Instruction::DupX2 => write!(f, "dup_x2"),
            Instruction::Dup2 => write!(f, "dup2"),
            Instruction::Swap => write!(f, "swap"),
            Instruction::Arith(op, kind) => write!(f, "{}{}", kind.prefix(), op.mnemonic()),
            Instruction::Neg(kind) => write!(f, "{}neg", kind.prefix()),
            Instruction::Cmp(kind) => write!(f, "{}cmp", kind.prefix()),
            Instruction::Convert(from, to) => write!(f, "{}2{}", from.prefix(), to.prefix()),
            Instruction::If(condition, label) => write!(f, "{} {}", condition.mnemonic(), label),
            Instruction::Goto(label) => write!(f, "goto {}", label),
            Instruction::TableSwitch { low, default, ref targets } => {
                write!(f, "tableswitch")?;
                for (i, target) in targets.iter().enumerate() {
                    write!(f, " {}: {}", low + i as i32, target)?;
                }
                write!(f, " default: {}", default)
            },
            Instruction::Return(None) => write!(f, "return"),
            Instruction::Return(Some(kind)) => write!(f, "{}return", kind.prefix()),
            Instruction::Throw => write!(f, "athrow"),
        }
    }
}

/// One entry of a method's exception table. Entries are searched in order; the first whose
/// range covers the faulting instruction and whose type matches wins.
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionHandler {
    pub start: Label,
    pub end: Label,
    pub handler: Label,
    /// `None` catches everything (used for `finally`).
    pub catch_type: Option<String>,
}

/// An assembled, verified method body.
#[derive(Debug, Clone, PartialEq)]
pub struct Code {
    pub instructions: Vec<Instruction>,
    /// Instruction index of each label, indexed by label number.
    pub labels: Vec<usize>,
    pub exception_table: Vec<ExceptionHandler>,
    pub max_locals: u16,
    pub max_stack: u16,
}

impl Code {
    /// The instruction index a label refers to.
    pub fn target(&self, label: Label) -> usize {
        self.labels[label.0]
    }

    /// Renders the body as a labelled listing.
    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        for (pc, instruction) in self.instructions.iter().enumerate() {
            for (label, _) in self.labels.iter().enumerate().filter(|&(_, &at)| at == pc) {
                out.push_str(&format!("{}:\n", Label(label)));
            }
            out.push_str(&format!("    {:>4}  {}\n", pc, instruction));
        }
        for (label, _) in self.labels.iter().enumerate()
                .filter(|&(_, &at)| at == self.instructions.len()) {
            out.push_str(&format!("{}:\n", Label(label)));
        }
        for handler in &self.exception_table {
            out.push_str(&format!("    try {} - {} catch {} => {}\n", handler.start, handler.end,
                                  handler.catch_type.as_deref().unwrap_or("*"), handler.handler));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_flow_shape() {
        assert!(Instruction::Pop.falls_through());
        assert!(!Instruction::Throw.falls_through());
        let switch = Instruction::TableSwitch {
            low: 3,
            default: Label(0),
            targets: vec![Label(1), Label(2)],
        };
        assert_eq!(vec![Label(0), Label(1), Label(2)], switch.branch_targets());
        assert_eq!("tableswitch 3: L1 4: L2 default: L0", switch.to_string());
    }

    #[test]
    fn listing() {
        let code = Code {
            instructions: vec![Instruction::Load(ValueKind::Reference, 0),
                               Instruction::Invoke(InvokeKind::Virtual,
                                   MethodRef::new("java.lang.Object", TypeName::string(),
                                                  "toString", vec![])),
                               Instruction::Return(Some(ValueKind::Reference))],
            labels: vec![0],
            exception_table: vec![],
            max_locals: 1,
            max_stack: 1,
        };
        let text = code.disassemble();
        assert!(text.starts_with("L0:\n"));
        assert!(text.contains("invokevirtual java.lang.Object.toString()Ljava/lang/String;"));
        assert!(text.contains("areturn"));
    }
}
