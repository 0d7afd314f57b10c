//! A semantic builder for method bodies.
//!
//! [`InstructionBuilder`] hides operand bookkeeping behind named operations: argument loading
//! knows where each parameter lives, boxing picks the right wrapper method, structured blocks
//! (conditionals, loops, switches, try/catch/finally) allocate and place their own labels.
//! Problems found while building are remembered and reported by [`InstructionBuilder::build`],
//! which also runs the verifier.

use crate::assembler::instruction::{ArithOp, Code, Condition, Constant, ExceptionHandler,
                                    FieldRef, Instruction, InvokeKind, Label, MethodRef};
use crate::assembler::verify;
use crate::error::{Error, Result};
use crate::model::method::MethodDescription;
use crate::model::types::{Primitive, TypeName, ValueKind};

/// The most values one switch may cover.
const MAX_SWITCH_CASES: i64 = 65_536;

/// A local variable allocated by [`InstructionBuilder::start_variable`]. It is only valid
/// inside the callback that received it.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalVariable {
    index: u16,
    ty: TypeName,
}

impl LocalVariable {
    pub fn index(&self) -> u16 {
        self.index
    }

    pub fn ty(&self) -> &TypeName {
        &self.ty
    }

    fn kind(&self) -> ValueKind {
        self.ty.kind().unwrap_or(ValueKind::Reference)
    }
}

type Callback<'b> = Box<dyn FnOnce(&mut InstructionBuilder) + 'b>;

/// The cases of a `switch`, collected by the callback given to
/// [`InstructionBuilder::start_switch`].
pub struct SwitchBlock<'b> {
    low: i32,
    high: i32,
    cases: Vec<(i32, Callback<'b>)>,
    default: Option<Callback<'b>>,
    errors: Vec<String>,
}

impl<'b> SwitchBlock<'b> {
    /// Adds code for one case value. Control continues after the switch when the case code
    /// completes normally.
    pub fn add_case<F>(&mut self, value: i32, callback: F) -> &mut Self
        where F: FnOnce(&mut InstructionBuilder) + 'b
    {
        if value < self.low || value > self.high {
            self.errors.push(format!("case {} is outside the switch range {}..={}",
                                     value, self.low, self.high));
        } else if self.cases.iter().any(|&(v, _)| v == value) {
            self.errors.push(format!("case {} is declared twice", value));
        } else {
            self.cases.push((value, Box::new(callback)));
        }
        self
    }

    /// Replaces the default behavior, which throws `java.lang.IllegalArgumentException`.
    pub fn add_default<F>(&mut self, callback: F) -> &mut Self
        where F: FnOnce(&mut InstructionBuilder) + 'b
    {
        self.default = Some(Box::new(callback));
        self
    }
}

/// The parts of a try/catch/finally statement, collected by the callback given to
/// [`InstructionBuilder::start_try_catch`].
///
/// Catch handlers are tried in the order they were added, and the first whose type matches
/// wins. Adding a handler for a superclass before one for a subclass leaves the subclass
/// handler unreachable.
pub struct TryCatchBlock<'b> {
    body: Option<Callback<'b>>,
    catches: Vec<(String, Callback<'b>)>,
    finally: Option<Box<dyn Fn(&mut InstructionBuilder) + 'b>>,
}

impl<'b> TryCatchBlock<'b> {
    pub fn add_try<F>(&mut self, callback: F) -> &mut Self
        where F: FnOnce(&mut InstructionBuilder) + 'b
    {
        self.body = Some(Box::new(callback));
        self
    }

    /// Adds a handler; the caught exception is on top of the stack when the handler starts.
    pub fn add_catch<F>(&mut self, exception_type: &str, callback: F) -> &mut Self
        where F: FnOnce(&mut InstructionBuilder) + 'b
    {
        self.catches.push((exception_type.to_string(), Box::new(callback)));
        self
    }

    /// Code run after the try body or a catch handler completes, normally or by throwing. The
    /// code is copied onto each of those paths.
    pub fn add_finally<F>(&mut self, callback: F) -> &mut Self
        where F: Fn(&mut InstructionBuilder) + 'b
    {
        self.finally = Some(Box::new(callback));
        self
    }
}

pub struct InstructionBuilder {
    class_name: String,
    super_class_name: String,
    description: MethodDescription,
    instructions: Vec<Instruction>,
    labels: Vec<Option<usize>>,
    exception_table: Vec<ExceptionHandler>,
    next_local: u16,
    max_locals: u16,
    failure: Option<String>,
}

impl InstructionBuilder {
    pub fn new(class_name: &str, super_class_name: &str,
               description: &MethodDescription) -> Self {
        let parameter_slots = description.parameter_slots();
        InstructionBuilder {
            class_name: class_name.to_string(),
            super_class_name: super_class_name.to_string(),
            description: description.clone(),
            instructions: vec![],
            labels: vec![],
            exception_table: vec![],
            next_local: parameter_slots,
            max_locals: parameter_slots,
            failure: None,
        }
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn super_class_name(&self) -> &str {
        &self.super_class_name
    }

    pub fn description(&self) -> &MethodDescription {
        &self.description
    }

    fn fail(&mut self, message: String) -> &mut Self {
        if self.failure.is_none() {
            self.failure = Some(message);
        }
        self
    }

    fn emit(&mut self, instruction: Instruction) -> &mut Self {
        self.instructions.push(instruction);
        self
    }

    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Places a label before the next instruction.
    pub fn mark(&mut self, label: Label) -> &mut Self {
        let here = self.instructions.len();
        match self.labels.get(label.0).cloned() {
            Some(None) => self.labels[label.0] = Some(here),
            Some(Some(_)) => return self.fail(format!("label {} placed twice", label)),
            None => return self.fail(format!("label {} belongs to another method", label)),
        }
        self
    }

    pub fn load_this(&mut self) -> &mut Self {
        if self.description.is_static() {
            return self.fail(String::from("static methods have no 'this'"));
        }
        self.emit(Instruction::Load(ValueKind::Reference, 0))
    }

    pub fn load_null(&mut self) -> &mut Self {
        self.emit(Instruction::Null)
    }

    pub fn load_constant<C: Into<Constant>>(&mut self, constant: C) -> &mut Self {
        self.emit(Instruction::Constant(constant.into()))
    }

    fn argument_slot(&self, index: usize) -> Option<(u16, ValueKind)> {
        let mut slot = if self.description.is_static() { 0 } else { 1 };
        for (i, ty) in self.description.argument_types.iter().enumerate() {
            let kind = ty.kind()?;
            if i == index {
                return Some((slot, kind));
            }
            slot += kind.slots();
        }
        None
    }

    /// Loads a method argument by position (zero based, not counting `this`).
    pub fn load_argument(&mut self, index: usize) -> &mut Self {
        match self.argument_slot(index) {
            Some((slot, kind)) => self.emit(Instruction::Load(kind, slot)),
            None => self.fail(format!("method {} has no argument {}",
                                      self.description.method_name, index)),
        }
    }

    /// Loads every argument, in order.
    pub fn load_arguments(&mut self) -> &mut Self {
        for index in 0..self.description.argument_types.len() {
            self.load_argument(index);
        }
        self
    }

    /// Pushes the zero value of a type: `0`, `0L`, `0.0`, `false` or `null`.
    pub fn load_default_value(&mut self, ty: &TypeName) -> &mut Self {
        match ty.kind() {
            Some(ValueKind::Int) => self.load_constant(0),
            Some(ValueKind::Long) => self.load_constant(0i64),
            Some(ValueKind::Float) => self.load_constant(0f32),
            Some(ValueKind::Double) => self.load_constant(0f64),
            Some(ValueKind::Reference) => self.load_null(),
            None => self,
        }
    }

    /// Returns the value on top of the stack (nothing, for `void` methods).
    pub fn return_result(&mut self) -> &mut Self {
        let kind = self.description.return_type.kind();
        self.emit(Instruction::Return(kind))
    }

    /// Returns the zero value of the method's return type.
    pub fn return_default_value(&mut self) -> &mut Self {
        let return_type = self.description.return_type.clone();
        self.load_default_value(&return_type).return_result()
    }

    /// Allocates a local variable for the duration of the callback.
    pub fn start_variable<F>(&mut self, ty: TypeName, callback: F) -> &mut Self
        where F: FnOnce(&mut InstructionBuilder, &LocalVariable)
    {
        let variable = LocalVariable {
            index: self.next_local,
            ty: ty,
        };
        let saved = self.next_local;
        self.next_local += variable.kind().slots();
        self.max_locals = self.max_locals.max(self.next_local);
        callback(self, &variable);
        self.next_local = saved;
        self
    }

    pub fn load_variable(&mut self, variable: &LocalVariable) -> &mut Self {
        self.emit(Instruction::Load(variable.kind(), variable.index))
    }

    pub fn store_variable(&mut self, variable: &LocalVariable) -> &mut Self {
        self.emit(Instruction::Store(variable.kind(), variable.index))
    }

    pub fn increment_variable(&mut self, variable: &LocalVariable, amount: i32) -> &mut Self {
        self.emit(Instruction::Increment(variable.index, amount))
    }

    pub fn get_field(&mut self, owner: &str, name: &str, ty: &TypeName) -> &mut Self {
        self.emit(Instruction::GetField(FieldRef::new(owner, name, ty.clone())))
    }

    pub fn put_field(&mut self, owner: &str, name: &str, ty: &TypeName) -> &mut Self {
        self.emit(Instruction::PutField(FieldRef::new(owner, name, ty.clone())))
    }

    pub fn get_static_field(&mut self, owner: &str, name: &str, ty: &TypeName) -> &mut Self {
        self.emit(Instruction::GetStatic(FieldRef::new(owner, name, ty.clone())))
    }

    pub fn put_static_field(&mut self, owner: &str, name: &str, ty: &TypeName) -> &mut Self {
        self.emit(Instruction::PutStatic(FieldRef::new(owner, name, ty.clone())))
    }

    pub fn get_field_ref(&mut self, field: &FieldRef) -> &mut Self {
        self.emit(Instruction::GetField(field.clone()))
    }

    pub fn put_field_ref(&mut self, field: &FieldRef) -> &mut Self {
        self.emit(Instruction::PutField(field.clone()))
    }

    pub fn invoke(&mut self, kind: InvokeKind, method: &MethodRef) -> &mut Self {
        self.emit(Instruction::Invoke(kind, method.clone()))
    }

    pub fn invoke_virtual(&mut self, owner: &str, return_type: TypeName, name: &str,
                          argument_types: Vec<TypeName>) -> &mut Self {
        self.invoke(InvokeKind::Virtual, &MethodRef::new(owner, return_type, name, argument_types))
    }

    pub fn invoke_interface(&mut self, owner: &str, return_type: TypeName, name: &str,
                            argument_types: Vec<TypeName>) -> &mut Self {
        self.invoke(InvokeKind::Interface,
                    &MethodRef::new(owner, return_type, name, argument_types))
    }

    pub fn invoke_special(&mut self, owner: &str, return_type: TypeName, name: &str,
                          argument_types: Vec<TypeName>) -> &mut Self {
        self.invoke(InvokeKind::Special, &MethodRef::new(owner, return_type, name, argument_types))
    }

    pub fn invoke_static(&mut self, owner: &str, return_type: TypeName, name: &str,
                         argument_types: Vec<TypeName>) -> &mut Self {
        self.invoke(InvokeKind::Static, &MethodRef::new(owner, return_type, name, argument_types))
    }

    /// Invokes a constructor on the uninitialized instance below the arguments.
    pub fn invoke_constructor(&mut self, class: &str, argument_types: Vec<TypeName>)
                              -> &mut Self {
        self.invoke_special(class, TypeName::void(), "<init>", argument_types)
    }

    pub fn new_instance(&mut self, class: &str) -> &mut Self {
        self.emit(Instruction::New(class.to_string()))
    }

    /// Boxes the primitive on top of the stack; a no-op for reference types.
    pub fn box_primitive(&mut self, ty: &TypeName) -> &mut Self {
        match ty.as_primitive() {
            Some(Primitive::Void) | None => self,
            Some(primitive) => {
                let wrapper = primitive.wrapper_class();
                self.invoke_static(wrapper, TypeName::class(wrapper), "valueOf", vec![ty.clone()])
            },
        }
    }

    /// Unboxes the wrapper on top of the stack to the given primitive type; a no-op for
    /// reference types.
    pub fn unbox_primitive(&mut self, ty: &TypeName) -> &mut Self {
        match ty.as_primitive() {
            Some(Primitive::Void) | None => self,
            Some(primitive) => self.invoke_virtual(primitive.wrapper_class(), ty.clone(),
                                                   &primitive.unbox_method(), vec![]),
        }
    }

    /// Casts the reference on top of the stack. Casting to a primitive type casts to its
    /// wrapper and unboxes.
    pub fn check_cast(&mut self, ty: &TypeName) -> &mut Self {
        match *ty {
            TypeName::Primitive(Primitive::Void) =>
                self.fail(String::from("cannot cast to void")),
            TypeName::Primitive(_) => {
                self.emit(Instruction::CheckCast(ty.boxed()));
                self.unbox_primitive(ty)
            },
            TypeName::Class(ref name) if name == "java.lang.Object" => self,
            _ => self.emit(Instruction::CheckCast(ty.clone())),
        }
    }

    pub fn instance_of(&mut self, ty: &TypeName) -> &mut Self {
        self.emit(Instruction::InstanceOf(ty.boxed()))
    }

    /// Duplicates the top value, inserting the copy `depth` values down (0, 1 or 2).
    pub fn dup(&mut self, depth: u8) -> &mut Self {
        match depth {
            0 => self.emit(Instruction::Dup),
            1 => self.emit(Instruction::DupX1),
            2 => self.emit(Instruction::DupX2),
            _ => self.fail(format!("cannot duplicate at depth {}", depth)),
        }
    }

    /// Duplicates a `long` or `double`.
    pub fn dup_wide(&mut self) -> &mut Self {
        self.emit(Instruction::Dup2)
    }

    pub fn pop(&mut self) -> &mut Self {
        self.emit(Instruction::Pop)
    }

    /// Discards a `long` or `double`.
    pub fn pop_wide(&mut self) -> &mut Self {
        self.emit(Instruction::Pop2)
    }

    pub fn swap(&mut self) -> &mut Self {
        self.emit(Instruction::Swap)
    }

    pub fn arithmetic(&mut self, op: ArithOp, kind: ValueKind) -> &mut Self {
        self.emit(Instruction::Arith(op, kind))
    }

    pub fn negate(&mut self, kind: ValueKind) -> &mut Self {
        self.emit(Instruction::Neg(kind))
    }

    pub fn compare(&mut self, kind: ValueKind) -> &mut Self {
        self.emit(Instruction::Cmp(kind))
    }

    pub fn convert(&mut self, from: ValueKind, to: ValueKind) -> &mut Self {
        self.emit(Instruction::Convert(from, to))
    }

    /// Pops a length and pushes a new array of that many elements.
    pub fn new_array(&mut self, component: &TypeName) -> &mut Self {
        self.emit(Instruction::NewArray(component.clone()))
    }

    pub fn array_length(&mut self) -> &mut Self {
        self.emit(Instruction::ArrayLength)
    }

    pub fn load_array_element(&mut self, component: &TypeName) -> &mut Self {
        match component.kind() {
            Some(kind) => self.emit(Instruction::ArrayLoad(kind)),
            None => self.fail(String::from("arrays of void do not exist")),
        }
    }

    pub fn store_array_element(&mut self, component: &TypeName) -> &mut Self {
        match component.kind() {
            Some(kind) => self.emit(Instruction::ArrayStore(kind)),
            None => self.fail(String::from("arrays of void do not exist")),
        }
    }

    /// Throws a new exception of the given class, constructed with a fixed message.
    pub fn throw_exception(&mut self, class: &str, message: &str) -> &mut Self {
        self.new_instance(class)
            .dup(0)
            .load_constant(message)
            .invoke_constructor(class, vec![TypeName::string()])
            .rethrow()
    }

    /// Throws the exception on top of the stack.
    pub fn rethrow(&mut self) -> &mut Self {
        self.emit(Instruction::Throw)
    }

    pub fn branch(&mut self, condition: Condition, label: Label) -> &mut Self {
        self.emit(Instruction::If(condition, label))
    }

    pub fn goto(&mut self, label: Label) -> &mut Self {
        self.emit(Instruction::Goto(label))
    }

    /// Runs `then` when the condition holds for the value(s) on top of the stack.
    pub fn when<F>(&mut self, condition: Condition, then: F) -> &mut Self
        where F: FnOnce(&mut InstructionBuilder)
    {
        let then_label = self.new_label();
        let end = self.new_label();
        self.branch(condition, then_label).goto(end).mark(then_label);
        then(self);
        self.mark(end)
    }

    pub fn when_else<F, G>(&mut self, condition: Condition, then: F, otherwise: G) -> &mut Self
        where F: FnOnce(&mut InstructionBuilder),
              G: FnOnce(&mut InstructionBuilder)
    {
        let then_label = self.new_label();
        let end = self.new_label();
        self.branch(condition, then_label);
        otherwise(self);
        self.goto(end).mark(then_label);
        then(self);
        self.mark(end)
    }

    /// A loop: `test` pushes the operands of `condition`; `body` runs while the condition
    /// holds.
    pub fn do_while<T, B>(&mut self, condition: Condition, test: T, body: B) -> &mut Self
        where T: FnOnce(&mut InstructionBuilder),
              B: FnOnce(&mut InstructionBuilder)
    {
        let top = self.new_label();
        let body_label = self.new_label();
        let end = self.new_label();
        self.mark(top);
        test(self);
        self.branch(condition, body_label).goto(end).mark(body_label);
        body(self);
        self.goto(top).mark(end)
    }

    /// Pops an array and runs `callback` once per element, with the element on the stack. The
    /// callback must consume the element.
    pub fn iterate_array<F>(&mut self, element_type: &TypeName, callback: F) -> &mut Self
        where F: FnOnce(&mut InstructionBuilder)
    {
        let array_type = TypeName::array_of(element_type.clone());
        self.start_variable(array_type, |b, array| {
            b.store_variable(array);
            b.start_variable(TypeName::int(), |b, index| {
                b.load_constant(0).store_variable(index);
                b.do_while(Condition::LessThan,
                           |b| {
                               b.load_variable(index).load_variable(array).array_length();
                           },
                           |b| {
                               b.load_variable(array)
                                   .load_variable(index)
                                   .load_array_element(element_type);
                               callback(b);
                               b.increment_variable(index, 1);
                           });
            });
        })
    }

    /// Pops an `int` and dispatches to the matching case in `low..=high`.
    pub fn start_switch<'b, F>(&mut self, low: i32, high: i32, callback: F) -> &mut Self
        where F: FnOnce(&mut SwitchBlock<'b>)
    {
        if high < low {
            return self.fail(format!("empty switch range {}..={}", low, high));
        }
        let span = i64::from(high) - i64::from(low) + 1;
        if span > MAX_SWITCH_CASES {
            return self.fail(format!("switch range {}..={} has {} cases, more than {}", low, high,
                                     span, MAX_SWITCH_CASES));
        }
        let mut block = SwitchBlock {
            low: low,
            high: high,
            cases: vec![],
            default: None,
            errors: vec![],
        };
        callback(&mut block);
        if let Some(error) = block.errors.into_iter().next() {
            return self.fail(error);
        }

        let end = self.new_label();
        let default_label = self.new_label();
        let mut targets = vec![default_label; span as usize];
        let mut cases = vec![];
        for (value, case) in block.cases {
            let label = self.new_label();
            targets[(value - low) as usize] = label;
            cases.push((label, case));
        }
        self.emit(Instruction::TableSwitch {
            low: low,
            default: default_label,
            targets: targets,
        });
        for (label, case) in cases {
            self.mark(label);
            case(self);
            self.goto(end);
        }
        self.mark(default_label);
        match block.default {
            Some(default) => default(self),
            None => {
                self.throw_exception("java.lang.IllegalArgumentException",
                                     "Switch value not matched in case statement.");
            },
        }
        self.mark(end)
    }

    /// Builds a try/catch/finally statement.
    pub fn start_try_catch<'b, F>(&mut self, callback: F) -> &mut Self
        where F: FnOnce(&mut TryCatchBlock<'b>)
    {
        let mut block = TryCatchBlock {
            body: None,
            catches: vec![],
            finally: None,
        };
        callback(&mut block);

        let start = self.new_label();
        let end = self.new_label();
        let after = self.new_label();
        self.mark(start);
        if let Some(body) = block.body {
            body(self);
        }
        self.mark(end);
        if let Some(ref finally) = block.finally {
            finally(self);
        }
        self.goto(after);

        let mut protected = vec![(start, end)];
        for (exception_type, catch) in block.catches {
            let handler = self.new_label();
            let handler_end = self.new_label();
            self.mark(handler);
            catch(self);
            self.mark(handler_end);
            self.exception_table.push(ExceptionHandler {
                start: start,
                end: end,
                handler: handler,
                catch_type: Some(exception_type),
            });
            protected.push((handler, handler_end));
            if let Some(ref finally) = block.finally {
                finally(self);
            }
            self.goto(after);
        }

        if let Some(ref finally) = block.finally {
            let any = self.new_label();
            self.mark(any);
            self.start_variable(TypeName::class("java.lang.Throwable"), |b, exception| {
                b.store_variable(exception);
                finally(b);
                b.load_variable(exception).rethrow();
            });
            for (range_start, range_end) in protected {
                self.exception_table.push(ExceptionHandler {
                    start: range_start,
                    end: range_end,
                    handler: any,
                    catch_type: None,
                });
            }
        }
        self.mark(after)
    }

    /// Resolves labels and verifies the body.
    pub fn build(self) -> Result<Code> {
        let method = format!("{}.{}{}", self.class_name, self.description.method_name,
                             self.description.descriptor());
        if let Some(message) = self.failure {
            return Err(Error::Assembly { method: method, message: message });
        }
        let mut labels = Vec::with_capacity(self.labels.len());
        for (index, label) in self.labels.iter().enumerate() {
            match *label {
                Some(pc) => labels.push(pc),
                None => return Err(Error::Assembly {
                    method: method,
                    message: format!("label {} was never placed", Label(index)),
                }),
            }
        }
        let mut code = Code {
            instructions: self.instructions,
            labels: labels,
            exception_table: self.exception_table,
            max_locals: self.max_locals,
            max_stack: 0,
        };
        code.max_stack = verify::verify(&self.class_name, &self.description, &code)?;
        trace!("assembled {} ({} instructions)", method, code.instructions.len());
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder(description: &str) -> InstructionBuilder {
        let description = MethodDescription::parse(description).unwrap();
        InstructionBuilder::new("org.example.Target", "java.lang.Object", &description)
    }

    #[test]
    fn arguments_account_for_wide_slots() {
        let mut b = builder("public long pick(long a, int b, double c)");
        b.load_argument(2).pop_wide().load_argument(0).return_result();
        let code = b.build().unwrap();
        assert_eq!(Instruction::Load(ValueKind::Double, 4), code.instructions[0]);
        assert_eq!(Instruction::Load(ValueKind::Long, 1), code.instructions[2]);
        assert_eq!(6, code.max_locals);
    }

    #[test]
    fn default_values() {
        let cases = [("int f()", Instruction::Constant(Constant::Int(0))),
                     ("java.lang.String f()", Instruction::Null),
                     ("double f()", Instruction::Constant(Constant::Double(0.0)))];
        for (signature, expected) in &cases {
            let mut b = builder(signature);
            b.return_default_value();
            assert_eq!(expected, &b.build().unwrap().instructions[0]);
        }
        let mut b = builder("void f()");
        b.return_default_value();
        assert_eq!(vec![Instruction::Return(None)], b.build().unwrap().instructions);
    }

    #[test]
    fn cast_to_primitive_unboxes() {
        let mut b = builder("int f(java.lang.Object value)");
        b.load_argument(0).check_cast(&TypeName::int()).return_result();
        let code = b.build().unwrap();
        assert_eq!(Instruction::CheckCast(TypeName::class("java.lang.Integer")),
                   code.instructions[1]);
        assert_eq!("invokevirtual java.lang.Integer.intValue()I", code.instructions[2].to_string());
    }

    #[test]
    fn scoped_locals_are_reused() {
        let mut b = builder("void f()");
        b.start_variable(TypeName::Primitive(Primitive::Long), |b, v| {
            assert_eq!(1, v.index());
            b.load_constant(1i64).store_variable(v);
        });
        b.start_variable(TypeName::int(), |b, v| {
            assert_eq!(1, v.index());
            b.load_constant(1).store_variable(v);
        });
        b.return_result();
        assert_eq!(3, b.build().unwrap().max_locals);
    }

    #[test]
    fn inconsistent_stack_is_an_assembly_failure() {
        let mut b = builder("int f()");
        b.load_constant("text").return_result();
        match b.build() {
            Err(Error::Assembly { method, .. }) => assert_eq!("org.example.Target.f()I", method),
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn bad_argument_index_is_reported_at_build() {
        let mut b = builder("void f(int a)");
        b.load_argument(3).return_result();
        let error = b.build().unwrap_err().to_string();
        assert!(error.contains("no argument 3"), "{}", error);
    }

    #[test]
    fn switch_rejects_duplicate_cases() {
        let mut b = builder("void f(int a)");
        b.load_argument(0).start_switch(0, 2, |s| {
            s.add_case(1, |b| { b.pop_wide(); });
            s.add_case(1, |_| {});
        });
        b.return_result();
        assert!(b.build().is_err());
    }

    #[test]
    fn switch_ranges_are_bounded() {
        let mut b = builder("void f(int a)");
        b.load_argument(0).start_switch(i32::MIN, i32::MAX, |s| {
            s.add_case(0, |_| {});
        });
        b.return_result();
        match b.build() {
            Err(Error::Assembly { message, .. }) => {
                assert!(message.contains("more than 65536"), "{}", message)
            },
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }

        let mut b = builder("void f(int a)");
        b.load_argument(0).start_switch(i32::MAX - 1, i32::MAX, |s| {
            s.add_case(i32::MAX, |_| {});
            s.add_default(|_| {});
        });
        b.return_result();
        let code = b.build().unwrap();
        let targets = code.instructions.iter()
            .find_map(|i| match *i {
                Instruction::TableSwitch { ref targets, .. } => Some(targets.len()),
                _ => None,
            });
        assert_eq!(Some(2), targets);
    }

    #[test]
    fn try_catch_table_order() {
        let mut b = builder("void f()");
        b.start_try_catch(|t| {
            t.add_try(|b| { b.load_this().pop(); });
            t.add_catch("java.lang.RuntimeException", |b| { b.pop(); });
            t.add_catch("java.lang.Exception", |b| { b.pop(); });
            t.add_finally(|b| { b.load_constant(1).pop(); });
        });
        b.return_result();
        let code = b.build().unwrap();
        let types: Vec<Option<&str>> = code.exception_table.iter()
            .map(|h| h.catch_type.as_deref())
            .collect();
        assert_eq!(vec![Some("java.lang.RuntimeException"), Some("java.lang.Exception"),
                        None, None, None],
                   types);
    }
}
