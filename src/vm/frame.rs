//! The interpreter: one [`Frame`] per invocation of an assembled method.

use crate::assembler::{ArithOp, Code, Condition, Constant, Instruction, InvokeKind};
use crate::error::{Error, Result};
use crate::model::class_def::MethodBody;
use crate::model::types::TypeName;
use crate::vm::class::Method;
use crate::vm::class_loader::ClassLoader;
use crate::vm::value::{Object, ObjectRef, Value};

/// Runs a method. For instance methods `args[0]` is the receiver.
pub fn invoke(loader: &ClassLoader, method: &Method, args: Vec<Value>) -> Result<Option<Value>> {
    trace!("invoking {}", method);
    match method.body {
        MethodBody::Abstract => Err(loader.exception("java.lang.AbstractMethodError",
                                                     Some(&method.to_string()))),
        MethodBody::Native(ref native) => native.invoke(loader, &args),
        MethodBody::Code(ref code) => {
            let mut local_variables = Vec::with_capacity(code.max_locals as usize);
            for arg in args {
                let wide = arg.kind().is_wide();
                local_variables.push(Some(arg));
                if wide {
                    local_variables.push(None);
                }
            }
            if local_variables.len() < code.max_locals as usize {
                local_variables.resize(code.max_locals as usize, None);
            }
            Frame::new(method, code, local_variables).run(loader)
        },
    }
}

/// A frame is used to store data and partial results, as well as to perform dynamic linking,
/// return values for methods, and dispatch exceptions.
#[derive(Debug)]
pub struct Frame<'a> {
    /// The method whose code is executing in this frame.
    method: &'a Method,
    code: &'a Code,
    /// The index of the next instruction.
    pc: usize,
    /// The index of the instruction currently executing, for exception dispatch.
    current: usize,
    /// The local variables of the current method.
    /// Values that occupy two indices (`long` and `double`) are stored in one slot followed by a
    /// `None` value in the subsequent index.
    local_variables: Vec<Option<Value>>,
    /// The operand stack manipulated by the instructions of the current method.
    operand_stack: Vec<Value>,
}

enum Step {
    Continue,
    Return(Option<Value>),
}

impl<'a> Frame<'a> {
    pub fn new(method: &'a Method, code: &'a Code, local_variables: Vec<Option<Value>>) -> Self {
        Frame {
            method: method,
            code: code,
            pc: 0,
            current: 0,
            local_variables: local_variables,
            operand_stack: Vec::with_capacity(code.max_stack as usize),
        }
    }

    pub fn run(mut self, loader: &ClassLoader) -> Result<Option<Value>> {
        loop {
            match self.step(loader) {
                Ok(Step::Continue) => (),
                Ok(Step::Return(value)) => return Ok(value),
                Err(Error::Thrown(exception)) => match self.find_handler(loader, &exception)? {
                    Some(handler) => {
                        self.operand_stack.clear();
                        self.operand_stack.push(Value::Reference(exception));
                        self.pc = handler;
                    },
                    None => return Err(Error::Thrown(exception)),
                },
                Err(error) => return Err(error),
            }
        }
    }

    /// The first exception table entry covering the faulting instruction that catches the
    /// exception's class.
    fn find_handler(&self, loader: &ClassLoader, exception: &ObjectRef) -> Result<Option<usize>> {
        let thrown = Value::Reference(exception.clone());
        for entry in &self.code.exception_table {
            let start = self.code.target(entry.start);
            let end = self.code.target(entry.end);
            if self.current < start || self.current >= end {
                continue;
            }
            let caught = match entry.catch_type {
                None => true,
                Some(ref class_name) => loader.is_instance(&thrown, &TypeName::class(class_name))?,
            };
            if caught {
                debug!("{} caught by handler at {} in {}", exception.class_name(),
                       self.code.target(entry.handler), self.method);
                return Ok(Some(self.code.target(entry.handler)));
            }
        }
        Ok(None)
    }

    fn linkage(&self, message: &str) -> Error {
        Error::Linkage(format!("{} at {} in {}", message, self.current, self.method))
    }

    fn push(&mut self, value: Value) {
        self.operand_stack.push(value);
    }

    fn pop(&mut self) -> Result<Value> {
        match self.operand_stack.pop() {
            Some(value) => Ok(value),
            None => Err(self.linkage("operand stack underflow")),
        }
    }

    fn pop_int(&mut self) -> Result<i32> {
        match self.pop()? {
            Value::Int(v) => Ok(v),
            other => Err(self.linkage(&format!("expected an int but found {}", other))),
        }
    }

    /// Pops a reference, throwing `NullPointerException` for `null`.
    fn pop_object(&mut self, loader: &ClassLoader) -> Result<ObjectRef> {
        match self.pop()? {
            Value::Reference(object) => Ok(object),
            Value::Null => Err(loader.exception("java.lang.NullPointerException", None)),
            other => Err(self.linkage(&format!("expected a reference but found {}", other))),
        }
    }

    /// Pops the top `count` values, in push order.
    fn pop_args(&mut self, count: usize) -> Result<Vec<Value>> {
        if self.operand_stack.len() < count {
            return Err(self.linkage("operand stack underflow"));
        }
        let start = self.operand_stack.len() - count;
        Ok(self.operand_stack.split_off(start))
    }

    fn load(&self, index: u16) -> Result<Value> {
        match self.local_variables.get(index as usize) {
            Some(&Some(ref value)) => Ok(value.clone()),
            _ => Err(self.linkage(&format!("local variable {} is not set", index))),
        }
    }

    fn store(&mut self, index: u16, value: Value) {
        let index = index as usize;
        let wide = value.kind().is_wide();
        let needed = index + if wide { 2 } else { 1 };
        if self.local_variables.len() < needed {
            self.local_variables.resize(needed, None);
        }
        // invalidate the slot after this one if we're storing a category 2 operand
        if wide {
            self.local_variables[index + 1] = None;
        }
        self.local_variables[index] = Some(value);
        // invalidate the slot before this one if it was formerly storing a category 2 operand
        if index > 0 {
            let previous_is_wide = self.local_variables[index - 1].as_ref()
                .map_or(false, |v| v.kind().is_wide());
            if previous_is_wide {
                self.local_variables[index - 1] = None;
            }
        }
    }

    fn element_index(&self, loader: &ClassLoader, length: usize, index: i32) -> Result<usize> {
        if index < 0 || index as usize >= length {
            let message = format!("Index {} out of bounds for length {}", index, length);
            return Err(loader.exception("java.lang.ArrayIndexOutOfBoundsException",
                                        Some(&message)));
        }
        Ok(index as usize)
    }

    fn arithmetic(&self, loader: &ClassLoader, op: ArithOp, a: Value, b: Value) -> Result<Value> {
        macro_rules! integral {
            ($variant: path, $a: expr, $b: expr) => ({
                let (a, b) = ($a, $b);
                match op {
                    ArithOp::Add => $variant(a.wrapping_add(b)),
                    ArithOp::Sub => $variant(a.wrapping_sub(b)),
                    ArithOp::Mul => $variant(a.wrapping_mul(b)),
                    ArithOp::Div | ArithOp::Rem if b == 0 =>
                        return Err(loader.exception("java.lang.ArithmeticException",
                                                    Some("/ by zero"))),
                    ArithOp::Div => $variant(a.wrapping_div(b)),
                    ArithOp::Rem => $variant(a.wrapping_rem(b)),
                }
            })
        }

        macro_rules! floating {
            ($variant: path, $a: expr, $b: expr) => ({
                let (a, b) = ($a, $b);
                match op {
                    ArithOp::Add => $variant(a + b),
                    ArithOp::Sub => $variant(a - b),
                    ArithOp::Mul => $variant(a * b),
                    ArithOp::Div => $variant(a / b),
                    ArithOp::Rem => $variant(a % b),
                }
            })
        }

        Ok(match (a, b) {
            (Value::Int(a), Value::Int(b)) => integral!(Value::Int, a, b),
            (Value::Long(a), Value::Long(b)) => integral!(Value::Long, a, b),
            (Value::Float(a), Value::Float(b)) => floating!(Value::Float, a, b),
            (Value::Double(a), Value::Double(b)) => floating!(Value::Double, a, b),
            (a, b) => return Err(self.linkage(&format!("cannot apply {:?} to {} and {}",
                                                       op, a, b))),
        })
    }

    fn condition(&mut self, condition: Condition) -> Result<bool> {
        Ok(match condition {
            Condition::Null => self.pop()?.is_null(),
            Condition::NonNull => !self.pop()?.is_null(),
            Condition::Zero => self.pop_int()? == 0,
            Condition::NonZero => self.pop_int()? != 0,
            Condition::LessThan => {
                let b = self.pop_int()?;
                self.pop_int()? < b
            },
            Condition::GreaterThan => {
                let b = self.pop_int()?;
                self.pop_int()? > b
            },
            Condition::Equal => {
                let b = self.pop()?;
                self.pop()?.same(&b)
            },
            Condition::NotEqual => {
                let b = self.pop()?;
                !self.pop()?.same(&b)
            },
        })
    }

    fn step(&mut self, loader: &ClassLoader) -> Result<Step> {
        let code = self.code;
        let instruction = match code.instructions.get(self.pc) {
            Some(instruction) => instruction,
            None => return Err(self.linkage("execution fell off the end of the code")),
        };
        self.current = self.pc;
        self.pc += 1;

        match *instruction {
            Instruction::Nop => (),
            Instruction::Null => self.push(Value::Null),
            Instruction::Constant(ref constant) => {
                let value = match *constant {
                    Constant::Int(v) => Value::Int(v),
                    Constant::Long(v) => Value::Long(v),
                    Constant::Float(v) => Value::Float(v),
                    Constant::Double(v) => Value::Double(v),
                    Constant::String(ref s) => loader.string(s),
                };
                self.push(value);
            },
            Instruction::Load(_, index) => {
                let value = self.load(index)?;
                self.push(value);
            },
            Instruction::Store(_, index) => {
                let value = self.pop()?;
                self.store(index, value);
            },
            Instruction::Increment(index, amount) => match self.load(index)? {
                Value::Int(v) => self.store(index, Value::Int(v.wrapping_add(amount))),
                other => return Err(self.linkage(&format!("iinc on {}", other))),
            },

            Instruction::GetField(ref field) => {
                let object = self.pop_object(loader)?;
                let value = object.class().field_slot(&field.owner, &field.name)
                    .and_then(|slot| object.get_slot(slot))
                    .ok_or_else(|| Error::NoSuchField {
                        class: object.class_name().to_string(),
                        field: field.name.clone(),
                    })?;
                self.push(value);
            },
            Instruction::PutField(ref field) => {
                let value = self.pop()?;
                let object = self.pop_object(loader)?;
                let stored = object.class().field_slot(&field.owner, &field.name)
                    .map_or(false, |slot| object.put_slot(slot, value));
                if !stored {
                    return Err(Error::NoSuchField {
                        class: object.class_name().to_string(),
                        field: field.name.clone(),
                    });
                }
            },
            Instruction::GetStatic(ref field) => {
                let class = loader.load_class(&field.owner)?;
                let value = class.get_static(&field.name).ok_or_else(|| Error::NoSuchField {
                    class: field.owner.clone(),
                    field: field.name.clone(),
                })?;
                self.push(value);
            },
            Instruction::PutStatic(ref field) => {
                let value = self.pop()?;
                let class = loader.load_class(&field.owner)?;
                if !class.put_static(&field.name, value) {
                    return Err(Error::NoSuchField {
                        class: field.owner.clone(),
                        field: field.name.clone(),
                    });
                }
            },

            Instruction::Invoke(kind, ref method_ref) => {
                let key = method_ref.key();
                let receiver_slots = if kind == InvokeKind::Static { 0 } else { 1 };
                let args = self.pop_args(method_ref.argument_types.len() + receiver_slots)?;
                let resolved = match kind {
                    InvokeKind::Static | InvokeKind::Special => {
                        if kind == InvokeKind::Special && args[0].is_null() {
                            return Err(loader.exception("java.lang.NullPointerException",
                                                        Some(&method_ref.name)));
                        }
                        loader.load_class(&method_ref.owner)?.find_method(&key)
                    },
                    InvokeKind::Virtual | InvokeKind::Interface => match args[0] {
                        Value::Reference(ref receiver) => receiver.class().find_method(&key),
                        Value::Null => return Err(loader.exception(
                            "java.lang.NullPointerException",
                            Some(&format!("cannot invoke {}.{}", method_ref.owner,
                                          method_ref.name)))),
                        ref other => return Err(self.linkage(&format!(
                            "invoke {} on primitive {}", key, other))),
                    },
                };
                let method = resolved.ok_or_else(|| Error::NoSuchMethod {
                    class: method_ref.owner.clone(),
                    method: key.to_string(),
                })?;
                if let Some(result) = invoke(loader, &method, args)? {
                    if !method_ref.return_type.is_void() {
                        self.push(result);
                    }
                }
            },

            Instruction::New(ref class_name) => {
                let class = loader.load_class(class_name)?;
                if class.is_abstract() || class.is_interface() {
                    return Err(loader.exception("java.lang.InstantiationError",
                                                Some(class_name)));
                }
                self.push(Value::Reference(Object::new_instance(class)));
            },
            Instruction::NewArray(ref component) => {
                let length = self.pop_int()?;
                if length < 0 {
                    return Err(loader.exception("java.lang.NegativeArraySizeException",
                                                Some(&length.to_string())));
                }
                let elements = vec![Value::default_for(component); length as usize];
                self.push(loader.new_array(component, elements));
            },
            Instruction::ArrayLength => {
                let array = self.pop_object(loader)?;
                let length = match array.elements() {
                    Some(elements) => elements.read().len(),
                    None => return Err(self.linkage("arraylength on a non-array")),
                };
                self.push(Value::Int(length as i32));
            },
            Instruction::ArrayLoad(_) => {
                let index = self.pop_int()?;
                let array = self.pop_object(loader)?;
                let elements = match array.elements() {
                    Some(elements) => elements.read(),
                    None => return Err(self.linkage("array load from a non-array")),
                };
                let index = self.element_index(loader, elements.len(), index)?;
                let value = elements[index].clone();
                drop(elements);
                self.push(value);
            },
            Instruction::ArrayStore(_) => {
                let value = self.pop()?;
                let index = self.pop_int()?;
                let array = self.pop_object(loader)?;
                let mut elements = match array.elements() {
                    Some(elements) => elements.write(),
                    None => return Err(self.linkage("array store into a non-array")),
                };
                let index = self.element_index(loader, elements.len(), index)?;
                elements[index] = value;
            },
            Instruction::CheckCast(ref ty) => {
                let value = match self.operand_stack.last() {
                    Some(value) => value.clone(),
                    None => return Err(self.linkage("operand stack underflow")),
                };
                if !value.is_null() && !loader.is_instance(&value, ty)? {
                    let message = format!("class {} cannot be cast to class {}",
                                          loader.type_of(&value), ty);
                    return Err(loader.exception("java.lang.ClassCastException", Some(&message)));
                }
            },
            Instruction::InstanceOf(ref ty) => {
                let value = self.pop()?;
                let result = loader.is_instance(&value, ty)?;
                self.push(Value::from_bool(result));
            },

            Instruction::Pop => {
                self.pop()?;
            },
            Instruction::Pop2 => {
                if !self.pop()?.kind().is_wide() {
                    self.pop()?;
                }
            },
            Instruction::Dup => {
                let value = self.pop()?;
                self.push(value.clone());
                self.push(value);
            },
            Instruction::DupX1 => {
                let value1 = self.pop()?;
                let value2 = self.pop()?;
                self.operand_stack.extend_from_slice(&[value1.clone(), value2, value1]);
            },
            Instruction::DupX2 => {
                let value1 = self.pop()?;
                let value2 = self.pop()?;
                if value2.kind().is_wide() {
                    self.operand_stack.extend_from_slice(&[value1.clone(), value2, value1]);
                } else {
                    let value3 = self.pop()?;
                    self.operand_stack.extend_from_slice(&[value1.clone(), value3, value2,
                                                           value1]);
                }
            },
            Instruction::Dup2 => {
                let value1 = self.pop()?;
                if value1.kind().is_wide() {
                    self.operand_stack.extend_from_slice(&[value1.clone(), value1]);
                } else {
                    let value2 = self.pop()?;
                    self.operand_stack.extend_from_slice(&[value2.clone(), value1.clone(), value2,
                                                           value1]);
                }
            },
            Instruction::Swap => {
                // both values need to be category 1
                let value1 = self.pop()?;
                let value2 = self.pop()?;
                self.operand_stack.extend_from_slice(&[value1, value2]);
            },

            Instruction::Arith(op, _) => {
                let b = self.pop()?;
                let a = self.pop()?;
                let result = self.arithmetic(loader, op, a, b)?;
                self.push(result);
            },
            Instruction::Neg(_) => {
                let result = match self.pop()? {
                    Value::Int(v) => Value::Int(v.wrapping_neg()),
                    Value::Long(v) => Value::Long(v.wrapping_neg()),
                    Value::Float(v) => Value::Float(-v),
                    Value::Double(v) => Value::Double(-v),
                    other => return Err(self.linkage(&format!("cannot negate {}", other))),
                };
                self.push(result);
            },
            Instruction::Cmp(_) => {
                let b = self.pop()?;
                let a = self.pop()?;
                let ordering = match (a, b) {
                    (Value::Long(a), Value::Long(b)) => Some(a.cmp(&b)),
                    (Value::Float(a), Value::Float(b)) => a.partial_cmp(&b),
                    (Value::Double(a), Value::Double(b)) => a.partial_cmp(&b),
                    (a, b) => return Err(self.linkage(&format!("cannot compare {} and {}",
                                                               a, b))),
                };
                // NaN compares as less
                let result = ordering.map_or(-1, |ordering| ordering as i32);
                self.push(Value::Int(result));
            },
            Instruction::Convert(_, to) => {
                let value = self.pop()?;
                match value.convert(to) {
                    Some(converted) => self.push(converted),
                    None => return Err(self.linkage(&format!("cannot convert {} to {:?}",
                                                             value, to))),
                }
            },

            Instruction::If(condition, label) => {
                if self.condition(condition)? {
                    self.pc = code.target(label);
                }
            },
            Instruction::Goto(label) => self.pc = code.target(label),
            Instruction::TableSwitch { low, default, ref targets } => {
                let index = self.pop_int()? as i64 - low as i64;
                let label = if index >= 0 && (index as usize) < targets.len() {
                    targets[index as usize]
                } else {
                    default
                };
                self.pc = code.target(label);
            },
            Instruction::Return(None) => return Ok(Step::Return(None)),
            Instruction::Return(Some(_)) => return Ok(Step::Return(Some(self.pop()?))),
            Instruction::Throw => {
                let exception = self.pop_object(loader)?;
                return Err(Error::Thrown(exception));
            },
        }
        Ok(Step::Continue)
    }
}

#[cfg(test)]
mod tests {
    use crate::assembler::InstructionBuilder;
    use crate::model::class_def::ClassDef;
    use crate::model::method::{MethodDescription, MethodKey};
    use crate::model::types::{Primitive, ValueKind};
    use crate::vm::class_loader::ClassLoader;
    use super::*;

    fn run<F>(description: &str, args: Vec<Value>, body: F) -> Result<Option<Value>>
        where F: FnOnce(&mut InstructionBuilder)
    {
        let loader = ClassLoader::new();
        let description = MethodDescription::parse(description).unwrap()
            .with_modifiers(crate::model::access_flags::ACC_PUBLIC
                            | crate::model::access_flags::ACC_STATIC);
        let key = description.key();
        let mut def = ClassDef::new("test.Subject", "java.lang.Object");
        def.add_code_method(description, body).unwrap();
        loader.define(def).unwrap();
        loader.invoke_static("test.Subject", &key, args)
    }

    #[test]
    fn loops_and_arithmetic() {
        // sum of 1..=n
        let result = run("int sum(int)", vec![Value::Int(10)], |b| {
            b.start_variable(TypeName::int(), |b, total| {
                b.load_constant(0).store_variable(total);
                b.start_variable(TypeName::int(), |b, i| {
                    b.load_constant(1).store_variable(i);
                    b.do_while(Condition::LessThan,
                               |b| {
                                   b.load_variable(i).load_argument(0).load_constant(1)
                                       .arithmetic(ArithOp::Add, ValueKind::Int);
                               },
                               |b| {
                                   b.load_variable(total).load_variable(i)
                                       .arithmetic(ArithOp::Add, ValueKind::Int)
                                       .store_variable(total);
                                   b.increment_variable(i, 1);
                               });
                });
                b.load_variable(total).return_result();
            });
        }).unwrap();
        assert_eq!(Some(55), result.and_then(|v| v.as_int()));
    }

    #[test]
    fn division_by_zero_is_caught_by_the_first_matching_handler() {
        let result = run("int divide(int, int)", vec![Value::Int(1), Value::Int(0)], |b| {
            b.start_try_catch(|block| {
                block.add_try(|b| {
                    b.load_argument(0).load_argument(1)
                        .arithmetic(ArithOp::Div, ValueKind::Int).return_result();
                });
                block.add_catch("java.lang.ArithmeticException", |b| {
                    b.pop().load_constant(-1).return_result();
                });
                block.add_catch("java.lang.RuntimeException", |b| {
                    b.pop().load_constant(-2).return_result();
                });
            });
            b.load_constant(0).return_result();
        }).unwrap();
        assert_eq!(Some(-1), result.and_then(|v| v.as_int()));
    }

    #[test]
    fn uncaught_exceptions_propagate() {
        let error = run("void fail()", vec![], |b| {
            b.throw_exception("java.lang.IllegalStateException", "no way");
        }).unwrap_err();
        let thrown = error.thrown().unwrap();
        assert_eq!("java.lang.IllegalStateException", thrown.class_name());
        assert_eq!(Some(String::from("no way")), thrown.message());
    }

    #[test]
    fn boxing_and_casts() {
        let loader_free = run("java.lang.Object box(long)", vec![Value::Long(7)], |b| {
            b.load_argument(0).box_primitive(&TypeName::Primitive(Primitive::Long))
                .return_result();
        }).unwrap().unwrap();
        assert_eq!("7", loader_free.to_string());

        let error = run("int unbox(java.lang.Object)",
                        vec![ClassLoader::new().string("seven")], |b| {
            b.load_argument(0).check_cast(&TypeName::int()).return_result();
        }).unwrap_err();
        assert_eq!("java.lang.ClassCastException", error.thrown().unwrap().class_name());
    }

    #[test]
    fn switch_falls_back_to_default() {
        let body = |b: &mut InstructionBuilder| {
            b.load_argument(0).start_switch(1, 2, |switch| {
                switch.add_case(1, |b| {
                    b.load_constant("one").return_result();
                });
                switch.add_case(2, |b| {
                    b.load_constant("two").return_result();
                });
            });
        };
        let two = run("java.lang.String name(int)", vec![Value::Int(2)], body).unwrap();
        assert_eq!(Some("two"), two.as_ref().and_then(Value::as_str));
        let error = run("java.lang.String name(int)", vec![Value::Int(9)], body).unwrap_err();
        assert_eq!("java.lang.IllegalArgumentException", error.thrown().unwrap().class_name());
    }

    #[test]
    fn abstract_methods_throw() {
        let loader = ClassLoader::new();
        let mut def = ClassDef::new("test.Shape", "java.lang.Object");
        def.access_flags |= crate::model::access_flags::ACC_ABSTRACT;
        def.add_abstract_method(MethodDescription::new(TypeName::int(), "area", vec![]));
        let class = loader.define(def).unwrap();
        let area = class.find_method(&MethodKey::new("area", "()I")).unwrap();
        let error = loader.invoke(&area, vec![Value::Null]).unwrap_err();
        assert_eq!("java.lang.AbstractMethodError", error.thrown().unwrap().class_name());
    }
}
