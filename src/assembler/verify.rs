//! Type-level verification of assembled method bodies.
//!
//! The verifier runs a data-flow pass over the kinds of values on the operand stack and in the
//! local variables. It checks that every instruction finds operands of the kinds it expects, that
//! all paths reaching a label agree on the stack shape, that branches land inside the method and
//! that execution never runs off the end of the body.

use std::collections::VecDeque;

use crate::assembler::instruction::{Code, Condition, InvokeKind, Instruction};
use crate::error::{Error, Result};
use crate::model::method::MethodDescription;
use crate::model::types::ValueKind;

#[derive(Debug, Clone, PartialEq)]
struct State {
    stack: Vec<ValueKind>,
    /// `None` marks an unset slot, or the second half of a `long`/`double`.
    locals: Vec<Option<ValueKind>>,
}

impl State {
    /// Merges another state into this one, returning whether this state changed.
    fn merge(&mut self, other: &State) -> std::result::Result<bool, String> {
        if self.stack != other.stack {
            return Err(format!("inconsistent stack at merge point: {:?} versus {:?}",
                               self.stack, other.stack));
        }
        let mut changed = false;
        for (mine, theirs) in self.locals.iter_mut().zip(other.locals.iter()) {
            if mine.is_some() && mine != theirs {
                *mine = None;
                changed = true;
            }
        }
        Ok(changed)
    }

    fn depth(&self) -> u16 {
        self.stack.iter().map(|kind| kind.slots()).sum()
    }
}

struct Verifier<'a> {
    code: &'a Code,
    returns: Option<ValueKind>,
    states: Vec<Option<State>>,
    worklist: VecDeque<usize>,
}

impl<'a> Verifier<'a> {
    fn flow_to(&mut self, pc: usize, state: &State) -> std::result::Result<(), String> {
        if pc >= self.code.instructions.len() {
            return Err(format!("branch to {} is outside the method body", pc));
        }
        let changed = match self.states[pc] {
            Some(ref mut existing) => existing.merge(state)?,
            None => {
                self.states[pc] = Some(state.clone());
                true
            },
        };
        if changed && !self.worklist.contains(&pc) {
            self.worklist.push_back(pc);
        }
        Ok(())
    }

    fn step(&mut self, pc: usize) -> std::result::Result<u16, String> {
        let code = self.code;
        let mut state = match self.states[pc] {
            Some(ref state) => state.clone(),
            None => return Ok(0),
        };
        let instruction = &code.instructions[pc];

        // every instruction inside a protected range may transfer to its handler
        for handler in &code.exception_table {
            let start = code.target(handler.start);
            let end = code.target(handler.end);
            if pc >= start && pc < end {
                let entry = State {
                    stack: vec![ValueKind::Reference],
                    locals: state.locals.clone(),
                };
                let target = code.target(handler.handler);
                self.flow_to(target, &entry)?;
            }
        }

        execute(instruction, &mut state, self.returns)
            .map_err(|message| format!("at {} ({}): {}", pc, instruction, message))?;
        let depth = state.depth();

        for label in instruction.branch_targets() {
            let target = code.target(label);
            self.flow_to(target, &state)?;
        }
        if instruction.falls_through() {
            if pc + 1 >= code.instructions.len() {
                return Err(String::from("execution falls off the end of the method"));
            }
            self.flow_to(pc + 1, &state)?;
        }
        Ok(depth)
    }
}

fn pop(state: &mut State, expected: ValueKind) -> std::result::Result<(), String> {
    match state.stack.pop() {
        Some(kind) if kind == expected => Ok(()),
        Some(kind) => Err(format!("expected {:?} on the stack but found {:?}", expected, kind)),
        None => Err(format!("expected {:?} but the stack is empty", expected)),
    }
}

fn pop_any(state: &mut State) -> std::result::Result<ValueKind, String> {
    state.stack.pop().ok_or_else(|| String::from("stack underflow"))
}

fn pop_narrow(state: &mut State) -> std::result::Result<ValueKind, String> {
    let kind = pop_any(state)?;
    if kind.is_wide() {
        Err(format!("expected a category 1 value but found {:?}", kind))
    } else {
        Ok(kind)
    }
}

fn local(state: &State, index: u16) -> std::result::Result<Option<ValueKind>, String> {
    state.locals.get(index as usize).cloned()
        .ok_or_else(|| format!("local variable {} is out of range", index))
}

fn store(state: &mut State, kind: ValueKind, index: u16) -> std::result::Result<(), String> {
    let index = index as usize;
    let last = index + kind.slots() as usize - 1;
    if last >= state.locals.len() {
        return Err(format!("local variable {} is out of range", index));
    }
    state.locals[index] = Some(kind);
    if kind.is_wide() {
        state.locals[index + 1] = None;
    }
    if index > 0 && state.locals[index - 1].map_or(false, ValueKind::is_wide) {
        state.locals[index - 1] = None;
    }
    Ok(())
}

/// Applies the stack effect of one instruction.
fn execute(instruction: &Instruction, state: &mut State, returns: Option<ValueKind>)
           -> std::result::Result<(), String> {
    use self::Instruction::*;
    match *instruction {
        Nop | Goto(_) => (),
        Null | New(_) => state.stack.push(ValueKind::Reference),
        Constant(ref constant) => state.stack.push(constant.kind()),
        Load(kind, index) => {
            if local(state, index)? != Some(kind) {
                return Err(format!("local variable {} does not hold a {:?}", index, kind));
            }
            state.stack.push(kind);
        },
        Store(kind, index) => {
            pop(state, kind)?;
            store(state, kind, index)?;
        },
        Increment(index, _) => {
            if local(state, index)? != Some(ValueKind::Int) {
                return Err(format!("local variable {} does not hold an int", index));
            }
        },
        GetField(ref field) => {
            pop(state, ValueKind::Reference)?;
            state.stack.push(field_kind(&field.ty)?);
        },
        PutField(ref field) => {
            pop(state, field_kind(&field.ty)?)?;
            pop(state, ValueKind::Reference)?;
        },
        GetStatic(ref field) => state.stack.push(field_kind(&field.ty)?),
        PutStatic(ref field) => pop(state, field_kind(&field.ty)?)?,
        Invoke(kind, ref method) => {
            for argument in method.argument_types.iter().rev() {
                pop(state, field_kind(argument)?)?;
            }
            if kind != InvokeKind::Static {
                pop(state, ValueKind::Reference)?;
            }
            if let Some(result) = method.return_type.kind() {
                state.stack.push(result);
            }
        },
        NewArray(_) => {
            pop(state, ValueKind::Int)?;
            state.stack.push(ValueKind::Reference);
        },
        ArrayLength => {
            pop(state, ValueKind::Reference)?;
            state.stack.push(ValueKind::Int);
        },
        ArrayLoad(kind) => {
            pop(state, ValueKind::Int)?;
            pop(state, ValueKind::Reference)?;
            state.stack.push(kind);
        },
        ArrayStore(kind) => {
            pop(state, kind)?;
            pop(state, ValueKind::Int)?;
            pop(state, ValueKind::Reference)?;
        },
        CheckCast(_) => {
            pop(state, ValueKind::Reference)?;
            state.stack.push(ValueKind::Reference);
        },
        InstanceOf(_) => {
            pop(state, ValueKind::Reference)?;
            state.stack.push(ValueKind::Int);
        },
        Pop => {
            pop_narrow(state)?;
        },
        Pop2 => {
            if !pop_any(state)?.is_wide() {
                pop_narrow(state)?;
            }
        },
        Dup => {
            let top = pop_narrow(state)?;
            state.stack.extend_from_slice(&[top, top]);
        },
        DupX1 => {
            let v1 = pop_narrow(state)?;
            let v2 = pop_narrow(state)?;
            state.stack.extend_from_slice(&[v1, v2, v1]);
        },
        DupX2 => {
            let v1 = pop_narrow(state)?;
            let v2 = pop_any(state)?;
            if v2.is_wide() {
                state.stack.extend_from_slice(&[v1, v2, v1]);
            } else {
                let v3 = pop_narrow(state)?;
                state.stack.extend_from_slice(&[v1, v3, v2, v1]);
            }
        },
        Dup2 => {
            let v1 = pop_any(state)?;
            if v1.is_wide() {
                state.stack.extend_from_slice(&[v1, v1]);
            } else {
                let v2 = pop_narrow(state)?;
                state.stack.extend_from_slice(&[v2, v1, v2, v1]);
            }
        },
        Swap => {
            let v1 = pop_narrow(state)?;
            let v2 = pop_narrow(state)?;
            state.stack.extend_from_slice(&[v1, v2]);
        },
        Arith(_, kind) => {
            numeric(kind)?;
            pop(state, kind)?;
            pop(state, kind)?;
            state.stack.push(kind);
        },
        Neg(kind) => {
            numeric(kind)?;
            pop(state, kind)?;
            state.stack.push(kind);
        },
        Cmp(kind) => {
            if kind == ValueKind::Int || kind == ValueKind::Reference {
                return Err(format!("cannot compare {:?} values with cmp", kind));
            }
            pop(state, kind)?;
            pop(state, kind)?;
            state.stack.push(ValueKind::Int);
        },
        Convert(from, to) => {
            numeric(from)?;
            numeric(to)?;
            pop(state, from)?;
            state.stack.push(to);
        },
        If(condition, _) => match condition {
            Condition::Null | Condition::NonNull => pop(state, ValueKind::Reference)?,
            Condition::Zero | Condition::NonZero => pop(state, ValueKind::Int)?,
            Condition::LessThan | Condition::GreaterThan => {
                pop(state, ValueKind::Int)?;
                pop(state, ValueKind::Int)?;
            },
            Condition::Equal | Condition::NotEqual => {
                let kind = pop_any(state)?;
                if kind != ValueKind::Int && kind != ValueKind::Reference {
                    return Err(format!("cannot compare {:?} values for equality", kind));
                }
                pop(state, kind)?;
            },
        },
        TableSwitch { .. } => pop(state, ValueKind::Int)?,
        Return(kind) => {
            if kind != returns {
                return Err(format!("returns {:?} from a method returning {:?}", kind, returns));
            }
            if let Some(kind) = kind {
                pop(state, kind)?;
            }
        },
        Throw => pop(state, ValueKind::Reference)?,
    }
    Ok(())
}

fn numeric(kind: ValueKind) -> std::result::Result<(), String> {
    if kind == ValueKind::Reference {
        Err(String::from("arithmetic on a reference"))
    } else {
        Ok(())
    }
}

fn field_kind(ty: &crate::model::types::TypeName) -> std::result::Result<ValueKind, String> {
    ty.kind().ok_or_else(|| String::from("void is not a value type"))
}

/// Verifies `code` as the body of `description` in class `owner`, returning the maximum operand
/// stack depth in slots.
pub fn verify(owner: &str, description: &MethodDescription, code: &Code) -> Result<u16> {
    let method_name = || format!("{}.{}{}", owner, description.method_name,
                                 description.descriptor());
    let failure = |message: String| Error::Assembly {
        method: method_name(),
        message: message,
    };

    if code.instructions.is_empty() {
        return Err(failure(String::from("method body is empty")));
    }
    if code.labels.iter().any(|&pc| pc > code.instructions.len()) {
        return Err(failure(String::from("label placed outside the method body")));
    }

    let mut locals = vec![None; code.max_locals as usize];
    let mut slot = 0usize;
    let receiver = if description.is_static() { None } else { Some(ValueKind::Reference) };
    let parameters = receiver.into_iter()
        .chain(description.argument_types.iter().filter_map(|ty| ty.kind()));
    for kind in parameters {
        if slot + kind.slots() as usize > locals.len() {
            return Err(failure(String::from("max_locals is too small for the parameters")));
        }
        locals[slot] = Some(kind);
        slot += kind.slots() as usize;
    }

    let mut verifier = Verifier {
        code: code,
        returns: description.return_type.kind(),
        states: vec![None; code.instructions.len()],
        worklist: VecDeque::new(),
    };
    verifier.flow_to(0, &State { stack: vec![], locals: locals }).map_err(&failure)?;

    let mut max_stack = 0;
    while let Some(pc) = verifier.worklist.pop_front() {
        let depth = verifier.step(pc).map_err(&failure)?;
        max_stack = max_stack.max(depth);
    }
    for state in verifier.states.iter().flatten() {
        max_stack = max_stack.max(state.depth());
    }
    Ok(max_stack)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::instruction::{ArithOp, Constant, ExceptionHandler, Label};
    use crate::model::types::TypeName;

    fn code(instructions: Vec<Instruction>, labels: Vec<usize>, max_locals: u16) -> Code {
        Code {
            instructions: instructions,
            labels: labels,
            exception_table: vec![],
            max_locals: max_locals,
            max_stack: 0,
        }
    }

    fn int_method() -> MethodDescription {
        MethodDescription::new(TypeName::int(), "compute", vec![TypeName::int()])
    }

    #[test]
    fn accepts_well_typed_code() {
        let body = code(vec![Instruction::Load(ValueKind::Int, 1),
                             Instruction::Constant(Constant::Int(2)),
                             Instruction::Arith(ArithOp::Mul, ValueKind::Int),
                             Instruction::Return(Some(ValueKind::Int))],
                        vec![], 2);
        assert_eq!(2, verify("a.B", &int_method(), &body).unwrap());
    }

    #[test]
    fn rejects_kind_mismatch_naming_the_method() {
        let body = code(vec![Instruction::Load(ValueKind::Int, 1),
                             Instruction::Constant(Constant::Long(2)),
                             Instruction::Arith(ArithOp::Add, ValueKind::Int),
                             Instruction::Return(Some(ValueKind::Int))],
                        vec![], 2);
        match verify("a.B", &int_method(), &body) {
            Err(Error::Assembly { method, message }) => {
                assert_eq!("a.B.compute(I)I", method);
                assert!(message.contains("Long"), "{}", message);
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn rejects_falling_off_the_end() {
        let body = code(vec![Instruction::Load(ValueKind::Int, 1)], vec![], 2);
        assert!(verify("a.B", &int_method(), &body).is_err());
    }

    #[test]
    fn rejects_inconsistent_merge() {
        // L0 is reached with an empty stack and with an int on the stack
        let body = code(vec![Instruction::Load(ValueKind::Int, 1),
                             Instruction::If(Condition::Zero, Label(0)),
                             Instruction::Load(ValueKind::Int, 1),
                             Instruction::Load(ValueKind::Int, 1),
                             Instruction::Return(Some(ValueKind::Int))],
                        vec![3], 2);
        assert!(verify("a.B", &int_method(), &body).is_err());
    }

    #[test]
    fn handlers_start_with_the_exception() {
        let void = MethodDescription::new(TypeName::void(), "run", vec![]);
        let mut body = code(vec![Instruction::Nop,
                                 Instruction::Return(None),
                                 Instruction::Throw],
                            vec![0, 1, 2], 1);
        body.exception_table.push(ExceptionHandler {
            start: Label(0),
            end: Label(1),
            handler: Label(2),
            catch_type: None,
        });
        assert!(verify("a.B", &void, &body).is_ok());
    }

    #[test]
    fn wide_locals_take_two_slots() {
        let method = MethodDescription::new(TypeName::void(), "run",
                                            vec![crate::model::types::Primitive::Long.into()]);
        // slot 2 is the second half of the long in slot 1
        let body = code(vec![Instruction::Load(ValueKind::Int, 2), Instruction::Return(None)],
                        vec![], 3);
        assert!(verify("a.B", &method, &body).is_err());
    }
}
