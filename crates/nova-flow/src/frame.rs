//! Abstract JVM frames over [`ParamsValue`].

use nova_classfile::opcodes::*;
use nova_classfile::Insn;
use thiserror::Error;

use crate::lattice::{ParamSet, ParamsValue};
use crate::transfer::{InsnCategory, Operands, ParametersUsage};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("operand stack underflow: need {needed} value(s), have {available}")]
    StackUnderflow { needed: usize, available: usize },
    #[error("operand stack overflow: max_stack is {max_stack}")]
    StackOverflow { max_stack: usize },
    #[error("incompatible stack heights at join: {left} vs {right}")]
    HeightMismatch { left: usize, right: usize },
    #[error("incompatible value widths in stack slot {slot} at join")]
    WidthMismatch { slot: usize },
    #[error("illegal use of a two-word value by opcode {opcode:#04x}")]
    IllegalWideUse { opcode: u8 },
    #[error("local {index} out of range (max_locals {max_locals})")]
    LocalOutOfRange { index: usize, max_locals: usize },
}

/// Locals and operand stack before or after one instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame<S> {
    locals: Vec<ParamsValue<S>>,
    stack: Vec<ParamsValue<S>>,
    max_stack: usize,
}

impl<S: ParamSet> Frame<S> {
    #[must_use]
    pub fn new(locals: Vec<ParamsValue<S>>, max_stack: u16) -> Self {
        Self {
            locals,
            stack: Vec::new(),
            max_stack: usize::from(max_stack),
        }
    }

    #[must_use]
    pub fn locals(&self) -> &[ParamsValue<S>] {
        &self.locals
    }

    #[must_use]
    pub fn stack(&self) -> &[ParamsValue<S>] {
        &self.stack
    }

    /// Frame entering an exception handler from this one: the same locals and
    /// a stack holding only the thrown exception.
    #[must_use]
    pub fn handler_frame(&self, arity: usize) -> Self {
        Self {
            locals: self.locals.clone(),
            stack: vec![ParamsValue::untracked(arity, 1)],
            max_stack: self.max_stack,
        }
    }

    /// Merges the locals of `other` into `self`, keeping the stack.
    pub fn merge_locals(&mut self, other: &Self) {
        for (mine, theirs) in self.locals.iter_mut().zip(&other.locals) {
            if mine != theirs {
                *mine = mine.merge(theirs);
            }
        }
    }

    /// Joins `incoming` into `self`; returns whether `self` changed.
    pub fn merge_into(&mut self, incoming: &Self) -> Result<bool, FrameError> {
        if self.stack.len() != incoming.stack.len() {
            return Err(FrameError::HeightMismatch {
                left: self.stack.len(),
                right: incoming.stack.len(),
            });
        }
        let mut changed = false;
        for (slot, (mine, theirs)) in self.stack.iter_mut().zip(&incoming.stack).enumerate() {
            if mine.width() != theirs.width() {
                return Err(FrameError::WidthMismatch { slot });
            }
            if mine != theirs {
                let merged = mine.merge(theirs);
                changed |= merged != *mine;
                *mine = merged;
            }
        }
        for (mine, theirs) in self.locals.iter_mut().zip(&incoming.locals) {
            if mine != theirs {
                let merged = mine.merge(theirs);
                changed |= merged != *mine;
                *mine = merged;
            }
        }
        Ok(changed)
    }

    /// The values `insn` consumes, read without modifying the frame.
    pub fn operands(&self, category: InsnCategory) -> Result<Operands<'_, S>, FrameError> {
        Ok(match category {
            InsnCategory::Nullary => Operands::Nullary,
            InsnCategory::Load(var) => Operands::Copy(self.local(var)?),
            InsnCategory::Store(_) => Operands::Copy(self.peek(0)?),
            InsnCategory::Unary => Operands::Unary(self.peek(0)?),
            InsnCategory::Binary => Operands::Binary(self.peek(1)?, self.peek(0)?),
            InsnCategory::Ternary => {
                Operands::Ternary(self.peek(2)?, self.peek(1)?, self.peek(0)?)
            }
            InsnCategory::Nary(n) => Operands::Nary(self.top(n)?),
            InsnCategory::Pseudo
            | InsnCategory::Control
            | InsnCategory::Stack
            | InsnCategory::Iinc(_)
            | InsnCategory::Jsr => Operands::None,
        })
    }

    /// Applies `insn` to the frame in place.
    pub fn execute(
        &mut self,
        insn: &Insn,
        category: InsnCategory,
        usage: &ParametersUsage,
    ) -> Result<(), FrameError> {
        match category {
            InsnCategory::Pseudo | InsnCategory::Control => Ok(()),
            InsnCategory::Stack => match insn.opcode() {
                Some(opcode) => self.execute_stack_op(opcode),
                None => Ok(()),
            },
            InsnCategory::Iinc(var) => {
                let index = self.check_local(var, 1)?;
                self.set_local(index, ParamsValue::untracked(usage.arity, 1));
                Ok(())
            }
            InsnCategory::Jsr => self.push(ParamsValue::untracked(usage.arity, 1)),
            InsnCategory::Store(var) => {
                let value = self.pop()?;
                let index = self.check_local(var, value.width())?;
                self.set_local(index, value);
                Ok(())
            }
            _ => {
                let result = usage.transfer(insn, &self.operands(category)?);
                let height = self.stack.len() - category.popped();
                self.stack.truncate(height);
                match result {
                    Some(value) => self.push(value),
                    None => Ok(()),
                }
            }
        }
    }

    fn execute_stack_op(&mut self, opcode: u8) -> Result<(), FrameError> {
        match opcode {
            POP => {
                self.pop_narrow(opcode)?;
            }
            POP2 => {
                if self.pop()?.width() == 1 {
                    self.pop_narrow(opcode)?;
                }
            }
            DUP => {
                let v1 = self.pop_narrow(opcode)?;
                self.push_all([v1.clone(), v1])?;
            }
            DUP_X1 => {
                let v1 = self.pop_narrow(opcode)?;
                let v2 = self.pop_narrow(opcode)?;
                self.push_all([v1.clone(), v2, v1])?;
            }
            DUP_X2 => {
                let v1 = self.pop_narrow(opcode)?;
                let v2 = self.pop()?;
                if v2.width() == 2 {
                    self.push_all([v1.clone(), v2, v1])?;
                } else {
                    let v3 = self.pop_narrow(opcode)?;
                    self.push_all([v1.clone(), v3, v2, v1])?;
                }
            }
            DUP2 => {
                let v1 = self.pop()?;
                if v1.width() == 2 {
                    self.push_all([v1.clone(), v1])?;
                } else {
                    let v2 = self.pop_narrow(opcode)?;
                    self.push_all([v2.clone(), v1.clone(), v2, v1])?;
                }
            }
            DUP2_X1 => {
                let v1 = self.pop()?;
                if v1.width() == 2 {
                    let v2 = self.pop_narrow(opcode)?;
                    self.push_all([v1.clone(), v2, v1])?;
                } else {
                    let v2 = self.pop_narrow(opcode)?;
                    let v3 = self.pop_narrow(opcode)?;
                    self.push_all([v2.clone(), v1.clone(), v3, v2, v1])?;
                }
            }
            DUP2_X2 => {
                let v1 = self.pop()?;
                if v1.width() == 2 {
                    let v2 = self.pop()?;
                    if v2.width() == 2 {
                        self.push_all([v1.clone(), v2, v1])?;
                    } else {
                        let v3 = self.pop_narrow(opcode)?;
                        self.push_all([v1.clone(), v3, v2, v1])?;
                    }
                } else {
                    let v2 = self.pop_narrow(opcode)?;
                    let v3 = self.pop()?;
                    if v3.width() == 2 {
                        self.push_all([v2.clone(), v1.clone(), v3, v2, v1])?;
                    } else {
                        let v4 = self.pop_narrow(opcode)?;
                        self.push_all([v2.clone(), v1.clone(), v4, v3, v2, v1])?;
                    }
                }
            }
            SWAP => {
                let v1 = self.pop_narrow(opcode)?;
                let v2 = self.pop_narrow(opcode)?;
                self.push_all([v1, v2])?;
            }
            _ => {}
        }
        Ok(())
    }

    fn local(&self, var: u16) -> Result<&ParamsValue<S>, FrameError> {
        let index = usize::from(var);
        self.locals.get(index).ok_or(FrameError::LocalOutOfRange {
            index,
            max_locals: self.locals.len(),
        })
    }

    fn check_local(&self, var: u16, width: u8) -> Result<usize, FrameError> {
        let index = usize::from(var);
        let last = index + usize::from(width) - 1;
        if last >= self.locals.len() {
            return Err(FrameError::LocalOutOfRange {
                index: last,
                max_locals: self.locals.len(),
            });
        }
        Ok(index)
    }

    /// Writes a local, invalidating the halves of any two-word value it
    /// overlaps.
    fn set_local(&mut self, index: usize, value: ParamsValue<S>) {
        let filler = || {
            let mut params = value.params.clone();
            params.clear();
            ParamsValue::with_params(params, 1)
        };
        if index > 0 && self.locals[index - 1].width() == 2 {
            self.locals[index - 1] = filler();
        }
        if value.width() == 2 {
            self.locals[index + 1] = filler();
        }
        self.locals[index] = value;
    }

    fn peek(&self, depth: usize) -> Result<&ParamsValue<S>, FrameError> {
        let len = self.stack.len();
        if depth >= len {
            return Err(FrameError::StackUnderflow {
                needed: depth + 1,
                available: len,
            });
        }
        Ok(&self.stack[len - 1 - depth])
    }

    fn top(&self, n: usize) -> Result<&[ParamsValue<S>], FrameError> {
        let len = self.stack.len();
        if n > len {
            return Err(FrameError::StackUnderflow {
                needed: n,
                available: len,
            });
        }
        Ok(&self.stack[len - n..])
    }

    fn pop(&mut self) -> Result<ParamsValue<S>, FrameError> {
        self.stack.pop().ok_or(FrameError::StackUnderflow {
            needed: 1,
            available: 0,
        })
    }

    fn pop_narrow(&mut self, opcode: u8) -> Result<ParamsValue<S>, FrameError> {
        let value = self.pop()?;
        if value.width() != 1 {
            return Err(FrameError::IllegalWideUse { opcode });
        }
        Ok(value)
    }

    fn push(&mut self, value: ParamsValue<S>) -> Result<(), FrameError> {
        let words: usize = self.stack.iter().map(|v| usize::from(v.width())).sum();
        if words + usize::from(value.width()) > self.max_stack {
            return Err(FrameError::StackOverflow {
                max_stack: self.max_stack,
            });
        }
        self.stack.push(value);
        Ok(())
    }

    fn push_all<const N: usize>(&mut self, values: [ParamsValue<S>; N]) -> Result<(), FrameError> {
        values.into_iter().try_for_each(|v| self.push(v))
    }
}
