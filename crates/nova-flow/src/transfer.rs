//! Category-based transfer functions.
//!
//! Instructions are classified once by [`category`] into the number of
//! operand-stack values they consume. [`ParametersUsage`] then computes the
//! produced value from the consumed ones and, during leak collection, which
//! consumed values count as dereferenced or escaped.

use nova_classfile::opcodes::*;
use nova_classfile::{parse_method_descriptor, FieldType, Insn, MethodDescriptor};

use crate::frame::{Frame, FrameError};
use crate::lattice::{ParamSet, ParamsValue};
use crate::leaks::LeakAccumulator;

/// How an instruction interacts with the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsnCategory {
    /// Labels, line numbers and frame markers.
    Pseudo,
    /// No operand-stack effect (`NOP`, `GOTO`, `RET`, `RETURN`).
    Control,
    /// Pushes one value without popping.
    Nullary,
    Load(u16),
    Store(u16),
    /// `POP`, `POP2`, the `DUP` family and `SWAP`.
    Stack,
    Unary,
    Binary,
    Ternary,
    /// Pops the given number of values (invocations, `MULTIANEWARRAY`).
    Nary(usize),
    Iinc(u16),
    Jsr,
}

impl InsnCategory {
    /// Number of operand-stack values consumed by the transfer function.
    #[must_use]
    pub fn popped(self) -> usize {
        match self {
            InsnCategory::Unary | InsnCategory::Store(_) => 1,
            InsnCategory::Binary => 2,
            InsnCategory::Ternary => 3,
            InsnCategory::Nary(n) => n,
            _ => 0,
        }
    }
}

/// Classifies `insn`.
///
/// Fails only when an invocation carries an unparsable method descriptor.
pub fn category(insn: &Insn) -> nova_classfile::Result<InsnCategory> {
    let Some(opcode) = insn.opcode() else {
        return Ok(InsnCategory::Pseudo);
    };
    Ok(match insn {
        Insn::Var { opcode: RET, .. } => InsnCategory::Control,
        Insn::Var { opcode, var } if *opcode <= ALOAD => InsnCategory::Load(*var),
        Insn::Var { var, .. } => InsnCategory::Store(*var),
        Insn::Iinc { var, .. } => InsnCategory::Iinc(*var),
        Insn::Method { opcode, desc, .. } => {
            let receiver = usize::from(*opcode != INVOKESTATIC);
            InsnCategory::Nary(parse_method_descriptor(desc)?.arity() + receiver)
        }
        Insn::InvokeDynamic { desc, .. } => {
            InsnCategory::Nary(parse_method_descriptor(desc)?.arity())
        }
        Insn::MultiANewArray { dims, .. } => InsnCategory::Nary(usize::from(*dims)),
        _ => category_of_opcode(opcode),
    })
}

/// [`category`] of every instruction of a method body.
pub fn categorize(instructions: &[Insn]) -> nova_classfile::Result<Vec<InsnCategory>> {
    instructions.iter().map(category).collect()
}

fn category_of_opcode(opcode: u8) -> InsnCategory {
    match opcode {
        ACONST_NULL..=LDC2_W | GETSTATIC | NEW => InsnCategory::Nullary,
        IALOAD..=SALOAD => InsnCategory::Binary,
        IASTORE..=SASTORE => InsnCategory::Ternary,
        POP..=SWAP => InsnCategory::Stack,
        IADD..=DREM | ISHL..=LXOR | LCMP..=DCMPG => InsnCategory::Binary,
        INEG..=DNEG | I2L..=I2S => InsnCategory::Unary,
        IFEQ..=IFLE | IFNULL | IFNONNULL => InsnCategory::Unary,
        IF_ICMPEQ..=IF_ACMPNE => InsnCategory::Binary,
        TABLESWITCH | LOOKUPSWITCH => InsnCategory::Unary,
        IRETURN..=ARETURN => InsnCategory::Unary,
        PUTSTATIC | GETFIELD => InsnCategory::Unary,
        PUTFIELD => InsnCategory::Binary,
        NEWARRAY | ANEWARRAY | ARRAYLENGTH | ATHROW => InsnCategory::Unary,
        CHECKCAST | INSTANCEOF | MONITORENTER | MONITOREXIT => InsnCategory::Unary,
        JSR => InsnCategory::Jsr,
        _ => InsnCategory::Control,
    }
}

/// Values consumed by one instruction, bottom of the stack first.
#[derive(Debug)]
pub enum Operands<'a, S> {
    None,
    Nullary,
    /// The local read by a load or the value written by a store.
    Copy(&'a ParamsValue<S>),
    Unary(&'a ParamsValue<S>),
    Binary(&'a ParamsValue<S>, &'a ParamsValue<S>),
    Ternary(&'a ParamsValue<S>, &'a ParamsValue<S>, &'a ParamsValue<S>),
    Nary(&'a [ParamsValue<S>]),
}

/// Transfer functions tracking which formal parameters flow where.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParametersUsage {
    /// Number of declared formal parameters.
    pub arity: usize,
    /// Local slots before the first declared parameter: 1 for `this`, 0 for
    /// static methods.
    pub shift: usize,
}

impl ParametersUsage {
    #[must_use]
    pub fn new(descriptor: &MethodDescriptor, is_static: bool) -> Self {
        Self {
            arity: descriptor.arity(),
            shift: usize::from(!is_static),
        }
    }

    /// Frame at method entry.
    ///
    /// Reference parameters track their own index; `this`, primitives and
    /// the remaining locals are untracked.
    pub fn entry_frame<S: ParamSet>(
        &self,
        descriptor: &MethodDescriptor,
        max_locals: u16,
        max_stack: u16,
    ) -> Result<Frame<S>, FrameError> {
        let max_locals = usize::from(max_locals);
        let needed = self.shift + descriptor.param_slots();
        if needed > max_locals {
            return Err(FrameError::LocalOutOfRange {
                index: needed - 1,
                max_locals,
            });
        }

        let mut locals = Vec::with_capacity(max_locals);
        if self.shift == 1 {
            locals.push(ParamsValue::untracked(self.arity, 1));
        }
        for (index, param) in descriptor.params.iter().enumerate() {
            match param {
                FieldType::Object(_) | FieldType::Array(_) => {
                    locals.push(ParamsValue::parameter(self.arity, index));
                }
                FieldType::Base(_) => {
                    let width = param.width();
                    locals.push(ParamsValue::untracked(self.arity, width));
                    if width == 2 {
                        locals.push(ParamsValue::untracked(self.arity, 1));
                    }
                }
            }
        }
        locals.resize(max_locals, ParamsValue::untracked(self.arity, 1));
        Ok(Frame::new(locals, max_stack))
    }

    /// Value produced by `insn`, or `None` when it pushes nothing.
    #[must_use]
    pub fn transfer<S: ParamSet>(
        &self,
        insn: &Insn,
        operands: &Operands<'_, S>,
    ) -> Option<ParamsValue<S>> {
        let opcode = insn.opcode()?;
        match operands {
            Operands::None => None,
            Operands::Copy(value) => Some((*value).clone()),
            Operands::Nullary => Some(self.fresh(nullary_width(insn))),
            Operands::Unary(value) => match opcode {
                CHECKCAST => Some(ParamsValue::with_params(value.params.clone(), 1)),
                GETFIELD => Some(self.fresh(field_width(insn))),
                LNEG | DNEG | I2L | I2D | F2L | F2D | L2D | D2L => Some(self.fresh(2)),
                IFEQ..=IFLE
                | IFNULL
                | IFNONNULL
                | TABLESWITCH
                | LOOKUPSWITCH
                | IRETURN..=ARETURN
                | ATHROW
                | PUTSTATIC
                | MONITORENTER
                | MONITOREXIT => None,
                _ => Some(self.fresh(1)),
            },
            Operands::Binary(..) => match opcode {
                LALOAD | DALOAD | LADD | DADD | LSUB | DSUB | LMUL | DMUL | LDIV | DDIV
                | LREM | DREM | LSHL | LSHR | LUSHR | LAND | LOR | LXOR => Some(self.fresh(2)),
                IF_ICMPEQ..=IF_ACMPNE | PUTFIELD => None,
                _ => Some(self.fresh(1)),
            },
            Operands::Ternary(..) => None,
            Operands::Nary(_) => match insn {
                Insn::Method { desc, .. } | Insn::InvokeDynamic { desc, .. } => {
                    return_width(desc).map(|width| self.fresh(width))
                }
                _ => Some(self.fresh(1)),
            },
        }
    }

    /// Folds the parameters `insn` dereferences or lets escape into `acc`.
    pub fn record_leaks<S: ParamSet>(
        &self,
        insn: &Insn,
        operands: &Operands<'_, S>,
        acc: &mut LeakAccumulator<S>,
    ) {
        let Some(opcode) = insn.opcode() else {
            return;
        };
        match operands {
            Operands::Unary(value) => match opcode {
                GETFIELD | ARRAYLENGTH | MONITORENTER | INSTANCEOF | IRETURN | ARETURN
                | IFNULL | IFNONNULL => acc.not_null(value),
                CHECKCAST | PUTSTATIC => acc.nullable(value),
                _ => {}
            },
            Operands::Binary(object, value) => match opcode {
                IALOAD..=SALOAD => acc.not_null(object),
                PUTFIELD => {
                    acc.not_null(object);
                    acc.nullable(value);
                }
                _ => {}
            },
            Operands::Ternary(array, _, value) => {
                if (IASTORE..=SASTORE).contains(&opcode) {
                    acc.not_null(array);
                    acc.nullable(value);
                }
            }
            Operands::Nary(values) => match opcode {
                INVOKEVIRTUAL..=INVOKEINTERFACE => values.iter().for_each(|v| acc.not_null(v)),
                // Captured arguments escape into the call site without a
                // receiver, so they are recorded as nullable only.
                INVOKEDYNAMIC => values.iter().for_each(|v| acc.nullable(v)),
                _ => {}
            },
            Operands::None | Operands::Nullary | Operands::Copy(_) => {}
        }
    }

    fn fresh<S: ParamSet>(&self, width: u8) -> ParamsValue<S> {
        ParamsValue::untracked(self.arity, width)
    }
}

fn nullary_width(insn: &Insn) -> u8 {
    match insn {
        Insn::Op(LCONST_0 | LCONST_1 | DCONST_0 | DCONST_1) => 2,
        Insn::Ldc(constant) => constant.width(),
        Insn::Field { .. } => field_width(insn),
        _ => 1,
    }
}

fn field_width(insn: &Insn) -> u8 {
    match insn {
        Insn::Field { desc, .. } if desc == "J" || desc == "D" => 2,
        _ => 1,
    }
}

fn return_width(desc: &str) -> Option<u8> {
    match desc.rsplit_once(')').map(|(_, ret)| ret) {
        Some("V") => None,
        Some("J" | "D") => Some(2),
        _ => Some(1),
    }
}
