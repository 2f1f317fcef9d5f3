use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::opcodes::*;

/// Position marker inside an instruction list.
///
/// Labels are placed with [`Insn::Label`]; jumps, switches, try/catch blocks
/// and line numbers refer to them instead of raw bytecode offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub u32);

/// Operand of `LDC`, `LDC_W` and `LDC2_W`.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Int(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    String(String),
    Class(String),
    MethodType(String),
    MethodHandle { kind: u8 },
    Dynamic { descriptor: String },
}

impl Constant {
    #[must_use]
    pub fn width(&self) -> u8 {
        match self {
            Constant::Long(_) | Constant::Double(_) => 2,
            Constant::Dynamic { descriptor } if matches!(descriptor.as_str(), "J" | "D") => 2,
            _ => 1,
        }
    }
}

/// One element of a method's linear instruction list.
///
/// The first three variants are pseudo-instructions: they occupy an index in
/// the list (and therefore a node in the control-flow graph) but have no
/// operand semantics.
#[derive(Debug, Clone, PartialEq)]
pub enum Insn {
    Label(Label),
    LineNumber {
        line: u16,
        start: Label,
    },
    Frame,
    /// Any instruction without operands (`IADD`, `ARETURN`, `DUP2_X1`, ...).
    Op(u8),
    /// `BIPUSH`, `SIPUSH`, `NEWARRAY`.
    Int {
        opcode: u8,
        operand: i32,
    },
    /// Loads, stores and `RET`.
    Var {
        opcode: u8,
        var: u16,
    },
    /// `NEW`, `ANEWARRAY`, `CHECKCAST`, `INSTANCEOF`.
    Type {
        opcode: u8,
        desc: String,
    },
    Field {
        opcode: u8,
        owner: String,
        name: String,
        desc: String,
    },
    Method {
        opcode: u8,
        owner: String,
        name: String,
        desc: String,
        interface: bool,
    },
    InvokeDynamic {
        name: String,
        desc: String,
    },
    Jump {
        opcode: u8,
        target: Label,
    },
    Ldc(Constant),
    Iinc {
        var: u16,
        incr: i16,
    },
    TableSwitch {
        low: i32,
        high: i32,
        default: Label,
        targets: Vec<Label>,
    },
    LookupSwitch {
        default: Label,
        keys: Vec<i32>,
        targets: Vec<Label>,
    },
    MultiANewArray {
        desc: String,
        dims: u8,
    },
}

impl Insn {
    /// The JVM opcode, or `None` for pseudo-instructions.
    #[must_use]
    pub fn opcode(&self) -> Option<u8> {
        Some(match self {
            Insn::Label(_) | Insn::LineNumber { .. } | Insn::Frame => return None,
            Insn::Op(op) => *op,
            Insn::Int { opcode, .. }
            | Insn::Var { opcode, .. }
            | Insn::Type { opcode, .. }
            | Insn::Field { opcode, .. }
            | Insn::Method { opcode, .. }
            | Insn::Jump { opcode, .. } => *opcode,
            Insn::InvokeDynamic { .. } => INVOKEDYNAMIC,
            Insn::Ldc(_) => LDC,
            Insn::Iinc { .. } => IINC,
            Insn::TableSwitch { .. } => TABLESWITCH,
            Insn::LookupSwitch { .. } => LOOKUPSWITCH,
            Insn::MultiANewArray { .. } => MULTIANEWARRAY,
        })
    }

    #[must_use]
    pub fn is_pseudo(&self) -> bool {
        self.opcode().is_none()
    }

    /// Labels this instruction may transfer control to (excluding fall-through).
    #[must_use]
    pub fn branch_targets(&self) -> Vec<Label> {
        match self {
            Insn::Jump { target, .. } => vec![*target],
            Insn::TableSwitch {
                default, targets, ..
            }
            | Insn::LookupSwitch {
                default, targets, ..
            } => std::iter::once(*default)
                .chain(targets.iter().copied())
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// An entry of the exception table, expressed with labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TryCatchBlock {
    pub start: Label,
    pub end: Label,
    pub handler: Label,
    /// Internal name of the caught class; `None` catches everything
    /// (`finally`).
    pub catch_type: Option<String>,
}

/// Body of a concrete method.
#[derive(Debug, Clone, PartialEq)]
pub struct Code {
    pub max_stack: u16,
    pub max_locals: u16,
    pub instructions: Vec<Insn>,
    pub try_catch_blocks: Vec<TryCatchBlock>,
}

impl Code {
    /// Maps every placed label to its index in [`Code::instructions`].
    pub fn label_index(&self) -> LabelIndex {
        let positions = self
            .instructions
            .iter()
            .enumerate()
            .filter_map(|(idx, insn)| match insn {
                Insn::Label(label) => Some((*label, idx)),
                _ => None,
            })
            .collect();
        LabelIndex { positions }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LabelIndex {
    positions: HashMap<Label, usize>,
}

impl LabelIndex {
    pub fn resolve(&self, label: Label) -> Result<usize> {
        self.positions
            .get(&label)
            .copied()
            .ok_or(Error::UnknownLabel(label))
    }
}
