//! Minimal class-file reader producing method bodies as ASM-style instruction
//! lists for bytecode analyses.

#![forbid(unsafe_code)]

mod classfile;
mod code;
mod constant_pool;
mod decode;
mod descriptor;
mod error;
pub mod opcodes;
mod reader;

pub use crate::classfile::{access, ClassFile, ClassMember};
pub use crate::code::{Code, Constant, Insn, Label, LabelIndex, TryCatchBlock};
pub use crate::descriptor::{parse_field_descriptor, parse_method_descriptor};
pub use crate::descriptor::{BaseType, FieldType, MethodDescriptor, ReturnType};
pub use crate::error::{Error, Result};
