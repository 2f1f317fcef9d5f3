//! Decoding of the `Code` attribute into an [`Insn`] list.

use std::collections::{BTreeMap, HashSet};

use crate::code::{Code, Insn, Label, TryCatchBlock};
use crate::constant_pool::ConstantPool;
use crate::error::{Error, Result};
use crate::opcodes::*;
use crate::reader::Reader;

/// Hands out one label per bytecode offset, remembering the first offset
/// that referred to it.
#[derive(Default)]
struct Labels {
    by_offset: BTreeMap<u32, (Label, u32)>,
}

impl Labels {
    fn at(&mut self, target: u32, from: u32) -> Label {
        let next = Label(self.by_offset.len() as u32);
        self.by_offset.entry(target).or_insert((next, from)).0
    }

    fn get(&self, offset: u32) -> Option<Label> {
        self.by_offset.get(&offset).map(|(label, _)| *label)
    }
}

struct RawTryCatch {
    start: u32,
    end: u32,
    handler: u32,
    catch_type: Option<String>,
}

/// Parses the body of a `Code` attribute (everything after the attribute
/// header).
pub(crate) fn parse_code_attribute(info: &[u8], cp: &ConstantPool) -> Result<Code> {
    let mut reader = Reader::new(info);
    let max_stack = reader.read_u2()?;
    let max_locals = reader.read_u2()?;
    let code_length = reader.read_u4()? as usize;
    if code_length == 0 {
        return Err(Error::MalformedAttribute("Code"));
    }
    let bytecode = reader.read_bytes(code_length)?;

    let table_len = reader.read_u2()? as usize;
    let mut raw_handlers = Vec::with_capacity(table_len);
    for _ in 0..table_len {
        let start = reader.read_u2()? as u32;
        let end = reader.read_u2()? as u32;
        let handler = reader.read_u2()? as u32;
        let catch_index = reader.read_u2()?;
        let catch_type = match catch_index {
            0 => None,
            idx => Some(cp.get_class_name(idx)?),
        };
        if start >= end {
            return Err(Error::MalformedAttribute("Code"));
        }
        raw_handlers.push(RawTryCatch {
            start,
            end,
            handler,
            catch_type,
        });
    }

    let mut line_numbers: Vec<(u32, u16)> = Vec::new();
    let attributes_count = reader.read_u2()? as usize;
    for _ in 0..attributes_count {
        let name = cp.get_utf8(reader.read_u2()?)?;
        let length = reader.read_u4()? as usize;
        let body = reader.read_bytes(length)?;
        if name == "LineNumberTable" {
            let mut sub = Reader::new(body);
            let count = sub.read_u2()? as usize;
            for _ in 0..count {
                let start_pc = sub.read_u2()? as u32;
                let line = sub.read_u2()?;
                line_numbers.push((start_pc, line));
            }
            sub.ensure_empty()
                .map_err(|_| Error::MalformedAttribute("LineNumberTable"))?;
        }
    }
    reader.ensure_empty()?;

    let mut labels = Labels::default();
    let decoded = decode_instructions(bytecode, cp, &mut labels)?;

    let try_catch_blocks = raw_handlers
        .into_iter()
        .map(|raw| TryCatchBlock {
            start: labels.at(raw.start, raw.start),
            end: labels.at(raw.end, raw.start),
            handler: labels.at(raw.handler, raw.start),
            catch_type: raw.catch_type,
        })
        .collect();

    let mut lines_by_offset: BTreeMap<u32, Vec<u16>> = BTreeMap::new();
    for (start_pc, line) in line_numbers {
        labels.at(start_pc, start_pc);
        lines_by_offset.entry(start_pc).or_default().push(line);
    }

    let boundaries: HashSet<u32> = decoded.iter().map(|(offset, _)| *offset).collect();
    for (&target, &(_, from)) in &labels.by_offset {
        if !boundaries.contains(&target) && target as usize != code_length {
            return Err(Error::InvalidBranchTarget {
                offset: from,
                target: target as i64,
            });
        }
    }

    let mut instructions = Vec::with_capacity(decoded.len() + labels.by_offset.len() * 2);
    let emit_markers = |offset: u32, out: &mut Vec<Insn>| {
        if let Some(label) = labels.get(offset) {
            out.push(Insn::Label(label));
            for &line in lines_by_offset.get(&offset).into_iter().flatten() {
                out.push(Insn::LineNumber { line, start: label });
            }
        }
    };
    for (offset, insn) in decoded {
        emit_markers(offset, &mut instructions);
        instructions.push(insn);
    }
    emit_markers(code_length as u32, &mut instructions);

    Ok(Code {
        max_stack,
        max_locals,
        instructions,
        try_catch_blocks,
    })
}

fn decode_instructions(
    bytecode: &[u8],
    cp: &ConstantPool,
    labels: &mut Labels,
) -> Result<Vec<(u32, Insn)>> {
    let mut reader = Reader::new(bytecode);
    let mut out = Vec::new();

    while reader.remaining() > 0 {
        let offset = reader.position() as u32;
        let opcode = reader.read_u1()?;
        let mut label_at = |delta: i64| -> Result<Label> {
            let target = offset as i64 + delta;
            if target < 0 || target >= bytecode.len() as i64 {
                return Err(Error::InvalidBranchTarget { offset, target });
            }
            Ok(labels.at(target as u32, offset))
        };

        let insn = match opcode {
            NOP..=DCONST_1
            | IALOAD..=SALOAD
            | IASTORE..=LXOR
            | I2L..=DCMPG
            | IRETURN..=RETURN
            | ARRAYLENGTH
            | ATHROW
            | MONITORENTER
            | MONITOREXIT => Insn::Op(opcode),
            BIPUSH => Insn::Int {
                opcode,
                operand: reader.read_i1()? as i32,
            },
            SIPUSH => Insn::Int {
                opcode,
                operand: reader.read_i2()? as i32,
            },
            NEWARRAY => Insn::Int {
                opcode,
                operand: reader.read_u1()? as i32,
            },
            LDC => Insn::Ldc(cp.get_loadable(reader.read_u1()? as u16)?),
            LDC_W | LDC2_W => Insn::Ldc(cp.get_loadable(reader.read_u2()?)?),
            ILOAD..=ALOAD | ISTORE..=ASTORE | RET => Insn::Var {
                opcode,
                var: reader.read_u1()? as u16,
            },
            ILOAD_0..=ALOAD_3 => {
                let n = opcode - ILOAD_0;
                Insn::Var {
                    opcode: ILOAD + n / 4,
                    var: (n % 4) as u16,
                }
            }
            ISTORE_0..=ASTORE_3 => {
                let n = opcode - ISTORE_0;
                Insn::Var {
                    opcode: ISTORE + n / 4,
                    var: (n % 4) as u16,
                }
            }
            IINC => Insn::Iinc {
                var: reader.read_u1()? as u16,
                incr: reader.read_i1()? as i16,
            },
            IFEQ..=JSR | IFNULL | IFNONNULL => {
                let delta = reader.read_i2()? as i64;
                Insn::Jump {
                    opcode,
                    target: label_at(delta)?,
                }
            }
            GOTO_W | JSR_W => {
                let delta = reader.read_i4()? as i64;
                Insn::Jump {
                    opcode: if opcode == GOTO_W { GOTO } else { JSR },
                    target: label_at(delta)?,
                }
            }
            TABLESWITCH | LOOKUPSWITCH => {
                let padding = (4 - (offset as usize + 1) % 4) % 4;
                reader.skip(padding)?;
                let default = label_at(reader.read_i4()? as i64)?;
                if opcode == TABLESWITCH {
                    let low = reader.read_i4()?;
                    let high = reader.read_i4()?;
                    if high < low {
                        return Err(Error::MalformedAttribute("Code"));
                    }
                    let count = (high as i64 - low as i64 + 1) as usize;
                    let mut targets = Vec::with_capacity(count.min(reader.remaining() / 4));
                    for _ in 0..count {
                        targets.push(label_at(reader.read_i4()? as i64)?);
                    }
                    Insn::TableSwitch {
                        low,
                        high,
                        default,
                        targets,
                    }
                } else {
                    let npairs = reader.read_i4()?;
                    if npairs < 0 {
                        return Err(Error::MalformedAttribute("Code"));
                    }
                    let mut keys = Vec::new();
                    let mut targets = Vec::new();
                    for _ in 0..npairs {
                        keys.push(reader.read_i4()?);
                        targets.push(label_at(reader.read_i4()? as i64)?);
                    }
                    Insn::LookupSwitch {
                        default,
                        keys,
                        targets,
                    }
                }
            }
            GETSTATIC..=PUTFIELD => {
                let field = cp.get_field_ref(reader.read_u2()?)?;
                Insn::Field {
                    opcode,
                    owner: field.owner,
                    name: field.name,
                    desc: field.descriptor,
                }
            }
            INVOKEVIRTUAL..=INVOKEINTERFACE => {
                let method = cp.get_method_ref(reader.read_u2()?)?;
                if opcode == INVOKEINTERFACE {
                    // count and a reserved zero byte
                    reader.skip(2)?;
                }
                Insn::Method {
                    opcode,
                    owner: method.owner,
                    name: method.name,
                    desc: method.descriptor,
                    interface: method.interface,
                }
            }
            INVOKEDYNAMIC => {
                let (name, desc) = cp.get_invoke_dynamic(reader.read_u2()?)?;
                reader.skip(2)?;
                Insn::InvokeDynamic { name, desc }
            }
            NEW | ANEWARRAY | CHECKCAST | INSTANCEOF => Insn::Type {
                opcode,
                desc: cp.get_class_name(reader.read_u2()?)?,
            },
            MULTIANEWARRAY => Insn::MultiANewArray {
                desc: cp.get_class_name(reader.read_u2()?)?,
                dims: reader.read_u1()?,
            },
            WIDE => {
                let inner = reader.read_u1()?;
                match inner {
                    IINC => Insn::Iinc {
                        var: reader.read_u2()?,
                        incr: reader.read_i2()?,
                    },
                    ILOAD..=ALOAD | ISTORE..=ASTORE | RET => Insn::Var {
                        opcode: inner,
                        var: reader.read_u2()?,
                    },
                    _ => {
                        return Err(Error::InvalidOpcode {
                            offset,
                            opcode: inner,
                        })
                    }
                }
            }
            _ => return Err(Error::InvalidOpcode { offset, opcode }),
        };
        out.push((offset, insn));
    }

    Ok(out)
}
