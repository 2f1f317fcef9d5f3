use crate::code::Constant;
use crate::error::{Error, Result};
use crate::reader::Reader;

#[derive(Debug, Clone)]
enum Entry {
    /// Index 0 and the second slot of `Long`/`Double` entries.
    Unusable,
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class(u16),
    String(u16),
    FieldRef { class: u16, name_and_type: u16 },
    MethodRef { class: u16, name_and_type: u16 },
    InterfaceMethodRef { class: u16, name_and_type: u16 },
    NameAndType { name: u16, descriptor: u16 },
    MethodHandle { kind: u8, reference: u16 },
    MethodType(u16),
    Dynamic { bootstrap: u16, name_and_type: u16 },
    InvokeDynamic { bootstrap: u16, name_and_type: u16 },
    Module(u16),
    Package(u16),
}

impl Entry {
    fn kind(&self) -> &'static str {
        match self {
            Entry::Unusable => "unusable",
            Entry::Utf8(_) => "Utf8",
            Entry::Integer(_) => "Integer",
            Entry::Float(_) => "Float",
            Entry::Long(_) => "Long",
            Entry::Double(_) => "Double",
            Entry::Class(_) => "Class",
            Entry::String(_) => "String",
            Entry::FieldRef { .. } => "Fieldref",
            Entry::MethodRef { .. } => "Methodref",
            Entry::InterfaceMethodRef { .. } => "InterfaceMethodref",
            Entry::NameAndType { .. } => "NameAndType",
            Entry::MethodHandle { .. } => "MethodHandle",
            Entry::MethodType(_) => "MethodType",
            Entry::Dynamic { .. } => "Dynamic",
            Entry::InvokeDynamic { .. } => "InvokeDynamic",
            Entry::Module(_) => "Module",
            Entry::Package(_) => "Package",
        }
    }
}

/// Symbolic reference to a field or method (`owner.name:descriptor`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MemberRef {
    pub(crate) owner: String,
    pub(crate) name: String,
    pub(crate) descriptor: String,
    pub(crate) interface: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct ConstantPool {
    entries: Vec<Entry>,
}

impl ConstantPool {
    pub(crate) fn parse(reader: &mut Reader<'_>) -> Result<Self> {
        let count = reader.read_u2()? as usize;
        let mut entries = Vec::with_capacity(count.max(1));
        entries.push(Entry::Unusable);

        while entries.len() < count {
            let tag = reader.read_u1()?;
            let entry = match tag {
                1 => {
                    let len = reader.read_u2()? as usize;
                    Entry::Utf8(decode_modified_utf8(reader.read_bytes(len)?)?)
                }
                3 => Entry::Integer(reader.read_i4()?),
                4 => Entry::Float(f32::from_bits(reader.read_u4()?)),
                5 => Entry::Long(reader.read_u8()? as i64),
                6 => Entry::Double(f64::from_bits(reader.read_u8()?)),
                7 => Entry::Class(reader.read_u2()?),
                8 => Entry::String(reader.read_u2()?),
                9 => Entry::FieldRef {
                    class: reader.read_u2()?,
                    name_and_type: reader.read_u2()?,
                },
                10 => Entry::MethodRef {
                    class: reader.read_u2()?,
                    name_and_type: reader.read_u2()?,
                },
                11 => Entry::InterfaceMethodRef {
                    class: reader.read_u2()?,
                    name_and_type: reader.read_u2()?,
                },
                12 => Entry::NameAndType {
                    name: reader.read_u2()?,
                    descriptor: reader.read_u2()?,
                },
                15 => Entry::MethodHandle {
                    kind: reader.read_u1()?,
                    reference: reader.read_u2()?,
                },
                16 => Entry::MethodType(reader.read_u2()?),
                17 => Entry::Dynamic {
                    bootstrap: reader.read_u2()?,
                    name_and_type: reader.read_u2()?,
                },
                18 => Entry::InvokeDynamic {
                    bootstrap: reader.read_u2()?,
                    name_and_type: reader.read_u2()?,
                },
                19 => Entry::Module(reader.read_u2()?),
                20 => Entry::Package(reader.read_u2()?),
                other => return Err(Error::InvalidConstantPoolTag(other)),
            };

            let wide = matches!(entry, Entry::Long(_) | Entry::Double(_));
            entries.push(entry);
            if wide {
                entries.push(Entry::Unusable);
            }
        }

        if entries.len() != count.max(1) {
            // A trailing Long/Double claimed a slot past the declared count.
            return Err(Error::InvalidConstantPoolIndex(count as u16));
        }

        Ok(Self { entries })
    }

    fn entry(&self, index: u16) -> Result<&Entry> {
        match self.entries.get(index as usize) {
            None | Some(Entry::Unusable) => Err(Error::InvalidConstantPoolIndex(index)),
            Some(entry) => Ok(entry),
        }
    }

    fn mismatch(&self, index: u16, expected: &'static str) -> Error {
        let found = self
            .entries
            .get(index as usize)
            .map(Entry::kind)
            .unwrap_or("missing");
        Error::ConstantPoolTypeMismatch {
            index,
            expected,
            found,
        }
    }

    pub(crate) fn get_utf8(&self, index: u16) -> Result<&str> {
        match self.entry(index)? {
            Entry::Utf8(s) => Ok(s),
            _ => Err(self.mismatch(index, "Utf8")),
        }
    }

    pub(crate) fn get_class_name(&self, index: u16) -> Result<String> {
        match self.entry(index)? {
            Entry::Class(name) => Ok(self.get_utf8(*name)?.to_string()),
            _ => Err(self.mismatch(index, "Class")),
        }
    }

    fn get_name_and_type(&self, index: u16) -> Result<(&str, &str)> {
        match self.entry(index)? {
            Entry::NameAndType { name, descriptor } => {
                Ok((self.get_utf8(*name)?, self.get_utf8(*descriptor)?))
            }
            _ => Err(self.mismatch(index, "NameAndType")),
        }
    }

    pub(crate) fn get_field_ref(&self, index: u16) -> Result<MemberRef> {
        match self.entry(index)? {
            Entry::FieldRef {
                class,
                name_and_type,
            } => self.member_ref(*class, *name_and_type, false),
            _ => Err(self.mismatch(index, "Fieldref")),
        }
    }

    pub(crate) fn get_method_ref(&self, index: u16) -> Result<MemberRef> {
        match self.entry(index)? {
            Entry::MethodRef {
                class,
                name_and_type,
            } => self.member_ref(*class, *name_and_type, false),
            Entry::InterfaceMethodRef {
                class,
                name_and_type,
            } => self.member_ref(*class, *name_and_type, true),
            _ => Err(self.mismatch(index, "Methodref")),
        }
    }

    fn member_ref(&self, class: u16, name_and_type: u16, interface: bool) -> Result<MemberRef> {
        let owner = self.get_class_name(class)?;
        let (name, descriptor) = self.get_name_and_type(name_and_type)?;
        Ok(MemberRef {
            owner,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            interface,
        })
    }

    /// Name and descriptor of an `InvokeDynamic` call site.
    pub(crate) fn get_invoke_dynamic(&self, index: u16) -> Result<(String, String)> {
        match self.entry(index)? {
            Entry::InvokeDynamic { name_and_type, .. } => {
                let (name, desc) = self.get_name_and_type(*name_and_type)?;
                Ok((name.to_string(), desc.to_string()))
            }
            _ => Err(self.mismatch(index, "InvokeDynamic")),
        }
    }

    /// Resolves an operand of `LDC`/`LDC_W`/`LDC2_W`.
    pub(crate) fn get_loadable(&self, index: u16) -> Result<Constant> {
        Ok(match self.entry(index)? {
            Entry::Integer(v) => Constant::Int(*v),
            Entry::Float(v) => Constant::Float(*v),
            Entry::Long(v) => Constant::Long(*v),
            Entry::Double(v) => Constant::Double(*v),
            Entry::String(s) => Constant::String(self.get_utf8(*s)?.to_string()),
            Entry::Class(name) => Constant::Class(self.get_utf8(*name)?.to_string()),
            Entry::MethodType(desc) => Constant::MethodType(self.get_utf8(*desc)?.to_string()),
            Entry::MethodHandle { kind, .. } => Constant::MethodHandle { kind: *kind },
            Entry::Dynamic { name_and_type, .. } => {
                let (_, desc) = self.get_name_and_type(*name_and_type)?;
                Constant::Dynamic {
                    descriptor: desc.to_string(),
                }
            }
            _ => return Err(self.mismatch(index, "loadable constant")),
        })
    }
}

/// Decodes the JVM's "modified UTF-8" (`\0` as two bytes, supplementary
/// characters as surrogate pairs).
fn decode_modified_utf8(bytes: &[u8]) -> Result<String> {
    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b0 = bytes[i] as u16;
        let continuation = |idx: usize| -> Result<u16> {
            match bytes.get(idx) {
                Some(&b) if b & 0xC0 == 0x80 => Ok((b & 0x3F) as u16),
                _ => Err(Error::InvalidModifiedUtf8),
            }
        };
        if b0 == 0 || b0 >= 0xF0 {
            return Err(Error::InvalidModifiedUtf8);
        } else if b0 < 0x80 {
            units.push(b0);
            i += 1;
        } else if b0 & 0xE0 == 0xC0 {
            units.push(((b0 & 0x1F) << 6) | continuation(i + 1)?);
            i += 2;
        } else if b0 & 0xF0 == 0xE0 {
            units.push(((b0 & 0x0F) << 12) | (continuation(i + 1)? << 6) | continuation(i + 2)?);
            i += 3;
        } else {
            return Err(Error::InvalidModifiedUtf8);
        }
    }
    String::from_utf16(&units).map_err(|_| Error::InvalidModifiedUtf8)
}
