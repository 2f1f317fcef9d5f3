use crate::code::Code;
use crate::constant_pool::ConstantPool;
use crate::decode::parse_code_attribute;
use crate::descriptor::{parse_method_descriptor, MethodDescriptor};
use crate::error::{Error, Result};
use crate::reader::Reader;

/// Access flag bits shared by classes, fields and methods (JVMS §4.1, §4.6).
pub mod access {
    pub const ACC_PUBLIC: u16 = 0x0001;
    pub const ACC_PRIVATE: u16 = 0x0002;
    pub const ACC_PROTECTED: u16 = 0x0004;
    pub const ACC_STATIC: u16 = 0x0008;
    pub const ACC_FINAL: u16 = 0x0010;
    pub const ACC_SYNCHRONIZED: u16 = 0x0020;
    pub const ACC_BRIDGE: u16 = 0x0040;
    pub const ACC_VARARGS: u16 = 0x0080;
    pub const ACC_NATIVE: u16 = 0x0100;
    pub const ACC_INTERFACE: u16 = 0x0200;
    pub const ACC_ABSTRACT: u16 = 0x0400;
    pub const ACC_SYNTHETIC: u16 = 0x1000;
}

#[derive(Debug, Clone)]
pub struct ClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    pub access_flags: u16,
    pub this_class: String,
    pub super_class: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<ClassMember>,
    pub methods: Vec<ClassMember>,
}

#[derive(Debug, Clone)]
pub struct ClassMember {
    pub access_flags: u16,
    pub name: String,
    pub descriptor: String,
    /// Decoded `Code` attribute. Always `None` for fields, abstract and
    /// native methods.
    pub code: Option<Code>,
}

impl ClassMember {
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.access_flags & access::ACC_STATIC != 0
    }

    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.access_flags & access::ACC_ABSTRACT != 0
    }

    #[must_use]
    pub fn is_native(&self) -> bool {
        self.access_flags & access::ACC_NATIVE != 0
    }

    pub fn method_descriptor(&self) -> Result<MethodDescriptor> {
        parse_method_descriptor(&self.descriptor)
    }
}

impl ClassFile {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes);
        let magic = reader.read_u4()?;
        if magic != 0xCAFEBABE {
            return Err(Error::InvalidMagic(magic));
        }

        let minor_version = reader.read_u2()?;
        let major_version = reader.read_u2()?;
        let cp = ConstantPool::parse(&mut reader)?;

        let access_flags = reader.read_u2()?;
        let this_class = cp.get_class_name(reader.read_u2()?)?;
        let super_class_idx = reader.read_u2()?;
        let super_class = if super_class_idx == 0 {
            None
        } else {
            Some(cp.get_class_name(super_class_idx)?)
        };

        let interfaces_count = reader.read_u2()? as usize;
        let mut interfaces = Vec::with_capacity(interfaces_count);
        for _ in 0..interfaces_count {
            interfaces.push(cp.get_class_name(reader.read_u2()?)?);
        }

        let fields_count = reader.read_u2()? as usize;
        let mut fields = Vec::with_capacity(fields_count);
        for _ in 0..fields_count {
            fields.push(parse_member(&mut reader, &cp, MemberKind::Field)?);
        }

        let methods_count = reader.read_u2()? as usize;
        let mut methods = Vec::with_capacity(methods_count);
        for _ in 0..methods_count {
            methods.push(parse_member(&mut reader, &cp, MemberKind::Method)?);
        }

        skip_attributes(&mut reader)?;
        reader.ensure_empty()?;

        Ok(Self {
            minor_version,
            major_version,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
        })
    }

    /// Finds a method by name, and by descriptor when one is given.
    pub fn method(&self, name: &str, descriptor: Option<&str>) -> Option<&ClassMember> {
        self.methods
            .iter()
            .find(|m| m.name == name && descriptor.map_or(true, |d| m.descriptor == d))
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum MemberKind {
    Field,
    Method,
}

fn parse_member(reader: &mut Reader<'_>, cp: &ConstantPool, kind: MemberKind) -> Result<ClassMember> {
    let access_flags = reader.read_u2()?;
    let name = cp.get_utf8(reader.read_u2()?)?.to_string();
    let descriptor = cp.get_utf8(reader.read_u2()?)?.to_string();

    let mut code = None;
    let attributes_count = reader.read_u2()? as usize;
    for _ in 0..attributes_count {
        let name_index = reader.read_u2()?;
        let length = reader.read_u4()? as usize;
        let info = reader.read_bytes(length)?;
        if kind == MemberKind::Method && cp.get_utf8(name_index)? == "Code" {
            if code.is_some() {
                return Err(Error::MalformedAttribute("Code"));
            }
            code = Some(parse_code_attribute(info, cp)?);
        }
        // Other attributes (annotations, signatures, ...) are not needed here.
    }

    Ok(ClassMember {
        access_flags,
        name,
        descriptor,
        code,
    })
}

fn skip_attributes(reader: &mut Reader<'_>) -> Result<()> {
    let attributes_count = reader.read_u2()? as usize;
    for _ in 0..attributes_count {
        reader.skip(2)?;
        let length = reader.read_u4()? as usize;
        reader.skip(length)?;
    }
    Ok(())
}
