use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Base(BaseType),
    Object(String),
    Array(Box<FieldType>),
}

impl FieldType {
    /// Number of local-variable / operand-stack words a value of this type
    /// occupies (2 for `long` and `double`).
    #[must_use]
    pub fn width(&self) -> u8 {
        match self {
            FieldType::Base(BaseType::Long | BaseType::Double) => 2,
            _ => 1,
        }
    }

    #[must_use]
    pub fn is_reference(&self) -> bool {
        matches!(self, FieldType::Object(_) | FieldType::Array(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReturnType {
    Void,
    Type(FieldType),
}

impl ReturnType {
    /// Width of the pushed result, `None` for `void`.
    #[must_use]
    pub fn width(&self) -> Option<u8> {
        match self {
            ReturnType::Void => None,
            ReturnType::Type(ty) => Some(ty.width()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub params: Vec<FieldType>,
    pub return_type: ReturnType,
}

impl MethodDescriptor {
    /// Number of declared formal parameters (excluding `this`).
    #[must_use]
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Number of local slots taken by the declared parameters.
    #[must_use]
    pub fn param_slots(&self) -> usize {
        self.params.iter().map(|p| p.width() as usize).sum()
    }
}

pub fn parse_field_descriptor(desc: &str) -> Result<FieldType> {
    let (ty, rest) = parse_field_type(desc).ok_or_else(|| invalid(desc))?;
    if !rest.is_empty() {
        return Err(invalid(desc));
    }
    Ok(ty)
}

pub fn parse_method_descriptor(desc: &str) -> Result<MethodDescriptor> {
    let mut rest = desc.strip_prefix('(').ok_or_else(|| invalid(desc))?;

    let mut params = Vec::new();
    loop {
        if let Some(after) = rest.strip_prefix(')') {
            rest = after;
            break;
        }
        let (param, after) = parse_field_type(rest).ok_or_else(|| invalid(desc))?;
        params.push(param);
        rest = after;
    }

    let return_type = if rest == "V" {
        ReturnType::Void
    } else {
        match parse_field_type(rest) {
            Some((ty, "")) => ReturnType::Type(ty),
            _ => return Err(invalid(desc)),
        }
    };

    Ok(MethodDescriptor {
        params,
        return_type,
    })
}

fn invalid(desc: &str) -> Error {
    Error::InvalidDescriptor(desc.to_string())
}

fn parse_field_type(input: &str) -> Option<(FieldType, &str)> {
    let first = *input.as_bytes().first()?;
    let rest = &input[1..];
    let base = |b| Some((FieldType::Base(b), rest));
    match first {
        b'B' => base(BaseType::Byte),
        b'C' => base(BaseType::Char),
        b'D' => base(BaseType::Double),
        b'F' => base(BaseType::Float),
        b'I' => base(BaseType::Int),
        b'J' => base(BaseType::Long),
        b'S' => base(BaseType::Short),
        b'Z' => base(BaseType::Boolean),
        b'L' => {
            let end = rest.find(';')?;
            if end == 0 {
                return None;
            }
            Some((FieldType::Object(rest[..end].to_string()), &rest[end + 1..]))
        }
        b'[' => {
            let (component, rest) = parse_field_type(rest)?;
            Some((FieldType::Array(Box::new(component)), rest))
        }
        _ => None,
    }
}
