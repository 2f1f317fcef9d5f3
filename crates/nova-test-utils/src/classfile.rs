//! In-memory class-file assembler.
//!
//! Only what tests need: a constant pool with de-duplicated entries, methods
//! with an optional `Code` attribute (exception table and `LineNumberTable`),
//! no fields and no class attributes.

use std::collections::HashMap;

const ACC_PUBLIC: u16 = 0x0001;
const ACC_SUPER: u16 = 0x0020;

/// Raw `Code` attribute contents for [`ClassFileBuilder::method`].
#[derive(Debug, Clone, Default)]
pub struct MethodCode {
    pub max_stack: u16,
    pub max_locals: u16,
    pub bytecode: Vec<u8>,
    pub exception_table: Vec<ExceptionEntry>,
    /// `(start_pc, line)` pairs.
    pub line_numbers: Vec<(u16, u16)>,
}

impl MethodCode {
    pub fn new(max_stack: u16, max_locals: u16, bytecode: Vec<u8>) -> Self {
        Self {
            max_stack,
            max_locals,
            bytecode,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ExceptionEntry {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    /// Constant-pool index of the caught class, `0` for catch-all.
    pub catch_type: u16,
}

struct MethodEntry {
    access_flags: u16,
    name: u16,
    descriptor: u16,
    code: Option<MethodCode>,
}

pub struct ClassFileBuilder {
    pool: Vec<u8>,
    pool_slots: u16,
    interned: HashMap<Vec<u8>, u16>,
    this_class: u16,
    super_class: u16,
    methods: Vec<MethodEntry>,
}

impl ClassFileBuilder {
    /// Starts a public class extending `java/lang/Object`.
    pub fn new(internal_name: &str) -> Self {
        let mut builder = Self {
            pool: Vec::new(),
            pool_slots: 1,
            interned: HashMap::new(),
            this_class: 0,
            super_class: 0,
            methods: Vec::new(),
        };
        builder.this_class = builder.class(internal_name);
        builder.super_class = builder.class("java/lang/Object");
        builder
    }

    fn intern(&mut self, entry: Vec<u8>, slots: u16) -> u16 {
        if let Some(&index) = self.interned.get(&entry) {
            return index;
        }
        let index = self.pool_slots;
        self.pool.extend_from_slice(&entry);
        self.pool_slots += slots;
        self.interned.insert(entry, index);
        index
    }

    pub fn utf8(&mut self, value: &str) -> u16 {
        // Test inputs are ASCII, where modified UTF-8 and UTF-8 agree.
        let mut entry = vec![1];
        entry.extend_from_slice(&(value.len() as u16).to_be_bytes());
        entry.extend_from_slice(value.as_bytes());
        self.intern(entry, 1)
    }

    pub fn class(&mut self, internal_name: &str) -> u16 {
        let name = self.utf8(internal_name);
        self.intern(tagged(7, &[name]), 1)
    }

    pub fn string(&mut self, value: &str) -> u16 {
        let utf8 = self.utf8(value);
        self.intern(tagged(8, &[utf8]), 1)
    }

    pub fn integer(&mut self, value: i32) -> u16 {
        let mut entry = vec![3];
        entry.extend_from_slice(&value.to_be_bytes());
        self.intern(entry, 1)
    }

    pub fn long(&mut self, value: i64) -> u16 {
        let mut entry = vec![5];
        entry.extend_from_slice(&value.to_be_bytes());
        self.intern(entry, 2)
    }

    pub fn double(&mut self, value: f64) -> u16 {
        let mut entry = vec![6];
        entry.extend_from_slice(&value.to_bits().to_be_bytes());
        self.intern(entry, 2)
    }

    fn name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        let name = self.utf8(name);
        let descriptor = self.utf8(descriptor);
        self.intern(tagged(12, &[name, descriptor]), 1)
    }

    fn member_ref(&mut self, tag: u8, owner: &str, name: &str, descriptor: &str) -> u16 {
        let class = self.class(owner);
        let nat = self.name_and_type(name, descriptor);
        self.intern(tagged(tag, &[class, nat]), 1)
    }

    pub fn field_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        self.member_ref(9, owner, name, descriptor)
    }

    pub fn method_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        self.member_ref(10, owner, name, descriptor)
    }

    pub fn interface_method_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        self.member_ref(11, owner, name, descriptor)
    }

    /// `InvokeDynamic` entry; the bootstrap index is not validated by readers
    /// that skip `BootstrapMethods`.
    pub fn invoke_dynamic(&mut self, name: &str, descriptor: &str) -> u16 {
        let nat = self.name_and_type(name, descriptor);
        self.intern(tagged(18, &[0, nat]), 1)
    }

    pub fn method(
        &mut self,
        access_flags: u16,
        name: &str,
        descriptor: &str,
        code: Option<MethodCode>,
    ) -> &mut Self {
        let name = self.utf8(name);
        let descriptor = self.utf8(descriptor);
        self.methods.push(MethodEntry {
            access_flags,
            name,
            descriptor,
            code,
        });
        self
    }

    pub fn build(&mut self) -> Vec<u8> {
        // Intern attribute names up front so the pool is complete.
        let code_name = self.utf8("Code");
        let lines_name = self.utf8("LineNumberTable");

        let mut out = Vec::new();
        out.extend_from_slice(&0xCAFEBABEu32.to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes());
        out.extend_from_slice(&52u16.to_be_bytes());
        out.extend_from_slice(&self.pool_slots.to_be_bytes());
        out.extend_from_slice(&self.pool);
        push_u2(&mut out, ACC_PUBLIC | ACC_SUPER);
        push_u2(&mut out, self.this_class);
        push_u2(&mut out, self.super_class);
        push_u2(&mut out, 0); // interfaces
        push_u2(&mut out, 0); // fields

        push_u2(&mut out, self.methods.len() as u16);
        for method in &self.methods {
            push_u2(&mut out, method.access_flags);
            push_u2(&mut out, method.name);
            push_u2(&mut out, method.descriptor);
            match &method.code {
                None => push_u2(&mut out, 0),
                Some(code) => {
                    push_u2(&mut out, 1);
                    let body = code_attribute(code, lines_name);
                    push_u2(&mut out, code_name);
                    out.extend_from_slice(&(body.len() as u32).to_be_bytes());
                    out.extend_from_slice(&body);
                }
            }
        }

        push_u2(&mut out, 0); // class attributes
        tracing::trace!(target: "nova.test_utils", len = out.len(), "assembled class file");
        out
    }
}

fn code_attribute(code: &MethodCode, lines_name: u16) -> Vec<u8> {
    let mut out = Vec::new();
    push_u2(&mut out, code.max_stack);
    push_u2(&mut out, code.max_locals);
    out.extend_from_slice(&(code.bytecode.len() as u32).to_be_bytes());
    out.extend_from_slice(&code.bytecode);

    push_u2(&mut out, code.exception_table.len() as u16);
    for entry in &code.exception_table {
        push_u2(&mut out, entry.start_pc);
        push_u2(&mut out, entry.end_pc);
        push_u2(&mut out, entry.handler_pc);
        push_u2(&mut out, entry.catch_type);
    }

    if code.line_numbers.is_empty() {
        push_u2(&mut out, 0);
    } else {
        push_u2(&mut out, 1);
        push_u2(&mut out, lines_name);
        let len = 2 + 4 * code.line_numbers.len() as u32;
        out.extend_from_slice(&len.to_be_bytes());
        push_u2(&mut out, code.line_numbers.len() as u16);
        for &(start_pc, line) in &code.line_numbers {
            push_u2(&mut out, start_pc);
            push_u2(&mut out, line);
        }
    }
    out
}

fn tagged(tag: u8, indices: &[u16]) -> Vec<u8> {
    let mut entry = vec![tag];
    for index in indices {
        entry.extend_from_slice(&index.to_be_bytes());
    }
    entry
}

fn push_u2(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}
