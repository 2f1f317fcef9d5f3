use nova_classfile::opcodes::*;
use nova_classfile::{access, ClassFile, Constant, Error, Insn, Label, TryCatchBlock};
use nova_test_utils::{ClassFileBuilder, ExceptionEntry, MethodCode};

const STATIC: u16 = access::ACC_PUBLIC | access::ACC_STATIC;

fn parse_single(builder: &mut ClassFileBuilder) -> nova_classfile::ClassMember {
    let class = ClassFile::parse(&builder.build()).expect("parse class");
    assert_eq!(class.this_class, "Test");
    assert_eq!(class.super_class.as_deref(), Some("java/lang/Object"));
    class.methods.into_iter().next().expect("one method")
}

#[test]
fn decodes_invoke_and_normalises_short_loads() {
    let mut builder = ClassFileBuilder::new("Test");
    let hash = builder.method_ref("java/lang/Object", "hashCode", "()I");
    let [hi, lo] = hash.to_be_bytes();
    builder.method(
        STATIC,
        "f",
        "(Ljava/lang/Object;)I",
        Some(MethodCode::new(1, 1, vec![0x2a, INVOKEVIRTUAL, hi, lo, IRETURN])),
    );

    let method = parse_single(&mut builder);
    assert!(method.is_static());
    let code = method.code.expect("code");
    assert_eq!((code.max_stack, code.max_locals), (1, 1));
    assert_eq!(
        code.instructions,
        vec![
            Insn::Var { opcode: ALOAD, var: 0 },
            Insn::Method {
                opcode: INVOKEVIRTUAL,
                owner: "java/lang/Object".to_string(),
                name: "hashCode".to_string(),
                desc: "()I".to_string(),
                interface: false,
            },
            Insn::Op(IRETURN),
        ]
    );
}

#[test]
fn places_labels_for_branches_try_blocks_and_lines() {
    let mut builder = ClassFileBuilder::new("Test");
    let mut code = MethodCode::new(
        1,
        1,
        vec![
            0x2a, // aload_0
            IFNULL, 0x00, 0x05,
            ICONST_1,
            IRETURN,
            ICONST_0,
            IRETURN,
        ],
    );
    code.exception_table.push(ExceptionEntry {
        start_pc: 0,
        end_pc: 4,
        handler_pc: 6,
        catch_type: 0,
    });
    code.line_numbers = vec![(0, 10), (6, 11)];
    builder.method(STATIC, "f", "(Ljava/lang/Object;)I", Some(code));

    let code = parse_single(&mut builder).code.expect("code");
    let (target, start, end) = (Label(0), Label(1), Label(2));
    assert_eq!(
        code.instructions,
        vec![
            Insn::Label(start),
            Insn::LineNumber { line: 10, start },
            Insn::Var { opcode: ALOAD, var: 0 },
            Insn::Jump { opcode: IFNULL, target },
            Insn::Label(end),
            Insn::Op(ICONST_1),
            Insn::Op(IRETURN),
            Insn::Label(target),
            Insn::LineNumber { line: 11, start: target },
            Insn::Op(ICONST_0),
            Insn::Op(IRETURN),
        ]
    );
    assert_eq!(
        code.try_catch_blocks,
        vec![TryCatchBlock {
            start,
            end,
            handler: target,
            catch_type: None,
        }]
    );

    let labels = code.label_index();
    assert_eq!(labels.resolve(target).unwrap(), 7);
    assert_eq!(labels.resolve(end).unwrap(), 4);
}

#[test]
fn decodes_padded_tableswitch() {
    let mut builder = ClassFileBuilder::new("Test");
    let mut bytes = vec![0x1a, TABLESWITCH, 0, 0];
    for word in [25i32, 0, 1, 23, 25] {
        bytes.extend_from_slice(&word.to_be_bytes());
    }
    bytes.extend_from_slice(&[ICONST_1, IRETURN, ICONST_2, IRETURN]);
    builder.method(STATIC, "f", "(I)I", Some(MethodCode::new(1, 1, bytes)));

    let code = parse_single(&mut builder).code.expect("code");
    let (default, case0) = (Label(0), Label(1));
    assert_eq!(
        code.instructions,
        vec![
            Insn::Var { opcode: ILOAD, var: 0 },
            Insn::TableSwitch {
                low: 0,
                high: 1,
                default,
                targets: vec![case0, default],
            },
            Insn::Label(case0),
            Insn::Op(ICONST_1),
            Insn::Op(IRETURN),
            Insn::Label(default),
            Insn::Op(ICONST_2),
            Insn::Op(IRETURN),
        ]
    );
}

#[test]
fn normalises_wide_and_goto_w() {
    let mut builder = ClassFileBuilder::new("Test");
    let bytes = vec![
        WIDE, IINC, 0x01, 0x2c, 0xff, 0xfe, // iinc 300, -2
        GOTO_W, 0, 0, 0, 5,
        RETURN,
    ];
    builder.method(STATIC, "f", "()V", Some(MethodCode::new(0, 301, bytes)));

    let code = parse_single(&mut builder).code.expect("code");
    assert_eq!(
        code.instructions,
        vec![
            Insn::Iinc { var: 300, incr: -2 },
            Insn::Jump { opcode: GOTO, target: Label(0) },
            Insn::Label(Label(0)),
            Insn::Op(RETURN),
        ]
    );
}

#[test]
fn resolves_ldc_constants() {
    let mut builder = ClassFileBuilder::new("Test");
    let long = builder.long(1 << 40);
    let string = builder.string("hi");
    let [lhi, llo] = long.to_be_bytes();
    let bytes = vec![LDC2_W, lhi, llo, POP2, LDC, string as u8, POP, RETURN];
    builder.method(STATIC, "f", "()V", Some(MethodCode::new(2, 0, bytes)));

    let code = parse_single(&mut builder).code.expect("code");
    assert_eq!(code.instructions[0], Insn::Ldc(Constant::Long(1 << 40)));
    assert_eq!(code.instructions[2], Insn::Ldc(Constant::String("hi".to_string())));
    assert_eq!(Constant::Long(0).width(), 2);
}

#[test]
fn abstract_methods_have_no_code() {
    let mut builder = ClassFileBuilder::new("Test");
    builder.method(
        access::ACC_PUBLIC | access::ACC_ABSTRACT,
        "f",
        "(Ljava/lang/Object;)V",
        None,
    );
    let method = parse_single(&mut builder);
    assert!(method.is_abstract());
    assert!(method.code.is_none());
    assert_eq!(method.method_descriptor().unwrap().arity(), 1);
}

#[test]
fn rejects_branch_into_the_middle_of_an_instruction() {
    let mut builder = ClassFileBuilder::new("Test");
    builder.method(
        STATIC,
        "f",
        "()V",
        Some(MethodCode::new(0, 0, vec![GOTO, 0x00, 0x01, RETURN])),
    );
    let err = ClassFile::parse(&builder.build()).unwrap_err();
    assert_eq!(err, Error::InvalidBranchTarget { offset: 0, target: 1 });
}

#[test]
fn rejects_unknown_opcodes() {
    let mut builder = ClassFileBuilder::new("Test");
    builder.method(STATIC, "f", "()V", Some(MethodCode::new(0, 0, vec![0xff])));
    let err = ClassFile::parse(&builder.build()).unwrap_err();
    assert_eq!(err, Error::InvalidOpcode { offset: 0, opcode: 0xff });
}

#[test]
fn rejects_bad_magic() {
    let err = ClassFile::parse(&[0, 1, 2, 3]).unwrap_err();
    assert_eq!(err, Error::InvalidMagic(0x00010203));
    assert!(err.to_string().contains("0x00010203"));
}
