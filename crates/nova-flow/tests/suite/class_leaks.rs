use nova_classfile::opcodes::*;
use nova_classfile::{access, ClassFile, Insn};
use nova_flow::{
    analyze_class, build_cfg, AnalysisError, FlowConfig, FrameError, LeakResult, MethodOutcome,
    MethodReport, ParamsRepr,
};
use nova_test_utils::{ClassFileBuilder, ExceptionEntry, MethodCode};
use tokio_util::sync::CancellationToken;

const PUBLIC: u16 = access::ACC_PUBLIC;
const STATIC: u16 = access::ACC_PUBLIC | access::ACC_STATIC;

fn sample_class() -> ClassFile {
    let mut b = ClassFileBuilder::new("Sample");
    let [hash_hi, hash_lo] = b
        .method_ref("java/lang/Object", "hashCode", "()I")
        .to_be_bytes();
    let [str_hi, str_lo] = b
        .method_ref("java/lang/Object", "toString", "()Ljava/lang/String;")
        .to_be_bytes();
    let npe = b.class("java/lang/NullPointerException");

    // void hash(Object a) { a.hashCode(); }
    b.method(
        PUBLIC,
        "hash",
        "(Ljava/lang/Object;)V",
        Some(MethodCode::new(
            1,
            2,
            vec![0x2b, INVOKEVIRTUAL, hash_hi, hash_lo, POP, RETURN],
        )),
    );
    // void copy(Object a) { Object b = a; }
    b.method(
        PUBLIC,
        "copy",
        "(Ljava/lang/Object;)V",
        Some(MethodCode::new(1, 3, vec![0x2b, 0x4d, RETURN])),
    );
    // static void store(Object[] arr, Object v) { arr[0] = v; }
    b.method(
        STATIC,
        "store",
        "([Ljava/lang/Object;Ljava/lang/Object;)V",
        Some(MethodCode::new(
            3,
            2,
            vec![0x2a, ICONST_0, 0x2b, AASTORE, RETURN],
        )),
    );
    // static int none() { return 1; }
    b.method(
        STATIC,
        "none",
        "()I",
        Some(MethodCode::new(1, 0, vec![ICONST_1, IRETURN])),
    );
    // static long wide(long x, Object o) { return x + x + o.hashCode(); }
    b.method(
        STATIC,
        "wide",
        "(JLjava/lang/Object;)J",
        Some(MethodCode::new(
            4,
            3,
            vec![
                0x1e, // lload_0
                DUP2,
                LADD,
                0x2c, // aload_2
                INVOKEVIRTUAL,
                hash_hi,
                hash_lo,
                I2L,
                LADD,
                LRETURN,
            ],
        )),
    );
    // static void guarded(Object a) {
    //     try { a.toString(); } catch (NullPointerException e) {}
    // }
    let mut guarded = MethodCode::new(
        1,
        2,
        vec![
            0x2a, // aload_0
            INVOKEVIRTUAL,
            str_hi,
            str_lo,
            POP,
            GOTO,
            0x00,
            0x04,
            0x4c, // astore_1
            RETURN,
        ],
    );
    guarded.exception_table.push(ExceptionEntry {
        start_pc: 0,
        end_pc: 5,
        handler_pc: 8,
        catch_type: npe,
    });
    b.method(STATIC, "guarded", "(Ljava/lang/Object;)V", Some(guarded));
    // Pops from an empty stack.
    b.method(
        STATIC,
        "broken",
        "(Ljava/lang/Object;)V",
        Some(MethodCode::new(1, 1, vec![POP, RETURN])),
    );
    b.method(
        PUBLIC | access::ACC_ABSTRACT,
        "pending",
        "(Ljava/lang/String;)V",
        None,
    );

    ClassFile::parse(&b.build()).expect("sample class parses")
}

fn report<'a>(reports: &'a [MethodReport], name: &str) -> &'a MethodReport {
    reports
        .iter()
        .find(|r| r.name == name)
        .unwrap_or_else(|| panic!("no report for {name}"))
}

fn leaks(reports: &[MethodReport], name: &str) -> LeakResult {
    report(reports, name)
        .analysis()
        .unwrap_or_else(|| panic!("{name} was not analysed: {:?}", report(reports, name).outcome))
        .leaks
        .clone()
}

fn analyze(params: ParamsRepr) -> Vec<MethodReport> {
    let config = FlowConfig {
        params,
        ..FlowConfig::default()
    };
    analyze_class(&sample_class(), &config, &CancellationToken::new())
}

#[test]
fn scenarios_match_expected_leaks() {
    let reports = analyze(ParamsRepr::Auto);

    let hash = leaks(&reports, "hash");
    assert_eq!(hash.not_null, vec![true]);
    assert_eq!(hash.nullable, vec![true]);

    let copy = leaks(&reports, "copy");
    assert_eq!(copy, LeakResult::none(1));

    let store = leaks(&reports, "store");
    assert_eq!(store.not_null, vec![true, false]);
    assert_eq!(store.nullable, vec![true, true]);

    assert_eq!(leaks(&reports, "none"), LeakResult::none(0));

    let wide = leaks(&reports, "wide");
    assert_eq!(wide.not_null, vec![false, true]);

    assert_eq!(leaks(&reports, "pending"), LeakResult::none(1));
}

#[test]
fn packed_and_wide_representations_agree() {
    let packed = analyze(ParamsRepr::Packed);
    let wide = analyze(ParamsRepr::Wide);
    assert_eq!(packed, wide);
}

#[test]
fn not_null_always_implies_nullable() {
    for report in analyze(ParamsRepr::Auto) {
        let Some(analysis) = report.analysis() else {
            continue;
        };
        for (not_null, nullable) in analysis.leaks.not_null.iter().zip(&analysis.leaks.nullable) {
            assert!(!not_null || *nullable, "{}", report.name);
        }
    }
}

#[test]
fn graphs_cover_every_instruction() {
    let class = sample_class();
    for (report, member) in analyze(ParamsRepr::Auto).iter().zip(&class.methods) {
        let Some(analysis) = report.analysis() else {
            continue;
        };
        let graph = &analysis.flow.graph;
        let expected = member.code.as_ref().map_or(0, |c| c.instructions.len());
        assert_eq!(graph.node_count(), expected, "{}", report.name);
        for edge in graph.edges() {
            assert!(edge.from < expected && edge.to < expected);
        }
        assert_eq!(graph.edges().count(), graph.edge_count());
        assert!(analysis.flow.reducible);
    }
}

#[test]
fn npe_handler_is_recorded_for_the_dereferencing_call() {
    let reports = analyze(ParamsRepr::Auto);
    let analysis = report(&reports, "guarded").analysis().expect("analysed");
    assert_eq!(analysis.leaks.not_null, vec![true]);

    let class = sample_class();
    let code = class
        .method("guarded", None)
        .and_then(|m| m.code.as_ref())
        .expect("code");
    let call = code
        .instructions
        .iter()
        .position(|insn| matches!(insn, Insn::Method { .. }))
        .expect("call");
    let graph = &analysis.flow.graph;
    let handler = graph.npe_edge(call).expect("npe edge");
    assert!(matches!(code.instructions[handler], Insn::Label(_)));
    assert!(matches!(
        code.instructions[handler + 1],
        Insn::Var { opcode: ASTORE, var: 1 }
    ));
    assert!(graph.may_throw(call));
    assert_eq!(graph.npe_edges().len(), 1);
}

#[test]
fn broken_method_fails_without_affecting_others() {
    let reports = analyze(ParamsRepr::Auto);
    assert!(matches!(
        report(&reports, "broken").outcome,
        MethodOutcome::Failed(AnalysisError::Malformed {
            source: FrameError::StackUnderflow { .. },
            ..
        })
    ));
    let analysed = reports.iter().filter(|r| r.analysis().is_some()).count();
    assert_eq!(analysed, reports.len() - 1);
}

#[test]
fn standalone_cfg_verifies_frames_when_asked() {
    let class = sample_class();
    let broken = class.method("broken", None).expect("broken");
    let cancel = CancellationToken::new();

    let lenient = FlowConfig {
        verify_frames: false,
        ..FlowConfig::default()
    };
    let graph = build_cfg(broken, &lenient, &cancel).expect("structure only");
    assert_eq!(graph.node_count(), 2);

    assert!(matches!(
        build_cfg(broken, &FlowConfig::default(), &cancel),
        Err(AnalysisError::Malformed { insn: 0, .. })
    ));

    let pending = class.method("pending", None).expect("abstract");
    assert_eq!(
        build_cfg(pending, &FlowConfig::default(), &cancel)
            .expect("empty")
            .node_count(),
        0
    );
}

#[test]
fn cancelled_batch_reports_unknown_not_safe() {
    let token = CancellationToken::new();
    token.cancel();
    let reports = analyze_class(&sample_class(), &FlowConfig::default(), &token);
    assert!(!reports.is_empty());
    for report in reports {
        assert_eq!(report.outcome, MethodOutcome::Cancelled);
        assert!(report.analysis().is_none());
    }
}
