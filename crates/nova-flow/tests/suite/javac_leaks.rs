use nova_classfile::ClassFile;
use nova_flow::{analyze_class, FlowConfig, LeakResult, MethodReport};
use nova_test_utils::javac::{compile_snippet, javac_available};
use tokio_util::sync::CancellationToken;

const SOURCE: &str = r#"
public class Test {
    private Object field;

    void deref(Object a) { a.hashCode(); }
    void copy(Object a) { Object b = a; }
    static void store(Object[] arr, Object v) { arr[0] = v; }
    void assign(Object a) { this.field = a; }
    static int length(int[] xs) { return xs.length; }
    static String cast(Object o) { return (String) o; }

    static int loop(Object a, Object b, int n) {
        Object o = a;
        for (int i = 0; i < n; i++) {
            o = b;
        }
        return o.hashCode();
    }

    static void guarded(Object a) {
        try {
            a.toString();
        } catch (NullPointerException e) {
            // ignored
        }
    }

    static Runnable capture(Object a) {
        return () -> System.out.println(a);
    }

    static long wide(long x, double d, Object o) {
        synchronized (o) {
            return x + (long) d;
        }
    }
}
"#;

fn leaks(reports: &[MethodReport], name: &str) -> LeakResult {
    reports
        .iter()
        .find(|r| r.name == name)
        .and_then(MethodReport::analysis)
        .unwrap_or_else(|| panic!("{name} not analysed"))
        .leaks
        .clone()
}

#[test]
#[ignore = "requires javac on PATH"]
fn javac_output_matches_expected_leaks() {
    if !javac_available() {
        eprintln!("javac not found; skipping");
        return;
    }
    let compiled = compile_snippet(SOURCE).expect("run javac");
    assert!(compiled.success(), "javac failed:\n{}", compiled.stderr);
    let bytes = compiled.class("Test").expect("Test.class");
    let class = ClassFile::parse(bytes).expect("parse Test.class");

    let reports = analyze_class(&class, &FlowConfig::default(), &CancellationToken::new());
    for report in &reports {
        assert!(
            report.analysis().is_some(),
            "{}{} failed: {:?}",
            report.name,
            report.descriptor,
            report.outcome
        );
    }

    assert_eq!(leaks(&reports, "deref").not_null, vec![true]);
    assert_eq!(leaks(&reports, "copy"), LeakResult::none(1));

    let store = leaks(&reports, "store");
    assert_eq!(store.not_null, vec![true, false]);
    assert_eq!(store.nullable, vec![true, true]);

    let assign = leaks(&reports, "assign");
    assert_eq!(assign.not_null, vec![false]);
    assert_eq!(assign.nullable, vec![true]);

    assert_eq!(leaks(&reports, "length").not_null, vec![true]);

    let cast = leaks(&reports, "cast");
    assert_eq!(cast.not_null, vec![true]);

    assert_eq!(leaks(&reports, "loop").not_null, vec![true, true, false]);
    assert_eq!(leaks(&reports, "guarded").not_null, vec![true]);

    let capture = leaks(&reports, "capture");
    assert_eq!(capture.not_null, vec![false]);
    assert_eq!(capture.nullable, vec![true]);

    assert_eq!(leaks(&reports, "wide").not_null, vec![false, false, true]);
}
