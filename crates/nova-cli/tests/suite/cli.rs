use assert_cmd::Command;
use nova_classfile::access;
use nova_classfile::opcodes::*;
use nova_test_utils::{ClassFileBuilder, MethodCode};
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn nova() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("nova"))
}

const STATIC: u16 = access::ACC_PUBLIC | access::ACC_STATIC;

fn sample_class_bytes() -> Vec<u8> {
    let mut b = ClassFileBuilder::new("Sample");
    let [hash_hi, hash_lo] = b
        .method_ref("java/lang/Object", "hashCode", "()I")
        .to_be_bytes();

    // static int hash(Object a, Object b) { return a.hashCode(); }
    b.method(
        STATIC,
        "hash",
        "(Ljava/lang/Object;Ljava/lang/Object;)I",
        Some(MethodCode::new(
            1,
            2,
            vec![0x2a, INVOKEVIRTUAL, hash_hi, hash_lo, IRETURN],
        )),
    );
    // static int spin(int n) { while (n != 0) n--; return n; }
    b.method(
        STATIC,
        "spin",
        "(I)I",
        Some(MethodCode::new(
            1,
            1,
            vec![
                0x1a, // iload_0
                IFEQ, 0x00, 0x09, // -> 10
                IINC, 0x00, 0xff, // n += -1
                GOTO, 0xff, 0xf9, // -> 0
                0x1a, // iload_0
                IRETURN,
            ],
        )),
    );
    // Pops from an empty stack.
    b.method(
        STATIC,
        "broken",
        "()V",
        Some(MethodCode::new(1, 0, vec![POP, RETURN])),
    );
    b.build()
}

fn write_class(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("Sample.class");
    std::fs::write(&path, sample_class_bytes()).expect("write class");
    path
}

fn write_config(dir: &TempDir, text: &str) -> PathBuf {
    let path = dir.path().join("nova.toml");
    std::fs::write(&path, text).expect("write config");
    path
}

fn leaks_json(args: &[&str], class: &Path) -> serde_json::Value {
    let output = nova()
        .arg("leaks")
        .arg(class)
        .args(args)
        .arg("--json")
        .output()
        .expect("run nova");
    serde_json::from_slice(&output.stdout).expect("json output")
}

#[test]
fn help_lists_subcommands() {
    nova()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("leaks").and(predicate::str::contains("cfg")));
}

#[test]
fn leaks_prints_parameter_indices() {
    let dir = TempDir::new().expect("tempdir");
    let class = write_class(&dir);
    nova()
        .arg("leaks")
        .arg(&class)
        .args(["--method", "hash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Sample:"))
        .stdout(predicate::str::contains(
            "hash(Ljava/lang/Object;Ljava/lang/Object;)I: not_null: [0] nullable: [0]",
        ));
}

#[test]
fn leaks_json_reports_every_method() {
    let dir = TempDir::new().expect("tempdir");
    let class = write_class(&dir);
    let json = leaks_json(&[], &class);

    assert_eq!(json["class"], "Sample");
    let methods = json["methods"].as_array().expect("methods");
    assert_eq!(methods.len(), 3);

    let hash = &methods[0];
    assert_eq!(hash["name"], "hash");
    assert_eq!(hash["status"], "analyzed");
    assert_eq!(hash["not_null"], serde_json::json!([true, false]));
    assert_eq!(hash["nullable"], serde_json::json!([true, false]));

    let spin = &methods[1];
    assert_eq!(spin["status"], "analyzed");
    assert_eq!(spin["not_null"], serde_json::json!([false]));

    let broken = &methods[2];
    assert_eq!(broken["status"], "failed");
    assert!(broken["error"].as_str().expect("error").contains("stack underflow"));
}

#[test]
fn failed_method_sets_exit_code_one() {
    let dir = TempDir::new().expect("tempdir");
    let class = write_class(&dir);
    nova()
        .arg("leaks")
        .arg(&class)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("broken()V: error:"))
        .stdout(predicate::str::contains("spin(I)I: not_null: [] nullable: []"));
}

#[test]
fn config_selects_the_parameter_representation() {
    let dir = TempDir::new().expect("tempdir");
    let class = write_class(&dir);
    let config = write_config(
        &dir,
        "[flow]\nparams = \"wide\"\n\n[logging]\nlevel = \"error\"\n",
    );
    let config = config.to_str().expect("utf-8 path");
    let wide = leaks_json(&["--method", "hash", "--config", config], &class);
    let auto = leaks_json(&["--method", "hash"], &class);
    assert_eq!(wide, auto);
}

#[test]
fn invalid_config_exits_with_two() {
    let dir = TempDir::new().expect("tempdir");
    let class = write_class(&dir);
    let config = write_config(&dir, "[flow]\nparams = \"sparse\"\n");
    nova()
        .arg("leaks")
        .arg(&class)
        .arg("--config")
        .arg(&config)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("invalid config"));
}

#[test]
fn unreadable_inputs_exit_with_two() {
    let dir = TempDir::new().expect("tempdir");
    nova()
        .arg("leaks")
        .arg(dir.path().join("Missing.class"))
        .assert()
        .code(2)
        .stderr(predicate::str::contains("failed to read"));

    let garbage = dir.path().join("Garbage.class");
    std::fs::write(&garbage, b"not a class file").expect("write");
    nova()
        .arg("leaks")
        .arg(&garbage)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("failed to parse"));

    let class = write_class(&dir);
    nova()
        .arg("leaks")
        .arg(&class)
        .args(["--method", "absent"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("no method named `absent`"));
}

#[test]
fn cfg_json_marks_the_loop_back_edge() {
    let dir = TempDir::new().expect("tempdir");
    let class = write_class(&dir);
    let output = nova()
        .arg("cfg")
        .arg(&class)
        .args(["--method", "spin", "--json"])
        .output()
        .expect("run nova");
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json output");

    assert_eq!(json["method"], "spin");
    assert_eq!(json["reducible"], true);
    let nodes = json["nodes"].as_u64().expect("nodes");
    let edges = json["edges"].as_array().expect("edges");
    assert!(!edges.is_empty());
    for edge in edges {
        assert!(edge["from"].as_u64().expect("from") < nodes);
        assert!(edge["to"].as_u64().expect("to") < nodes);
        assert_eq!(edge["error"], false);
    }
    assert_eq!(edges.iter().filter(|e| e["back"] == true).count(), 1);
    assert_eq!(json["npe_edges"], serde_json::json!([]));
}

#[test]
fn cfg_text_output_and_failure() {
    let dir = TempDir::new().expect("tempdir");
    let class = write_class(&dir);
    nova()
        .arg("cfg")
        .arg(&class)
        .args(["--method", "spin"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Sample.spin(I)I"))
        .stdout(predicate::str::contains("reducible: true"))
        .stdout(predicate::str::contains("(back)"));

    nova()
        .arg("cfg")
        .arg(&class)
        .args(["--method", "broken"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Sample.broken()V"));
}
