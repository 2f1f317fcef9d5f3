//! Compiles Java snippets with the system `javac` so analysis tests can run
//! against real compiler output.

use std::collections::BTreeMap;
use std::io;
use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

#[derive(Debug, Clone, Default)]
pub struct JavacOptions {
    /// Maps to `javac --release`.
    pub release: Option<u32>,
    /// Emit `LineNumberTable` and `LocalVariableTable` (`-g`).
    pub debug_info: bool,
    /// Extra command-line args appended after the default flags.
    pub extra_args: Vec<String>,
}

#[derive(Debug)]
pub struct CompiledClasses {
    pub status: std::process::ExitStatus,
    pub stderr: String,
    /// Class-file bytes keyed by internal name (`com/example/Foo`).
    pub classes: BTreeMap<String, Vec<u8>>,
}

impl CompiledClasses {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    pub fn class(&self, internal_name: &str) -> Option<&[u8]> {
        self.classes.get(internal_name).map(Vec::as_slice)
    }
}

/// Compiles a single snippet saved as `Test.java`.
pub fn compile_snippet(source: &str) -> io::Result<CompiledClasses> {
    compile_files(&[("Test.java", source)], &JavacOptions::default())
}

/// Compiles several files placed in one temporary source root.
pub fn compile_files(files: &[(&str, &str)], opts: &JavacOptions) -> io::Result<CompiledClasses> {
    let dir = TempDir::new()?;
    for (name, src) in files {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, src)?;
    }

    let out_dir = dir.path().join("out");
    std::fs::create_dir_all(&out_dir)?;

    let mut cmd = Command::new("javac");
    cmd.current_dir(dir.path());
    cmd.args(["-encoding", "UTF-8", "-XDrawDiagnostics"]);
    // Never inherit CLASSPATH from the environment.
    cmd.args(["-classpath", "."]);
    if let Some(release) = opts.release {
        cmd.arg("--release");
        cmd.arg(release.to_string());
    }
    cmd.arg(if opts.debug_info { "-g" } else { "-g:none" });
    cmd.args(&opts.extra_args);
    cmd.arg("-d");
    cmd.arg(&out_dir);
    for (name, _) in files {
        cmd.arg(name);
    }

    let out = cmd.output()?;
    let mut classes = BTreeMap::new();
    if out.status.success() {
        collect_classes(&out_dir, &out_dir, &mut classes)?;
    }
    tracing::debug!(
        target: "nova.test_utils",
        status = %out.status,
        classes = classes.len(),
        "javac finished"
    );

    Ok(CompiledClasses {
        status: out.status,
        stderr: String::from_utf8_lossy(&out.stderr).to_string(),
        classes,
    })
}

fn collect_classes(
    root: &Path,
    dir: &Path,
    classes: &mut BTreeMap<String, Vec<u8>>,
) -> io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_classes(root, &path, classes)?;
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) != Some("class") {
            continue;
        }
        let Ok(relative) = path.with_extension("").strip_prefix(root).map(Path::to_path_buf) else {
            continue;
        };
        let internal = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        classes.insert(internal, std::fs::read(&path)?);
    }
    Ok(())
}

/// Whether `javac` is on `PATH`; differential tests skip themselves otherwise.
pub fn javac_available() -> bool {
    Command::new("javac")
        .arg("-version")
        .output()
        .is_ok_and(|out| out.status.success())
}
