//! Utilities shared by Nova tests.
//!
//! [`classfile`] assembles small class files in memory so decoder and
//! analysis tests don't depend on checked-in binaries. [`javac`] is a thin
//! harness for differential tests against real compiler output.
//!
//! ## Running `javac` differential tests locally
//!
//! ```bash
//! # Run ignored tests (requires `javac` on PATH)
//! cargo test -p nova-flow --test tests javac -- --ignored
//! ```

pub mod classfile;

pub use classfile::{ClassFileBuilder, ExceptionEntry, MethodCode};

#[cfg(feature = "javac")]
pub mod javac;
