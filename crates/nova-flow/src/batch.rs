use nova_classfile::{ClassFile, ClassMember};
use rayon::prelude::*;
use tokio_util::sync::CancellationToken;

use crate::config::FlowConfig;
use crate::error::AnalysisError;
use crate::{analyze_method, MethodAnalysis};

/// Result of analysing one method in a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodOutcome {
    Analyzed(MethodAnalysis),
    Failed(AnalysisError),
    /// Facts are unknown, not absent.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodReport {
    pub name: String,
    pub descriptor: String,
    pub outcome: MethodOutcome,
}

impl MethodReport {
    #[must_use]
    pub fn analysis(&self) -> Option<&MethodAnalysis> {
        match &self.outcome {
            MethodOutcome::Analyzed(analysis) => Some(analysis),
            _ => None,
        }
    }
}

/// Analyses every method of `class` in parallel.
///
/// Reports come back in declaration order. A failing or cancelled method
/// never affects the others.
pub fn analyze_class(
    class: &ClassFile,
    config: &FlowConfig,
    cancel: &CancellationToken,
) -> Vec<MethodReport> {
    analyze_methods(&class.this_class, &class.methods, config, cancel)
}

pub(crate) fn analyze_methods(
    class_name: &str,
    methods: &[ClassMember],
    config: &FlowConfig,
    cancel: &CancellationToken,
) -> Vec<MethodReport> {
    methods
        .par_iter()
        .map(|member| {
            let outcome = match analyze_method(member, config, cancel) {
                Ok(analysis) => MethodOutcome::Analyzed(analysis),
                Err(err) if err.is_cancelled() => MethodOutcome::Cancelled,
                Err(err) => {
                    tracing::warn!(
                        target: "nova.flow",
                        class = %class_name,
                        method = %member.name,
                        descriptor = %member.descriptor,
                        error = %err,
                        "method analysis failed"
                    );
                    MethodOutcome::Failed(err)
                }
            };
            MethodReport {
                name: member.name.clone(),
                descriptor: member.descriptor.clone(),
                outcome,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameError;
    use nova_classfile::access::ACC_STATIC;
    use nova_classfile::opcodes::*;
    use nova_classfile::{Code, Insn};

    fn method(name: &str, insns: Vec<Insn>) -> ClassMember {
        ClassMember {
            access_flags: ACC_STATIC,
            name: name.into(),
            descriptor: "(Ljava/lang/Object;)V".into(),
            code: Some(Code {
                max_stack: 2,
                max_locals: 1,
                instructions: insns,
                try_catch_blocks: Vec::new(),
            }),
        }
    }

    fn methods() -> Vec<ClassMember> {
        vec![
            method(
                "good",
                vec![
                    Insn::Var { opcode: ALOAD, var: 0 },
                    Insn::Op(MONITORENTER),
                    Insn::Op(RETURN),
                ],
            ),
            method("underflow", vec![Insn::Op(IADD), Insn::Op(RETURN)]),
            method("empty", vec![Insn::Op(RETURN)]),
        ]
    }

    #[test]
    fn malformed_method_fails_alone() {
        let reports = analyze_methods(
            "Test",
            &methods(),
            &FlowConfig::default(),
            &CancellationToken::new(),
        );
        let names: Vec<_> = reports.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["good", "underflow", "empty"]);

        assert_eq!(
            reports[0].analysis().map(|a| a.leaks.not_null.clone()),
            Some(vec![true])
        );
        assert!(matches!(
            reports[1].outcome,
            MethodOutcome::Failed(AnalysisError::Malformed {
                insn: 0,
                source: FrameError::StackUnderflow { .. }
            })
        ));
        assert_eq!(
            reports[2].analysis().map(|a| a.leaks.nullable.clone()),
            Some(vec![false])
        );
    }

    #[test]
    fn cancellation_marks_every_method_unknown() {
        let token = CancellationToken::new();
        token.cancel();
        let reports = analyze_methods("Test", &methods(), &FlowConfig::default(), &token);
        assert!(reports
            .iter()
            .all(|r| r.outcome == MethodOutcome::Cancelled));
    }
}
