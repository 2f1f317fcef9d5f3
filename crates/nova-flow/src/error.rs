use thiserror::Error;

use crate::frame::FrameError;

/// Why the analysis of one method produced no result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    ClassFile(#[from] nova_classfile::Error),
    #[error("malformed bytecode at instruction {insn}: {source}")]
    Malformed {
        insn: usize,
        #[source]
        source: FrameError,
    },
    #[error("control falls off the end of the code at instruction {insn}")]
    FallsOffEnd { insn: usize },
    #[error("concrete method has no Code attribute")]
    MissingCode,
    #[error("fixed point not reached within {limit} frame updates")]
    LimitExceeded { limit: usize },
    #[error("analysis cancelled")]
    Cancelled,
}

impl AnalysisError {
    /// Cancellation is not a failure: the method's facts are unknown.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AnalysisError::Cancelled)
    }
}

pub(crate) fn check_cancelled(
    cancel: &tokio_util::sync::CancellationToken,
) -> Result<(), AnalysisError> {
    if cancel.is_cancelled() {
        Err(AnalysisError::Cancelled)
    } else {
        Ok(())
    }
}
