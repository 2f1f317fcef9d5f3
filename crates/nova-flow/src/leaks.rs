//! Leak collection over stable frames.

use nova_classfile::Insn;
use serde::Serialize;

use crate::error::AnalysisError;
use crate::frame::Frame;
use crate::lattice::{ParamSet, ParamsValue};
use crate::transfer::{InsnCategory, ParametersUsage};

/// Per-parameter leak facts of one method.
///
/// `not_null[i]` means parameter `i` may be dereferenced, so passing `null`
/// for it can fail. `nullable[i]` means it may escape at all. `not_null[i]`
/// always implies `nullable[i]`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct LeakResult {
    pub not_null: Vec<bool>,
    pub nullable: Vec<bool>,
}

impl LeakResult {
    /// No parameter leaks.
    #[must_use]
    pub fn none(arity: usize) -> Self {
        Self {
            not_null: vec![false; arity],
            nullable: vec![false; arity],
        }
    }
}

/// Accumulates leaking parameter sets for one pass over one method.
#[derive(Debug)]
pub struct LeakAccumulator<S> {
    arity: usize,
    not_null: S,
    nullable: S,
}

impl<S: ParamSet> LeakAccumulator<S> {
    #[must_use]
    pub fn new(arity: usize) -> Self {
        Self {
            arity,
            not_null: S::empty(arity),
            nullable: S::empty(arity),
        }
    }

    /// `value` is dereferenced.
    pub fn not_null(&mut self, value: &ParamsValue<S>) {
        self.not_null.union_with(&value.params);
    }

    /// `value` escapes into a position that tolerates `null`.
    pub fn nullable(&mut self, value: &ParamsValue<S>) {
        self.nullable.union_with(&value.params);
    }

    #[must_use]
    pub fn finish(mut self) -> LeakResult {
        self.nullable.union_with(&self.not_null);
        LeakResult {
            not_null: self.not_null.to_bools(self.arity),
            nullable: self.nullable.to_bools(self.arity),
        }
    }
}

/// Replays every reachable instruction once against its stable
/// pre-execution frame.
pub fn collect_leaks<S: ParamSet>(
    instructions: &[Insn],
    categories: &[InsnCategory],
    frames: &[Option<Frame<S>>],
    usage: &ParametersUsage,
) -> Result<LeakResult, AnalysisError> {
    let mut acc = LeakAccumulator::new(usage.arity);
    for (index, insn) in instructions.iter().enumerate() {
        let category = categories[index];
        if category == InsnCategory::Pseudo {
            continue;
        }
        let Some(frame) = &frames[index] else {
            continue;
        };
        let operands = frame
            .operands(category)
            .map_err(|source| AnalysisError::Malformed { insn: index, source })?;
        usage.record_leaks(insn, &operands, &mut acc);
    }
    Ok(acc.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lattice::{PackedParams, WideParams};

    fn accumulate<S: ParamSet>() -> LeakResult {
        let mut acc = LeakAccumulator::<S>::new(3);
        acc.not_null(&ParamsValue::parameter(3, 0));
        acc.nullable(&ParamsValue::parameter(3, 2));
        acc.nullable(&ParamsValue::untracked(3, 1));
        acc.finish()
    }

    #[test]
    fn not_null_implies_nullable() {
        let result = accumulate::<PackedParams>();
        assert_eq!(result.not_null, vec![true, false, false]);
        assert_eq!(result.nullable, vec![true, false, true]);
        assert_eq!(result, accumulate::<WideParams>());
    }

    #[test]
    fn empty_arity_yields_empty_arrays() {
        let result = LeakAccumulator::<WideParams>::new(0).finish();
        assert!(result.not_null.is_empty());
        assert!(result.nullable.is_empty());
        assert_eq!(result, LeakResult::none(0));
    }
}
