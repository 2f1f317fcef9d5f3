//! Fixed-point computation of per-instruction frames.

use std::collections::VecDeque;

use nova_classfile::Code;
use tokio_util::sync::CancellationToken;

use crate::cfg::{ControlFlowGraph, Edge};
use crate::dfs::DfsTree;
use crate::error::{check_cancelled, AnalysisError};
use crate::frame::Frame;
use crate::lattice::ParamSet;
use crate::transfer::{InsnCategory, ParametersUsage};

/// Order in which instructions are revisited until frames stabilise.
#[derive(Debug, Clone, Copy)]
pub enum Strategy<'a> {
    /// Sweeps in reverse postorder of the DFS tree. Only sound for reducible
    /// graphs.
    ReversePostorder(&'a DfsTree),
    /// FIFO worklist; correct for any graph.
    Worklist,
}

impl Strategy<'_> {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::ReversePostorder(_) => "reverse-postorder",
            Strategy::Worklist => "worklist",
        }
    }
}

/// Inputs shared by every step of one solve.
#[derive(Debug, Clone, Copy)]
pub struct FrameProblem<'a> {
    pub code: &'a Code,
    pub categories: &'a [InsnCategory],
    pub graph: &'a ControlFlowGraph,
    pub usage: ParametersUsage,
    /// Upper bound on instruction executions.
    pub max_updates: usize,
}

/// Upper bound on the instruction executions a solve over `code` can need.
///
/// An instruction is re-executed only after its frame changed. Each frame is
/// set once, and afterwards each of its slots can only gain some of `arity`
/// parameters or narrow from two words to one.
#[must_use]
pub fn update_bound(code: &Code, arity: usize) -> usize {
    let slots = usize::from(code.max_locals) + usize::from(code.max_stack);
    let changes_per_frame = slots.saturating_mul(arity.saturating_add(1));
    code.instructions
        .len()
        .saturating_mul(changes_per_frame.saturating_add(2))
}

/// Computes the stable pre-execution frame of every reachable instruction.
///
/// Unreachable instructions get `None`.
pub fn solve_frames<S: ParamSet>(
    problem: &FrameProblem<'_>,
    entry: Frame<S>,
    strategy: Strategy<'_>,
    cancel: &CancellationToken,
) -> Result<Vec<Option<Frame<S>>>, AnalysisError> {
    let nodes = problem.graph.node_count();
    let mut solver = Solver {
        problem,
        frames: vec![None; nodes],
        updates: 0,
    };
    if nodes == 0 {
        return Ok(solver.frames);
    }
    solver.frames[0] = Some(entry);

    match strategy {
        Strategy::Worklist => {
            let mut queued = vec![false; nodes];
            let mut queue = VecDeque::from([0]);
            queued[0] = true;
            while let Some(node) = queue.pop_front() {
                check_cancelled(cancel)?;
                queued[node] = false;
                for succ in solver.step(node)? {
                    if !queued[succ] {
                        queued[succ] = true;
                        queue.push_back(succ);
                    }
                }
            }
        }
        Strategy::ReversePostorder(dfs) => {
            let mut dirty = vec![false; nodes];
            dirty[0] = true;
            let mut pending = true;
            while pending {
                pending = false;
                for &node in dfs.postorder().iter().rev() {
                    check_cancelled(cancel)?;
                    if !dirty[node] {
                        continue;
                    }
                    dirty[node] = false;
                    for succ in solver.step(node)? {
                        dirty[succ] = true;
                        pending = true;
                    }
                }
            }
        }
    }

    tracing::trace!(
        target: "nova.flow",
        strategy = strategy.name(),
        updates = solver.updates,
        "frames stable"
    );
    Ok(solver.frames)
}

struct Solver<'p, 'a, S> {
    problem: &'p FrameProblem<'a>,
    frames: Vec<Option<Frame<S>>>,
    updates: usize,
}

impl<S: ParamSet> Solver<'_, '_, S> {
    /// Executes `node` and propagates to its successors; returns the
    /// successors whose frame changed.
    fn step(&mut self, node: usize) -> Result<Vec<usize>, AnalysisError> {
        self.updates += 1;
        if self.updates > self.problem.max_updates {
            return Err(AnalysisError::LimitExceeded {
                limit: self.problem.max_updates,
            });
        }
        let Some(pre) = self.frames[node].clone() else {
            return Ok(Vec::new());
        };
        let problem = self.problem;
        let mut post = pre.clone();
        post.execute(
            &problem.code.instructions[node],
            problem.categories[node],
            &problem.usage,
        )
        .map_err(|source| AnalysisError::Malformed { insn: node, source })?;

        let mut changed = Vec::new();
        for &succ in problem.graph.successors(node) {
            let edge = Edge::new(node, succ);
            if problem.graph.is_normal_edge(edge) && self.propagate(succ, &post)? {
                changed.push(succ);
            }
            if problem.graph.is_error_edge(edge) {
                let mut handler = pre.handler_frame(problem.usage.arity);
                handler.merge_locals(&post);
                if self.propagate(succ, &handler)? && !changed.contains(&succ) {
                    changed.push(succ);
                }
            }
        }
        Ok(changed)
    }

    fn propagate(&mut self, node: usize, incoming: &Frame<S>) -> Result<bool, AnalysisError> {
        if let Some(existing) = &mut self.frames[node] {
            return existing
                .merge_into(incoming)
                .map_err(|source| AnalysisError::Malformed { insn: node, source });
        }
        self.frames[node] = Some(incoming.clone());
        Ok(true)
    }
}
