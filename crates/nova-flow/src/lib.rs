//! Bytecode flow analysis: instruction-level CFG construction, DFS tree and
//! reducibility, a fixed point over parameter-tracking frames, and the
//! parameter leak facts derived from it.

mod batch;
mod cfg;
mod config;
mod dfs;
mod error;
mod frame;
mod lattice;
mod leaks;
mod rich;
mod solver;
mod transfer;

use nova_classfile::{ClassMember, Code, MethodDescriptor};
use tokio_util::sync::CancellationToken;

pub use crate::batch::{analyze_class, MethodOutcome, MethodReport};
pub use crate::cfg::{build_cfg, ControlFlowGraph, Edge};
pub use crate::config::{FlowConfig, ParamsRepr};
pub use crate::dfs::{build_dfs, DfsTree};
pub use crate::error::AnalysisError;
pub use crate::frame::{Frame, FrameError};
pub use crate::lattice::{PackedParams, ParamSet, ParamsValue, WideParams};
pub use crate::leaks::{collect_leaks, LeakAccumulator, LeakResult};
pub use crate::rich::{is_reducible, RichControlFlow};
pub use crate::solver::{solve_frames, update_bound, FrameProblem, Strategy};
pub use crate::transfer::{category, categorize, InsnCategory, Operands, ParametersUsage};

/// Everything known about one analysed method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodAnalysis {
    pub flow: RichControlFlow,
    pub leaks: LeakResult,
}

/// Runs the full pipeline on one method: CFG, DFS tree, reducibility, frame
/// fixed point and leak collection.
///
/// Abstract and native methods yield an empty, reducible flow and no leaks.
/// Nothing partial is returned on failure or cancellation.
pub fn analyze_method(
    member: &ClassMember,
    config: &FlowConfig,
    cancel: &CancellationToken,
) -> Result<MethodAnalysis, AnalysisError> {
    error::check_cancelled(cancel)?;
    let descriptor = member.method_descriptor()?;
    if member.is_abstract() || member.is_native() {
        return Ok(MethodAnalysis {
            flow: RichControlFlow::empty(),
            leaks: LeakResult::none(descriptor.arity()),
        });
    }
    let code = member.code.as_ref().ok_or(AnalysisError::MissingCode)?;

    let graph = cfg::build_graph(code, cancel)?;
    let dfs = build_dfs(&graph, cancel)?;
    let flow = RichControlFlow::new(graph, dfs);
    tracing::debug!(
        target: "nova.flow",
        method = %member.name,
        insns = code.instructions.len(),
        edges = flow.graph.edge_count(),
        reducible = flow.reducible,
        "control flow ready"
    );

    let usage = ParametersUsage::new(&descriptor, member.is_static());
    let categories = categorize(&code.instructions)?;
    let problem = FrameProblem {
        code,
        categories: &categories,
        graph: &flow.graph,
        usage,
        max_updates: config
            .max_frame_updates
            .max(update_bound(code, usage.arity)),
    };
    let strategy = if flow.reducible {
        Strategy::ReversePostorder(&flow.dfs)
    } else {
        Strategy::Worklist
    };
    let leaks = if config.params.uses_packed(usage.arity) {
        leaks_with::<PackedParams>(&problem, code, &descriptor, strategy, cancel)?
    } else {
        leaks_with::<WideParams>(&problem, code, &descriptor, strategy, cancel)?
    };
    tracing::debug!(
        target: "nova.flow",
        method = %member.name,
        not_null = leaks.not_null.iter().filter(|&&b| b).count(),
        nullable = leaks.nullable.iter().filter(|&&b| b).count(),
        "leaks collected"
    );

    Ok(MethodAnalysis { flow, leaks })
}

fn leaks_with<S: ParamSet>(
    problem: &FrameProblem<'_>,
    code: &Code,
    descriptor: &MethodDescriptor,
    strategy: Strategy<'_>,
    cancel: &CancellationToken,
) -> Result<LeakResult, AnalysisError> {
    let entry = problem
        .usage
        .entry_frame::<S>(descriptor, code.max_locals, code.max_stack)
        .map_err(|source| AnalysisError::Malformed { insn: 0, source })?;
    let frames = solve_frames(problem, entry, strategy, cancel)?;
    collect_leaks(
        &code.instructions,
        problem.categories,
        &frames,
        &problem.usage,
    )
}
