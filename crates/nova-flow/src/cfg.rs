use std::collections::{HashMap, HashSet};

use nova_classfile::opcodes::*;
use nova_classfile::{ClassMember, Code, Insn};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::FlowConfig;
use crate::error::{check_cancelled, AnalysisError};
use crate::lattice::{PackedParams, ParamSet, WideParams};
use crate::solver::{solve_frames, update_bound, FrameProblem, Strategy};
use crate::transfer::{categorize, ParametersUsage};

/// A control transfer between two instruction indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Edge {
    pub from: usize,
    pub to: usize,
}

impl Edge {
    #[must_use]
    pub const fn new(from: usize, to: usize) -> Self {
        Self { from, to }
    }
}

/// Instruction-level control-flow graph of one method.
///
/// Node `i` is instruction `i` of the method's instruction list, pseudo
/// instructions included. Only edges leaving instructions reachable from
/// the entry are recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlFlowGraph {
    transitions: Vec<Vec<usize>>,
    edge_count: usize,
    may_throw: Vec<bool>,
    error_edges: HashSet<Edge>,
    npe_edges: HashMap<usize, usize>,
    normal_edges: HashSet<Edge>,
}

impl ControlFlowGraph {
    /// The graph of a method without a body.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.transitions.len()
    }

    /// Number of distinct edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    #[must_use]
    pub fn successors(&self, node: usize) -> &[usize] {
        &self.transitions[node]
    }

    pub fn edges(&self) -> impl Iterator<Item = Edge> + '_ {
        self.transitions
            .iter()
            .enumerate()
            .flat_map(|(from, succs)| succs.iter().map(move |&to| Edge::new(from, to)))
    }

    /// Whether `node` has at least one exceptional successor.
    #[must_use]
    pub fn may_throw(&self, node: usize) -> bool {
        self.may_throw[node]
    }

    #[must_use]
    pub fn error_edges(&self) -> &HashSet<Edge> {
        &self.error_edges
    }

    #[must_use]
    pub fn is_error_edge(&self, edge: Edge) -> bool {
        self.error_edges.contains(&edge)
    }

    /// Whether `edge` is an ordinary (non-exceptional) transfer. An edge can
    /// be both normal and exceptional.
    #[must_use]
    pub fn is_normal_edge(&self, edge: Edge) -> bool {
        self.normal_edges.contains(&edge)
    }

    /// Handler reached when `node` throws `NullPointerException`.
    #[must_use]
    pub fn npe_edge(&self, node: usize) -> Option<usize> {
        self.npe_edges.get(&node).copied()
    }

    #[must_use]
    pub fn npe_edges(&self) -> &HashMap<usize, usize> {
        &self.npe_edges
    }
}

/// Builds the control-flow graph of `member`.
///
/// Abstract and native methods get an empty graph. With
/// [`FlowConfig::verify_frames`] set, frames are simulated over the graph
/// and any inconsistency fails the build.
pub fn build_cfg(
    member: &ClassMember,
    config: &FlowConfig,
    cancel: &CancellationToken,
) -> Result<ControlFlowGraph, AnalysisError> {
    if member.is_abstract() || member.is_native() {
        return Ok(ControlFlowGraph::empty());
    }
    let code = member.code.as_ref().ok_or(AnalysisError::MissingCode)?;
    let graph = build_graph(code, cancel)?;
    tracing::debug!(
        target: "nova.flow",
        method = %member.name,
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        "built control-flow graph"
    );

    if config.verify_frames {
        let descriptor = member.method_descriptor()?;
        let usage = ParametersUsage::new(&descriptor, member.is_static());
        let categories = categorize(&code.instructions)?;
        let problem = FrameProblem {
            code,
            categories: &categories,
            graph: &graph,
            usage,
            max_updates: config
                .max_frame_updates
                .max(update_bound(code, usage.arity)),
        };
        if config.params.uses_packed(usage.arity) {
            verify::<PackedParams>(&problem, &descriptor, cancel)?;
        } else {
            verify::<WideParams>(&problem, &descriptor, cancel)?;
        }
    }
    Ok(graph)
}

fn verify<S: ParamSet>(
    problem: &FrameProblem<'_>,
    descriptor: &nova_classfile::MethodDescriptor,
    cancel: &CancellationToken,
) -> Result<(), AnalysisError> {
    let entry = problem
        .usage
        .entry_frame::<S>(descriptor, problem.code.max_locals, problem.code.max_stack)
        .map_err(|source| AnalysisError::Malformed { insn: 0, source })?;
    solve_frames(problem, entry, Strategy::Worklist, cancel).map(drop)
}

/// Discovers the edges of `code` by a worklist walk from instruction 0.
pub(crate) fn build_graph(
    code: &Code,
    cancel: &CancellationToken,
) -> Result<ControlFlowGraph, AnalysisError> {
    let insns = &code.instructions;
    let mut builder = GraphBuilder::new(insns.len());
    if insns.is_empty() {
        return Ok(builder.finish());
    }

    let labels = code.label_index();
    let mut handlers: Vec<Vec<(usize, Option<&str>)>> = vec![Vec::new(); insns.len()];
    for block in &code.try_catch_blocks {
        let start = labels.resolve(block.start)?;
        let end = labels.resolve(block.end)?;
        let handler = labels.resolve(block.handler)?;
        for covered in handlers.iter_mut().take(end).skip(start) {
            covered.push((handler, block.catch_type.as_deref()));
        }
    }
    let subroutine_returns: Vec<usize> = insns
        .iter()
        .enumerate()
        .filter(|(_, insn)| matches!(insn, Insn::Jump { opcode: JSR, .. }))
        .map(|(idx, _)| idx + 1)
        .filter(|&idx| idx < insns.len())
        .collect();

    let mut visited = vec![false; insns.len()];
    let mut pending = vec![0usize];
    visited[0] = true;
    while let Some(from) = pending.pop() {
        check_cancelled(cancel)?;
        let insn = &insns[from];
        let mut successors = Vec::new();

        for target in insn.branch_targets() {
            successors.push(labels.resolve(target)?);
        }
        match insn.opcode() {
            Some(RET) if matches!(insn, Insn::Var { .. }) => {
                successors.extend_from_slice(&subroutine_returns);
            }
            Some(GOTO | JSR | TABLESWITCH | LOOKUPSWITCH | IRETURN..=RETURN | ATHROW) => {}
            _ => {
                if from + 1 >= insns.len() {
                    return Err(AnalysisError::FallsOffEnd { insn: from });
                }
                successors.push(from + 1);
            }
        }
        for to in successors {
            builder.add_normal_edge(from, to);
        }

        if !insn.is_pseudo() {
            let derefs = dereferences(insn);
            for &(handler, catch_type) in &handlers[from] {
                builder.add_error_edge(from, handler, derefs && catches_npe(catch_type));
            }
        }

        for &to in &builder.graph.transitions[from] {
            if !visited[to] {
                visited[to] = true;
                pending.push(to);
            }
        }
    }
    Ok(builder.finish())
}

/// Whether `insn` throws `NullPointerException` on a `null` operand.
fn dereferences(insn: &Insn) -> bool {
    match insn.opcode() {
        Some(
            GETFIELD | PUTFIELD | INVOKEVIRTUAL | INVOKESPECIAL | INVOKEINTERFACE | ARRAYLENGTH
            | ATHROW | MONITORENTER | MONITOREXIT,
        ) => true,
        Some(op) => (IALOAD..=SALOAD).contains(&op) || (IASTORE..=SASTORE).contains(&op),
        None => false,
    }
}

fn catches_npe(catch_type: Option<&str>) -> bool {
    match catch_type {
        None => true,
        Some(name) => matches!(
            name,
            "java/lang/Throwable"
                | "java/lang/Exception"
                | "java/lang/RuntimeException"
                | "java/lang/NullPointerException"
        ),
    }
}

struct GraphBuilder {
    graph: ControlFlowGraph,
    seen: HashSet<Edge>,
}

impl GraphBuilder {
    fn new(nodes: usize) -> Self {
        Self {
            graph: ControlFlowGraph {
                transitions: vec![Vec::new(); nodes],
                may_throw: vec![false; nodes],
                ..ControlFlowGraph::default()
            },
            seen: HashSet::new(),
        }
    }

    /// Records `edge` once; returns whether it is new.
    fn insert(&mut self, edge: Edge) -> bool {
        if !self.seen.insert(edge) {
            return false;
        }
        self.graph.transitions[edge.from].push(edge.to);
        self.graph.edge_count += 1;
        true
    }

    fn add_normal_edge(&mut self, from: usize, to: usize) {
        let edge = Edge::new(from, to);
        self.insert(edge);
        self.graph.normal_edges.insert(edge);
    }

    fn add_error_edge(&mut self, from: usize, to: usize, npe: bool) {
        let edge = Edge::new(from, to);
        self.insert(edge);
        self.graph.error_edges.insert(edge);
        self.graph.may_throw[from] = true;
        if npe {
            self.graph.npe_edges.entry(from).or_insert(to);
        }
    }

    fn finish(self) -> ControlFlowGraph {
        self.graph
    }
}

#[cfg(test)]
impl ControlFlowGraph {
    /// A graph with only normal edges, in the given insertion order.
    pub(crate) fn from_edges(nodes: usize, edges: &[(usize, usize)]) -> Self {
        let mut builder = GraphBuilder::new(nodes);
        for &(from, to) in edges {
            builder.add_normal_edge(from, to);
        }
        builder.finish()
    }
}
