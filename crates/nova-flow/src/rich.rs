use crate::cfg::ControlFlowGraph;
use crate::dfs::DfsTree;

/// A control-flow graph together with its DFS tree and reducibility verdict.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RichControlFlow {
    pub graph: ControlFlowGraph,
    pub dfs: DfsTree,
    /// Every loop has a single entry.
    pub reducible: bool,
}

impl RichControlFlow {
    #[must_use]
    pub fn new(graph: ControlFlowGraph, dfs: DfsTree) -> Self {
        let reducible = is_reducible(&graph, &dfs);
        Self {
            graph,
            dfs,
            reducible,
        }
    }

    /// The flow of a method without a body.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            reducible: true,
            ..Self::default()
        }
    }
}

/// Tarjan's interval test for reducibility.
///
/// Nodes are visited from the highest instruction index down to 0. For each
/// loop header `w`, the back-edge sources seed its body `P`, which grows
/// backwards along non-back edges. The graph is irreducible as soon as a body
/// node is entered from outside the DFS subtree of `w`. Afterwards every
/// member of `P` is collapsed into `w`.
///
/// Self-loops seed `P` with the header itself, so a self-loop entered from
/// outside its own subtree is reported irreducible.
#[must_use]
pub fn is_reducible(graph: &ControlFlowGraph, dfs: &DfsTree) -> bool {
    if dfs.back_edges().is_empty() {
        return true;
    }

    let nodes = graph.node_count();
    let mut cycle_incoming: Vec<Vec<usize>> = vec![Vec::new(); nodes];
    let mut non_cycle_incoming: Vec<Vec<usize>> = vec![Vec::new(); nodes];
    for edge in dfs.back_edges() {
        cycle_incoming[edge.to].push(edge.from);
    }
    for edge in dfs.non_back_edges() {
        non_cycle_incoming[edge.to].push(edge.from);
    }

    let mut collapsed_to: Vec<usize> = (0..nodes).collect();
    // Header whose `P` currently contains the node.
    let mut member_of: Vec<Option<usize>> = vec![None; nodes];
    let mut body = Vec::new();
    let mut worklist = Vec::new();

    for w in (0..nodes).rev() {
        if cycle_incoming[w].is_empty() {
            continue;
        }
        body.clear();
        for &x in &cycle_incoming[w] {
            if member_of[x] != Some(w) {
                member_of[x] = Some(w);
                body.push(x);
                worklist.push(x);
            }
        }

        while let Some(x) = worklist.pop() {
            for &pred in &non_cycle_incoming[x] {
                let y = collapsed_to[pred];
                if !dfs.is_descendant(y, w) {
                    return false;
                }
                if y != w && member_of[y] != Some(w) {
                    member_of[y] = Some(w);
                    body.push(y);
                    worklist.push(y);
                }
            }
        }

        for &v in &body {
            collapsed_to[v] = w;
        }
    }
    true
}
