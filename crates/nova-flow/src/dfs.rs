use std::collections::HashSet;

use tokio_util::sync::CancellationToken;

use crate::cfg::{ControlFlowGraph, Edge};
use crate::error::{check_cancelled, AnalysisError};

/// Depth-first spanning tree of a [`ControlFlowGraph`] rooted at node 0.
///
/// Every edge of the graph is classified exactly once: it is a back edge
/// when its target is still on the DFS stack, and a non-back edge (tree,
/// forward or cross) otherwise.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DfsTree {
    back: HashSet<Edge>,
    non_back: HashSet<Edge>,
    loop_enters: Vec<bool>,
    pre: Vec<Option<usize>>,
    post: Vec<Option<usize>>,
    preorder: Vec<usize>,
    postorder: Vec<usize>,
}

impl DfsTree {
    #[must_use]
    pub fn back_edges(&self) -> &HashSet<Edge> {
        &self.back
    }

    #[must_use]
    pub fn non_back_edges(&self) -> &HashSet<Edge> {
        &self.non_back
    }

    #[must_use]
    pub fn is_back_edge(&self, edge: Edge) -> bool {
        self.back.contains(&edge)
    }

    /// Whether `node` is the target of a back edge.
    #[must_use]
    pub fn is_loop_header(&self, node: usize) -> bool {
        self.loop_enters.get(node).copied().unwrap_or(false)
    }

    #[must_use]
    pub fn loop_enters(&self) -> &[bool] {
        &self.loop_enters
    }

    /// Reachable nodes in the order they were entered.
    #[must_use]
    pub fn preorder(&self) -> &[usize] {
        &self.preorder
    }

    /// Reachable nodes in the order they were exited.
    #[must_use]
    pub fn postorder(&self) -> &[usize] {
        &self.postorder
    }

    #[must_use]
    pub fn pre_number(&self, node: usize) -> Option<usize> {
        self.pre.get(node).copied().flatten()
    }

    #[must_use]
    pub fn is_reachable(&self, node: usize) -> bool {
        self.pre_number(node).is_some()
    }

    /// Whether `x` lies in the DFS subtree rooted at `w` (`x == w` included).
    #[must_use]
    pub fn is_descendant(&self, x: usize, w: usize) -> bool {
        match (self.pre[x], self.pre[w], self.post[x], self.post[w]) {
            (Some(pre_x), Some(pre_w), Some(post_x), Some(post_w)) => {
                pre_w <= pre_x && post_x <= post_w
            }
            _ => false,
        }
    }
}

/// Builds the DFS tree of `graph` iteratively.
pub fn build_dfs(
    graph: &ControlFlowGraph,
    cancel: &CancellationToken,
) -> Result<DfsTree, AnalysisError> {
    let nodes = graph.node_count();
    let mut tree = DfsTree {
        loop_enters: vec![false; nodes],
        pre: vec![None; nodes],
        post: vec![None; nodes],
        ..DfsTree::default()
    };
    if nodes == 0 {
        return Ok(tree);
    }

    let mut on_stack = vec![false; nodes];
    // (node, index of the next successor to visit)
    let mut stack: Vec<(usize, usize)> = Vec::new();
    tree.enter(0, &mut on_stack, &mut stack);

    while let Some(top) = stack.last_mut() {
        check_cancelled(cancel)?;
        let (node, next) = *top;
        top.1 += 1;
        match graph.successors(node).get(next).copied() {
            Some(succ) => {
                let edge = Edge::new(node, succ);
                if tree.pre[succ].is_none() {
                    tree.non_back.insert(edge);
                    tree.enter(succ, &mut on_stack, &mut stack);
                } else if on_stack[succ] {
                    tree.back.insert(edge);
                    tree.loop_enters[succ] = true;
                } else {
                    tree.non_back.insert(edge);
                }
            }
            None => {
                stack.pop();
                on_stack[node] = false;
                tree.post[node] = Some(tree.postorder.len());
                tree.postorder.push(node);
            }
        }
    }
    Ok(tree)
}

impl DfsTree {
    fn enter(&mut self, node: usize, on_stack: &mut [bool], stack: &mut Vec<(usize, usize)>) {
        self.pre[node] = Some(self.preorder.len());
        self.preorder.push(node);
        on_stack[node] = true;
        stack.push((node, 0));
    }
}
