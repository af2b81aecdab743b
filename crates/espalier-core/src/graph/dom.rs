//! Dominator tree over the doubled flow graph (Lengauer-Tarjan).

use super::{FlowGraph, FlowNode};

const UNDEF: u32 = u32::MAX;

/// Immediate dominators plus the dominator graph (children-by-dominance).
pub struct DominatorTree {
    /// Node index -> immediate dominator node index. The entry maps to
    /// itself; unreachable nodes map to `UNDEF`.
    idom: Vec<u32>,
    /// Node index -> nodes it immediately dominates, in node order.
    children: Vec<Vec<FlowNode>>,
}

/// Iterative path compression for the Lengauer-Tarjan union-find forest.
///
/// Updates `label` entries so each node records the vertex with minimum
/// `semi` value on its path to the forest root, and compresses ancestor
/// pointers for future lookups. `usize::MAX` in `ancestor` means "root".
fn lt_compress(v: usize, ancestor: &mut [usize], label: &mut [usize], semi: &[usize]) {
    let mut path = Vec::new();
    let mut u = v;
    while ancestor[u] != usize::MAX && ancestor[ancestor[u]] != usize::MAX {
        path.push(u);
        u = ancestor[u];
    }
    for &node in path.iter().rev() {
        let a = ancestor[node];
        if semi[label[a]] < semi[label[node]] {
            label[node] = label[a];
        }
        ancestor[node] = ancestor[a];
    }
}

/// EVAL: returns the vertex with minimum semidominator on the path from
/// `v` to the root of its tree in the forest.
fn lt_eval(v: usize, ancestor: &mut [usize], label: &mut [usize], semi: &[usize]) -> usize {
    if ancestor[v] == usize::MAX {
        return v;
    }
    lt_compress(v, ancestor, label, semi);
    label[v]
}

impl DominatorTree {
    /// Nearly linear time with path compression. Unreachable nodes get no
    /// dominator and no children.
    pub fn build(graph: &FlowGraph, entry: FlowNode) -> Self {
        let node_count = graph.len();

        // Phase 1: iterative DFS numbering (avoids stack overflow on large
        // functions).
        let mut dfnum = vec![UNDEF; node_count];
        let mut vertex: Vec<usize> = Vec::new();
        let mut dfs_parent: Vec<usize> = Vec::new();

        let mut stack: Vec<(usize, usize)> = vec![(entry.index(), usize::MAX)];
        while let Some((node, parent_df)) = stack.pop() {
            if dfnum[node] != UNDEF {
                continue;
            }
            let df = vertex.len();
            dfnum[node] = df as u32;
            vertex.push(node);
            dfs_parent.push(parent_df);

            for succ in graph.successors(FlowNode::from_index(node)).iter().rev() {
                if dfnum[succ.index()] == UNDEF {
                    stack.push((succ.index(), df));
                }
            }
        }

        let n = vertex.len();
        let mut idom = vec![UNDEF; node_count];
        idom[entry.index()] = entry.index() as u32;

        if n > 1 {
            // Phase 2: compute semidominators and immediate dominators.
            let mut semi: Vec<usize> = (0..n).collect();
            let mut idom_idx: Vec<usize> = vec![0; n];
            let mut ancestor: Vec<usize> = vec![usize::MAX; n];
            let mut label: Vec<usize> = (0..n).collect();
            let mut bucket: Vec<Vec<usize>> = vec![Vec::new(); n];

            for i in (1..n).rev() {
                let w = vertex[i];
                let p = dfs_parent[i];

                for pred in graph.predecessors(FlowNode::from_index(w)) {
                    let pred_df = dfnum[pred.index()];
                    if pred_df != UNDEF {
                        let u = lt_eval(pred_df as usize, &mut ancestor, &mut label, &semi);
                        if semi[u] < semi[i] {
                            semi[i] = semi[u];
                        }
                    }
                }

                bucket[semi[i]].push(i);
                ancestor[i] = p;

                for v in std::mem::take(&mut bucket[p]) {
                    let u = lt_eval(v, &mut ancestor, &mut label, &semi);
                    idom_idx[v] = if semi[u] < semi[v] { u } else { p };
                }
            }

            // Phase 3: adjust immediate dominators.
            for i in 1..n {
                if idom_idx[i] != semi[i] {
                    idom_idx[i] = idom_idx[idom_idx[i]];
                }
            }

            for i in 1..n {
                idom[vertex[i]] = vertex[idom_idx[i]] as u32;
            }
        }

        // Dominator graph: children immediately dominated by each node.
        let mut children: Vec<Vec<FlowNode>> = vec![Vec::new(); node_count];
        for node in 0..node_count {
            let d = idom[node];
            if d != UNDEF && d as usize != node {
                children[d as usize].push(FlowNode::from_index(node));
            }
        }

        Self { idom, children }
    }

    /// The immediate dominator of `node`, or `None` for the entry and for
    /// unreachable nodes.
    pub fn immediate_dominator(&self, node: FlowNode) -> Option<FlowNode> {
        let d = self.idom[node.index()];
        if d == UNDEF || d as usize == node.index() {
            None
        } else {
            Some(FlowNode::from_index(d as usize))
        }
    }

    /// Whether `a` dominates `b` (reflexive).
    pub fn dominates(&self, a: FlowNode, b: FlowNode) -> bool {
        let mut cur = b.index();
        loop {
            if cur == a.index() {
                return true;
            }
            let d = self.idom[cur];
            if d == UNDEF || d as usize == cur {
                return false;
            }
            cur = d as usize;
        }
    }

    /// Nodes immediately dominated by `node`, in node order.
    pub fn children_of(&self, node: FlowNode) -> &[FlowNode] {
        &self.children[node.index()]
    }
}
