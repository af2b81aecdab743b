//! Control-flow graph over doubled block nodes.
//!
//! Every basic block contributes two nodes: an *enter* node and an *exit*
//! node. Normal control edges leave a block's exit and land on the target's
//! enter; exception edges leave a block's enter (an exception can occur at
//! any point inside the block) and land on the handler's enter. A single
//! dominator computation over this graph then answers both "who dominates
//! this block's code" and "who dominates this handler" questions.

pub mod dom;

pub use dom::DominatorTree;

use crate::entity::EntityRef;
use crate::ir::{BlockId, Function};

/// A node in the doubled graph. The 2n / 2n+1 encoding is confined to this
/// type; everything else goes through `enter`/`exit`/`block`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FlowNode(u32);

impl FlowNode {
    pub fn enter(block: BlockId) -> Self {
        FlowNode(block.index() as u32 * 2)
    }

    pub fn exit(block: BlockId) -> Self {
        FlowNode(block.index() as u32 * 2 + 1)
    }

    pub(crate) fn from_index(index: usize) -> Self {
        FlowNode(index as u32)
    }

    /// The block this node belongs to.
    pub fn block(self) -> BlockId {
        BlockId::new(self.0 as usize / 2)
    }

    pub fn is_enter(self) -> bool {
        self.0 % 2 == 0
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Debug for FlowNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_enter() {
            write!(f, "enter({})", self.block())
        } else {
            write!(f, "exit({})", self.block())
        }
    }
}

/// Edge lists for the doubled graph.
pub struct FlowGraph {
    succs: Vec<Vec<FlowNode>>,
    preds: Vec<Vec<FlowNode>>,
}

impl FlowGraph {
    pub fn build(func: &Function) -> Self {
        let n = func.blocks.len() * 2;
        let mut graph = FlowGraph {
            succs: vec![Vec::new(); n],
            preds: vec![Vec::new(); n],
        };

        for (id, block) in func.blocks.iter() {
            graph.add_edge(FlowNode::enter(id), FlowNode::exit(id));
            for region in &block.protected {
                graph.add_edge(FlowNode::enter(id), FlowNode::enter(region.handler));
            }
            // The terminator is normally last; scanning is defensive
            // against frontends that emit dead code after it.
            if let Some(inst) = block.insts.iter().find(|inst| inst.op.is_terminator()) {
                for target in inst.op.targets() {
                    graph.add_edge(FlowNode::exit(id), FlowNode::enter(target));
                }
            }
        }

        graph
    }

    fn add_edge(&mut self, from: FlowNode, to: FlowNode) {
        if self.succs[from.index()].contains(&to) {
            return;
        }
        self.succs[from.index()].push(to);
        self.preds[to.index()].push(from);
    }

    /// Node count (twice the block count).
    pub fn len(&self) -> usize {
        self.succs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.succs.is_empty()
    }

    pub fn successors(&self, node: FlowNode) -> &[FlowNode] {
        &self.succs[node.index()]
    }

    pub fn predecessors(&self, node: FlowNode) -> &[FlowNode] {
        &self.preds[node.index()]
    }

    pub fn incoming_count(&self, node: FlowNode) -> usize {
        self.preds[node.index()].len()
    }
}

/// Depth-first discovery positions, used for deterministic ordering of
/// sibling blocks and loop-exit candidates.
pub struct DfsOrder {
    pos: Vec<u32>,
}

impl DfsOrder {
    const UNREACHED: u32 = u32::MAX;

    pub fn compute(graph: &FlowGraph, entry: FlowNode) -> Self {
        let mut pos = vec![Self::UNREACHED; graph.len()];
        let mut next = 0u32;
        let mut stack = vec![entry];
        while let Some(node) = stack.pop() {
            if pos[node.index()] != Self::UNREACHED {
                continue;
            }
            pos[node.index()] = next;
            next += 1;
            for &succ in graph.successors(node).iter().rev() {
                if pos[succ.index()] == Self::UNREACHED {
                    stack.push(succ);
                }
            }
        }
        Self { pos }
    }

    /// Discovery position of a node; unreachable nodes sort last.
    pub fn position(&self, node: FlowNode) -> u32 {
        self.pos[node.index()]
    }
}
