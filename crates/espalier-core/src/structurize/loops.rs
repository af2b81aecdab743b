//! Loop structuring and the loop-exit heuristic.

use crate::ast::{LabelKind, Stmt};
use crate::entity::EntityRef;
use crate::error::CoreError;
use crate::graph::FlowNode;
use crate::ir::BlockId;

use super::{optimize, Structurer};

impl Structurer<'_> {
    /// Structures the loop headed by `head` and re-aims the traversal at
    /// the loop's chosen exit block (if it has one).
    pub(crate) fn process_loop(&mut self, head: BlockId) -> Result<(), CoreError> {
        self.flush_stack();
        self.fill_loop_nodes(head);

        let label = self.labels.alloc(LabelKind::Loop);
        let exit = match self.best_exit(head) {
            Some(exit) if self.loop_exits[exit.index()].is_none() => {
                self.loop_exits[exit.index()] = Some(label);
                Some(exit)
            }
            // Either no exit scored, or a nested loop already claimed the
            // block; every exit then goes through an explicit break.
            _ => None,
        };

        // A jump back to the head is the loop's natural continuation.
        self.jump_targets[head.index()] = Some(label);
        self.in_loop[head.index()] = true;

        let mut body = Vec::new();
        self.process_into(head, Some(head), &mut body)?;

        let mut condition = None;
        optimize::optimize_loop(&mut condition, &mut body, label);
        self.frame.stmts.push(Stmt::While {
            label,
            condition,
            body,
        });

        self.frame.current = exit;
        if let Some(exit) = exit {
            self.loop_exits[exit.index()] = None;
        }
        Ok(())
    }

    /// Marks the loop's body set: blocks from which the head is reachable
    /// backwards without leaving the region the head dominates.
    fn fill_loop_nodes(&mut self, head: BlockId) {
        for mark in self.loop_nodes.iter_mut() {
            *mark = false;
        }
        let head_enter = FlowNode::enter(head);
        let mut stack = vec![head];
        while let Some(block) = stack.pop() {
            if self.loop_nodes[block.index()] {
                continue;
            }
            self.loop_nodes[block.index()] = true;
            for &source in self.cfg.predecessors(FlowNode::enter(block)) {
                let source_block = source.block();
                if !self.loop_nodes[source_block.index()]
                    && self.dom.dominates(head_enter, source)
                {
                    stack.push(source_block);
                }
            }
        }
    }

    /// Chooses the block the loop statement should fall into.
    ///
    /// Walks the loop's dominated region; at each step the successors that
    /// leave the body set are narrowed to the one discovered latest, and
    /// that candidate is scored by how much code is reachable from it. The
    /// highest score wins; equal scores keep the earlier candidate.
    fn best_exit(&self, head: BlockId) -> Option<BlockId> {
        let mut stack = vec![head];
        let mut frontier: Vec<BlockId> = Vec::new();
        let mut best: Option<BlockId> = None;
        let mut best_score = 0u32;

        while let Some(block) = stack.pop() {
            let targets = self.dom.children_of(FlowNode::exit(block));

            for &target in targets {
                if !self.loop_nodes[target.block().index()] {
                    frontier.push(target.block());
                }
            }

            if !frontier.is_empty() {
                let mut candidate = frontier[0];
                for &other in &frontier[1..] {
                    if self.dfs.position(FlowNode::enter(candidate))
                        < self.dfs.position(FlowNode::enter(other))
                    {
                        candidate = other;
                    }
                }
                frontier.clear();
                let score = self.reachable_weight(candidate);
                if score > best_score {
                    best_score = score;
                    best = Some(candidate);
                }
            }

            for &target in targets {
                if self.loop_nodes[target.block().index()] {
                    stack.push(target.block());
                }
            }
        }

        best
    }

    /// Total instruction count of everything reachable from `start` — a
    /// proxy for "how much code hangs off this exit".
    fn reachable_weight(&self, start: BlockId) -> u32 {
        let mut weight = 0u32;
        let mut visited = vec![false; self.func.blocks.len()];
        let mut stack = vec![start];
        while let Some(block) = stack.pop() {
            if visited[block.index()] {
                continue;
            }
            visited[block.index()] = true;
            weight += self.func.blocks[block].insts.len() as u32;
            for &succ in self.cfg.successors(FlowNode::enter(block)) {
                if !visited[succ.block().index()] {
                    stack.push(succ.block());
                }
            }
            for &succ in self.cfg.successors(FlowNode::exit(block)) {
                if !visited[succ.block().index()] {
                    stack.push(succ.block());
                }
            }
        }
        weight
    }
}
