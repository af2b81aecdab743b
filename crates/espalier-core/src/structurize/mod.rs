//! Structured control flow reconstruction.
//!
//! Consumes a function's basic blocks in dominance order and produces a
//! goto-free statement tree: loops, conditionals, switches, protected
//! regions, and break/continue statements targeting labels.
//!
//! The traversal keeps a single mutable [`Frame`] (current block, expected
//! fall-through block, output statements, pending expression stack). Every
//! recursive sub-structuring — a conditional arm, a switch clause, a loop
//! body, a handler — swaps in a fresh frame and restores the old one
//! afterwards, so no state leaks between nesting levels.
//!
//! Blocks reachable by several paths ("shared successors" of a branch) are
//! threaded as a chain of nested labeled blocks; a forward jump into that
//! chain becomes a `break` to the matching label. Labels a finished tree
//! never jumps to are unwrapped before the tree is returned.

mod exprs;
mod loops;
mod optimize;
mod regions;
mod translate;

use std::mem;

use crate::ast::{Expr, LabelId, LabelKind, Labels, Stmt, StructuredBody};
use crate::entity::EntityRef;
use crate::error::CoreError;
use crate::graph::{DfsOrder, DominatorTree, FlowGraph, FlowNode};
use crate::ir::{BlockId, Function, VarInfo};

use self::exprs::Pending;
use self::regions::OpenRegion;

/// Structures a function's CFG into a statement tree.
///
/// The graph must be reducible and consistent with its dominance data;
/// inconsistencies abort with a [`CoreError`] naming the offending block.
pub fn structurize(func: &Function) -> Result<StructuredBody, CoreError> {
    let cfg = FlowGraph::build(func);
    let entry = FlowNode::enter(func.entry);
    let dfs = DfsOrder::compute(&cfg, entry);
    let dom = DominatorTree::build(&cfg, entry);
    let vars = VarInfo::compute(func);

    let block_count = func.blocks.len();
    Structurer {
        func,
        cfg,
        dfs,
        dom,
        vars,
        labels: Labels::new(),
        relocatable: vec![None; func.var_count],
        jump_targets: vec![None; block_count],
        loop_exits: vec![None; block_count],
        in_loop: vec![false; block_count],
        in_region_chain: vec![false; block_count],
        loop_nodes: vec![false; block_count],
        visited: vec![false; block_count],
        handler_in_use: vec![0; block_count],
        open_regions: Vec::new(),
        frame: Frame {
            current: Some(func.entry),
            next: None,
            stmts: Vec::new(),
            pending: Vec::new(),
            region_base: 0,
        },
    }
    .run()
}

/// Per-nesting-level traversal state.
pub(crate) struct Frame {
    /// The next block to consume; `None` means this level is finished.
    pub(crate) current: Option<BlockId>,
    /// The block fall-through is expected to reach; a jump there emits
    /// nothing.
    pub(crate) next: Option<BlockId>,
    /// Output statements of this level.
    pub(crate) stmts: Vec<Stmt>,
    /// Computed-but-unmaterialized values, last computed on top.
    pub(crate) pending: Vec<Pending>,
    /// Depth of the open-region stack when this frame was entered; regions
    /// opened deeper always close before the frame returns.
    pub(crate) region_base: usize,
}

pub(crate) struct Structurer<'a> {
    pub(crate) func: &'a Function,
    pub(crate) cfg: FlowGraph,
    pub(crate) dfs: DfsOrder,
    pub(crate) dom: DominatorTree,
    pub(crate) vars: VarInfo,
    pub(crate) labels: Labels,
    /// Pure values substituted at any later use of their variable.
    pub(crate) relocatable: Vec<Option<Expr>>,
    /// Per block: the label a jump to that block targets.
    pub(crate) jump_targets: Vec<Option<LabelId>>,
    /// Per block: the loop this block terminates, if it is a loop's
    /// designated exit.
    pub(crate) loop_exits: Vec<Option<LabelId>>,
    /// Loop heads currently (or previously) being structured.
    pub(crate) in_loop: Vec<bool>,
    /// Blocks whose dominated children are being threaded as a chain.
    pub(crate) in_region_chain: Vec<bool>,
    /// Membership marks for the loop currently being structured.
    pub(crate) loop_nodes: Vec<bool>,
    pub(crate) visited: Vec<bool>,
    /// Handlers claimed by an open protected region.
    pub(crate) handler_in_use: Vec<u32>,
    pub(crate) open_regions: Vec<OpenRegion>,
    pub(crate) frame: Frame,
}

impl<'a> Structurer<'a> {
    fn run(mut self) -> Result<StructuredBody, CoreError> {
        self.walk()?;
        let mut statements = mem::take(&mut self.frame.stmts);
        unwrap_unused_labels(&mut statements, &self.labels);
        Ok(StructuredBody {
            statements,
            labels: self.labels,
        })
    }

    /// The main loop: consumes blocks until the current frame is finished,
    /// then closes any protected regions the frame opened.
    fn walk(&mut self) -> Result<(), CoreError> {
        while let Some(block) = self.frame.current {
            if !self.in_loop[block.index()] && self.is_loop_head(block) {
                self.process_loop(block)?;
            } else if self.process_region_header(block)? {
                // The block's dominated children were threaded as a
                // labeled chain; `current` has been re-aimed.
            } else {
                if self.visited[block.index()] {
                    return Err(CoreError::RevisitedBlock {
                        function: self.func.name.clone(),
                        block,
                    });
                }
                self.visited[block.index()] = true;
                self.sync_regions(block)?;
                self.translate_block(block)?;
            }
        }
        let base = self.frame.region_base;
        self.close_regions_to(base)
    }

    /// Structures `block` (and everything it dominates) into `out`, with
    /// `next` as the expected fall-through target. The caller's frame is
    /// fully isolated from the nested traversal.
    pub(crate) fn process_into(
        &mut self,
        block: BlockId,
        next: Option<BlockId>,
        out: &mut Vec<Stmt>,
    ) -> Result<(), CoreError> {
        let fresh = Frame {
            current: Some(block),
            next,
            stmts: mem::take(out),
            pending: Vec::new(),
            region_base: self.open_regions.len(),
        };
        let saved = mem::replace(&mut self.frame, fresh);
        let result = self.walk();
        let finished = mem::replace(&mut self.frame, saved);
        *out = finished.stmts;
        result
    }

    /// A block is a loop head iff some edge into its enter node originates
    /// from a node it dominates.
    fn is_loop_head(&self, block: BlockId) -> bool {
        let enter = FlowNode::enter(block);
        self.cfg
            .predecessors(enter)
            .iter()
            .any(|&source| self.dom.dominates(enter, source))
    }

    /// A branch target is owned by the branch iff the branching block's
    /// exit node is its immediate dominator and the branch edge is its only
    /// way in.
    pub(crate) fn owns_branch(&self, block: BlockId, target: BlockId) -> bool {
        self.dom.immediate_dominator(FlowNode::enter(target)) == Some(FlowNode::exit(block))
            && self.cfg.incoming_count(FlowNode::enter(target)) == 1
    }

    // -----------------------------------------------------------------
    // Jump statements
    // -----------------------------------------------------------------

    /// The statement a jump to `target` becomes: nothing when the target is
    /// the expected fall-through, `continue` when the target's label is a
    /// loop, `break` otherwise.
    pub(crate) fn jump_statement(
        &mut self,
        target: BlockId,
        next: Option<BlockId>,
    ) -> Result<Option<Stmt>, CoreError> {
        if Some(target) == next {
            return Ok(None);
        }
        let label = self.jump_targets[target.index()].ok_or_else(|| {
            CoreError::MissingJumpTarget {
                function: self.func.name.clone(),
                block: target,
            }
        })?;
        self.labels.note_use(label);
        Ok(Some(match self.labels.kind(label) {
            LabelKind::Loop => Stmt::Continue { target: label },
            LabelKind::Block => Stmt::Break { target: label },
        }))
    }

    pub(crate) fn add_jump(
        &mut self,
        out: &mut Vec<Stmt>,
        target: BlockId,
        next: Option<BlockId>,
    ) -> Result<(), CoreError> {
        if let Some(stmt) = self.jump_statement(target, next)? {
            out.push(stmt);
        }
        Ok(())
    }

    /// Leaves the region dominated by the current block: emits the jump (if
    /// any) and finishes the frame.
    pub(crate) fn exit_dominated_region(&mut self, target: BlockId) -> Result<(), CoreError> {
        let next = self.frame.next;
        if let Some(stmt) = self.jump_statement(target, next)? {
            self.frame.stmts.push(stmt);
        }
        self.frame.current = None;
        Ok(())
    }

    // -----------------------------------------------------------------
    // Conditional branches
    // -----------------------------------------------------------------

    pub(crate) fn branch(
        &mut self,
        block: BlockId,
        condition: Expr,
        if_true: BlockId,
        if_false: BlockId,
    ) -> Result<(), CoreError> {
        self.flush_stack();

        if let Some(label) = self.loop_exits[if_true.index()] {
            self.loop_exit_branch(condition, label, if_false);
            return Ok(());
        }
        if let Some(label) = self.loop_exits[if_false.index()] {
            self.loop_exit_branch(optimize::not(condition), label, if_true);
            return Ok(());
        }

        let source = FlowNode::exit(block);
        let owns_true = self.owns_branch(block, if_true);
        let owns_false = self.owns_branch(block, if_false);

        let mut child_blocks: Vec<BlockId> = self
            .dom
            .children_of(source)
            .iter()
            .map(|node| node.block())
            .filter(|&child| !(owns_true && child == if_true) && !(owns_false && child == if_false))
            .collect();
        child_blocks.sort_by_key(|&child| self.dfs.position(FlowNode::enter(child)));

        let labels = self.assign_labels(&child_blocks);
        let block_after = child_blocks.first().copied().or(self.frame.next);

        let mut consequent = Vec::new();
        if owns_true {
            self.process_into(if_true, block_after, &mut consequent)?;
        } else {
            self.add_jump(&mut consequent, if_true, block_after)?;
        }

        let mut alternative = Vec::new();
        if owns_false {
            self.process_into(if_false, block_after, &mut alternative)?;
        } else {
            self.add_jump(&mut alternative, if_false, block_after)?;
        }

        let mut condition = condition;
        optimize::optimize_if(&mut condition, &mut consequent, &mut alternative);
        let if_stmt = Stmt::If {
            condition,
            consequent,
            alternative,
        };

        self.seal_children(&child_blocks, &labels, Some(if_stmt))
    }

    // -----------------------------------------------------------------
    // Switches
    // -----------------------------------------------------------------

    pub(crate) fn switch_branch(
        &mut self,
        block: BlockId,
        value: Expr,
        entries: &[crate::ir::SwitchEntry],
        default: BlockId,
    ) -> Result<(), CoreError> {
        self.flush_stack();
        let source = FlowNode::exit(block);

        // Distinct targets, default last.
        let mut targets: Vec<BlockId> = Vec::new();
        for entry in entries {
            if entry.target != default && !targets.contains(&entry.target) {
                targets.push(entry.target);
            }
        }
        targets.push(default);

        let mut owned = vec![false; self.func.blocks.len()];
        for &target in &targets {
            if self.owns_branch(block, target) {
                owned[target.index()] = true;
            }
        }

        let mut child_blocks: Vec<BlockId> = self
            .dom
            .children_of(source)
            .iter()
            .map(|node| node.block())
            .filter(|&child| !owned[child.index()])
            .collect();
        child_blocks.sort_by_key(|&child| self.dfs.position(FlowNode::enter(child)));

        let labels = self.assign_labels(&child_blocks);
        let block_after = child_blocks.first().copied().or(self.frame.next);

        // One clause per distinct non-default target, in first-encounter
        // order; labels mapping to the same target coalesce.
        let mut clause_targets: Vec<BlockId> = Vec::new();
        let mut clauses: Vec<crate::ast::SwitchClause> = Vec::new();
        for entry in entries {
            if entry.target == default {
                continue;
            }
            let index = match clause_targets.iter().position(|&t| t == entry.target) {
                Some(index) => index,
                None => {
                    let mut clause_body = Vec::new();
                    if owned[entry.target.index()] {
                        self.process_into(entry.target, block_after, &mut clause_body)?;
                    } else {
                        self.add_jump(&mut clause_body, entry.target, block_after)?;
                    }
                    clause_targets.push(entry.target);
                    clauses.push(crate::ast::SwitchClause {
                        values: Vec::new(),
                        body: clause_body,
                    });
                    clauses.len() - 1
                }
            };
            clauses[index].values.push(entry.value);
        }
        for clause in &mut clauses {
            clause.values.sort_unstable();
        }

        let mut default_body = Vec::new();
        if owned[default.index()] {
            self.process_into(default, block_after, &mut default_body)?;
        } else {
            self.add_jump(&mut default_body, default, block_after)?;
        }

        let switch_stmt = Stmt::Switch {
            value,
            clauses,
            default: default_body,
        };
        self.seal_children(&child_blocks, &labels, Some(switch_stmt))
    }

    /// `if (cond) break <loop>;` — the branch leaves the loop through its
    /// designated exit; traversal continues along the staying edge.
    fn loop_exit_branch(&mut self, condition: Expr, loop_label: LabelId, next: BlockId) {
        self.frame.stmts.push(Stmt::If {
            condition,
            consequent: vec![Stmt::Break { target: loop_label }],
            alternative: Vec::new(),
        });
        self.frame.current = Some(next);
    }

    // -----------------------------------------------------------------
    // Shared-successor chains
    // -----------------------------------------------------------------

    pub(crate) fn assign_labels(&mut self, children: &[BlockId]) -> Vec<LabelId> {
        children
            .iter()
            .map(|&child| {
                let label = self.labels.alloc(LabelKind::Block);
                self.jump_targets[child.index()] = Some(label);
                label
            })
            .collect()
    }

    /// Threads `children` (already in discovery order) as a chain of nested
    /// labeled blocks around `main`, so a jump to `children[i]` becomes a
    /// break landing exactly at that child's code. The last child becomes
    /// the frame's continuation.
    pub(crate) fn seal_children(
        &mut self,
        children: &[BlockId],
        labels: &[LabelId],
        main: Option<Stmt>,
    ) -> Result<(), CoreError> {
        if children.is_empty() {
            if let Some(main) = main {
                self.frame.stmts.push(main);
            }
            self.frame.current = None;
            return Ok(());
        }

        let mut body: Vec<Stmt> = Vec::new();
        if let Some(main) = main {
            body.push(main);
        }
        let last = children.len() - 1;
        for i in 0..children.len() {
            self.optimize_labeled(labels[i], &mut body);
            let sealed = mem::take(&mut body);
            if i < last {
                self.add_child(labels[i], sealed, &mut body);
                self.process_into(children[i], Some(children[i + 1]), &mut body)?;
            } else {
                let mut out = mem::take(&mut self.frame.stmts);
                self.add_child(labels[i], sealed, &mut out);
                self.frame.stmts = out;
            }
        }
        self.frame.current = Some(children[last]);
        Ok(())
    }

    /// Materializes a sealed child as a labeled block, or splices its body
    /// when nothing jumps to it.
    fn add_child(&self, label: LabelId, body: Vec<Stmt>, out: &mut Vec<Stmt>) {
        if self.labels.use_count(label) > 0 {
            out.push(Stmt::Labeled { label, body });
        } else {
            out.extend(body);
        }
    }

    /// Break elimination on a freshly sealed labeled block: while the first
    /// statement is a conditional whose consequent ends by breaking out of
    /// this very block, fold the remainder of the block into the
    /// conditional's alternative arm.
    fn optimize_labeled(&mut self, label: LabelId, body: &mut Vec<Stmt>) {
        loop {
            let Some(Stmt::If { consequent, .. }) = body.first() else {
                break;
            };
            if !matches!(consequent.last(), Some(Stmt::Break { target }) if *target == label) {
                break;
            }
            let tail: Vec<Stmt> = body.split_off(1);
            if let Some(Stmt::If {
                condition,
                consequent,
                alternative,
            }) = body.first_mut()
            {
                consequent.pop();
                alternative.extend(tail);
                optimize::optimize_if(condition, consequent, alternative);
            }
            self.labels.release_use(label);
        }
    }
}

/// Splices the bodies of labeled blocks nothing jumps to.
fn unwrap_unused_labels(stmts: &mut Vec<Stmt>, labels: &Labels) {
    let old = mem::take(stmts);
    for mut stmt in old {
        match &mut stmt {
            Stmt::Labeled { label, body } => {
                unwrap_unused_labels(body, labels);
                if labels.use_count(*label) == 0 {
                    stmts.append(body);
                    continue;
                }
            }
            Stmt::While { body, .. } => unwrap_unused_labels(body, labels),
            Stmt::If {
                consequent,
                alternative,
                ..
            } => {
                unwrap_unused_labels(consequent, labels);
                unwrap_unused_labels(alternative, labels);
            }
            Stmt::Switch {
                clauses, default, ..
            } => {
                for clause in clauses {
                    unwrap_unused_labels(&mut clause.body, labels);
                }
                unwrap_unused_labels(default, labels);
            }
            Stmt::Try { body, handler, .. } => {
                unwrap_unused_labels(body, labels);
                unwrap_unused_labels(handler, labels);
            }
            _ => {}
        }
        stmts.push(stmt);
    }
}

#[cfg(test)]
mod tests;
