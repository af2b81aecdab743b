//! Protected-region structuring.
//!
//! A block's declared regions are compared against the engine's open-region
//! stack on every visit. A region that passes the regularity test opens as
//! a properly nested protected-region statement and closes — wrapping the
//! statements produced in between and structuring its handler as the catch
//! sub-tree — when the traversal reaches a block outside its range. A
//! region that fails the test is never opened: the block's dominated
//! children (its handler included) are threaded as an ordinary labeled
//! chain and the exception edge stays implicit for the code generator.

use crate::entity::EntityRef;
use crate::error::CoreError;
use crate::graph::FlowNode;
use crate::ir::{BlockId, ProtectedRegion};
use crate::ast::Stmt;

use super::Structurer;

/// A protected region currently being built.
pub(crate) struct OpenRegion {
    exception_type: Option<String>,
    handler: BlockId,
    /// Statement index in the opening frame where the region's body began.
    start: usize,
}

impl OpenRegion {
    fn matches(&self, region: &ProtectedRegion) -> bool {
        self.exception_type == region.exception_type && self.handler == region.handler
    }
}

impl Structurer<'_> {
    /// Reconciles the open-region stack with `block`'s declared regions:
    /// closes regions the block no longer declares, then opens every
    /// not-yet-open declared region that is regular.
    pub(crate) fn sync_regions(&mut self, block: BlockId) -> Result<(), CoreError> {
        let func = self.func;
        let declared = &func.blocks[block].protected;

        let mut common = 0;
        while common < declared.len()
            && common < self.open_regions.len()
            && self.open_regions[common].matches(&declared[common])
        {
            common += 1;
        }

        // Regions opened by an enclosing frame are never closed from here;
        // a divergence below that depth is tolerated as irregular.
        let keep = common.max(self.frame.region_base);
        self.close_regions_to(keep)?;
        if self.open_regions.len() != common {
            return Ok(());
        }

        while self.open_regions.len() < declared.len() {
            let index = self.open_regions.len();
            let region = &declared[index];
            if !self.region_is_regular(block, region, index) {
                break;
            }
            self.handler_in_use[region.handler.index()] += 1;
            self.open_regions.push(OpenRegion {
                exception_type: region.exception_type.clone(),
                handler: region.handler,
                start: self.frame.stmts.len(),
            });
        }
        Ok(())
    }

    /// Closes open regions down to `target` depth, innermost first. Each
    /// close wraps the statements produced since the region opened and
    /// structures the handler block as the catch sub-tree, with the
    /// frame's continuation as the handler's implicit next block.
    pub(crate) fn close_regions_to(&mut self, target: usize) -> Result<(), CoreError> {
        while self.open_regions.len() > target {
            let Some(region) = self.open_regions.pop() else {
                break;
            };
            let body = self.frame.stmts.split_off(region.start);
            self.handler_in_use[region.handler.index()] -= 1;

            let mut handler = Vec::new();
            let next = self.frame.current;
            self.process_into(region.handler, next, &mut handler)?;

            let exception_var = self.func.blocks[region.handler].exception_var;
            self.frame.stmts.push(Stmt::Try {
                body,
                exception_type: region.exception_type,
                exception_var,
                handler,
            });
        }
        Ok(())
    }

    /// A region is regular when every way into its handler agrees on it:
    /// each predecessor of the handler's enter node (other than this block)
    /// must declare the identical handler/exception-type pair at the same
    /// nesting index. The handler must also still be unclaimed.
    fn region_is_regular(&self, block: BlockId, region: &ProtectedRegion, index: usize) -> bool {
        let handler = region.handler;
        if self.visited[handler.index()] || self.handler_in_use[handler.index()] > 0 {
            return false;
        }
        self.cfg
            .predecessors(FlowNode::enter(handler))
            .iter()
            .all(|&pred| {
                let pred_block = pred.block();
                if pred_block == block {
                    return true;
                }
                match self.func.blocks[pred_block].protected.get(index) {
                    Some(other) => *other == *region,
                    None => false,
                }
            })
    }

    /// Handles a block whose enter node immediately dominates more than its
    /// own code: handlers of irregular regions and merge points reachable
    /// only through exception edges. Those children are threaded as a
    /// labeled chain so forward jumps can reach them; returns false when
    /// the block has no such children.
    pub(crate) fn process_region_header(&mut self, block: BlockId) -> Result<bool, CoreError> {
        if self.in_region_chain[block.index()] {
            return Ok(false);
        }

        let mut children: Vec<BlockId> = self
            .dom
            .children_of(FlowNode::enter(block))
            .iter()
            .map(|node| node.block())
            .filter(|&child| child != block)
            .filter(|&child| self.handler_in_use[child.index()] == 0)
            .filter(|&child| !self.opens_regularly(block, child))
            .collect();
        if children.is_empty() {
            return Ok(false);
        }

        children.push(block);
        children.sort_by_key(|&child| self.dfs.position(FlowNode::enter(child)));

        let labels = self.assign_labels(&children);
        self.in_region_chain[block.index()] = true;
        self.seal_children(&children, &labels, None)?;
        Ok(true)
    }

    /// Whether `child` is the handler of a region this block will open as
    /// a nested protected-region statement.
    fn opens_regularly(&self, block: BlockId, child: BlockId) -> bool {
        self.func.blocks[block]
            .protected
            .iter()
            .enumerate()
            .any(|(index, region)| {
                region.handler == child && self.region_is_regular(block, region, index)
            })
    }
}
