//! Whole-function variable usage and definition counts.
//!
//! Computed once before structuring begins; the materialization layer
//! consults these to decide which values may be held un-materialized.

use crate::entity::EntityRef;

use super::func::Function;
use super::value::VarId;

pub struct VarInfo {
    usage: Vec<u32>,
    defs: Vec<u32>,
}

impl VarInfo {
    pub fn compute(func: &Function) -> Self {
        let mut usage = vec![0u32; func.var_count];
        let mut defs = vec![0u32; func.var_count];
        for block in func.blocks.values() {
            for inst in &block.insts {
                inst.op.for_each_use(|var| usage[var.index()] += 1);
                if let Some(result) = inst.result {
                    defs[result.index()] += 1;
                }
            }
            // A handler's exception variable is written by the dispatch
            // mechanism, not by any instruction.
            if let Some(var) = block.exception_var {
                defs[var.index()] += 1;
            }
        }
        Self { usage, defs }
    }

    pub fn usage(&self, var: VarId) -> u32 {
        self.usage[var.index()]
    }

    pub fn defs(&self, var: VarId) -> u32 {
        self.defs[var.index()]
    }

    /// A collapsible variable may be inlined at its single use instead of
    /// being materialized as an assignment.
    pub fn is_collapsible(&self, var: VarId) -> bool {
        self.defs(var) == 1 && self.usage(var) <= 1
    }
}
