//! Expression materialization.
//!
//! Each instruction result either becomes an explicit assignment statement
//! or is deferred for inlining at its single use. Pure values with no
//! ordering constraint go to the relocatable table and can be substituted
//! arbitrarily far away; order-sensitive values go on the pending stack
//! and may only be consumed last-computed-first. Any read that violates
//! that discipline is an internal inconsistency in the input.

use crate::ast::{Expr, Stmt};
use crate::entity::EntityRef;
use crate::error::CoreError;
use crate::ir::{BlockId, VarId};

use super::Structurer;

/// A computed value not yet committed to a statement.
pub(crate) struct Pending {
    pub(crate) var: VarId,
    pub(crate) value: Expr,
}

impl Structurer<'_> {
    /// Routes an instruction result: relocatable collapsible values go to
    /// the relocatable table, order-sensitive collapsible values to the
    /// pending stack, everything else becomes an assignment statement.
    pub(crate) fn assign_variable(&mut self, var: VarId, value: Expr, relocatable: bool) {
        if self.vars.is_collapsible(var) {
            if relocatable {
                self.relocatable[var.index()] = Some(value);
            } else {
                self.frame.pending.push(Pending { var, value });
            }
        } else {
            if !relocatable {
                self.flush_stack();
            }
            self.frame.stmts.push(Stmt::Assign {
                target: Some(Expr::Var(var)),
                value,
            });
        }
    }

    /// Constants are always relocatable; usage count does not matter as
    /// long as the variable has a single definition.
    pub(crate) fn assign_constant(&mut self, var: VarId, value: Expr) {
        if self.vars.defs(var) == 1 {
            self.relocatable[var.index()] = Some(value);
        } else {
            self.frame.stmts.push(Stmt::Assign {
                target: Some(Expr::Var(var)),
                value,
            });
        }
    }

    /// Resolves a variable read. The boolean is true when the returned
    /// expression is relocatable (safe to reorder), false when it was
    /// popped off the pending stack.
    pub(crate) fn use_var(
        &mut self,
        block: BlockId,
        var: VarId,
    ) -> Result<(Expr, bool), CoreError> {
        if let Some(value) = &self.relocatable[var.index()] {
            return Ok((value.clone(), true));
        }

        if self.vars.usage(var) == 1 {
            if matches!(self.frame.pending.last(), Some(top) if top.var == var) {
                if let Some(top) = self.frame.pending.pop() {
                    return Ok((top.value, false));
                }
            }
            // Pending but buried under later computations: inlining it
            // would reorder side effects, and it has no materialized home.
            if self.frame.pending.iter().any(|p| p.var == var) {
                return Err(CoreError::UnorderedVariable {
                    function: self.func.name.clone(),
                    var,
                    block,
                });
            }
        }

        Ok((Expr::Var(var), true))
    }

    /// Commits every pending value to an assignment statement, in
    /// computation order.
    pub(crate) fn flush_stack(&mut self) {
        let pending = std::mem::take(&mut self.frame.pending);
        for entry in pending {
            self.frame.stmts.push(Stmt::Assign {
                target: Some(Expr::Var(entry.var)),
                value: entry.value,
            });
        }
    }
}
