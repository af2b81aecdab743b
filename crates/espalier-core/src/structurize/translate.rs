//! Per-instruction translation into expressions and statements.
//!
//! Straight-line instructions feed the materialization layer; control
//! transfers call back into the traversal's branch/switch/jump handlers.

use crate::ast::{Expr, Stmt};
use crate::error::CoreError;
use crate::graph::FlowNode;
use crate::ir::{BinaryOp, BlockId, BranchCond, Constant, Inst, NumKind, Op};

use super::Structurer;

/// Whether an arithmetic operation is free of side effects. Integer
/// division and remainder can trap, so they stay ordered.
fn op_is_pure(op: BinaryOp, kind: NumKind) -> bool {
    match op {
        BinaryOp::Div | BinaryOp::Rem => kind == NumKind::Float,
        _ => true,
    }
}

/// `(a - b) cmp 0` and `(a <=> b) cmp 0` compare the operands directly.
fn fold_zero_compare(op: BinaryOp, value: Expr) -> Expr {
    match value {
        Expr::Binary {
            op: BinaryOp::Sub | BinaryOp::Compare,
            lhs,
            rhs,
        } => Expr::Binary { op, lhs, rhs },
        other => Expr::binary(op, other, Expr::int(0)),
    }
}

impl Structurer<'_> {
    pub(crate) fn translate_block(&mut self, block: BlockId) -> Result<(), CoreError> {
        let func = self.func;
        for inst in &func.blocks[block].insts {
            if self.translate_inst(block, inst)? {
                return Ok(());
            }
        }
        Err(CoreError::MissingTerminator {
            function: func.name.clone(),
            block,
        })
    }

    fn expect_result(&self, block: BlockId, inst: &Inst) -> Result<crate::ir::VarId, CoreError> {
        inst.result.ok_or_else(|| CoreError::MissingResult {
            function: self.func.name.clone(),
            block,
        })
    }

    /// Translates one instruction; returns true when it was a terminator.
    fn translate_inst(&mut self, block: BlockId, inst: &Inst) -> Result<bool, CoreError> {
        match &inst.op {
            Op::Const(constant) => {
                let result = self.expect_result(block, inst)?;
                self.assign_constant(result, Expr::Const(constant.clone()));
            }

            Op::Copy(src) => {
                let result = self.expect_result(block, inst)?;
                let (value, relocatable) = self.use_var(block, *src)?;
                self.assign_variable(result, value, relocatable);
            }

            Op::Unary { op, operand } => {
                let result = self.expect_result(block, inst)?;
                let (operand, relocatable) = self.use_var(block, *operand)?;
                self.assign_variable(result, Expr::unary(*op, operand), relocatable);
            }

            Op::Binary { op, kind, lhs, rhs } => {
                let result = self.expect_result(block, inst)?;
                // Operands resolve in reverse: the right operand was
                // computed last, so it sits on top of the pending stack.
                let (rhs, rhs_relocatable) = self.use_var(block, *rhs)?;
                let (lhs, lhs_relocatable) = self.use_var(block, *lhs)?;
                let relocatable = op_is_pure(*op, *kind) && lhs_relocatable && rhs_relocatable;
                self.assign_variable(result, Expr::binary(*op, lhs, rhs), relocatable);
            }

            Op::GetField { object, field } => {
                let result = self.expect_result(block, inst)?;
                let object = match object {
                    Some(object) => Some(Box::new(self.use_var(block, *object)?.0)),
                    None => None,
                };
                let value = Expr::GetField {
                    object,
                    field: field.clone(),
                };
                self.assign_variable(result, value, false);
            }

            Op::PutField {
                object,
                field,
                value,
            } => {
                let (value, _) = self.use_var(block, *value)?;
                let object = match object {
                    Some(object) => Some(Box::new(self.use_var(block, *object)?.0)),
                    None => None,
                };
                self.flush_stack();
                self.frame.stmts.push(Stmt::Assign {
                    target: Some(Expr::GetField {
                        object,
                        field: field.clone(),
                    }),
                    value,
                });
            }

            Op::GetElement { array, index } => {
                let result = self.expect_result(block, inst)?;
                let (index, _) = self.use_var(block, *index)?;
                let (array, _) = self.use_var(block, *array)?;
                let value = Expr::GetElement {
                    array: Box::new(array),
                    index: Box::new(index),
                };
                self.assign_variable(result, value, false);
            }

            Op::PutElement {
                array,
                index,
                value,
            } => {
                let (value, _) = self.use_var(block, *value)?;
                let (index, _) = self.use_var(block, *index)?;
                let (array, _) = self.use_var(block, *array)?;
                self.flush_stack();
                self.frame.stmts.push(Stmt::Assign {
                    target: Some(Expr::GetElement {
                        array: Box::new(array),
                        index: Box::new(index),
                    }),
                    value,
                });
            }

            Op::Call { function, args } => {
                let mut arg_exprs = Vec::with_capacity(args.len());
                for &arg in args.iter().rev() {
                    arg_exprs.push(self.use_var(block, arg)?.0);
                }
                arg_exprs.reverse();
                let call = Expr::Call {
                    function: function.clone(),
                    args: arg_exprs,
                };
                match inst.result {
                    Some(result) => self.assign_variable(result, call, false),
                    None => {
                        self.flush_stack();
                        self.frame.stmts.push(Stmt::Assign {
                            target: None,
                            value: call,
                        });
                    }
                }
            }

            Op::Branch {
                cond,
                operand,
                if_true,
                if_false,
            } => {
                let condition = self.zero_condition(block, *cond, *operand)?;
                self.branch(block, condition, *if_true, *if_false)?;
                return Ok(true);
            }

            Op::BinaryBranch {
                cond,
                lhs,
                rhs,
                if_true,
                if_false,
            } => {
                let (rhs, _) = self.use_var(block, *rhs)?;
                let (lhs, _) = self.use_var(block, *lhs)?;
                let op = match cond {
                    crate::ir::BinaryBranchCond::Equal => BinaryOp::Eq,
                    crate::ir::BinaryBranchCond::NotEqual => BinaryOp::Ne,
                };
                self.branch(block, Expr::binary(op, lhs, rhs), *if_true, *if_false)?;
                return Ok(true);
            }

            Op::Jump(target) => {
                let source = FlowNode::exit(block);
                if self.dom.immediate_dominator(FlowNode::enter(*target)) == Some(source) {
                    // Falling through to dominated code; the traversal
                    // simply continues there.
                    self.frame.current = Some(*target);
                } else {
                    self.flush_stack();
                    self.exit_dominated_region(*target)?;
                }
                return Ok(true);
            }

            Op::Switch {
                operand,
                entries,
                default,
            } => {
                let (value, _) = self.use_var(block, *operand)?;
                self.switch_branch(block, value, entries, *default)?;
                return Ok(true);
            }

            Op::Return(value) => {
                let value = match value {
                    Some(value) => Some(self.use_var(block, *value)?.0),
                    None => None,
                };
                self.flush_stack();
                // A bare `return` at a point where the function falls off
                // the end anyway is elided.
                if self.frame.next.is_some() || value.is_some() {
                    self.frame.stmts.push(Stmt::Return { value });
                }
                self.frame.current = None;
                return Ok(true);
            }

            Op::Raise(value) => {
                let (value, _) = self.use_var(block, *value)?;
                self.flush_stack();
                self.frame.stmts.push(Stmt::Throw { value });
                self.frame.current = None;
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Builds the condition of a unary branch: the operand tested against
    /// zero or null.
    fn zero_condition(
        &mut self,
        block: BlockId,
        cond: BranchCond,
        operand: crate::ir::VarId,
    ) -> Result<Expr, CoreError> {
        let (value, _) = self.use_var(block, operand)?;
        Ok(match cond {
            BranchCond::Null => Expr::binary(BinaryOp::Eq, value, Expr::Const(Constant::Null)),
            BranchCond::NotNull => Expr::binary(BinaryOp::Ne, value, Expr::Const(Constant::Null)),
            BranchCond::Equal => fold_zero_compare(BinaryOp::Eq, value),
            BranchCond::NotEqual => fold_zero_compare(BinaryOp::Ne, value),
            BranchCond::Less => fold_zero_compare(BinaryOp::Lt, value),
            BranchCond::LessOrEqual => fold_zero_compare(BinaryOp::Le, value),
            BranchCond::Greater => fold_zero_compare(BinaryOp::Gt, value),
            BranchCond::GreaterOrEqual => fold_zero_compare(BinaryOp::Ge, value),
        })
    }
}
