//! Block-at-a-time function construction, used by tests and frontends.

use crate::entity::{EntityRef, PrimaryMap};

use super::block::{Block, BlockId, ProtectedRegion};
use super::func::Function;
use super::inst::{
    BinaryBranchCond, BinaryOp, BranchCond, Inst, NumKind, Op, SwitchEntry, UnaryOp,
};
use super::value::{Constant, VarId};

pub struct FunctionBuilder {
    name: String,
    blocks: PrimaryMap<BlockId, Block>,
    entry: BlockId,
    current: BlockId,
    var_count: usize,
}

impl FunctionBuilder {
    /// Creates a builder positioned at a fresh entry block.
    pub fn new(name: &str) -> Self {
        let mut blocks = PrimaryMap::new();
        let entry = blocks.push(Block::new());
        Self {
            name: name.to_string(),
            blocks,
            entry,
            current: entry,
            var_count: 0,
        }
    }

    pub fn create_block(&mut self) -> BlockId {
        self.blocks.push(Block::new())
    }

    pub fn switch_to_block(&mut self, block: BlockId) {
        self.current = block;
    }

    pub fn fresh_var(&mut self) -> VarId {
        let var = VarId::new(self.var_count);
        self.var_count += 1;
        var
    }

    fn push(&mut self, op: Op, result: Option<VarId>) {
        self.blocks[self.current].insts.push(Inst { op, result });
    }

    fn push_with_result(&mut self, op: Op) -> VarId {
        let result = self.fresh_var();
        self.push(op, Some(result));
        result
    }

    // ---------------------------------------------------------------
    // Value-producing instructions
    // ---------------------------------------------------------------

    pub fn constant(&mut self, value: Constant) -> VarId {
        self.push_with_result(Op::Const(value))
    }

    /// Writes a constant into an existing register (a re-definition).
    pub fn const_into(&mut self, dst: VarId, value: Constant) {
        self.push(Op::Const(value), Some(dst));
    }

    /// Re-computes an existing register from a binary operation.
    pub fn binary_into(&mut self, dst: VarId, op: BinaryOp, kind: NumKind, lhs: VarId, rhs: VarId) {
        self.push(Op::Binary { op, kind, lhs, rhs }, Some(dst));
    }

    pub fn const_int(&mut self, value: i64) -> VarId {
        self.constant(Constant::Int(value))
    }

    pub fn const_str(&mut self, value: &str) -> VarId {
        self.constant(Constant::Str(value.to_string()))
    }

    pub fn const_null(&mut self) -> VarId {
        self.constant(Constant::Null)
    }

    pub fn copy(&mut self, src: VarId) -> VarId {
        self.push_with_result(Op::Copy(src))
    }

    pub fn unary(&mut self, op: UnaryOp, operand: VarId) -> VarId {
        self.push_with_result(Op::Unary { op, operand })
    }

    pub fn binary(&mut self, op: BinaryOp, kind: NumKind, lhs: VarId, rhs: VarId) -> VarId {
        self.push_with_result(Op::Binary { op, kind, lhs, rhs })
    }

    pub fn add(&mut self, lhs: VarId, rhs: VarId) -> VarId {
        self.binary(BinaryOp::Add, NumKind::Int, lhs, rhs)
    }

    pub fn sub(&mut self, lhs: VarId, rhs: VarId) -> VarId {
        self.binary(BinaryOp::Sub, NumKind::Int, lhs, rhs)
    }

    pub fn mul(&mut self, lhs: VarId, rhs: VarId) -> VarId {
        self.binary(BinaryOp::Mul, NumKind::Int, lhs, rhs)
    }

    pub fn div(&mut self, lhs: VarId, rhs: VarId) -> VarId {
        self.binary(BinaryOp::Div, NumKind::Int, lhs, rhs)
    }

    pub fn compare(&mut self, lhs: VarId, rhs: VarId) -> VarId {
        self.binary(BinaryOp::Compare, NumKind::Int, lhs, rhs)
    }

    pub fn get_field(&mut self, object: Option<VarId>, field: &str) -> VarId {
        self.push_with_result(Op::GetField {
            object,
            field: field.to_string(),
        })
    }

    pub fn put_field(&mut self, object: Option<VarId>, field: &str, value: VarId) {
        self.push(
            Op::PutField {
                object,
                field: field.to_string(),
                value,
            },
            None,
        );
    }

    pub fn get_element(&mut self, array: VarId, index: VarId) -> VarId {
        self.push_with_result(Op::GetElement { array, index })
    }

    pub fn put_element(&mut self, array: VarId, index: VarId, value: VarId) {
        self.push(Op::PutElement { array, index, value }, None);
    }

    pub fn call(&mut self, function: &str, args: &[VarId]) -> VarId {
        self.push_with_result(Op::Call {
            function: function.to_string(),
            args: args.to_vec(),
        })
    }

    pub fn call_void(&mut self, function: &str, args: &[VarId]) {
        self.push(
            Op::Call {
                function: function.to_string(),
                args: args.to_vec(),
            },
            None,
        );
    }

    // ---------------------------------------------------------------
    // Terminators
    // ---------------------------------------------------------------

    pub fn branch(&mut self, cond: BranchCond, operand: VarId, if_true: BlockId, if_false: BlockId) {
        self.push(
            Op::Branch {
                cond,
                operand,
                if_true,
                if_false,
            },
            None,
        );
    }

    /// `branch NotEqual operand, 0` — taken when the operand is non-zero.
    pub fn branch_nonzero(&mut self, operand: VarId, if_true: BlockId, if_false: BlockId) {
        self.branch(BranchCond::NotEqual, operand, if_true, if_false);
    }

    pub fn branch_compare(
        &mut self,
        cond: BinaryBranchCond,
        lhs: VarId,
        rhs: VarId,
        if_true: BlockId,
        if_false: BlockId,
    ) {
        self.push(
            Op::BinaryBranch {
                cond,
                lhs,
                rhs,
                if_true,
                if_false,
            },
            None,
        );
    }

    pub fn jump(&mut self, target: BlockId) {
        self.push(Op::Jump(target), None);
    }

    pub fn switch(&mut self, operand: VarId, entries: &[(i64, BlockId)], default: BlockId) {
        let entries = entries
            .iter()
            .map(|&(value, target)| SwitchEntry { value, target })
            .collect();
        self.push(
            Op::Switch {
                operand,
                entries,
                default,
            },
            None,
        );
    }

    pub fn ret(&mut self, value: Option<VarId>) {
        self.push(Op::Return(value), None);
    }

    pub fn raise(&mut self, value: VarId) {
        self.push(Op::Raise(value), None);
    }

    // ---------------------------------------------------------------
    // Exception metadata
    // ---------------------------------------------------------------

    /// Declares a protected region on the current block.
    pub fn protect(&mut self, exception_type: Option<&str>, handler: BlockId) {
        self.blocks[self.current].protected.push(ProtectedRegion {
            exception_type: exception_type.map(str::to_string),
            handler,
        });
    }

    /// Allocates and installs the current block's exception variable.
    pub fn set_exception_var(&mut self) -> VarId {
        let var = self.fresh_var();
        self.blocks[self.current].exception_var = Some(var);
        var
    }

    pub fn build(self) -> Function {
        Function {
            name: self.name,
            blocks: self.blocks,
            entry: self.entry,
            var_count: self.var_count,
        }
    }
}
