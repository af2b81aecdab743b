//! The program model: functions, basic blocks, instructions, variables.

pub mod block;
pub mod builder;
pub mod func;
pub mod inst;
pub mod value;
pub mod vars;

pub use block::{Block, BlockId, ProtectedRegion};
pub use builder::FunctionBuilder;
pub use func::Function;
pub use inst::{
    BinaryBranchCond, BinaryOp, BranchCond, Inst, NumKind, Op, SwitchEntry, UnaryOp,
};
pub use value::{Constant, VarId};
pub use vars::VarInfo;
