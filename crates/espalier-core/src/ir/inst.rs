use std::fmt;

use serde::{Deserialize, Serialize};

use super::block::BlockId;
use super::value::{Constant, VarId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    /// Three-way comparison producing -1/0/1.
    Compare,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// Logical short-circuit forms, produced only by the optimizer.
    And,
    Or,
}

/// Operand class of an arithmetic instruction. Integer division and
/// remainder can trap, which makes them order-sensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NumKind {
    Int,
    Float,
}

/// Condition of a unary branch: the operand is tested against zero or null.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BranchCond {
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    Null,
    NotNull,
}

/// Condition of a two-operand compare-and-branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryBranchCond {
    Equal,
    NotEqual,
}

/// One arm of a multi-way switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchEntry {
    pub value: i64,
    pub target: BlockId,
}

/// An IR instruction kind.
///
/// The set is closed: every consumer (translation, materialization, the
/// interpreter) matches exhaustively, so adding a kind is a compile error
/// at each site until it is handled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Op {
    Const(Constant),
    Copy(VarId),
    Unary {
        op: UnaryOp,
        operand: VarId,
    },
    Binary {
        op: BinaryOp,
        kind: NumKind,
        lhs: VarId,
        rhs: VarId,
    },
    GetField {
        object: Option<VarId>,
        field: String,
    },
    PutField {
        object: Option<VarId>,
        field: String,
        value: VarId,
    },
    GetElement {
        array: VarId,
        index: VarId,
    },
    PutElement {
        array: VarId,
        index: VarId,
        value: VarId,
    },
    Call {
        function: String,
        args: Vec<VarId>,
    },
    Branch {
        cond: BranchCond,
        operand: VarId,
        if_true: BlockId,
        if_false: BlockId,
    },
    BinaryBranch {
        cond: BinaryBranchCond,
        lhs: VarId,
        rhs: VarId,
        if_true: BlockId,
        if_false: BlockId,
    },
    Jump(BlockId),
    Switch {
        operand: VarId,
        entries: Vec<SwitchEntry>,
        default: BlockId,
    },
    Return(Option<VarId>),
    Raise(VarId),
}

impl Op {
    /// Whether this instruction transfers control out of its block.
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Op::Branch { .. }
                | Op::BinaryBranch { .. }
                | Op::Jump(_)
                | Op::Switch { .. }
                | Op::Return(_)
                | Op::Raise(_)
        )
    }

    /// Calls `f` for every variable this instruction reads.
    pub fn for_each_use(&self, mut f: impl FnMut(VarId)) {
        match self {
            Op::Const(_) => {}
            Op::Copy(src) => f(*src),
            Op::Unary { operand, .. } => f(*operand),
            Op::Binary { lhs, rhs, .. } => {
                f(*lhs);
                f(*rhs);
            }
            Op::GetField { object, .. } => {
                if let Some(object) = object {
                    f(*object);
                }
            }
            Op::PutField { object, value, .. } => {
                if let Some(object) = object {
                    f(*object);
                }
                f(*value);
            }
            Op::GetElement { array, index } => {
                f(*array);
                f(*index);
            }
            Op::PutElement {
                array,
                index,
                value,
            } => {
                f(*array);
                f(*index);
                f(*value);
            }
            Op::Call { args, .. } => {
                for &arg in args {
                    f(arg);
                }
            }
            Op::Branch { operand, .. } => f(*operand),
            Op::BinaryBranch { lhs, rhs, .. } => {
                f(*lhs);
                f(*rhs);
            }
            Op::Jump(_) => {}
            Op::Switch { operand, .. } => f(*operand),
            Op::Return(value) => {
                if let Some(value) = value {
                    f(*value);
                }
            }
            Op::Raise(value) => f(*value),
        }
    }

    /// Successor blocks of a terminator (empty for non-terminators).
    pub fn targets(&self) -> Vec<BlockId> {
        match self {
            Op::Branch {
                if_true, if_false, ..
            }
            | Op::BinaryBranch {
                if_true, if_false, ..
            } => vec![*if_true, *if_false],
            Op::Jump(target) => vec![*target],
            Op::Switch {
                entries, default, ..
            } => {
                let mut targets: Vec<BlockId> = Vec::with_capacity(entries.len() + 1);
                for entry in entries {
                    if !targets.contains(&entry.target) {
                        targets.push(entry.target);
                    }
                }
                if !targets.contains(default) {
                    targets.push(*default);
                }
                targets
            }
            _ => Vec::new(),
        }
    }
}

/// An instruction: an operation plus the variable receiving its result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inst {
    pub op: Op,
    pub result: Option<VarId>,
}

impl fmt::Display for Inst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(result) = self.result {
            write!(f, "{result} = ")?;
        }
        match &self.op {
            Op::Const(c) => write!(f, "const {c}"),
            Op::Copy(src) => write!(f, "copy {src}"),
            Op::Unary { op, operand } => write!(f, "{op:?} {operand}"),
            Op::Binary { op, lhs, rhs, .. } => write!(f, "{op:?} {lhs}, {rhs}"),
            Op::GetField { object, field } => match object {
                Some(object) => write!(f, "getfield {object}.{field}"),
                None => write!(f, "getfield {field}"),
            },
            Op::PutField {
                object,
                field,
                value,
            } => match object {
                Some(object) => write!(f, "putfield {object}.{field} <- {value}"),
                None => write!(f, "putfield {field} <- {value}"),
            },
            Op::GetElement { array, index } => write!(f, "getelem {array}[{index}]"),
            Op::PutElement {
                array,
                index,
                value,
            } => write!(f, "putelem {array}[{index}] <- {value}"),
            Op::Call { function, args } => {
                write!(f, "call {function}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
            Op::Branch {
                cond,
                operand,
                if_true,
                if_false,
            } => write!(f, "branch {cond:?} {operand} ? {if_true} : {if_false}"),
            Op::BinaryBranch {
                cond,
                lhs,
                rhs,
                if_true,
                if_false,
            } => write!(f, "branch {cond:?} {lhs}, {rhs} ? {if_true} : {if_false}"),
            Op::Jump(target) => write!(f, "jump {target}"),
            Op::Switch {
                operand,
                entries,
                default,
            } => {
                write!(f, "switch {operand} [")?;
                for (i, entry) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} -> {}", entry.value, entry.target)?;
                }
                write!(f, "] default {default}")
            }
            Op::Return(value) => match value {
                Some(value) => write!(f, "return {value}"),
                None => write!(f, "return"),
            },
            Op::Raise(value) => write!(f, "raise {value}"),
        }
    }
}
