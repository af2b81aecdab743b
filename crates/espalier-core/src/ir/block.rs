use serde::{Deserialize, Serialize};

use crate::define_entity;

use super::inst::Inst;
use super::value::VarId;

define_entity!(BlockId, "b");

/// A protected range declared by a block: exceptions of `exception_type`
/// raised while the block executes transfer control to `handler`.
///
/// A block's regions are ordered outermost first. `None` as the exception
/// type is a catch-all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedRegion {
    pub exception_type: Option<String>,
    pub handler: BlockId,
}

/// A basic block: an ordered instruction list ending in a terminator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub insts: Vec<Inst>,
    /// Protected regions covering this block, outermost first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub protected: Vec<ProtectedRegion>,
    /// The variable receiving the caught exception when this block is a
    /// handler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception_var: Option<VarId>,
}

impl Block {
    pub fn new() -> Self {
        Self {
            insts: Vec::new(),
            protected: Vec::new(),
            exception_var: None,
        }
    }
}

impl Default for Block {
    fn default() -> Self {
        Self::new()
    }
}
