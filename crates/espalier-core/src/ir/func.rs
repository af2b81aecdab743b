use std::fmt;

use serde::{Deserialize, Serialize};

use crate::entity::PrimaryMap;

use super::block::{Block, BlockId};

/// A function in the IR: a flat register file and a list of basic blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub blocks: PrimaryMap<BlockId, Block>,
    /// Entry block — always the first block.
    pub entry: BlockId,
    /// Number of variables (registers) the function uses.
    pub var_count: usize,
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "fn {} (vars: {})", self.name, self.var_count)?;
        for (id, block) in self.blocks.iter() {
            write!(f, "{id}:")?;
            if let Some(var) = block.exception_var {
                write!(f, "  ; catches into {var}")?;
            }
            writeln!(f)?;
            for region in &block.protected {
                match &region.exception_type {
                    Some(ty) => writeln!(f, "    ; protected ({ty} -> {})", region.handler)?,
                    None => writeln!(f, "    ; protected (any -> {})", region.handler)?,
                }
            }
            for inst in &block.insts {
                writeln!(f, "    {inst}")?;
            }
        }
        Ok(())
    }
}
