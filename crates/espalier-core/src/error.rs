//! Error type shared across the core.

use thiserror::Error;

use crate::ir::{BlockId, VarId};

/// Fatal failures raised by the engine.
///
/// Every variant indicates an internal inconsistency in the input program
/// or its dominance data — a bug in an upstream pass, not a user error.
/// Each carries the function name and the offending block so the caller
/// can dump the IR alongside (`Function` implements `Display`).
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{function}: block {block} does not end with a terminator")]
    MissingTerminator { function: String, block: BlockId },

    #[error("{function}: instruction in {block} produces a value but has no result variable")]
    MissingResult { function: String, block: BlockId },

    #[error("{function}: no jump label assigned for target block {block}")]
    MissingJumpTarget { function: String, block: BlockId },

    #[error(
        "{function}: {var} read in {block} out of order: not relocatable, \
         not on top of the pending stack, and never materialized"
    )]
    UnorderedVariable {
        function: String,
        var: VarId,
        block: BlockId,
    },

    #[error("{function}: block {block} structured twice")]
    RevisitedBlock { function: String, block: BlockId },
}
