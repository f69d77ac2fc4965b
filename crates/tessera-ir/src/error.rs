//! Error types for the Tessera IR.

/// Structural problems found by [`Function::verify`](crate::Function::verify).
#[derive(Debug, thiserror::Error)]
pub enum IrError {
    /// A handle index is out of bounds for its arena.
    #[error("{what} handle {index} out of bounds (arena size: {size})")]
    BadHandle {
        what: &'static str,
        index: usize,
        size: usize,
    },

    /// A phi does not have exactly one source per predecessor.
    #[error("phi {phi} in block {block} has sources from {sources:?}, predecessors are {predecessors:?}")]
    PhiSourceMismatch {
        phi: usize,
        block: usize,
        sources: Vec<usize>,
        predecessors: Vec<usize>,
    },

    /// A phi appears after a non-phi instruction.
    #[error("phi {phi} in block {block} follows a non-phi instruction")]
    MisplacedPhi { phi: usize, block: usize },

    /// A block's predecessor list disagrees with the terminators.
    #[error("block {block} lists predecessors {listed:?}, but is reached from {actual:?}")]
    PredecessorMismatch {
        block: usize,
        listed: Vec<usize>,
        actual: Vec<usize>,
    },
}
