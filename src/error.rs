use thiserror::Error;

/// The error type of tree operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The global allocator could not provide memory for a new node.
    /// The tree is left exactly as it was before the failed insert.
    #[error("Out of memory: could not allocate a tree node of {size} bytes")]
    OutOfMemory { size: usize },
}
