//! Tree errors

use thiserror::Error;

use crate::node::NodeTag;

/// Tree result type
pub type Result<T> = std::result::Result<T, TreeError>;

/// Errors raised by tree operations
#[derive(Debug, Error)]
pub enum TreeError {
    #[error("tree modification is disabled")]
    ModificationForbidden,

    #[error("node variant mismatch: expected {expected:?}, found {found:?}")]
    VariantMismatch { expected: NodeTag, found: NodeTag },

    #[error("list element mismatch: expected {expected:?}, found {found:?}")]
    ElementMismatch { expected: NodeTag, found: NodeTag },

    #[error("index {index} out of bounds for list of length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("invalid range {start}..{end} for list of length {len}")]
    InvalidRange { start: usize, end: usize, len: usize },

    #[error("expected a list node, found {found:?}")]
    NotAList { found: NodeTag },

    #[error("expected a value node, found {found:?}")]
    NotAValue { found: NodeTag },
}
