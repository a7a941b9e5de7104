//! Error types for range tree construction.

use thiserror::Error;

/// Errors raised while building a [`RangeTree`](crate::RangeTree).
///
/// Tree operations themselves never fail; only a bad dimension count does.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RangeTreeError {
    /// A tree must index at least one dimension.
    #[error("a range tree needs at least one dimension")]
    ZeroDimensions,

    /// More dimensions than the tree supports.
    #[error("too many dimensions: requested {requested}, max {max}")]
    TooManyDimensions { requested: usize, max: usize },
}

/// Result type for range tree construction.
pub type Result<T> = std::result::Result<T, RangeTreeError>;
