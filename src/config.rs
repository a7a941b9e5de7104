//! Range tree configuration.

use crate::error::{RangeTreeError, Result};

/// Upper bound on the number of dimensions a tree may index.
pub const MAX_DIMENSIONS: usize = 64;

/// Initial capacity of the `moved`/`removed` vectors of a shift.
const DEFAULT_RESULT_CAPACITY: usize = 100;

/// Configuration for a [`RangeTree`](crate::RangeTree).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Number of dimensions (`D`), fixed for the lifetime of the tree lineage.
    pub dimensions: usize,
    /// Capacity hint for the entry lists returned by
    /// [`RangeTree::insert_at_dimension`](crate::RangeTree::insert_at_dimension).
    pub result_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dimensions: 1,
            result_capacity: DEFAULT_RESULT_CAPACITY,
        }
    }
}

impl Config {
    /// Default configuration for a tree of `dimensions` dimensions.
    pub fn with_dimensions(dimensions: usize) -> Self {
        Self {
            dimensions,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.dimensions == 0 {
            return Err(RangeTreeError::ZeroDimensions);
        }
        if self.dimensions > MAX_DIMENSIONS {
            return Err(RangeTreeError::TooManyDimensions {
                requested: self.dimensions,
                max: MAX_DIMENSIONS,
            });
        }
        Ok(())
    }
}
