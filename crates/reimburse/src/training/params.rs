//! Tree growth parameters.

use thiserror::Error;

/// Errors from [`TreeParams::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParamValidationError {
    #[error("max_depth must be at least 1, got {0}")]
    InvalidMaxDepth(u32),
    #[error("min_samples_leaf must be at least 1, got {0}")]
    InvalidMinSamplesLeaf(u32),
    #[error("min_samples_split must be at least 2, got {0}")]
    InvalidMinSamplesSplit(u32),
}

/// Structure limits for a single regression tree.
///
/// # Example
///
/// ```
/// use reimburse::training::TreeParams;
///
/// let outlier = TreeParams::new(8, 2);
/// assert_eq!(outlier.min_samples_split, 2);
/// assert!(outlier.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeParams {
    /// Maximum depth of any leaf. Default: 12.
    pub max_depth: u32,
    /// Minimum number of cases in each leaf. Default: 3.
    pub min_samples_leaf: u32,
    /// Minimum number of cases a node needs to be considered for a split. Default: 2.
    pub min_samples_split: u32,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self::new(12, 3)
    }
}

impl TreeParams {
    /// Depth and leaf-size limits with the default split minimum.
    pub fn new(max_depth: u32, min_samples_leaf: u32) -> Self {
        Self {
            max_depth,
            min_samples_leaf,
            min_samples_split: 2,
        }
    }

    pub fn with_min_samples_split(mut self, min_samples_split: u32) -> Self {
        self.min_samples_split = min_samples_split;
        self
    }

    pub fn validate(&self) -> Result<(), ParamValidationError> {
        if self.max_depth == 0 {
            return Err(ParamValidationError::InvalidMaxDepth(self.max_depth));
        }
        if self.min_samples_leaf == 0 {
            return Err(ParamValidationError::InvalidMinSamplesLeaf(self.min_samples_leaf));
        }
        if self.min_samples_split < 2 {
            return Err(ParamValidationError::InvalidMinSamplesSplit(self.min_samples_split));
        }
        Ok(())
    }

    /// Smallest node that could still be split into two legal leaves.
    #[inline]
    pub(crate) fn min_splittable(&self) -> usize {
        (self.min_samples_split as usize).max(2 * self.min_samples_leaf as usize)
    }
}
