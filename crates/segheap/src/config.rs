//! Tunables of a [`Heap`](crate::heap::Heap).

use derive_more::Display;

/// Size of the first heap extension performed by initialization.
pub const DEFAULT_CHUNK_SIZE: u32 = 1 << 12;

/// Strategy used to pick a free block for an allocation request.
///
/// All policies start at the size class of the request and only look at
/// larger classes; they differ in how far they keep searching.
#[derive(Debug, Display, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FitPolicy {
    /// Returns an exact-size block as soon as one is seen. Otherwise picks
    /// the tightest larger block of the first class that has any fitting
    /// block, without looking at further classes.
    #[default]
    #[display("class-local")]
    ClassLocal,
    /// Returns the first fitting block.
    #[display("first-fit")]
    FirstFit,
    /// Returns the tightest fitting block over all classes.
    #[display("best-fit")]
    BestFit,
}

/// Configuration of a heap instance.
///
/// # Examples
///
/// ```
/// use segheap::{FitPolicy, HeapConfig};
///
/// let config = HeapConfig::new()
///     .with_chunk_size(1 << 16)
///     .with_fit_policy(FitPolicy::BestFit);
/// assert_eq!(config.chunk_size, 65536);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapConfig {
    /// Bytes requested from the region right after the sentinels are laid
    /// out. Must be a multiple of 8 and at least 16.
    pub chunk_size: u32,
    pub fit_policy: FitPolicy,
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl HeapConfig {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            fit_policy: FitPolicy::ClassLocal,
        }
    }

    #[must_use]
    pub const fn with_chunk_size(mut self, chunk_size: u32) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    #[must_use]
    pub const fn with_fit_policy(mut self, fit_policy: FitPolicy) -> Self {
        self.fit_policy = fit_policy;
        self
    }
}
