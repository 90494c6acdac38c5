//! Growable byte regions backing a heap.
//!
//! A region plays the role of `sbrk`: it hands out more bytes at its end
//! and never moves or shrinks what it already handed out. Two
//! implementations are provided:
//!
//! - [`VecRegion`] owns a `Vec<u8>` and caps its length at a configurable
//!   limit, which makes exhaustion deterministic.
//! - [`SliceRegion`] carves a caller-provided buffer, suitable for `no_std`
//!   environments where the heap lives in a fixed memory range.

use alloc::vec::Vec;

use snafu::{ResultExt as _, ensure};

use crate::error::{GrowError, LimitExceededSnafu, ReserveSnafu};

/// Default byte limit of a [`VecRegion`].
pub const DEFAULT_REGION_LIMIT: usize = 20 * (1 << 20);

/// Largest region addressable by 32-bit heap offsets.
pub const MAX_REGION_SIZE: usize = u32::MAX as usize;

/// The growth primitive consumed by a heap.
pub trait MemoryRegion {
    /// Extends the region by exactly `delta` bytes.
    ///
    /// Returns the offset of the first added byte, which is the length of
    /// the region before the call. On failure the region is unchanged.
    fn grow(&mut self, delta: usize) -> Result<usize, GrowError>;

    /// All bytes handed out so far.
    fn as_bytes(&self) -> &[u8];

    fn as_bytes_mut(&mut self) -> &mut [u8];

    fn len(&self) -> usize {
        self.as_bytes().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A region backed by an owned, zero-initialized `Vec<u8>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VecRegion {
    bytes: Vec<u8>,
    limit: usize,
}

impl Default for VecRegion {
    fn default() -> Self {
        Self::new()
    }
}

impl VecRegion {
    /// Creates an empty region limited to [`DEFAULT_REGION_LIMIT`] bytes.
    #[must_use]
    pub const fn new() -> Self {
        Self::with_limit(DEFAULT_REGION_LIMIT)
    }

    /// Creates an empty region that refuses to grow past `limit` bytes.
    ///
    /// The limit is clamped to [`MAX_REGION_SIZE`].
    #[must_use]
    pub const fn with_limit(limit: usize) -> Self {
        let limit = if limit > MAX_REGION_SIZE {
            MAX_REGION_SIZE
        } else {
            limit
        };
        Self {
            bytes: Vec::new(),
            limit,
        }
    }

    #[must_use]
    pub const fn limit(&self) -> usize {
        self.limit
    }

    /// Changes the byte limit. Lowering it below the current length only
    /// prevents further growth.
    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit.min(MAX_REGION_SIZE);
    }
}

impl MemoryRegion for VecRegion {
    fn grow(&mut self, delta: usize) -> Result<usize, GrowError> {
        let base = self.bytes.len();
        let available = self.limit.saturating_sub(base);
        ensure!(
            delta <= available,
            LimitExceededSnafu {
                requested: delta,
                available,
            }
        );
        self.bytes
            .try_reserve_exact(delta)
            .context(ReserveSnafu { requested: delta })?;
        self.bytes.resize(base + delta, 0);
        Ok(base)
    }

    fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

/// A region carved out of a borrowed buffer.
///
/// The buffer is handed out front to back; the region is exhausted once
/// its break reaches the end of the buffer.
#[derive(Debug)]
pub struct SliceRegion<'a> {
    buffer: &'a mut [u8],
    brk: usize,
}

impl<'a> SliceRegion<'a> {
    /// Creates an empty region over `buffer`.
    ///
    /// Only the first [`MAX_REGION_SIZE`] bytes of the buffer are used.
    #[must_use]
    pub fn new(buffer: &'a mut [u8]) -> Self {
        let len = buffer.len().min(MAX_REGION_SIZE);
        Self {
            buffer: &mut buffer[..len],
            brk: 0,
        }
    }

    /// Total number of bytes this region can hand out.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }
}

impl MemoryRegion for SliceRegion<'_> {
    fn grow(&mut self, delta: usize) -> Result<usize, GrowError> {
        let base = self.brk;
        let available = self.buffer.len() - base;
        ensure!(
            delta <= available,
            LimitExceededSnafu {
                requested: delta,
                available,
            }
        );
        self.brk += delta;
        Ok(base)
    }

    fn as_bytes(&self) -> &[u8] {
        &self.buffer[..self.brk]
    }

    fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.buffer[..self.brk]
    }
}
