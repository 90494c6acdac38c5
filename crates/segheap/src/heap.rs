//! The allocator core.
//!
//! A [`Heap`] owns a [`MemoryRegion`] and lays out blocks inside it with
//! boundary tags, keeps free blocks in segregated size-class lists, and
//! merges neighboring free blocks as soon as a block is released.
//!
//! # Memory Layout
//!
//! ```text
//! base    +4         +8         +16                              end
//! ┌──────┬──────────┬──────────┬──────────────────────┬─────┬──────────┐
//! │ pad  │ prologue │ prologue │ block | block | ...  │ ... │ epilogue │
//! │      │ header   │ footer   │                      │     │ header   │
//! └──────┴──────────┴──────────┴──────────────────────┴─────┴──────────┘
//! ```
//!
//! The prologue is an allocated block without payload and the epilogue a
//! zero-size allocated header. They make every real block have a readable
//! predecessor footer and successor header, so coalescing needs no
//! boundary checks. Growing the heap turns the old epilogue header into
//! the header of the new block and writes a fresh epilogue at the end.
//!
//! # Example
//!
//! ```
//! use segheap::{Heap, VecRegion};
//!
//! let mut heap = Heap::new(VecRegion::new()).unwrap();
//!
//! let a = heap.allocate(100).unwrap();
//! heap.payload_mut(a).unwrap()[..5].copy_from_slice(b"hello");
//!
//! let a = heap.reallocate(Some(a), 1000).unwrap();
//! assert_eq!(&heap.payload(a).unwrap()[..5], b"hello");
//!
//! heap.deallocate(Some(a));
//! heap.check().unwrap();
//! ```

use core::fmt;

use log::{debug, trace, warn};
use snafu::{ResultExt as _, ensure};

use crate::{
    block::{Blocks, HeapPtr},
    check::{self, HeapStats},
    codec::{self, ALIGNMENT, MIN_BLOCK_SIZE, OVERHEAD, Tag, WORD_SIZE},
    coalesce::coalesce,
    config::HeapConfig,
    error::{
        CheckError, GrowError, GrowSnafu, InitError, InvalidChunkSizeSnafu,
        LimitExceededSnafu, MisalignedRegionSnafu, RegionTooLargeSnafu,
    },
    free_list::FreeLists,
    region::MemoryRegion,
};

/// Bytes laid out by initialization: padding word, prologue header and
/// footer, epilogue header.
const PREAMBLE_SIZE: u32 = 4 * WORD_SIZE;

/// A segregated-fit heap over a growable region.
///
/// Every operation takes `&mut self`, so a heap is used by one thread of
/// control at a time; wrap it in a [`LockedHeap`](crate::locked::LockedHeap)
/// to share it.
///
/// Pointers handed out by the heap are payload offsets ([`HeapPtr`]); the
/// payload bytes are reached through [`payload`](Self::payload) and
/// [`payload_mut`](Self::payload_mut).
pub struct Heap<R> {
    region: R,
    free_lists: FreeLists,
    config: HeapConfig,
    /// Offset of the padding word in front of the prologue.
    start: u32,
    /// Payload offset of the epilogue, which is also the end of the region.
    epilogue: u32,
}

impl<R> fmt::Debug for Heap<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Heap")
            .field("config", &self.config)
            .field("start", &self.start)
            .field("epilogue", &self.epilogue)
            .finish_non_exhaustive()
    }
}

impl<R> Heap<R>
where
    R: MemoryRegion,
{
    /// Creates a heap over `region` with the default configuration.
    ///
    /// See [`with_config`](Self::with_config).
    pub fn new(region: R) -> Result<Self, InitError> {
        Self::with_config(region, HeapConfig::default())
    }

    /// Creates a heap over `region`.
    ///
    /// Lays out the prologue and epilogue sentinels at the current end of
    /// the region, then extends the heap with one free block of
    /// `config.chunk_size` bytes.
    ///
    /// # Errors
    ///
    /// Fails if the chunk size is not a multiple of 8 or smaller than the
    /// minimum block size, if the region end is not 8-byte aligned or does
    /// not fit in 32 bits, or if the region cannot grow.
    pub fn with_config(mut region: R, config: HeapConfig) -> Result<Self, InitError> {
        let chunk_size = config.chunk_size;
        ensure!(
            chunk_size >= MIN_BLOCK_SIZE && chunk_size.is_multiple_of(ALIGNMENT),
            InvalidChunkSizeSnafu { size: chunk_size }
        );
        let base = region.len();
        ensure!(
            base.is_multiple_of(ALIGNMENT as usize),
            MisalignedRegionSnafu { base }
        );
        let start = u32::try_from(base)
            .ok()
            .filter(|start| start.checked_add(PREAMBLE_SIZE).is_some())
            .ok_or_else(|| RegionTooLargeSnafu { base }.build())?;

        let mut heap = Self {
            region,
            free_lists: FreeLists::new(),
            config,
            start,
            epilogue: start + PREAMBLE_SIZE,
        };
        heap.region
            .grow(PREAMBLE_SIZE as usize)
            .context(GrowSnafu)?;

        let prologue = heap.prologue();
        let bytes = heap.region.as_bytes_mut();
        codec::write_word(bytes, start, 0);
        codec::write_tag(bytes, codec::header(prologue), Tag::PROLOGUE);
        codec::write_tag(bytes, prologue, Tag::PROLOGUE);
        codec::write_tag(bytes, codec::header(heap.epilogue), Tag::EPILOGUE);

        heap.extend(chunk_size).context(GrowSnafu)?;
        debug!(
            "initialized heap at {start:#x} with {chunk_size} bytes ({} policy)",
            config.fit_policy
        );
        Ok(heap)
    }

    #[must_use]
    pub fn config(&self) -> &HeapConfig {
        &self.config
    }

    #[must_use]
    pub fn region(&self) -> &R {
        &self.region
    }

    /// Consumes the heap and returns its region.
    #[must_use]
    pub fn into_region(self) -> R {
        self.region
    }

    /// Number of region bytes managed by this heap, sentinels included.
    #[must_use]
    pub fn heap_size(&self) -> usize {
        (self.epilogue - self.start) as usize
    }

    /// Allocates a block with at least `size` usable bytes.
    ///
    /// The request is rounded up to a block size (payload plus 8 bytes of
    /// tags, multiple of 8). The free lists are searched with the
    /// configured [`FitPolicy`](crate::config::FitPolicy); if no block fits,
    /// the heap grows by the missing amount, reusing a free block at the
    /// end of the heap when there is one.
    ///
    /// # Returns
    ///
    /// The payload offset of the new block, always a multiple of 8, or
    /// `None` if `size` is zero or the region cannot grow. A failed
    /// allocation leaves the heap unchanged.
    pub fn allocate(&mut self, size: usize) -> Option<HeapPtr> {
        if size == 0 {
            return None;
        }
        let Some(asize) = codec::adjust_size(size) else {
            warn!("allocation of {size} bytes exceeds the heap offset space");
            return None;
        };

        let fit = self
            .free_lists
            .find_fit(self.region.as_bytes(), asize, self.config.fit_policy);
        let bp = match fit {
            Some(bp) => bp,
            None => {
                let last = codec::read_tag(self.region.as_bytes(), self.epilogue - OVERHEAD);
                let request = if last.is_allocated() {
                    asize
                } else {
                    // the trailing free block would have been found otherwise
                    debug_assert!(last.size() < asize);
                    asize - last.size()
                };
                match self.extend(request) {
                    Ok(bp) => bp,
                    Err(e) => {
                        warn!("allocation of {size} bytes failed: {e}");
                        return None;
                    }
                }
            }
        };

        self.place(bp, asize);
        trace!("allocate({size}) -> {bp:#x}");
        Some(HeapPtr::from_offset(bp))
    }

    /// Allocates a zero-filled block for `count` elements of `size` bytes.
    ///
    /// Returns `None` if the product overflows, is zero, or the allocation
    /// fails.
    pub fn allocate_zeroed(&mut self, count: usize, size: usize) -> Option<HeapPtr> {
        let total = count.checked_mul(size)?;
        let ptr = self.allocate(total)?;
        if let Some(payload) = self.payload_mut(ptr) {
            payload.fill(0);
        }
        Some(ptr)
    }

    /// Releases the block at `ptr`.
    ///
    /// `None` is ignored. The block is merged with free neighbors right
    /// away. Pointers that do not designate an allocated block (never
    /// handed out, already released, or absorbed by a merge) are ignored
    /// as well, so releasing the same pointer twice is harmless as long as
    /// nothing was allocated in between.
    pub fn deallocate(&mut self, ptr: Option<HeapPtr>) {
        let Some(ptr) = ptr else {
            return;
        };
        let Some(bp) = self.allocated_block(ptr) else {
            warn!("ignoring deallocation of {ptr}: not an allocated block");
            return;
        };

        let bytes = self.region.as_bytes_mut();
        let size = codec::block_size(bytes, bp);
        codec::write_boundary(bytes, bp, size, false);
        let merged = coalesce(&mut self.free_lists, bytes, bp);
        trace!("deallocate({ptr}) -> free block {merged:#x}");
    }

    /// Resizes the block at `ptr` to hold at least `size` bytes.
    ///
    /// - `ptr == None` behaves as [`allocate`](Self::allocate).
    /// - `size == 0` behaves as [`deallocate`](Self::deallocate) and
    ///   returns `None`.
    ///
    /// The block is resized in place whenever possible: when shrinking,
    /// when a free successor provides enough room, or when the block is the
    /// last one of the heap and the region can grow by the shortfall. In
    /// those cases `ptr` itself is returned and nothing is copied.
    /// Otherwise a new block is allocated, the payload is copied up to the
    /// smaller of both sizes, and the old block is released.
    ///
    /// # Returns
    ///
    /// The (possibly unchanged) payload offset, or `None` on failure. On
    /// failure the original block and its contents are left untouched.
    pub fn reallocate(&mut self, ptr: Option<HeapPtr>, size: usize) -> Option<HeapPtr> {
        let Some(ptr) = ptr else {
            return self.allocate(size);
        };
        if size == 0 {
            self.deallocate(Some(ptr));
            return None;
        }
        let Some(bp) = self.allocated_block(ptr) else {
            warn!("ignoring reallocation of {ptr}: not an allocated block");
            return None;
        };
        let Some(asize) = codec::adjust_size(size) else {
            warn!("reallocation to {size} bytes exceeds the heap offset space");
            return None;
        };

        if self.resize_in_place(bp, asize) {
            trace!("reallocate({ptr}, {size}) -> {ptr} (in place)");
            return Some(ptr);
        }

        let old_len = codec::block_size(self.region.as_bytes(), bp) - OVERHEAD;
        let new_ptr = self.allocate(size)?;
        let copy_len = (old_len as usize).min(size);
        let src = bp as usize;
        self.region
            .as_bytes_mut()
            .copy_within(src..src + copy_len, new_ptr.as_usize());
        self.deallocate(Some(ptr));
        trace!("reallocate({ptr}, {size}) -> {new_ptr} (moved {copy_len} bytes)");
        Some(new_ptr)
    }

    /// Payload bytes of the allocated block at `ptr`.
    ///
    /// Returns `None` if `ptr` does not designate an allocated block.
    #[must_use]
    pub fn payload(&self, ptr: HeapPtr) -> Option<&[u8]> {
        let bp = self.allocated_block(ptr)?;
        let bytes = self.region.as_bytes();
        let end = bp + codec::block_size(bytes, bp) - OVERHEAD;
        Some(&bytes[bp as usize..end as usize])
    }

    /// Mutable payload bytes of the allocated block at `ptr`.
    ///
    /// Returns `None` if `ptr` does not designate an allocated block.
    pub fn payload_mut(&mut self, ptr: HeapPtr) -> Option<&mut [u8]> {
        let bp = self.allocated_block(ptr)?;
        let bytes = self.region.as_bytes_mut();
        let end = bp + codec::block_size(bytes, bp) - OVERHEAD;
        Some(&mut bytes[bp as usize..end as usize])
    }

    /// Number of usable payload bytes of the allocated block at `ptr`.
    #[must_use]
    pub fn usable_size(&self, ptr: HeapPtr) -> Option<usize> {
        self.payload(ptr).map(<[u8]>::len)
    }

    /// Iterates over every block between the prologue and the epilogue.
    #[must_use]
    pub fn blocks(&self) -> Blocks<'_> {
        Blocks::new(self.region.as_bytes(), self.first_block(), self.epilogue)
    }

    /// Verifies every structural invariant of the heap.
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    pub fn check(&self) -> Result<HeapStats, CheckError> {
        check::check_heap(
            self.region.as_bytes(),
            self.prologue(),
            self.epilogue,
            &self.free_lists,
        )
    }

    #[cfg(test)]
    pub(crate) fn free_lists(&self) -> &FreeLists {
        &self.free_lists
    }

    const fn prologue(&self) -> u32 {
        self.start + ALIGNMENT
    }

    const fn first_block(&self) -> u32 {
        self.prologue() + ALIGNMENT
    }

    /// Appends a free block of `size` bytes at the end of the heap and
    /// merges it with a free last block.
    ///
    /// `size` may be smaller than the minimum block size only when the
    /// last block is free, since the two are merged right away.
    fn extend(&mut self, size: u32) -> Result<u32, GrowError> {
        ensure!(
            self.epilogue.checked_add(size).is_some(),
            LimitExceededSnafu {
                requested: size as usize,
                available: (u32::MAX - self.epilogue) as usize,
            }
        );
        let base = self.region.grow(size as usize)?;
        debug_assert_eq!(base, self.epilogue as usize);

        let bp = self.epilogue;
        self.epilogue = bp + size;
        let bytes = self.region.as_bytes_mut();
        codec::write_boundary(bytes, bp, size, false);
        codec::write_tag(bytes, codec::header(self.epilogue), Tag::EPILOGUE);
        debug!(
            "extended heap by {size} bytes to {} bytes",
            self.epilogue - self.start
        );
        Ok(coalesce(&mut self.free_lists, bytes, bp))
    }

    /// Allocates `asize` bytes out of the free block at `bp`.
    fn place(&mut self, bp: u32, asize: u32) {
        let bytes = self.region.as_bytes_mut();
        let size = codec::block_size(bytes, bp);
        self.free_lists.remove(bytes, bp);
        self.carve(bp, size, asize);
    }

    /// Marks the unlinked range of `size` bytes at `bp` as an allocated
    /// block of `asize` bytes.
    ///
    /// The remainder becomes a new free block if it can hold one, and is
    /// absorbed as internal fragmentation otherwise.
    fn carve(&mut self, bp: u32, size: u32, asize: u32) {
        debug_assert!(asize <= size);
        let bytes = self.region.as_bytes_mut();
        if size - asize >= MIN_BLOCK_SIZE {
            codec::write_boundary(bytes, bp, asize, true);
            let rest = bp + asize;
            codec::write_boundary(bytes, rest, size - asize, false);
            coalesce(&mut self.free_lists, bytes, rest);
        } else {
            codec::write_boundary(bytes, bp, size, true);
        }
    }

    /// Tries to give the allocated block at `bp` a size of `asize` without
    /// moving it.
    ///
    /// Returns `false` with the heap unchanged if that is not possible.
    fn resize_in_place(&mut self, bp: u32, asize: u32) -> bool {
        let bytes = self.region.as_bytes();
        let size = codec::block_size(bytes, bp);
        if asize <= size {
            self.carve(bp, size, asize);
            return true;
        }

        let next = bp + size;
        let next_tag = codec::read_tag(bytes, codec::header(next));
        let next_free = !next_tag.is_allocated();
        let (available, tail) = if next_free {
            (size + next_tag.size(), next + next_tag.size())
        } else {
            (size, next)
        };

        if available >= asize {
            let bytes = self.region.as_bytes_mut();
            self.free_lists.remove(bytes, next);
            codec::clear_seam(bytes, next);
            self.carve(bp, available, asize);
            return true;
        }

        if tail != self.epilogue {
            return false;
        }

        // the block (and its free successor) ends the heap: grow by the
        // shortfall and extend in place
        let shortfall = asize - available;
        if let Err(e) = self.region.grow(shortfall as usize) {
            debug!("cannot grow block {bp:#x} in place: {e}");
            return false;
        }
        let bytes = self.region.as_bytes_mut();
        if next_free {
            self.free_lists.remove(bytes, next);
            codec::clear_seam(bytes, next);
        }
        self.epilogue = tail + shortfall;
        codec::write_tag(bytes, codec::header(self.epilogue), Tag::EPILOGUE);
        codec::write_boundary(bytes, bp, asize, true);
        debug!(
            "extended heap by {shortfall} bytes to {} bytes",
            self.epilogue - self.start
        );
        true
    }

    /// Validates `ptr` and returns its payload offset if it designates an
    /// allocated block.
    ///
    /// This catches pointers outside the heap, misaligned pointers, double
    /// releases and pointers into merged blocks, but not every forged
    /// pointer into the middle of a payload.
    fn allocated_block(&self, ptr: HeapPtr) -> Option<u32> {
        let bp = ptr.offset();
        if bp < self.first_block() || bp >= self.epilogue || !bp.is_multiple_of(ALIGNMENT) {
            return None;
        }
        let bytes = self.region.as_bytes();
        let tag = codec::read_tag(bytes, codec::header(bp));
        if !tag.is_allocated() || tag.size() < MIN_BLOCK_SIZE {
            return None;
        }
        let end = bp.checked_add(tag.size())?;
        if end > self.epilogue || codec::read_tag(bytes, end - OVERHEAD) != tag {
            return None;
        }
        Some(bp)
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::{block::Block, config::FitPolicy, region::VecRegion};

    /// Wraps a heap so that every allocation is filled with a pattern that
    /// is verified on release, and the heap is checked after each step.
    struct TestHeap {
        heap: Heap<VecRegion>,
    }

    impl TestHeap {
        fn new(limit: usize) -> Self {
            Self::with_config(limit, HeapConfig::default())
        }

        fn with_config(limit: usize, config: HeapConfig) -> Self {
            let heap = Heap::with_config(VecRegion::with_limit(limit), config).unwrap();
            heap.check().unwrap();
            Self { heap }
        }

        fn allocate(&mut self, size: usize) -> Option<HeapPtr> {
            let ptr = self.heap.allocate(size)?;
            assert_eq!(ptr.offset() % ALIGNMENT, 0);
            self.heap.payload_mut(ptr).unwrap()[..size].fill(0x33);
            self.heap.check().unwrap();
            Some(ptr)
        }

        fn deallocate(&mut self, ptr: HeapPtr, size: usize) {
            assert!(self.heap.payload(ptr).unwrap()[..size].iter().all(|&b| b == 0x33));
            self.heap.payload_mut(ptr).unwrap().fill(0x55);
            self.heap.deallocate(Some(ptr));
            self.heap.check().unwrap();
        }
    }

    #[test]
    fn test_init_layout() {
        let heap = Heap::new(VecRegion::new()).unwrap();
        assert_eq!(heap.heap_size(), 16 + 4096);
        let blocks = heap.blocks().collect::<Vec<_>>();
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].is_free());
        assert_eq!(blocks[0].ptr(), HeapPtr::from_offset(16));
        assert_eq!(blocks[0].size(), 4096);
        let stats = heap.check().unwrap();
        assert_eq!(stats.free_blocks, 1);
        assert_eq!(stats.free_bytes, 4096);
        assert_eq!(stats.allocated_blocks, 0);
    }

    #[test]
    fn test_init_rejects_bad_chunk_size() {
        for size in [0, 8, 20] {
            let config = HeapConfig::new().with_chunk_size(size);
            let err = Heap::with_config(VecRegion::new(), config).unwrap_err();
            assert!(matches!(err, InitError::InvalidChunkSize { .. }));
        }
    }

    #[test]
    fn test_init_fails_without_room() {
        let err = Heap::new(VecRegion::with_limit(1024)).unwrap_err();
        assert!(matches!(err, InitError::Grow { .. }));
        let err = Heap::new(VecRegion::with_limit(8)).unwrap_err();
        assert!(matches!(err, InitError::Grow { .. }));
    }

    #[test]
    fn test_init_on_non_empty_region() {
        let mut region = VecRegion::new();
        region.grow(64).unwrap();
        let mut heap = Heap::new(region).unwrap();
        let ptr = heap.allocate(10).unwrap();
        assert_eq!(ptr.offset(), 64 + 16);
        heap.check().unwrap();

        let mut region = VecRegion::new();
        region.grow(12).unwrap();
        let err = Heap::new(region).unwrap_err();
        assert!(matches!(err, InitError::MisalignedRegion { base: 12, .. }));
    }

    #[test]
    fn test_allocate_zero() {
        let mut heap = TestHeap::new(1 << 20);
        assert_eq!(heap.heap.allocate(0), None);
        assert_eq!(heap.heap.allocate(usize::MAX), None);
        heap.heap.check().unwrap();
    }

    #[test]
    fn test_allocate_splits_block() {
        let mut heap = TestHeap::new(1 << 20);
        let ptr = heap.allocate(100).unwrap();
        assert_eq!(ptr.offset(), 16);
        assert_eq!(heap.heap.usable_size(ptr), Some(104));
        let blocks = heap.heap.blocks().collect::<Vec<_>>();
        assert_eq!(blocks.len(), 2);
        assert!(blocks[0].is_allocated());
        assert_eq!(blocks[0].size(), 112);
        assert!(blocks[1].is_free());
        assert_eq!(blocks[1].size(), 4096 - 112);
    }

    #[test]
    fn test_allocate_absorbs_small_remainder() {
        let mut heap = TestHeap::with_config(1 << 20, HeapConfig::new().with_chunk_size(128));
        // a 120-byte block leaves 8 bytes, too small to split off
        let ptr = heap.allocate(112).unwrap();
        assert_eq!(heap.heap.usable_size(ptr), Some(120));
        assert_eq!(heap.heap.blocks().count(), 1);
    }

    #[test]
    fn test_free_then_reuse_exact_fit() {
        let mut heap = TestHeap::new(1 << 20);
        let a = heap.allocate(100).unwrap();
        let b = heap.allocate(200).unwrap();
        heap.deallocate(a, 100);
        let c = heap.allocate(90).unwrap();
        assert_eq!(c, a);
        heap.deallocate(b, 200);
        heap.deallocate(c, 90);
        assert_eq!(heap.heap.check().unwrap().free_blocks, 1);
    }

    #[test]
    fn test_free_then_reuse_same_size() {
        let mut heap = TestHeap::new(1 << 20);
        let a = heap.allocate(64).unwrap();
        heap.deallocate(a, 64);
        let b = heap.allocate(64).unwrap();
        assert_eq!(b, a);
    }

    #[test]
    fn test_coalescing_restores_single_block() {
        let mut heap = TestHeap::new(1 << 20);
        let ptrs = (0..8).map(|_| heap.allocate(64).unwrap()).collect::<Vec<_>>();
        // free every other block, then the rest
        for ptr in ptrs.iter().step_by(2) {
            heap.deallocate(*ptr, 64);
        }
        assert_eq!(heap.heap.check().unwrap().free_blocks, 5);
        for ptr in ptrs.iter().skip(1).step_by(2) {
            heap.deallocate(*ptr, 64);
        }
        let stats = heap.heap.check().unwrap();
        assert_eq!(stats.free_blocks, 1);
        assert_eq!(stats.free_bytes, 4096);
    }

    #[test]
    fn test_grow_when_no_fit() {
        let mut heap = TestHeap::new(1 << 20);
        let a = heap.allocate(4000).unwrap();
        let b = heap.allocate(4000).unwrap();
        assert!(b > a);
        assert!(heap.heap.heap_size() > 16 + 4096);
        heap.deallocate(a, 4000);
        heap.deallocate(b, 4000);
    }

    #[test]
    fn test_grow_reuses_free_tail() {
        let mut heap = TestHeap::new(1 << 20);
        let a = heap.allocate(1000).unwrap();
        // 3088 free bytes remain at the tail; only the shortfall is requested
        let before = heap.heap.heap_size();
        let b = heap.allocate(4000).unwrap();
        assert_eq!(b.offset(), a.offset() + 1008);
        assert_eq!(heap.heap.heap_size(), before + (4008 - (4096 - 1008)) as usize);
        assert_eq!(heap.heap.check().unwrap().free_blocks, 0);
    }

    #[test]
    fn test_out_of_memory_keeps_allocations() {
        let mut heap = TestHeap::new(16 * 1024);
        let mut ptrs = Vec::new();
        while let Some(ptr) = heap.allocate(1000) {
            ptrs.push(ptr);
        }
        assert!(ptrs.len() >= 10);
        assert!(heap.heap.region().len() <= 16 * 1024);
        for ptr in ptrs {
            heap.deallocate(ptr, 1000);
        }
        assert!(heap.allocate(1000).is_some());
    }

    #[test]
    fn test_double_free_is_ignored() {
        let mut heap = TestHeap::new(1 << 20);
        let a = heap.allocate(64).unwrap();
        let b = heap.allocate(64).unwrap();
        heap.heap.deallocate(Some(a));
        heap.heap.deallocate(Some(a));
        heap.heap.check().unwrap();
        heap.heap.deallocate(Some(b));
        heap.heap.deallocate(Some(b));
        heap.heap.deallocate(Some(a));
        assert_eq!(heap.heap.check().unwrap().free_blocks, 1);
    }

    #[test]
    fn test_invalid_pointers_are_ignored() {
        let mut heap = TestHeap::new(1 << 20);
        let a = heap.allocate(64).unwrap();
        heap.heap.deallocate(None);
        for offset in [0, 8, 12, a.offset() + 4, a.offset() + 8, 1 << 30] {
            let ptr = HeapPtr::from_offset(offset);
            heap.heap.deallocate(Some(ptr));
            assert_eq!(heap.heap.reallocate(Some(ptr), 10), None);
            assert_eq!(heap.heap.payload(ptr), None);
            heap.heap.check().unwrap();
        }
        heap.deallocate(a, 64);
    }

    #[test]
    fn test_allocate_zeroed() {
        let mut heap = TestHeap::new(1 << 20);
        let a = heap.allocate(256).unwrap();
        heap.deallocate(a, 256);
        let b = heap.heap.allocate_zeroed(16, 16).unwrap();
        assert_eq!(b, a);
        assert!(heap.heap.payload(b).unwrap().iter().all(|&x| x == 0));
        assert_eq!(heap.heap.allocate_zeroed(usize::MAX, 2), None);
        assert_eq!(heap.heap.allocate_zeroed(0, 2), None);
    }

    #[test]
    fn test_reallocate_degenerate_inputs() {
        let mut heap = TestHeap::new(1 << 20);
        let a = heap.heap.reallocate(None, 40).unwrap();
        assert!(heap.heap.payload(a).is_some());
        assert_eq!(heap.heap.reallocate(Some(a), 0), None);
        assert_eq!(heap.heap.payload(a), None);
        assert_eq!(heap.heap.check().unwrap().allocated_blocks, 0);
    }

    #[test]
    fn test_reallocate_shrink_in_place() {
        let mut heap = TestHeap::new(1 << 20);
        let a = heap.allocate(200).unwrap();
        let b = heap.allocate(200).unwrap();
        let shrunk = heap.heap.reallocate(Some(a), 50).unwrap();
        assert_eq!(shrunk, a);
        assert!(heap.heap.payload(a).unwrap()[..50].iter().all(|&x| x == 0x33));
        // the split-off remainder sits between a and b
        let blocks = heap.heap.blocks().collect::<Vec<_>>();
        assert!(blocks[1].is_free());
        assert_eq!(blocks[2].ptr(), b);
        heap.heap.check().unwrap();
    }

    #[test]
    fn test_reallocate_grow_into_free_successor() {
        let mut heap = TestHeap::new(1 << 20);
        let a = heap.allocate(100).unwrap();
        let b = heap.allocate(100).unwrap();
        let c = heap.allocate(100).unwrap();
        heap.deallocate(b, 100);
        let grown = heap.heap.reallocate(Some(a), 180).unwrap();
        assert_eq!(grown, a);
        assert!(heap.heap.payload(a).unwrap()[..100].iter().all(|&x| x == 0x33));
        let stats = heap.heap.check().unwrap();
        assert_eq!(stats.allocated_blocks, 2);
        heap.deallocate(c, 100);
    }

    #[test]
    fn test_reallocate_grow_at_heap_end() {
        let mut heap = TestHeap::with_config(1 << 20, HeapConfig::new().with_chunk_size(128));
        let a = heap.allocate(112).unwrap();
        assert_eq!(heap.heap.blocks().count(), 1);
        let grown = heap.heap.reallocate(Some(a), 1000).unwrap();
        assert_eq!(grown, a);
        assert_eq!(heap.heap.usable_size(a), Some(1000));
        assert!(heap.heap.payload(a).unwrap()[..112].iter().all(|&x| x == 0x33));
        assert_eq!(heap.heap.heap_size(), 16 + 1008);
        heap.heap.check().unwrap();
    }

    #[test]
    fn test_reallocate_moves_when_boxed_in() {
        let mut heap = TestHeap::new(1 << 20);
        let a = heap.allocate(50).unwrap();
        heap.heap.payload_mut(a).unwrap()[..50].fill(0xab);
        let _b = heap.allocate(50).unwrap();
        let moved = heap.heap.reallocate(Some(a), 500).unwrap();
        assert_ne!(moved, a);
        assert!(heap.heap.payload(moved).unwrap()[..50].iter().all(|&x| x == 0xab));
        assert_eq!(heap.heap.payload(a), None);
        heap.heap.check().unwrap();
    }

    #[test]
    fn test_reallocate_failure_keeps_original() {
        let mut heap = TestHeap::new(16 + 4096);
        let a = heap.allocate(1000).unwrap();
        let _b = heap.allocate(1000).unwrap();
        assert_eq!(heap.heap.reallocate(Some(a), 3000), None);
        assert!(heap.heap.payload(a).unwrap()[..1000].iter().all(|&x| x == 0x33));
        heap.heap.check().unwrap();
    }

    #[test]
    fn test_fit_policies_keep_invariants() {
        for policy in [FitPolicy::ClassLocal, FitPolicy::FirstFit, FitPolicy::BestFit] {
            let mut heap =
                TestHeap::with_config(1 << 20, HeapConfig::new().with_fit_policy(policy));
            let sizes = [24, 300, 17, 64, 1000, 8, 128, 513];
            let ptrs = sizes
                .iter()
                .map(|&size| (heap.allocate(size).unwrap(), size))
                .collect::<Vec<_>>();
            for &(ptr, size) in ptrs.iter().rev().step_by(3) {
                heap.deallocate(ptr, size);
            }
            for &size in &sizes {
                heap.allocate(size).unwrap();
            }
            assert!(heap.heap.blocks().all(|block| match block {
                Block::Free { size, .. } | Block::Allocated { size, .. } => size >= 16,
            }));
        }
    }
}
