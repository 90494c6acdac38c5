//! Error types reported by the heap and its backing regions.
//!
//! The allocation operations themselves keep the classic `malloc` surface
//! and report exhaustion as `None`; the types here describe *why* a
//! growth, an initialization or a consistency check failed.

use alloc::collections::TryReserveError;

use snafu::{Location, Snafu};

/// Failure of the growth primitive of a [`MemoryRegion`].
///
/// A failed growth never has partial effects: the region keeps its
/// previous length and contents.
///
/// [`MemoryRegion`]: crate::region::MemoryRegion
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum GrowError {
    #[snafu(display(
        "region limit exceeded: {requested} more bytes requested, {available} bytes available"
    ))]
    LimitExceeded {
        requested: usize,
        available: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("failed to reserve {requested} bytes of backing storage"))]
    Reserve {
        requested: usize,
        #[snafu(source)]
        source: TryReserveError,
        #[snafu(implicit)]
        location: Location,
    },
}

/// Failure while setting up a new heap.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum InitError {
    #[snafu(display("failed to grow the heap region"))]
    Grow {
        #[snafu(source)]
        source: GrowError,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display(
        "invalid chunk size {size}: must be a multiple of 8 and at least 16 bytes"
    ))]
    InvalidChunkSize {
        size: u32,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("region base offset {base:#x} is not 8-byte aligned"))]
    MisalignedRegion {
        base: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("region base offset {base:#x} does not fit in 32 bits"))]
    RegionTooLarge {
        base: usize,
        #[snafu(implicit)]
        location: Location,
    },
}

/// A structural invariant violation found by [`Heap::check`].
///
/// Every variant carries the payload offset of the offending block.
///
/// [`Heap::check`]: crate::heap::Heap::check
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CheckError {
    #[snafu(display("corrupted prologue at {offset:#x}"))]
    Prologue {
        offset: u32,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("corrupted or misplaced epilogue at {offset:#x}"))]
    Epilogue {
        offset: u32,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("block at {offset:#x} is not 8-byte aligned"))]
    Misaligned {
        offset: u32,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("block at {offset:#x} has size {size}, below the minimum block size"))]
    Undersized {
        offset: u32,
        size: u32,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("block at {offset:#x} with size {size} runs past the epilogue"))]
    OutOfBounds {
        offset: u32,
        size: u32,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display(
        "block at {offset:#x} has header {header:#x} but footer {footer:#x}"
    ))]
    TagMismatch {
        offset: u32,
        header: u32,
        footer: u32,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("free block at {offset:#x} follows another free block"))]
    AdjacentFree {
        offset: u32,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("allocated block at {offset:#x} is linked in free list {class}"))]
    ListedAllocated {
        offset: u32,
        class: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("free list {class} links to {offset:#x}, which is not a block"))]
    ListedUnknown {
        offset: u32,
        class: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("free block at {offset:#x} is linked more than once"))]
    ListedTwice {
        offset: u32,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("free block at {offset:#x} is in list {class}, expected list {expected}"))]
    WrongClass {
        offset: u32,
        class: usize,
        expected: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("free block at {offset:#x} has an inconsistent previous link"))]
    BrokenLink {
        offset: u32,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("{listed} blocks are linked in free lists, but the heap has {free} free blocks"))]
    ListCountMismatch {
        listed: usize,
        free: usize,
        #[snafu(implicit)]
        location: Location,
    },
}
