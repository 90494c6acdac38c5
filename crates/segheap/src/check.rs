//! Heap consistency checker.

use alloc::vec::Vec;

use snafu::ensure;

use crate::{
    codec::{self, ALIGNMENT, MIN_BLOCK_SIZE, OVERHEAD, Tag},
    error::{
        AdjacentFreeSnafu, BrokenLinkSnafu, CheckError, EpilogueSnafu, ListCountMismatchSnafu,
        ListedAllocatedSnafu, ListedTwiceSnafu, ListedUnknownSnafu, MisalignedSnafu,
        OutOfBoundsSnafu, PrologueSnafu, TagMismatchSnafu, UndersizedSnafu, WrongClassSnafu,
    },
    free_list::{CLASS_COUNT, FreeLists, class_of},
};

/// Occupancy summary produced by a successful check.
///
/// Byte counts are full block sizes, boundary tags included.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HeapStats {
    /// Bytes between the start of the heap and the end of the epilogue.
    pub heap_size: usize,
    pub allocated_blocks: usize,
    pub allocated_bytes: usize,
    pub free_blocks: usize,
    pub free_bytes: usize,
    pub largest_free: usize,
}

struct WalkedBlock {
    bp: u32,
    allocated: bool,
    linked: bool,
}

pub(crate) fn check_heap(
    bytes: &[u8],
    prologue: u32,
    epilogue: u32,
    lists: &FreeLists,
) -> Result<HeapStats, CheckError> {
    ensure!(
        codec::read_tag(bytes, codec::header(prologue)) == Tag::PROLOGUE
            && codec::read_tag(bytes, prologue) == Tag::PROLOGUE,
        PrologueSnafu { offset: prologue }
    );
    ensure!(
        epilogue as usize == bytes.len()
            && codec::read_tag(bytes, codec::header(epilogue)) == Tag::EPILOGUE,
        EpilogueSnafu { offset: epilogue }
    );

    let mut stats = HeapStats {
        heap_size: (epilogue - (prologue - ALIGNMENT)) as usize,
        ..HeapStats::default()
    };
    let mut blocks = Vec::new();
    let mut prev_free = false;
    let mut bp = prologue + ALIGNMENT;
    while bp < epilogue {
        ensure!(bp.is_multiple_of(ALIGNMENT), MisalignedSnafu { offset: bp });
        let tag = codec::read_tag(bytes, codec::header(bp));
        let size = tag.size();
        ensure!(size >= MIN_BLOCK_SIZE, UndersizedSnafu { offset: bp, size });
        ensure!(
            bp.checked_add(size).is_some_and(|end| end <= epilogue),
            OutOfBoundsSnafu { offset: bp, size }
        );
        let footer = codec::read_tag(bytes, bp + size - OVERHEAD);
        ensure!(
            footer == tag,
            TagMismatchSnafu {
                offset: bp,
                header: tag.bits(),
                footer: footer.bits(),
            }
        );

        if tag.is_allocated() {
            stats.allocated_blocks += 1;
            stats.allocated_bytes += size as usize;
        } else {
            ensure!(!prev_free, AdjacentFreeSnafu { offset: bp });
            stats.free_blocks += 1;
            stats.free_bytes += size as usize;
            stats.largest_free = stats.largest_free.max(size as usize);
        }
        prev_free = !tag.is_allocated();
        blocks.push(WalkedBlock {
            bp,
            allocated: tag.is_allocated(),
            linked: false,
        });
        bp += size;
    }

    let mut listed = 0;
    for class in 0..CLASS_COUNT {
        let mut prev = None;
        // a list longer than the number of free blocks must contain a cycle
        for bp in lists.iter_class(bytes, class).take(stats.free_blocks + 1) {
            let Ok(index) = blocks.binary_search_by_key(&bp, |block| block.bp) else {
                return ListedUnknownSnafu { offset: bp, class }.fail();
            };
            let block = &mut blocks[index];
            ensure!(!block.allocated, ListedAllocatedSnafu { offset: bp, class });
            ensure!(!block.linked, ListedTwiceSnafu { offset: bp });
            block.linked = true;

            let expected = class_of(codec::block_size(bytes, bp));
            ensure!(
                expected == class,
                WrongClassSnafu {
                    offset: bp,
                    class,
                    expected,
                }
            );
            ensure!(
                codec::read_prev_link(bytes, bp) == prev,
                BrokenLinkSnafu { offset: bp }
            );
            prev = Some(bp);
            listed += 1;
        }
    }
    ensure!(
        listed == stats.free_blocks,
        ListCountMismatchSnafu {
            listed,
            free: stats.free_blocks,
        }
    );

    Ok(stats)
}
